//! Lifecycle events recorded in the activity ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-extension lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Staged,
    /// On disk and registered, not loaded
    Installed,
    /// Loaded in the host
    Loaded,
    Removed,
}

/// Extension lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtensionEvent {
    Installed {
        name: String,
        version: String,
        source: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },

    InstallFailed {
        code: String,
        error_message: String,
    },

    /// The host refused a load; the record is kept for a retry
    LoadFailed {
        version: String,
        error_message: String,
    },

    Enabled {
        version: String,
    },

    Disabled {
        version: String,
    },

    Uninstalled {
        version: String,
    },

    Updated {
        from_version: String,
        to_version: String,
    },

    /// The host assigned a different id than the provisional one
    IdReassigned {
        from_id: String,
        to_id: String,
    },
}

impl ExtensionEvent {
    /// Snake-case type name, as serialized
    pub fn type_name(&self) -> &'static str {
        match self {
            ExtensionEvent::Installed { .. } => "installed",
            ExtensionEvent::InstallFailed { .. } => "install_failed",
            ExtensionEvent::LoadFailed { .. } => "load_failed",
            ExtensionEvent::Enabled { .. } => "enabled",
            ExtensionEvent::Disabled { .. } => "disabled",
            ExtensionEvent::Uninstalled { .. } => "uninstalled",
            ExtensionEvent::Updated { .. } => "updated",
            ExtensionEvent::IdReassigned { .. } => "id_reassigned",
        }
    }

    /// Version the event refers to, when it carries one
    pub fn version(&self) -> Option<&str> {
        match self {
            ExtensionEvent::Installed { version, .. }
            | ExtensionEvent::LoadFailed { version, .. }
            | ExtensionEvent::Enabled { version }
            | ExtensionEvent::Disabled { version }
            | ExtensionEvent::Uninstalled { version } => Some(version),
            ExtensionEvent::Updated { to_version, .. } => Some(to_version),
            ExtensionEvent::InstallFailed { .. } | ExtensionEvent::IdReassigned { .. } => None,
        }
    }
}

/// Event metadata envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID (UUID v4)
    pub event_id: String,

    pub timestamp: DateTime<Utc>,

    /// Extension id, or the hashed source label when no id was assigned yet
    pub extension_id: String,

    /// Engine version that recorded the event
    pub engine_version: String,

    pub state_before: Option<LifecycleState>,

    pub state_after: Option<LifecycleState>,

    pub event: ExtensionEvent,
}

impl EventEnvelope {
    pub fn new(
        extension_id: impl Into<String>,
        state_before: Option<LifecycleState>,
        state_after: Option<LifecycleState>,
        event: ExtensionEvent,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            extension_id: extension_id.into(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            state_before,
            state_after,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installed_serialization() {
        let event = ExtensionEvent::Installed {
            name: "Demo".to_string(),
            version: "1.2.3".to_string(),
            source: "file-crx".to_string(),
            warnings: vec![],
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"installed"#));
        assert!(!json.contains("warnings"));

        let deserialized: ExtensionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
        assert_eq!(event.type_name(), "installed");
    }

    #[test]
    fn test_envelope_serialization() {
        let envelope = EventEnvelope::new(
            "a".repeat(32),
            Some(LifecycleState::Installed),
            Some(LifecycleState::Loaded),
            ExtensionEvent::Enabled {
                version: "1.0.0".to_string(),
            },
        );

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""state_after":"loaded"#));
        assert!(json.contains(r#""type":"enabled"#));

        let deserialized: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.extension_id, envelope.extension_id);
        assert_eq!(deserialized.event.version(), Some("1.0.0"));
    }

    #[test]
    fn test_updated_reports_target_version() {
        let event = ExtensionEvent::Updated {
            from_version: "1.0.0".into(),
            to_version: "1.0.1".into(),
        };
        assert_eq!(event.version(), Some("1.0.1"));
    }
}
