//! Error types for quiver-core
//!
//! Every caller-facing failure carries a stable [`ErrorCode`]. The IPC layer
//! forwards the code verbatim, so the string forms below are part of the
//! public surface and must not change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using quiver-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes returned to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "E_INVALID_ID")]
    InvalidId,
    #[serde(rename = "E_INVALID_URL")]
    InvalidUrl,
    #[serde(rename = "E_INVALID_PATH")]
    InvalidPath,
    #[serde(rename = "E_PATH_TRAVERSAL")]
    PathTraversal,
    #[serde(rename = "E_ALREADY_EXISTS")]
    AlreadyExists,
    #[serde(rename = "E_NOT_AVAILABLE")]
    NotAvailable,
    #[serde(rename = "E_LOAD_FAILED")]
    LoadFailed,
    #[serde(rename = "E_REMOVE_FAILED")]
    RemoveFailed,
    #[serde(rename = "E_INSTALL_FAILED")]
    InstallFailed,
    #[serde(rename = "E_UPDATE_FAILED")]
    UpdateFailed,
    #[serde(rename = "E_PIN_LIMIT")]
    PinLimit,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
    #[serde(rename = "E_RATE_LIMIT")]
    RateLimit,
    #[serde(rename = "E_FETCH_FAILED")]
    FetchFailed,
    #[serde(rename = "E_VALIDATE_FAILED")]
    ValidateFailed,
}

impl ErrorCode {
    /// The literal code string (e.g. `E_PIN_LIMIT`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidId => "E_INVALID_ID",
            ErrorCode::InvalidUrl => "E_INVALID_URL",
            ErrorCode::InvalidPath => "E_INVALID_PATH",
            ErrorCode::PathTraversal => "E_PATH_TRAVERSAL",
            ErrorCode::AlreadyExists => "E_ALREADY_EXISTS",
            ErrorCode::NotAvailable => "E_NOT_AVAILABLE",
            ErrorCode::LoadFailed => "E_LOAD_FAILED",
            ErrorCode::RemoveFailed => "E_REMOVE_FAILED",
            ErrorCode::InstallFailed => "E_INSTALL_FAILED",
            ErrorCode::UpdateFailed => "E_UPDATE_FAILED",
            ErrorCode::PinLimit => "E_PIN_LIMIT",
            ErrorCode::InvalidState => "E_INVALID_STATE",
            ErrorCode::RateLimit => "E_RATE_LIMIT",
            ErrorCode::FetchFailed => "E_FETCH_FAILED",
            ErrorCode::ValidateFailed => "E_VALIDATE_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unknown extension id
    #[error("Invalid extension id: {id}")]
    InvalidId { id: String },

    /// Store URL rejected by the parser or the denylist
    #[error("Invalid store URL: {message}")]
    InvalidUrl { message: String },

    /// Input path rejected by the sanitizer
    #[error("Invalid path: {message}")]
    InvalidPath { message: String },

    /// Input path or archive entry escapes its allowed root
    #[error("Path traversal rejected: {message}")]
    PathTraversal { message: String },

    /// An extension with this id is already installed
    #[error("Extension already installed: {id}")]
    AlreadyExists { id: String },

    /// A collaborator (store, host capability) is not available
    #[error("Not available: {message}")]
    NotAvailable { message: String },

    /// The host refused to load an extension
    #[error("Failed to load extension {id}: {message}")]
    LoadFailed { id: String, message: String },

    /// Unloading or deleting an extension failed
    #[error("Failed to remove extension {id}: {message}")]
    RemoveFailed { id: String, message: String },

    /// Preparing or placing an extension on disk failed
    #[error("Install failed: {message}")]
    InstallFailed { message: String },

    /// An update sweep could not run
    #[error("Update failed: {message}")]
    UpdateFailed { message: String },

    /// The toolbar already holds the maximum number of pins
    #[error("Pin limit reached ({capacity} extensions)")]
    PinLimit { capacity: usize },

    /// The operation is not allowed in the record's current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Too many attempts from one sender
    #[error("Rate limit exceeded: {message}")]
    RateLimit { message: String },

    /// Fetching from the store failed
    #[error("Fetch failed: {message}")]
    FetchFailed { message: String },

    /// Manifest or policy validation denied the extension
    #[error("Validation failed: {}", errors.join("; "))]
    ValidateFailed {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    /// Writing engine state to disk failed
    ///
    /// Operations re-map this to their own code with [`Error::persist_as`].
    #[error("Failed to persist {what}: {message}")]
    Persist { what: &'static str, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Error {
    /// Stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidId { .. } => ErrorCode::InvalidId,
            Error::InvalidUrl { .. } => ErrorCode::InvalidUrl,
            Error::InvalidPath { .. } => ErrorCode::InvalidPath,
            Error::PathTraversal { .. } => ErrorCode::PathTraversal,
            Error::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Error::NotAvailable { .. } => ErrorCode::NotAvailable,
            Error::LoadFailed { .. } => ErrorCode::LoadFailed,
            Error::RemoveFailed { .. } => ErrorCode::RemoveFailed,
            Error::InstallFailed { .. }
            | Error::Persist { .. }
            | Error::Io(_)
            | Error::JsonParse(_) => {
                ErrorCode::InstallFailed
            }
            Error::UpdateFailed { .. } => ErrorCode::UpdateFailed,
            Error::PinLimit { .. } => ErrorCode::PinLimit,
            Error::InvalidState { .. } => ErrorCode::InvalidState,
            Error::RateLimit { .. } => ErrorCode::RateLimit,
            Error::FetchFailed { .. } => ErrorCode::FetchFailed,
            Error::ValidateFailed { .. } => ErrorCode::ValidateFailed,
        }
    }

    /// Warnings attached to the failure, if any
    pub fn warnings(&self) -> &[String] {
        match self {
            Error::ValidateFailed { warnings, .. } => warnings,
            _ => &[],
        }
    }

    /// Turn a persistence failure into the error `f` builds from its
    /// message; any other error passes through unchanged
    pub fn persist_as(self, f: impl FnOnce(String) -> Error) -> Error {
        match self {
            Error::Persist { .. } => {
                let message = self.to_string();
                f(message)
            }
            other => other,
        }
    }

    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId { id: id.into() }
    }

    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            message: message.into(),
        }
    }

    pub fn invalid_path(message: impl Into<String>) -> Self {
        Self::InvalidPath {
            message: message.into(),
        }
    }

    pub fn path_traversal(message: impl Into<String>) -> Self {
        Self::PathTraversal {
            message: message.into(),
        }
    }

    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    pub fn not_available(message: impl Into<String>) -> Self {
        Self::NotAvailable {
            message: message.into(),
        }
    }

    pub fn load_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LoadFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn remove_failed(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoveFailed {
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn install_failed(message: impl Into<String>) -> Self {
        Self::InstallFailed {
            message: message.into(),
        }
    }

    pub fn update_failed(message: impl Into<String>) -> Self {
        Self::UpdateFailed {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::RateLimit {
            message: message.into(),
        }
    }

    pub fn fetch_failed(message: impl Into<String>) -> Self {
        Self::FetchFailed {
            message: message.into(),
        }
    }

    /// Create a validation failure from report lists
    pub fn validate_failed(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self::ValidateFailed { errors, warnings }
    }
}

/// Structured result handed across the IPC boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> OperationResult<T> {
    /// Wrap an engine result, keeping the code and warnings of failures
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                code: None,
                error: None,
                warnings: Vec::new(),
                data: Some(data),
            },
            Err(e) => Self {
                success: false,
                code: Some(e.code()),
                warnings: e.warnings().to_vec(),
                error: Some(e.to_string()),
                data: None,
            },
        }
    }

    /// Attach warnings to a successful result
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}
