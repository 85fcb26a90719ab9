//! Read-only views: list, info, pins, status

use anyhow::Result;
use quiver_core::types::ExtensionRecord;
use quiver_extensions::LifecycleCoordinator;
use tabled::{settings::Style, Table, Tabled};

use crate::output;

#[derive(Tabled)]
struct ExtensionRow {
    id: String,
    name: String,
    version: String,
    source: String,
    state: String,
    pinned: String,
    #[tabled(rename = "risk score")]
    risk: u32,
}

fn state_of(record: &ExtensionRecord) -> String {
    let mut state = match (record.enabled, record.is_loaded()) {
        (true, true) => "loaded".to_string(),
        (true, false) => "enabled".to_string(),
        (false, _) => "disabled".to_string(),
    };
    if record.is_system {
        state.push_str(" (system)");
    }
    state
}

/// List installed extensions
pub(super) async fn run(engine: &LifecycleCoordinator, json: bool) -> Result<()> {
    let records = engine.list().await;
    let pinned = engine.get_pinned().await;

    output::finish(json, Ok(records), |records| {
        if records.is_empty() {
            output::info("No extensions installed yet");
            output::info("Install one with: quiver install <path>");
            return;
        }
        let rows: Vec<ExtensionRow> = records
            .iter()
            .map(|r| ExtensionRow {
                id: r.id.clone(),
                name: r.label().to_string(),
                version: r.version.clone(),
                source: r.source.to_string(),
                state: state_of(r),
                pinned: if pinned.contains(&r.id) { "yes" } else { "" }.to_string(),
                risk: r.risk_score,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
    })
}

/// Show one extension
pub(super) async fn info(engine: &LifecycleCoordinator, id: &str, json: bool) -> Result<()> {
    let result = engine.get_info(id).await;
    output::finish(json, result, |record| {
        output::header(record.label());
        output::kv("id", &record.id);
        output::kv("name", &record.name);
        output::kv("version", &record.version);
        if !record.display_description.is_empty() {
            output::kv("description", &record.display_description);
        }
        output::kv("source", &record.source.to_string());
        output::kv("state", &state_of(record));
        output::kv("path", &record.installed_path.display().to_string());
        if let Some(host_id) = &record.host_id {
            output::kv("host id", host_id);
        }
        if let Some(key_id) = &record.key_id {
            output::kv("key id", key_id);
        }
        output::kv("permissions", &output::list_or_dash(&record.permissions));
        output::kv("risk score", &record.risk_score.to_string());
        output::kv(
            "installed",
            &record.install_date.format("%Y-%m-%d %H:%M").to_string(),
        );
        if let Some(checked) = record.update.last_checked {
            output::kv(
                "last update check",
                &checked.format("%Y-%m-%d %H:%M").to_string(),
            );
        }
        for warning in &record.warnings {
            output::warning(warning);
        }
    })
}

/// Show the pinned toolbar list
pub(super) async fn pins(engine: &LifecycleCoordinator, json: bool) -> Result<()> {
    let pinned = engine.get_pinned().await;
    output::finish(json, Ok(pinned), |pinned| {
        if pinned.is_empty() {
            output::info("Nothing is pinned");
            return;
        }
        for (slot, id) in pinned.iter().enumerate() {
            println!("  {}. {}", slot + 1, id);
        }
    })
}

/// Show engine status
pub(super) async fn status(engine: &LifecycleCoordinator, json: bool) -> Result<()> {
    let status = engine.status().await;
    output::finish(json, Ok(status), |status| {
        output::header("Extension engine");
        output::kv("base dir", &status.base_dir.display().to_string());
        output::kv("host", status.host);
        output::kv("installed", &status.total.to_string());
        output::kv("enabled", &status.enabled.to_string());
        output::kv("loaded", &status.loaded.to_string());
        output::kv("system", &status.system.to_string());
        output::kv("pinned", &status.pinned.to_string());
        output::kv(
            "web store",
            if status.store_available {
                "available"
            } else {
                "not configured"
            },
        );
    })
}
