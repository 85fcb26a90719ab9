//! Lifecycle changes: enable, disable, uninstall, update, pin, unpin, clean

use anyhow::Result;
use quiver_extensions::lifecycle::SkipReason;
use quiver_extensions::LifecycleCoordinator;
use tabled::{settings::Style, Table, Tabled};

use crate::output;

/// Enable or disable an extension
pub(super) async fn toggle(
    engine: &LifecycleCoordinator,
    id: &str,
    enabled: bool,
    json: bool,
) -> Result<()> {
    let result = engine.toggle(id, enabled).await;
    output::finish(json, result, |record| {
        let verb = if record.enabled { "Enabled" } else { "Disabled" };
        output::success(&format!("{} {}", verb, record.label()));
    })
}

/// Remove an extension
pub(super) async fn uninstall(engine: &LifecycleCoordinator, id: &str, json: bool) -> Result<()> {
    let result = engine.uninstall(id).await;
    output::finish(json, result, |_| {
        output::success(&format!("Uninstalled {}", id));
    })
}

#[derive(Tabled)]
struct UpdateRow {
    id: String,
    result: String,
}

/// Update every web store extension
pub(super) async fn update(engine: &LifecycleCoordinator, json: bool) -> Result<()> {
    let result = engine.update().await;
    output::finish(json, result, |summary| {
        let mut rows = Vec::new();
        for entry in &summary.updated {
            rows.push(UpdateRow {
                id: entry.id.clone(),
                result: if entry.loaded {
                    format!("updated {} -> {}", entry.from, entry.to)
                } else {
                    format!("updated {} -> {} (not loaded)", entry.from, entry.to)
                },
            });
        }
        for skip in &summary.skipped {
            rows.push(UpdateRow {
                id: skip.id.clone(),
                result: match skip.reason {
                    SkipReason::AlreadyLatest => "already latest".to_string(),
                    SkipReason::NotWebstore => "skipped (not from the web store)".to_string(),
                },
            });
        }
        for error in &summary.errors {
            rows.push(UpdateRow {
                id: error.id.clone(),
                result: format!("failed: {}", error.error),
            });
        }
        if rows.is_empty() {
            output::info("No extensions to update");
            return;
        }
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
        output::info(&format!(
            "{} updated, {} skipped, {} failed",
            summary.updated.len(),
            summary.skipped.len(),
            summary.errors.len()
        ));
    })
}

/// Pin an extension to the toolbar
pub(super) async fn pin(engine: &LifecycleCoordinator, id: &str, json: bool) -> Result<()> {
    let result = engine.pin(id).await;
    output::finish(json, result, |pinned| {
        output::success(&format!("Pinned {} ({} pinned)", id, pinned.len()));
    })
}

/// Remove an extension from the toolbar
pub(super) async fn unpin(engine: &LifecycleCoordinator, id: &str, json: bool) -> Result<()> {
    let result = engine.unpin(id).await;
    output::finish(json, result, |pinned| {
        output::success(&format!("Unpinned {} ({} pinned)", id, pinned.len()));
    })
}

/// Drop stale registry entries
pub(super) async fn clean(engine: &LifecycleCoordinator, json: bool) -> Result<()> {
    let result = engine.validate_and_clean().await;
    output::finish(json, result, |report| {
        for removed in &report.removed {
            output::warning(&format!("Removed {} ({:?})", removed.id, removed.reason));
        }
        output::success(&format!(
            "Registry checked: {} -> {} entries",
            report.initial, report.remaining
        ));
    })
}
