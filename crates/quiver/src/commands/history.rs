//! Activity history command

use anyhow::{Context, Result};
use quiver_extensions::LifecycleCoordinator;
use tabled::{settings::Style, Table, Tabled};

use crate::cli::HistoryArgs;
use crate::output;

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "date/time")]
    timestamp: String,
    event: String,
    version: String,
}

/// Show the activity history of one extension, newest first
pub(super) fn run(engine: &LifecycleCoordinator, args: &HistoryArgs, json: bool) -> Result<()> {
    let events = engine
        .ledger()
        .history(&args.id, Some(args.limit))
        .context("Failed to read the activity ledger")?;

    output::finish(json, Ok(events), |events| {
        if events.is_empty() {
            output::info(&format!("No activity recorded for {}", args.id));
            return;
        }
        let rows: Vec<HistoryRow> = events
            .iter()
            .map(|e| HistoryRow {
                timestamp: e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                event: e.event.type_name().to_string(),
                version: e.event.version().unwrap_or("-").to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
    })
}
