//! Install commands

use anyhow::Result;
use quiver_extensions::{InstallOptions, InstallOutcome, LifecycleCoordinator};

use crate::cli::{InstallArgs, InstallStoreArgs};
use crate::output;

fn report(outcome: &InstallOutcome) {
    let record = &outcome.record;
    output::success(&format!(
        "Installed {} {} as {}",
        record.label(),
        record.version,
        record.id
    ));
    for warning in &outcome.warnings {
        output::warning(warning);
    }
    if outcome.pinned {
        output::info("Pinned to the toolbar");
    }
}

/// Install from a local package
pub(super) async fn run(
    engine: &LifecycleCoordinator,
    args: &InstallArgs,
    json: bool,
) -> Result<()> {
    let options = InstallOptions { confirmed: args.yes };
    let result = engine.install(args.path.as_str(), options).await;
    if let Err(e) = &result {
        if !json && !args.yes && e.to_string().contains("Confirmation required") {
            output::info("Re-run with --yes to accept these permissions");
        }
    }
    output::finish(json, result, report)
}

/// Install from the web store
pub(super) async fn from_store(
    engine: &LifecycleCoordinator,
    args: &InstallStoreArgs,
    json: bool,
) -> Result<()> {
    let result = engine.install_from_store(&args.url_or_id).await;
    output::finish(json, result, report)
}
