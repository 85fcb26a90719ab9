//! Command implementations
//!
//! Every command opens the engine on the configured base directory with a
//! detached host, runs, and shuts the engine down again:
//! - list, info, status, pins, history: read-only views
//! - install, install-store: add extensions
//! - enable, disable, uninstall, update, clean: lifecycle changes
//! - pin, unpin: toolbar list
//! - validate: dry-run validation of a package

mod history;
mod install;
mod list;
mod manage;
mod validate;

use anyhow::{Context, Result};
use quiver_core::EngineConfig;
use quiver_extensions::{DetachedHost, EngineContext, LifecycleCoordinator};
use std::sync::Arc;
use tracing::debug;

use crate::cli::{Cli, Commands};

/// Engine configuration from the environment plus CLI overrides
fn engine_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = EngineConfig::load().context("Failed to load engine configuration")?;
    if let Some(home) = &cli.home {
        config.base_dir = home.clone().into_std_path_buf();
    }
    if let Some(bundled) = &cli.bundled_dir {
        config = config.with_bundled_dir(bundled.clone().into_std_path_buf());
    }
    Ok(config)
}

/// Open and start the engine
async fn open_engine(config: EngineConfig) -> Result<LifecycleCoordinator> {
    let ctx = EngineContext::new(config).context("Failed to initialize engine")?;
    let engine = LifecycleCoordinator::new(ctx, Arc::new(DetachedHost::new()), None);
    let report = engine.start().await.context("Failed to start engine")?;
    debug!(
        "Engine ready: {} loaded, {} bundled imported, {} load failures",
        report.loaded,
        report.bundled.imported.len(),
        report.load_failures.len()
    );
    Ok(engine)
}

/// Main entry point for all commands
pub async fn run(cli: Cli) -> Result<()> {
    let config = engine_config(&cli)?;
    let engine = open_engine(config).await?;
    let json = cli.json;
    let result = match cli.command {
        Commands::List => list::run(&engine, json).await,
        Commands::Info(args) => list::info(&engine, &args.id, json).await,
        Commands::Pins => list::pins(&engine, json).await,
        Commands::Status => list::status(&engine, json).await,
        Commands::History(args) => history::run(&engine, &args, json),
        Commands::Install(args) => install::run(&engine, &args, json).await,
        Commands::InstallStore(args) => install::from_store(&engine, &args, json).await,
        Commands::Enable(args) => manage::toggle(&engine, &args.id, true, json).await,
        Commands::Disable(args) => manage::toggle(&engine, &args.id, false, json).await,
        Commands::Uninstall(args) => manage::uninstall(&engine, &args.id, json).await,
        Commands::Update => manage::update(&engine, json).await,
        Commands::Pin(args) => manage::pin(&engine, &args.id, json).await,
        Commands::Unpin(args) => manage::unpin(&engine, &args.id, json).await,
        Commands::Clean => manage::clean(&engine, json).await,
        Commands::Validate(args) => validate::run(engine.context(), &args, json),
    };

    engine
        .shutdown()
        .await
        .context("Failed to shut the engine down")?;
    result
}
