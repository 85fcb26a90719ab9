//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Quiver - browser extension installation and lifecycle
#[derive(Parser, Debug)]
#[command(name = "quiver")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Engine base directory (defaults to ~/.quiver/extensions)
    #[arg(long, env = "QUIVER_HOME", global = true)]
    pub home: Option<Utf8PathBuf>,

    /// Directory holding preinstalled.json and bundled packages
    #[arg(long, env = "QUIVER_BUNDLED_DIR", global = true)]
    pub bundled_dir: Option<Utf8PathBuf>,

    /// Print results as JSON ({ success, code, warnings, data })
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List installed extensions
    List,

    /// Show one extension
    Info(IdArgs),

    /// Install from a local directory, .zip, .crx or .crx3 file
    Install(InstallArgs),

    /// Install from the web store by URL or id
    InstallStore(InstallStoreArgs),

    /// Enable (load) an extension
    Enable(IdArgs),

    /// Disable (unload) an extension
    Disable(IdArgs),

    /// Remove an extension and its files
    Uninstall(IdArgs),

    /// Update every web store extension
    Update,

    /// Pin an extension to the toolbar
    Pin(IdArgs),

    /// Remove an extension from the toolbar
    Unpin(IdArgs),

    /// Show the pinned toolbar list
    Pins,

    /// Drop stale registry entries
    Clean,

    /// Validate a package without installing it
    Validate(ValidateArgs),

    /// Show the activity history of an extension
    History(HistoryArgs),

    /// Show engine status
    Status,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Extension id (32 characters a-p)
    pub id: String,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Absolute path of the package
    pub path: Utf8PathBuf,

    /// Accept dangerous permissions without asking
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct InstallStoreArgs {
    /// Store URL or bare extension id
    pub url_or_id: String,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Package directory or archive
    pub path: Utf8PathBuf,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Extension id or source label
    pub id: String,

    /// Maximum number of events to show
    #[arg(short = 'n', long, default_value_t = 20)]
    pub limit: usize,
}
