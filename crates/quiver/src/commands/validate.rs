//! Package validation command
//!
//! Runs the same checks as an install without placing anything. Archives
//! are extracted to the staging area and discarded afterwards.

use anyhow::Result;
use quiver_extensions::installer::read_manifest;
use quiver_extensions::{
    EngineContext, Installer, ManifestValidator, ValidationOutcome, ValidationReport,
};

use crate::cli::ValidateArgs;
use crate::output;

fn validate(ctx: &EngineContext, args: &ValidateArgs) -> quiver_core::Result<ValidationReport> {
    let path = args.path.as_std_path();
    if path.is_dir() {
        let manifest = read_manifest(path)?;
        return Ok(ManifestValidator::new(&ctx.policy).validate(&manifest, Some(path)));
    }
    let plan = Installer::new(ctx.clone()).inspect_archive(path)?;
    Ok(plan.report)
}

/// Validate a package directory or archive
pub(super) fn run(ctx: &EngineContext, args: &ValidateArgs, json: bool) -> Result<()> {
    let result = validate(ctx, args);
    output::finish(json, result, |report| {
        for error in &report.errors {
            output::warning(&format!("error: {}", error));
        }
        for warning in &report.warnings {
            output::warning(warning);
        }
        output::kv("files", &report.file_count.to_string());
        output::kv("bytes", &report.total_bytes.to_string());
        output::kv("risk score", &report.risk_score.to_string());
        if report.requires_confirmation {
            output::info(&format!(
                "Installing requires confirmation for: {}",
                output::list_or_dash(&report.dangerous_permissions)
            ));
        }
        match report.outcome {
            ValidationOutcome::Allow => output::success(&format!("{} is valid", args.path)),
            ValidationOutcome::Warn => {
                output::success(&format!("{} is valid with warnings", args.path))
            }
            ValidationOutcome::Deny => output::warning(&format!("{} would be rejected", args.path)),
        }
    })
}
