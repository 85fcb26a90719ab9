//! Terminal output utilities

use anyhow::{anyhow, Result};
use console::style;
use quiver_core::OperationResult;
use serde::Serialize;

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", style("ℹ").blue().bold(), msg);
}

/// Print a header
pub fn header(msg: &str) {
    println!("\n{}", style(msg).bold().underlined());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", style(key).dim(), value);
}

/// Report an engine result
///
/// JSON mode prints the `{ success, code, warnings, data }` envelope; the
/// human mode hands successes to `render` and turns failures into an error
/// carrying the stable code.
pub fn finish<T: Serialize>(
    json: bool,
    result: quiver_core::Result<T>,
    render: impl FnOnce(&T),
) -> Result<()> {
    if json {
        let failed = result.as_ref().err().map(|e| e.code());
        let envelope = OperationResult::from_result(result);
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return match failed {
            Some(code) => Err(anyhow!("Operation failed with {}", code)),
            None => Ok(()),
        };
    }

    match result {
        Ok(value) => {
            render(&value);
            Ok(())
        }
        Err(e) => {
            for w in e.warnings() {
                warning(w);
            }
            Err(anyhow!("{} [{}]", e, e.code()))
        }
    }
}

/// Join a list for display, `-` when empty
pub fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}
