use serde::Serialize;
use std::path::Path;

use concord_core::config::{ConfigWarning, WarnLevel};
use concord_core::engine::ValidationIssue;

use crate::output::print_json;

#[derive(Serialize)]
struct CheckReport {
    warnings: Vec<ConfigWarning>,
    syncs: usize,
    rejected: Vec<ValidationIssue>,
}

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let warnings = config.validate();
    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);

    let report = super::inspect(&config)?.report;
    let failed = has_errors || !report.rejected.is_empty();

    if json {
        print_json(&CheckReport {
            warnings,
            syncs: report.installed.len(),
            rejected: report.rejected,
        })?;
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
        for issue in &report.rejected {
            println!("[error] sync '{}': {}", issue.sync, issue.problem);
        }
        if !failed {
            println!(
                "Config is valid. {} syncs installed.",
                report.installed.len()
            );
        }
    }

    if failed {
        anyhow::bail!("check found errors");
    }
    Ok(())
}
