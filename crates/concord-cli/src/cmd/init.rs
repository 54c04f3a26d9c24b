use anyhow::Context;
use std::path::Path;

use concord_core::config::Config;
use concord_core::io;

use crate::output::print_json;

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let data = serde_yaml::to_string(&Config::default())?;
    let created = io::write_if_missing(path, data.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;

    if json {
        return print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "created": created,
        }));
    }

    if created {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists; left unchanged.", path.display());
    }
    Ok(())
}
