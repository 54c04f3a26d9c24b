use serde::Serialize;
use std::path::Path;

use crate::output::{print_json, print_table};

#[derive(Serialize)]
struct SyncRow {
    name: String,
    when: Vec<String>,
    then: Vec<String>,
    filter: bool,
}

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let app = super::inspect(&config)?;

    let rows: Vec<SyncRow> = app
        .engine
        .syncs()
        .iter()
        .map(|rule| SyncRow {
            name: rule.name().to_string(),
            when: rule.when().iter().map(|p| p.action.to_string()).collect(),
            then: rule.then().iter().map(|i| i.action.to_string()).collect(),
            filter: rule.has_filter(),
        })
        .collect();

    if json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No syncs installed.");
        return Ok(());
    }
    print_table(
        &["NAME", "WHEN", "THEN"],
        rows.into_iter()
            .map(|r| {
                let name = if r.filter {
                    format!("{} (filtered)", r.name)
                } else {
                    r.name
                };
                vec![name, r.when.join(", "), r.then.join(", ")]
            })
            .collect(),
    );
    Ok(())
}
