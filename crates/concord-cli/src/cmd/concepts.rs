use serde_json::json;
use std::path::Path;

use concord_core::ActionKind;

use crate::output::{print_json, print_table};

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    let concepts = super::inspect(&config)?.engine.concepts();

    if json {
        return print_json(&json!({ "concepts": concepts }));
    }

    let mut rows = Vec::new();
    for concept in &concepts {
        for action in &concept.actions {
            let kind = match action.kind {
                ActionKind::Action => "action",
                ActionKind::Query => "query",
            };
            rows.push(vec![
                concept.concept.clone(),
                action.name.to_string(),
                kind.to_string(),
                action.inputs.join(", "),
                action.outputs.join(", "),
            ]);
        }
    }
    print_table(&["CONCEPT", "ACTION", "KIND", "INPUTS", "OUTPUTS"], rows);
    Ok(())
}
