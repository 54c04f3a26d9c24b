use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    limit: Option<usize>,
}

/// GET {base}/_concord/history — most recent action records, newest first.
pub async fn history(
    State(app): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Value> {
    let records = app.engine.recent(params.limit.unwrap_or(DEFAULT_LIMIT));
    let records: Vec<&concord_core::ActionRecord> = records.iter().map(|r| r.as_ref()).collect();
    Json(json!({ "records": records }))
}
