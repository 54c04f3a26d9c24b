use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::Value;
use std::sync::Arc;

use concord_core::requesting::{REQUEST, REQUEST_KEY, RESPOND};
use concord_core::{BurstReport, Dict, Requesting};

use crate::error::AppError;
use crate::state::AppState;

/// Request bodies are JSON objects; an empty body is an empty object.
fn parse_body(body: &[u8]) -> Result<Dict, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Dict::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::bad_request("request body must be a JSON object")),
        Err(e) => Err(AppError::bad_request(format!("invalid JSON body: {e}"))),
    }
}

/// Abandons the correlation id when the handler goes away, including when
/// the client disconnects mid-request.
struct Claim {
    requesting: Arc<Requesting>,
    request: String,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.requesting.abandon(&self.request);
    }
}

fn responded(report: &BurstReport, request: &str) -> bool {
    report.records_of(&RESPOND).any(|r| {
        !r.is_error() && r.input.get(REQUEST_KEY).and_then(Value::as_str) == Some(request)
    })
}

/// POST {base}/{*path} — run one request through the engine.
///
/// Passthrough paths invoke their concept action directly and return its
/// output. Every other path becomes a `Requesting.request` carrying the body
/// fields plus `path`; the response is whatever a sync hands to
/// `Requesting.respond` for the same request id. The rest of the burst runs
/// on its own task, so the timeout bounds the whole wait and a response is
/// returned as soon as it is delivered.
pub async fn handle(
    State(app): State<AppState>,
    Path(path): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let path = format!("/{}", path.trim_start_matches('/'));
    let mut input = parse_body(&body)?;

    if let Some(action) = app.config.passthrough_action(&path) {
        tracing::debug!(%path, %action, "passthrough");
        let report = app.engine.stimulate(action, input).await?.into_result()?;
        return Ok(Json(Value::Object(report.root.output.clone())));
    }

    input.insert("path".to_string(), Value::String(path.clone()));
    let started = app.engine.begin(REQUEST, input).await?;
    let request = started
        .root()
        .output
        .get(REQUEST_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError(anyhow::anyhow!("Requesting.request returned no request id")))?;
    let _claim = Claim {
        requesting: Arc::clone(&app.requesting),
        request: request.clone(),
    };

    tracing::debug!(%path, %request, burst = %started.id(), "awaiting response");
    let mut burst = {
        let requesting = Arc::clone(&app.requesting);
        tokio::spawn(async move {
            let report = started.run().await;
            requesting.release_nested(&report);
            report
        })
    };

    let wait = app.requesting.await_response(&request, app.config.timeout());
    tokio::pin!(wait);

    tokio::select! {
        response = &mut wait => Ok(Json(Value::Object(response?))),
        joined = &mut burst => {
            let report = joined?;
            let delivered = responded(&report, &request);
            if let Some(failure) = report.failure {
                if !delivered {
                    return Err(failure.into());
                }
            }
            Ok(Json(Value::Object(wait.await?)))
        }
    }
}
