//! The Requesting boundary concept.
//!
//! `request` records an inbound call and hands out a correlation id;
//! `respond` delivers the payload for that id. The host (the HTTP layer)
//! blocks on [`Requesting::await_response`] until the payload arrives or its
//! timeout elapses.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::engine::BurstReport;
use crate::error::{ConceptError, RequestError};
use crate::record::{error_output, ActionRef, Dict};
use crate::registry::{ActionSpec, Concept};

pub const CONCEPT: &str = "Requesting";
pub const REQUEST: ActionRef = ActionRef::from_static(CONCEPT, "request");
pub const RESPOND: ActionRef = ActionRef::from_static(CONCEPT, "respond");

/// Correlation id field shared by `request` outputs and `respond` inputs.
pub const REQUEST_KEY: &str = "request";

const INTERFACE: &[ActionSpec] = &[
    ActionSpec::new("request", &["path"], &[REQUEST_KEY]),
    ActionSpec::new("respond", &[REQUEST_KEY], &[REQUEST_KEY]),
];

struct Slot {
    tx: Option<oneshot::Sender<Dict>>,
    rx: Option<oneshot::Receiver<Dict>>,
}

#[derive(Default)]
pub struct Requesting {
    pending: Mutex<HashMap<String, Slot>>,
}

impl Requesting {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a correlation id. The request fields themselves live on the
    /// action record; only the response slot is kept here.
    pub fn request(&self, _input: &Dict) -> Dict {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending().insert(
            id.clone(),
            Slot {
                tx: Some(tx),
                rx: Some(rx),
            },
        );
        let mut out = Dict::new();
        out.insert(REQUEST_KEY.to_string(), Value::String(id));
        out
    }

    /// Fulfil the slot for `input.request` with the remaining fields.
    pub fn respond(&self, mut input: Dict) -> Dict {
        let Some(Value::String(id)) = input.remove(REQUEST_KEY) else {
            return error_output("respond requires a string 'request' field");
        };
        let tx = match self.pending().get_mut(&id) {
            Some(slot) => slot.tx.take(),
            None => return error_output(format!("unknown request: {id}")),
        };
        let Some(tx) = tx else {
            return error_output(format!("request {id} already has a response"));
        };
        // The receiver is gone only if the host stopped waiting; the
        // response is still recorded on the action log.
        if tx.send(input).is_err() {
            tracing::debug!(request = %id, "response arrived after the caller stopped waiting");
        }
        let mut out = Dict::new();
        out.insert(REQUEST_KEY.to_string(), Value::String(id));
        out
    }

    /// Wait for the response to `request`, then forget the id.
    pub async fn await_response(
        &self,
        request: &str,
        timeout: Duration,
    ) -> Result<Dict, RequestError> {
        let rx = match self.pending().get_mut(request) {
            Some(slot) => slot
                .rx
                .take()
                .ok_or_else(|| RequestError::AlreadyAwaited(request.to_string()))?,
            None => return Err(RequestError::UnknownRequest(request.to_string())),
        };

        let result = tokio::time::timeout(timeout, rx).await;
        self.abandon(request);
        match result {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(RequestError::UnknownRequest(request.to_string())),
            Err(_) => Err(RequestError::Timeout {
                request: request.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Forget `request` without waiting.
    pub fn abandon(&self, request: &str) {
        self.pending().remove(request);
    }

    /// Forget every request a burst issued from inside its syncs. Nothing
    /// awaits those; only a stimulus request has a caller.
    pub fn release_nested(&self, report: &BurstReport) {
        let mut pending = self.pending();
        for record in report.records_of(&REQUEST) {
            if Arc::ptr_eq(record, &report.root) {
                continue;
            }
            if let Some(id) = record.output.get(REQUEST_KEY).and_then(Value::as_str) {
                pending.remove(id);
            }
        }
    }

    /// Number of requests that have not been awaited to completion.
    pub fn outstanding(&self) -> usize {
        self.pending().len()
    }
}

#[async_trait]
impl Concept for Requesting {
    fn interface(&self) -> &'static [ActionSpec] {
        INTERFACE
    }

    async fn perform(&self, action: &str, input: Dict) -> Result<Dict, ConceptError> {
        match action {
            "request" => Ok(self.request(&input)),
            "respond" => Ok(self.respond(input)),
            other => Err(ConceptError::UnknownAction(other.to_string())),
        }
    }
}
