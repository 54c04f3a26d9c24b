//! Action records: the immutable unit of observation.
//!
//! Every completed concept action (successful or not) becomes one
//! `ActionRecord`, appended to the engine's `ActionLog`. Sync rules only ever
//! read records; nothing mutates one once it is shared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

/// Argument and result dictionaries exchanged with concept actions.
pub type Dict = serde_json::Map<String, Value>;

/// Output field that marks an action result as an error.
pub const ERROR_KEY: &str = "error";

/// Action names starting with this prefix are read-only queries.
pub const QUERY_PREFIX: &str = "_";

/// Convert a JSON value into a `Dict`. Non-object values yield an empty dict.
pub fn dict(value: Value) -> Dict {
    match value {
        Value::Object(map) => map,
        _ => Dict::new(),
    }
}

/// Build the `{ "error": msg }` output shape.
pub fn error_output(msg: impl Into<String>) -> Dict {
    let mut out = Dict::new();
    out.insert(ERROR_KEY.to_string(), Value::String(msg.into()));
    out
}

// ---------------------------------------------------------------------------
// ActionRef
// ---------------------------------------------------------------------------

/// A `(concept, action)` pair naming one dispatchable action.
///
/// Borrowed names let concepts declare their references as `const`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionRef {
    pub concept: Cow<'static, str>,
    pub action: Cow<'static, str>,
}

impl ActionRef {
    pub const fn from_static(concept: &'static str, action: &'static str) -> Self {
        Self {
            concept: Cow::Borrowed(concept),
            action: Cow::Borrowed(action),
        }
    }

    pub fn new(concept: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            concept: Cow::Owned(concept.into()),
            action: Cow::Owned(action.into()),
        }
    }

    /// Parse a route-style reference: `/Concept/action`.
    pub fn from_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix('/')?;
        let (concept, action) = rest.split_once('/')?;
        if concept.is_empty() || action.is_empty() || action.contains('/') {
            return None;
        }
        Some(Self::new(concept, action))
    }

    /// Route-style rendering: `/Concept/action`.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.concept, self.action)
    }

    pub fn is_query(&self) -> bool {
        self.action.starts_with(QUERY_PREFIX)
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.concept, self.action)
    }
}

// ---------------------------------------------------------------------------
// BurstId
// ---------------------------------------------------------------------------

/// Identifies one burst: the causal chain started by a single stimulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BurstId(Uuid);

impl BurstId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BurstId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BurstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// ActionRecord
// ---------------------------------------------------------------------------

/// One completed action invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    /// Log-wide, strictly increasing append counter.
    pub seq: u64,
    pub burst: BurstId,
    /// 0 for the stimulus that opened the burst, +1 per sync hop.
    pub depth: u32,
    #[serde(flatten)]
    pub action: ActionRef,
    pub input: Dict,
    pub output: Dict,
    /// Name of the sync that dispatched this action, `None` for stimuli.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_by: Option<String>,
    pub at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn is_error(&self) -> bool {
        self.output.contains_key(ERROR_KEY)
    }

    /// The error message, if the action failed.
    pub fn error(&self) -> Option<&str> {
        self.output.get(ERROR_KEY).and_then(Value::as_str)
    }
}
