use thiserror::Error;

use crate::record::{ActionRef, BurstId};

/// Failures looking up or registering concept actions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("action not found: {0}")]
    NotFound(ActionRef),

    #[error("invalid concept name '{0}': must be alphanumeric or underscore")]
    InvalidConceptName(String),

    #[error("invalid action name '{action}' on concept '{concept}'")]
    InvalidActionName { concept: String, action: String },

    #[error("concept '{concept}' declares action '{action}' more than once")]
    DuplicateAction { concept: String, action: String },
}

/// Errors raised by a concept while performing an action.
///
/// The engine never propagates these: they are recorded as an `error` field
/// on the action's output so that error-matching syncs can react.
#[derive(Debug, Error)]
pub enum ConceptError {
    #[error("{0}")]
    Rejected(String),

    #[error("missing argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{name}' must be {expected}")]
    InvalidArgument { name: String, expected: &'static str },

    #[error("concept has no action '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ConceptError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }
}

/// Burst-level failures. Any of these aborts the burst that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("burst {burst} exceeded max depth {limit} dispatching sync '{sync}'")]
    DepthExceeded {
        burst: BurstId,
        limit: u32,
        sync: String,
    },

    #[error("burst {burst} exceeded the limit of {limit} actions")]
    BudgetExceeded { burst: BurstId, limit: usize },

    #[error("cycle detected: sync '{sync}' re-fired with the same binding on one causal chain in burst {burst}")]
    CycleDetected { burst: BurstId, sync: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors at the Requesting boundary (the HTTP side of a request).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("timed out after {timeout_ms}ms waiting for a response to request {request}")]
    Timeout { request: String, timeout_ms: u64 },

    #[error("unknown request: {0}")]
    UnknownRequest(String),

    #[error("request {0} is already being awaited")]
    AlreadyAwaited(String),
}

/// Document store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Umbrella error for operations that cross module boundaries
/// (configuration loading, engine assembly).
#[derive(Debug, Error)]
pub enum ConcordError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConcordError>;
