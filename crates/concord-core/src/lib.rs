pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod log;
pub mod matcher;
pub mod pattern;
pub mod record;
pub mod registry;
pub mod requesting;
pub mod store;
pub mod sync;

pub use engine::{BurstReport, BurstState, Engine, Firing, StartedBurst, ValidationReport};
pub use error::{
    ConceptError, ConcordError, EngineError, RegistryError, RequestError, Result, StoreError,
};
pub use pattern::{Binding, Shape, Var};
pub use record::{dict, error_output, ActionRecord, ActionRef, BurstId, Dict};
pub use registry::{ActionKind, ActionSpec, Concept};
pub use requesting::Requesting;
pub use store::Store;
pub use sync::{SyncRule, SyncSpec, Vars};
