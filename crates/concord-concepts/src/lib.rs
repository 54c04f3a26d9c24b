//! The application: its concepts and the syncs that compose them.

mod args;
pub mod list_creation;
pub mod notifying;
pub mod syncs;

use std::sync::Arc;

use concord_core::config::Config;
use concord_core::requesting::{self, Requesting};
use concord_core::{store, Engine, Result, Store, ValidationReport};

pub use list_creation::ListCreation;
pub use notifying::Notifying;

/// An engine with every concept registered and every sync installed.
pub struct App {
    pub engine: Arc<Engine>,
    pub requesting: Arc<Requesting>,
    pub report: ValidationReport,
}

/// Assemble the application over the store described by `config`.
pub fn assemble(config: &Config) -> Result<App> {
    let store = store::open(&config.store)?;
    assemble_with_store(config, store)
}

pub fn assemble_with_store(config: &Config, store: Arc<dyn Store>) -> Result<App> {
    let engine = Engine::new(config.engine.clone());
    let requesting = Arc::new(Requesting::new());

    engine.register(requesting::CONCEPT, requesting.clone())?;
    engine.register(
        list_creation::CONCEPT,
        Arc::new(ListCreation::new(Arc::clone(&store))),
    )?;
    engine.register(notifying::CONCEPT, Arc::new(Notifying::new(store)))?;

    let report = engine.install(syncs::all());
    tracing::debug!(
        installed = report.installed.len(),
        rejected = report.rejected.len(),
        "syncs installed"
    );

    Ok(App {
        engine: Arc::new(engine),
        requesting,
        report,
    })
}
