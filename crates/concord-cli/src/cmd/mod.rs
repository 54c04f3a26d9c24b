pub mod check;
pub mod concepts;
pub mod init;
pub mod serve;
pub mod syncs;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

use concord_concepts::App;
use concord_core::config::Config;
use concord_core::store::MemoryStore;

pub(crate) fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_or_default(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

/// The app over a throwaway in-memory store, for commands that only inspect
/// its wiring.
pub(crate) fn inspect(config: &Config) -> anyhow::Result<App> {
    concord_concepts::assemble_with_store(config, Arc::new(MemoryStore::new()))
        .context("failed to assemble app")
}
