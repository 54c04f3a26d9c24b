use anyhow::Context;
use std::path::Path;

use concord_core::config::WarnLevel;
use concord_server::AppState;

pub fn run(path: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let config = super::load_config(path)?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => anyhow::bail!("invalid config: {}", w.message),
        }
    }

    let app = concord_concepts::assemble(&config).context("failed to assemble app")?;
    for issue in &app.report.rejected {
        tracing::warn!(sync = %issue.sync, problem = %issue.problem, "sync rejected");
    }
    tracing::info!(
        syncs = app.report.installed.len(),
        store = ?config.store.path,
        "app assembled"
    );

    let port = port.unwrap_or(config.server.port);
    let state = AppState::new(app.engine, app.requesting, config.requesting.clone());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(concord_server::serve(state, port))
}
