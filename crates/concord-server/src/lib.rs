pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let base = state.base_path().to_string();

    Router::new()
        .route("/health", get(routes::health::health))
        // Introspection
        .route(
            &format!("{base}/_concord/history"),
            get(routes::history::history),
        )
        // Everything else under the base path becomes a Requesting.request
        .route(&format!("{base}/{{*path}}"), post(routes::requesting::handle))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on `port`.
pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(state, listener).await
}

/// Start the server on a pre-bound listener.
pub async fn serve_on(state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let base = state.base_path().to_string();
    let app = build_router(state);

    tracing::info!("concord listening on http://localhost:{actual_port}{base}");

    axum::serve(listener, app).await?;
    Ok(())
}
