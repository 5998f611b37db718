//! REST API server

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::rest::handlers;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// REST API server over the engine
pub struct RestApiServer {
    engine: Arc<Engine>,
}

impl RestApiServer {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Build the router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/shifts",
                post(handlers::create_shift).get(handlers::list_shifts),
            )
            .route(
                "/shifts/:id",
                get(handlers::get_shift).delete(handlers::cancel_shift),
            )
            .route("/shifts/:id/match", post(handlers::match_shift))
            .route("/shifts/:id/proposals", get(handlers::list_proposals))
            .route("/shifts/:id/select", post(handlers::select_shift))
            .route("/proposals", post(handlers::create_proposal))
            .route(
                "/proposals/:id/respond",
                post(handlers::respond_to_proposal),
            )
            .route("/proposals/:id/view", post(handlers::view_proposal))
            .route("/bulk-matches", post(handlers::submit_bulk))
            .route("/bulk-matches/:id", get(handlers::get_bulk))
            .route(
                "/caregivers/:id/preferences",
                get(handlers::get_preferences).put(handlers::put_preferences),
            )
            .route(
                "/caregivers/:id/eligible-shifts",
                get(handlers::eligible_shifts),
            )
            .route(
                "/configurations/:id",
                get(handlers::get_configuration).put(handlers::put_configuration),
            )
            .route("/metrics/matching", get(handlers::matching_metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&self.engine))
    }

    /// Bind and serve until the process stops
    pub async fn serve(&self, addr: std::net::SocketAddr) -> EngineResult<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| EngineError::Transient(format!("failed to bind {}: {}", addr, e)))?;
        tracing::info!(%addr, "REST API listening");
        axum::serve(listener, self.router())
            .await
            .map_err(|e| EngineError::Transient(format!("server error: {}", e)))
    }
}
