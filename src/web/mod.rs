use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::Level;

use crate::coordinator::CoordinatorHandle;
use crate::storage::SharedState;
use crate::stores::StoreRegistry;

pub mod handlers;
pub mod responses;

pub use handlers::{current_results, deliver_message, health_check, list_stores, start_search};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorHandle,
    pub shared: SharedState,
    pub registry: Arc<StoreRegistry>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/stores", get(list_stores))
        .route("/search", post(start_search))
        .route("/messages", post(deliver_message))
        .route("/results", get(current_results))
}
