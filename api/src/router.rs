use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::cors::create_cors_layer;
use crate::handlers::{get_meme_history, get_top_memes, health_check, send_meme_report};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let meme_routes = Router::new()
        .route("/top", get(get_top_memes))
        .route("/allmemes", get(get_meme_history))
        .route("/send-report", post(send_meme_report));

    Router::new()
        .route("/health", get(health_check))
        .nest("/memes", meme_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins)),
        )
        .with_state(state)
}
