//! API layer for the gateway.
//!
//! This module contains all HTTP handlers, request/response models,
//! streaming support and the router that ties them together.

pub mod disconnect;
pub mod handlers;
pub mod models;
pub mod streaming;

use crate::core::{init_metrics, request_id_middleware, MetricsMiddleware};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

// Re-export commonly used types
pub use handlers::{chat, health, metrics_handler, prompt, stream, versions, AppState};
pub use models::{
    ChatRequest, ConversationTurn, FinishReason, GenerationRequest, GenerationResult, Role,
    StreamChunk, Usage,
};
pub use streaming::{relay_stream, sse_response};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health,
        crate::api::handlers::versions,
        crate::api::handlers::prompt,
        crate::api::handlers::chat,
        crate::api::handlers::stream,
    ),
    components(
        schemas(
            crate::api::models::GenerationRequest,
            crate::api::models::ChatRequest,
            crate::api::models::ConversationTurn,
            crate::api::models::Role,
            crate::api::models::GenerationResult,
            crate::api::models::FinishReason,
            crate::api::models::Usage,
            crate::api::models::StreamChunk,
            crate::api::models::HealthResponse,
            crate::api::models::VersionsResponse,
            crate::core::error::ErrorBody,
        )
    ),
    tags(
        (name = "generation", description = "Text generation endpoints"),
        (name = "health", description = "Service status endpoints")
    ),
    info(
        title = "Gemini Gateway API",
        description = "REST and SSE gateway in front of the Gemini generative-language API.",
        license(name = "MIT")
    )
)]
pub struct ApiDoc;

/// Build router with all endpoints
pub fn build_router(state: AppState) -> Router {
    // The metrics middleware expects the registry to exist
    init_metrics();
    let state = Arc::new(state);

    let api_routes = Router::new()
        .route("/prompt", post(prompt))
        .route("/chat", post(chat))
        .route("/stream", post(stream))
        .route("/versions", get(versions))
        .with_state(state);

    Router::new()
        .merge(api_routes)
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .layer(axum::middleware::from_fn(MetricsMiddleware::track_metrics))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
