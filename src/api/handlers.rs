//! HTTP request handlers for the gateway endpoints.
//!
//! This module implements the main API endpoints:
//! - Single-prompt generation (`/prompt`)
//! - Multi-turn generation (`/chat`)
//! - Streamed generation (`/stream`)
//! - Health, version, metrics and OpenAPI documents

use crate::api::models::{
    ChatRequest, GenerationRequest, GenerationResult, HealthResponse, StreamChunk,
    VersionsResponse,
};
use crate::api::streaming::{relay_stream, sse_response};
use crate::core::config::AppConfig;
use crate::core::error::{AppError, ErrorBody, Result};
use crate::core::logging::get_request_id;
use crate::core::metrics::record_token_usage;
use crate::core::middleware::ModelName;
use crate::core::StreamCancelHandle;
use crate::services::{GenerationInput, GenerationOptions, ModelClient};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use utoipa::OpenApi;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub client: Arc<dyn ModelClient>,
}

impl AppState {
    pub fn new(config: AppConfig, client: Arc<dyn ModelClient>) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }

    /// Resolve per-call options, falling back to the configured default model.
    fn options(
        &self,
        model: Option<String>,
        temperature: f32,
        max_output_tokens: Option<u32>,
    ) -> GenerationOptions {
        GenerationOptions {
            model: model.unwrap_or_else(|| self.config.default_model.clone()),
            temperature,
            max_output_tokens,
        }
    }
}

fn generation_response(result: GenerationResult) -> Response {
    if let Some(usage) = result.usage {
        record_token_usage(
            &result.model,
            usage.prompt_tokens as u64,
            usage.completion_tokens as u64,
            usage.total_tokens as u64,
        );
    }
    let model = result.model.clone();
    let mut response = Json(result).into_response();
    response.extensions_mut().insert(ModelName(model));
    response
}

/// Health check endpoint.
///
/// Never contacts the upstream provider.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Service version and configuration summary.
#[utoipa::path(
    get,
    path = "/versions",
    tag = "health",
    responses(
        (status = 200, description = "Service and configuration summary", body = VersionsResponse)
    )
)]
pub async fn versions(State(state): State<Arc<AppState>>) -> Json<VersionsResponse> {
    Json(VersionsResponse {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_default: state.config.default_model.clone(),
        upstream: state.client.name().to_string(),
        env_key_present: !state.config.api_key.is_empty(),
    })
}

/// Generate a single response for one prompt.
#[utoipa::path(
    post,
    path = "/prompt",
    tag = "generation",
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "Generated text", body = GenerationResult),
        (status = 400, description = "Content policy rejection", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody),
        (status = 429, description = "Upstream rate limit", body = ErrorBody),
        (status = 500, description = "Upstream or internal failure", body = ErrorBody),
        (status = 502, description = "Upstream unreachable or failed", body = ErrorBody),
        (status = 504, description = "Upstream timed out", body = ErrorBody)
    )
)]
pub async fn prompt(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(mut request) = payload?;
    request.validate()?;

    let options = state.options(
        request.model.take(),
        request.temperature,
        request.max_output_tokens,
    );
    tracing::info!(
        request_id = %get_request_id(),
        model = %options.model,
        prompt_chars = request.prompt.chars().count(),
        "Prompt request"
    );

    let result = state
        .client
        .generate_once(
            &request.prompt,
            request.system_instruction.as_deref(),
            &options,
        )
        .await?;

    Ok(generation_response(result))
}

/// Generate the next turn of a conversation.
#[utoipa::path(
    post,
    path = "/chat",
    tag = "generation",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Generated text", body = GenerationResult),
        (status = 400, description = "Content policy rejection", body = ErrorBody),
        (status = 422, description = "Invalid request", body = ErrorBody),
        (status = 429, description = "Upstream rate limit", body = ErrorBody),
        (status = 500, description = "Upstream or internal failure", body = ErrorBody),
        (status = 502, description = "Upstream unreachable or failed", body = ErrorBody),
        (status = 504, description = "Upstream timed out", body = ErrorBody)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(mut request) = payload?;
    request.validate()?;

    let options = state.options(
        request.model.take(),
        request.temperature,
        request.max_output_tokens,
    );
    tracing::info!(
        request_id = %get_request_id(),
        model = %options.model,
        turns = request.messages.len(),
        "Chat request"
    );

    let result = state
        .client
        .generate_chat(&request.messages, &options)
        .await?;

    Ok(generation_response(result))
}

/// Stream a generation as server-sent events.
///
/// Emits `data: {"delta": ...}` per chunk and ends with exactly one
/// `event: done` (carrying the aggregated result) or `event: error`.
#[utoipa::path(
    post,
    path = "/stream",
    tag = "generation",
    request_body = GenerationRequest,
    responses(
        (status = 200, description = "SSE stream of deltas", content_type = "text/event-stream", body = StreamChunk),
        (status = 422, description = "Invalid request", body = ErrorBody),
        (status = 500, description = "Upstream failure before the stream opened", body = ErrorBody)
    )
)]
pub async fn stream(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<GenerationRequest>, JsonRejection>,
) -> Result<Response> {
    let Json(mut request) = payload?;
    request.validate()?;

    let options = state.options(
        request.model.take(),
        request.temperature,
        request.max_output_tokens,
    );
    let model = options.model.clone();
    tracing::info!(
        request_id = %get_request_id(),
        model = %model,
        prompt_chars = request.prompt.chars().count(),
        "Stream request"
    );

    let cancel = StreamCancelHandle::new();
    let input = GenerationInput::Prompt {
        prompt: request.prompt,
        system_instruction: request.system_instruction,
    };
    let upstream = state
        .client
        .generate_stream(input, options, cancel.clone())
        .await?;

    let frames = relay_stream(upstream, cancel.clone(), model.clone());
    let mut response = sse_response(frames, cancel);
    response.extensions_mut().insert(ModelName(model));
    Ok(response)
}

/// Prometheus metrics endpoint.
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let content_type = HeaderValue::from_str(encoder.format_type())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut response = (StatusCode::OK, buffer).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, content_type);
    Ok(response)
}

/// OpenAPI document for the gateway.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(crate::api::ApiDoc::openapi())
}
