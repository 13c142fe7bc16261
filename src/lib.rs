//! Gemini Gateway - a REST/SSE front for the Gemini generative-language API
//!
//! This library translates simple JSON requests into Gemini `generateContent`
//! calls and relays the result either as one aggregated response or as a
//! stream of server-sent events:
//!
//! - **Single prompt** (`/prompt`) and **conversation** (`/chat`) generation
//! - **Streaming** (`/stream`) with upstream cancellation on client disconnect
//! - **Structured errors** that keep the upstream failure kind
//! - **Metrics & Monitoring**: Prometheus metrics for observability
//!
//! # Architecture
//!
//! - [`core`]: Core functionality (config, errors, cancellation, metrics, middleware)
//! - [`api`]: HTTP handlers, request/response models and the SSE relay
//! - [`services`]: The upstream model client abstraction and its Gemini implementation
//! - [`transformer`]: Gemini wire format and SSE parsing
//!
//! # Configuration
//!
//! The server requires the following environment variable:
//! - `GOOGLE_API_KEY`: Gemini API key (`GEMINI_API_KEY` is accepted as a fallback)
//!
//! Optional environment variables:
//! - `GEMINI_MODEL`: Default model (default: gemini-2.5-flash)
//! - `GEMINI_API_BASE`: Upstream base URL
//! - `GEMINI_THINKING_BUDGET`: Thinking budget, or `off` (default: 0)
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8080)
//! - `REQUEST_TIMEOUT_SECS`: Upstream request timeout in seconds (default: 300)

pub mod api;
pub mod core;
pub mod services;
pub mod transformer;

// Re-export commonly used types for convenience
pub use api::{build_router, ApiDoc, AppState};
pub use core::{AppConfig, AppError, Result};
pub use services::{GeminiClient, ModelClient};
