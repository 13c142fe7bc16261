//! Core functionality for the gateway.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling
//! - Stream cancellation
//! - Metrics collection
//! - HTTP middleware

pub mod cancel;
pub mod config;
pub mod error;
pub mod error_types;
pub mod logging;
pub mod metrics;
pub mod middleware;

// Re-export commonly used types
pub use cancel::StreamCancelHandle;
pub use config::{AppConfig, ServerConfig};
pub use error::{AppError, ErrorBody, Result};
pub use error_types::{truncate_message, ErrorKind};
pub use logging::{generate_request_id, get_request_id, init_tracing, REQUEST_ID};
pub use metrics::{get_metrics, init_metrics, try_get_metrics, Metrics};
pub use middleware::{request_id_middleware, MetricsMiddleware, ModelName};
