//! Upstream model services for the gateway.
//!
//! This module contains the [`ModelClient`] abstraction the HTTP layer talks
//! to and its Gemini implementation.

pub mod gemini;
pub mod model_client;

// Re-export commonly used types
pub use gemini::GeminiClient;
pub use model_client::{ChunkStream, GenerationInput, GenerationOptions, ModelClient, StreamEvent};
