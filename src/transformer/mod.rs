//! Transformer module for the upstream wire protocol.
//!
//! ```text
//! Gateway request ──[gemini::build_*]──▶ GenerateContentRequest
//!                                              │
//!                                       Gemini backend
//!                                              │
//! GenerationResult ◀──[gemini::parse_* / StreamAccumulator]── JSON or SSE
//! ```

pub mod gemini;
pub mod stream;

pub use gemini::{classify_error, parse_generate_response, StreamAccumulator};
pub use stream::{format_sse_data, format_sse_event, SseEvent, SseParser};
