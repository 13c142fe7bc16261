//! Upstream model client abstraction.
//!
//! Handlers only see [`ModelClient`]; the Gemini implementation lives in
//! [`super::gemini`] and tests substitute their own doubles.

use crate::api::models::{ConversationTurn, GenerationResult};
use crate::core::{Result, StreamCancelHandle};
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Per-call generation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Model that serves the call
    pub model: String,
    pub temperature: f32,
    /// `None` lets the provider pick its own limit
    pub max_output_tokens: Option<u32>,
}

/// Input of a streaming generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationInput {
    Prompt {
        prompt: String,
        system_instruction: Option<String>,
    },
    Turns(Vec<ConversationTurn>),
}

/// One item of a streamed generation.
///
/// A well-formed stream yields zero or more `Delta`s followed by exactly one
/// `Done`, whose `text` is the concatenation of the deltas.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done(GenerationResult),
}

/// Stream type for upstream generations
pub type ChunkStream = BoxStream<'static, Result<StreamEvent>>;

/// Trait for upstream generative model clients
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Client name used in logs
    fn name(&self) -> &'static str;

    /// Generate a single response for one prompt.
    async fn generate_once(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<GenerationResult>;

    /// Generate the next turn of a conversation, oldest turn first.
    async fn generate_chat(
        &self,
        turns: &[ConversationTurn],
        options: &GenerationOptions,
    ) -> Result<GenerationResult>;

    /// Open a streaming generation.
    ///
    /// Errors returned here happen before any chunk exists; errors inside the
    /// stream happen after. The stream stops promptly once `cancel` fires.
    async fn generate_stream(
        &self,
        input: GenerationInput,
        options: GenerationOptions,
        cancel: StreamCancelHandle,
    ) -> Result<ChunkStream>;
}
