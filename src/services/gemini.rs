//! Gemini implementation of [`ModelClient`].
//!
//! One pooled `reqwest::Client` is shared by every request; the credential is
//! sent in the `x-goog-api-key` header.

use crate::api::models::{ConversationTurn, GenerationResult};
use crate::core::config::AppConfig;
use crate::core::{AppError, Result, StreamCancelHandle};
use crate::services::model_client::{
    ChunkStream, GenerationInput, GenerationOptions, ModelClient, StreamEvent,
};
use crate::transformer::gemini::{
    build_chat_request, build_prompt_request, build_request, build_url, classify_error,
    GenerateContentRequest, StreamAccumulator, API_KEY_HEADER,
};
use crate::transformer::{parse_generate_response, SseParser};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;

pub struct GeminiClient {
    http_client: reqwest::Client,
    api_key: String,
    api_base: String,
    thinking_budget: Option<i32>,
}

impl GeminiClient {
    /// Build a client with its own connection pool.
    pub fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let http_client = create_http_client(config.request_timeout_secs)?;
        Ok(Self::with_http_client(config, http_client))
    }

    pub fn with_http_client(config: &AppConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
            thinking_budget: config.thinking_budget,
        }
    }

    async fn send(
        &self,
        url: &str,
        payload: &GenerateContentRequest,
    ) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify_error(status.as_u16(), &body);
        tracing::debug!(status = status.as_u16(), error = %error, "Upstream returned an error status");
        Err(error)
    }

    async fn generate(
        &self,
        payload: GenerateContentRequest,
        model: &str,
    ) -> Result<GenerationResult> {
        let url = build_url(&self.api_base, model, false)?;
        let response = self.send(&url, &payload).await?;
        let body = response.text().await?;
        let result = parse_generate_response(&body, model)?;

        tracing::debug!(
            model = %model,
            chars = result.text.chars().count(),
            finish_reason = ?result.finish_reason,
            "Upstream generation completed"
        );
        Ok(result)
    }
}

/// Create HTTP client with connection pooling
fn create_http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(100)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .build()?;
    Ok(client)
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate_once(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        let payload =
            build_prompt_request(prompt, system_instruction, options, self.thinking_budget);
        self.generate(payload, &options.model).await
    }

    async fn generate_chat(
        &self,
        turns: &[ConversationTurn],
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        let payload = build_chat_request(turns, options, self.thinking_budget)?;
        self.generate(payload, &options.model).await
    }

    async fn generate_stream(
        &self,
        input: GenerationInput,
        options: GenerationOptions,
        cancel: StreamCancelHandle,
    ) -> Result<ChunkStream> {
        let url = build_url(&self.api_base, &options.model, true)?;
        let payload = build_request(&input, &options, self.thinking_budget)?;
        let response = self.send(&url, &payload).await?;

        let model = options.model;
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut parser = SseParser::new();
            let mut accumulator = StreamAccumulator::new();

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!(model = %model, "Caller went away, closing upstream stream");
                        return;
                    }
                    next = bytes.next() => next,
                };

                match next {
                    Some(Ok(chunk)) => {
                        for event in parser.parse(&chunk) {
                            let Some(data) = event.data else { continue };
                            match accumulator.ingest(&data) {
                                Ok(Some(delta)) => yield Ok(StreamEvent::Delta(delta)),
                                Ok(None) => {}
                                Err(e) => {
                                    yield Err(e);
                                    return;
                                }
                            }
                        }
                    }
                    Some(Err(e)) => {
                        yield Err(AppError::from(e));
                        return;
                    }
                    None => break,
                }
            }

            if let Some(data) = parser.finish().and_then(|event| event.data) {
                match accumulator.ingest(&data) {
                    Ok(Some(delta)) => yield Ok(StreamEvent::Delta(delta)),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }

            yield accumulator.finish(&model).map(StreamEvent::Done);
        };

        Ok(Box::pin(stream))
    }
}
