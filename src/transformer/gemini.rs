//! Gemini protocol transformer.
//!
//! Handles conversion between the gateway's request/response models and the
//! Google Gemini `generateContent` wire format, and classifies upstream
//! failures into [`AppError`] kinds.

use crate::api::models::{
    is_safe_model_id, ConversationTurn, FinishReason, GenerationResult, Role, Usage,
};
use crate::core::error_types::truncate_message;
use crate::core::{AppError, Result};
use crate::services::model_client::{GenerationInput, GenerationOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const API_VERSION: &str = "v1beta";
pub const API_KEY_HEADER: &str = "x-goog-api-key";

// ============================================================================
// Wire types: request
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub text: String,
}

impl Content {
    fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: i32,
}

// ============================================================================
// Wire types: response
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateContentResponse {
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CandidateContent {
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponsePart {
    pub text: Option<String>,
    pub thought: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
    pub block_reason_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageMetadata {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenated non-thought text of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    pub fn raw_finish_reason(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
    }

    pub fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
            .filter(|r| !r.is_empty() && *r != "BLOCK_REASON_UNSPECIFIED")
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage_metadata.as_ref().map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: if u.total_token_count > 0 {
                u.total_token_count
            } else {
                u.prompt_token_count.saturating_add(u.candidates_token_count)
            },
        })
    }

    fn blocked_prompt_error(&self) -> Option<AppError> {
        let reason = self.block_reason()?;
        let message = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason_message.clone())
            .unwrap_or_else(|| "Prompt was blocked by the provider".to_string());
        Some(AppError::UpstreamContentPolicy {
            reason: reason.to_string(),
            message,
        })
    }
}

// ============================================================================
// Request shaping
// ============================================================================

/// Build the `generateContent` (or `streamGenerateContent`) URL for a model.
pub fn build_url(api_base: &str, model: &str, stream: bool) -> Result<String> {
    if !is_safe_model_id(model) {
        return Err(AppError::validation(
            "model",
            "model must be a non-empty identifier of letters, digits, '-', '_' or '.'",
        ));
    }
    let base = api_base.trim_end_matches('/');
    Ok(if stream {
        format!(
            "{}/{}/models/{}:streamGenerateContent?alt=sse",
            base, API_VERSION, model
        )
    } else {
        format!("{}/{}/models/{}:generateContent", base, API_VERSION, model)
    })
}

fn generation_config(options: &GenerationOptions, thinking_budget: Option<i32>) -> GenerationConfig {
    GenerationConfig {
        temperature: options.temperature,
        max_output_tokens: options.max_output_tokens,
        response_modalities: vec!["TEXT".to_string()],
        thinking_config: thinking_budget.map(|thinking_budget| ThinkingConfig { thinking_budget }),
    }
}

/// Shape a single prompt with an optional system instruction.
pub fn build_prompt_request(
    prompt: &str,
    system_instruction: Option<&str>,
    options: &GenerationOptions,
    thinking_budget: Option<i32>,
) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::text(Some("user"), prompt)],
        system_instruction: system_instruction
            .filter(|s| !s.trim().is_empty())
            .map(|s| Content::text(None, s)),
        generation_config: generation_config(options, thinking_budget),
    }
}

/// Shape a conversation.
///
/// System turns are concatenated, newline-separated and in order, into the
/// system instruction; the remaining turns become `contents`.
pub fn build_chat_request(
    turns: &[ConversationTurn],
    options: &GenerationOptions,
    thinking_budget: Option<i32>,
) -> Result<GenerateContentRequest> {
    let system: Vec<&str> = turns
        .iter()
        .filter(|t| t.role == Role::System)
        .map(|t| t.content.as_str())
        .collect();

    let contents: Vec<Content> = turns
        .iter()
        .filter(|t| t.role != Role::System)
        .map(|t| Content::text(Some(t.role.as_str()), t.content.as_str()))
        .collect();

    if contents.is_empty() {
        return Err(AppError::validation(
            "messages",
            "messages must contain at least one user or model turn",
        ));
    }

    Ok(GenerateContentRequest {
        contents,
        system_instruction: if system.is_empty() {
            None
        } else {
            Some(Content::text(None, system.join("\n")))
        },
        generation_config: generation_config(options, thinking_budget),
    })
}

/// Shape either kind of streaming input.
pub fn build_request(
    input: &GenerationInput,
    options: &GenerationOptions,
    thinking_budget: Option<i32>,
) -> Result<GenerateContentRequest> {
    match input {
        GenerationInput::Prompt {
            prompt,
            system_instruction,
        } => Ok(build_prompt_request(
            prompt,
            system_instruction.as_deref(),
            options,
            thinking_budget,
        )),
        GenerationInput::Turns(turns) => build_chat_request(turns, options, thinking_budget),
    }
}

// ============================================================================
// Response parsing
// ============================================================================

pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::Safety
        }
        "RECITATION" => FinishReason::Recitation,
        _ => FinishReason::Other,
    }
}

fn finish_result(
    text: String,
    raw_finish_reason: Option<&str>,
    usage: Option<Usage>,
    model: &str,
) -> Result<GenerationResult> {
    let finish_reason = raw_finish_reason.map(map_finish_reason);

    if text.is_empty() && finish_reason == Some(FinishReason::Safety) {
        return Err(AppError::UpstreamContentPolicy {
            reason: raw_finish_reason.unwrap_or("SAFETY").to_string(),
            message: "Response was blocked by the provider".to_string(),
        });
    }

    Ok(GenerationResult {
        text,
        model: model.to_string(),
        finish_reason,
        usage,
    })
}

fn malformed(context: &str, body: &str) -> AppError {
    tracing::error!(
        body = %truncate_message(body),
        "{}",
        context
    );
    AppError::UpstreamMalformedResponse(context.to_string())
}

/// Parse a complete `generateContent` response body.
pub fn parse_generate_response(body: &str, model: &str) -> Result<GenerationResult> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|_| malformed("Upstream response is not valid JSON", body))?;

    if let Some(err) = response.blocked_prompt_error() {
        return Err(err);
    }

    if response.candidates.is_empty() {
        return Err(malformed("Upstream response contained no candidates", body));
    }

    finish_result(
        response.text(),
        response.raw_finish_reason(),
        response.usage(),
        model,
    )
}

/// Folds streamed `GenerateContentResponse` chunks into deltas and a final
/// result.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    chunks: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume the data of one SSE event; returns the text delta, if any.
    pub fn ingest(&mut self, data: &str) -> Result<Option<String>> {
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Ok(None);
        }

        let chunk: GenerateContentResponse = serde_json::from_str(data)
            .map_err(|_| malformed("Upstream stream chunk is not valid JSON", data))?;
        self.chunks += 1;

        if let Some(err) = chunk.blocked_prompt_error() {
            return Err(err);
        }
        if let Some(usage) = chunk.usage() {
            self.usage = Some(usage);
        }
        if let Some(reason) = chunk.raw_finish_reason() {
            self.finish_reason = Some(reason.to_string());
        }

        let delta = chunk.text();
        if delta.is_empty() {
            return Ok(None);
        }
        self.text.push_str(&delta);
        Ok(Some(delta))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Build the terminal result once the upstream stream has ended.
    pub fn finish(self, model: &str) -> Result<GenerationResult> {
        if self.chunks == 0 {
            return Err(AppError::UpstreamMalformedResponse(
                "Upstream stream ended without data".to_string(),
            ));
        }
        finish_result(self.text, self.finish_reason.as_deref(), self.usage, model)
    }
}

// ============================================================================
// Error classification
// ============================================================================

/// Extract canonical error message from provider error payload.
pub fn extract_error_message(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
        .or_else(|| {
            body.get("error")
                .and_then(|e| e.as_str())
                .map(|s| s.to_string())
        })
        .or_else(|| {
            body.get("message")
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
}

fn is_invalid_key_error(body: &Value, message: &str) -> bool {
    let error = body.get("error");
    let status_unauthenticated = error
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str())
        .is_some_and(|s| s == "UNAUTHENTICATED" || s == "PERMISSION_DENIED");
    let reason_invalid_key = error
        .and_then(|e| e.get("details"))
        .and_then(|d| d.as_array())
        .is_some_and(|details| {
            details.iter().any(|d| {
                d.get("reason").and_then(|r| r.as_str()) == Some("API_KEY_INVALID")
            })
        });
    status_unauthenticated || reason_invalid_key || message.contains("API key not valid")
}

/// Map a non-success upstream HTTP status and body to an error kind.
pub fn classify_error(status: u16, body: &str) -> AppError {
    let parsed = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
    let message = extract_error_message(&parsed)
        .map(|m| truncate_message(&m))
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| truncate_message(trimmed))
        })
        .unwrap_or_else(|| format!("HTTP {}", status));

    match status {
        401 | 403 => AppError::UpstreamAuth(message),
        400 if is_invalid_key_error(&parsed, &message) => AppError::UpstreamAuth(message),
        429 => AppError::UpstreamRateLimit(message),
        _ => AppError::UpstreamProvider { status, message },
    }
}
