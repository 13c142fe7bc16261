//! API request and response models.
//!
//! This module defines the data structures accepted and returned by the
//! HTTP surface, along with their validation rules.

use crate::core::{AppError, Result};
use axum::extract::rejection::JsonRejection;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use utoipa::ToSchema;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;
pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const MAX_OUTPUT_TOKENS_LIMIT: u32 = 8192;

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

/// An explicit `null` temperature falls back to the default.
fn temperature_or_default<'de, D>(deserializer: D) -> std::result::Result<f32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<f32>::deserialize(deserializer).map(|t| t.unwrap_or(DEFAULT_TEMPERATURE))
}

fn default_max_output_tokens() -> Option<u32> {
    Some(DEFAULT_MAX_OUTPUT_TOKENS)
}

/// Single-prompt generation request, used by `/prompt` and `/stream`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "prompt": "Say HELLO twice.",
    "system_instruction": "Answer in upper case.",
    "temperature": 0.0,
    "max_output_tokens": 10
}))]
pub struct GenerationRequest {
    /// User prompt text
    pub prompt: String,

    /// Optional system instruction forwarded as the provider's system prompt
    #[serde(default, alias = "system", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Sampling temperature (0.0 to 2.0); `null` means the default
    #[serde(
        default = "default_temperature",
        deserialize_with = "temperature_or_default"
    )]
    pub temperature: f32,

    /// Maximum tokens to generate (1 to 8192); `null` lets the provider decide
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: Option<u32>,

    /// Model override; the configured default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One role-tagged message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"role": "user", "content": "Hello!"}))]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Multi-turn generation request, used by `/chat`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "messages": [
        {"role": "system", "content": "You are terse."},
        {"role": "user", "content": "Name a prime number."}
    ],
    "temperature": 0.3
}))]
pub struct ChatRequest {
    /// Chronological conversation turns, oldest first
    pub messages: Vec<ConversationTurn>,

    /// Sampling temperature (0.0 to 2.0); `null` means the default
    #[serde(
        default = "default_temperature",
        deserialize_with = "temperature_or_default"
    )]
    pub temperature: f32,

    /// Maximum tokens to generate (1 to 8192); `null` lets the provider decide
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: Option<u32>,

    /// Model override; the configured default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}))]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Aggregated generation outcome returned by `/prompt` and `/chat`, and
/// carried by the terminal `done` event of `/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"text": "HELLO HELLO", "model": "gemini-2.5-flash", "finish_reason": "stop"}))]
pub struct GenerationResult {
    /// Generated text
    pub text: String,

    /// Model that served the request
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One incremental text fragment of a streamed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"delta": "HEL"}))]
pub struct StreamChunk {
    pub delta: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"status": "ok"}))]
pub struct HealthResponse {
    pub status: String,
}

/// Service and configuration summary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VersionsResponse {
    pub service: String,
    pub version: String,
    pub model_default: String,
    pub upstream: String,
    pub env_key_present: bool,
}

// ============================================================================
// Validation
// ============================================================================

fn validate_temperature(temperature: f32) -> Result<()> {
    if !temperature.is_finite() || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        return Err(AppError::validation(
            "temperature",
            format!(
                "temperature must be between {:.1} and {:.1}",
                MIN_TEMPERATURE, MAX_TEMPERATURE
            ),
        ));
    }
    Ok(())
}

fn validate_max_output_tokens(max_output_tokens: Option<u32>) -> Result<()> {
    match max_output_tokens {
        Some(n) if n == 0 || n > MAX_OUTPUT_TOKENS_LIMIT => Err(AppError::validation(
            "max_output_tokens",
            format!(
                "max_output_tokens must be between 1 and {}",
                MAX_OUTPUT_TOKENS_LIMIT
            ),
        )),
        _ => Ok(()),
    }
}

/// Whether a model id is usable as a single URL path segment.
pub fn is_safe_model_id(model: &str) -> bool {
    !model.is_empty()
        && model != "."
        && model != ".."
        && model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Validate and normalize a model override.
///
/// A leading `models/` prefix is accepted and stripped.
fn normalize_model(model: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = model else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    let id = trimmed.strip_prefix("models/").unwrap_or(trimmed);
    if !is_safe_model_id(id) {
        return Err(AppError::validation(
            "model",
            "model must be a non-empty identifier of letters, digits, '-', '_' or '.'",
        ));
    }
    Ok(Some(id.to_string()))
}

impl GenerationRequest {
    /// Check invariants and normalize the model override in place.
    pub fn validate(&mut self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::validation("prompt", "prompt must not be empty"));
        }
        validate_temperature(self.temperature)?;
        validate_max_output_tokens(self.max_output_tokens)?;
        self.model = normalize_model(self.model.as_deref())?;
        if self
            .system_instruction
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            self.system_instruction = None;
        }
        Ok(())
    }
}

impl ChatRequest {
    /// Check invariants and normalize the model override in place.
    pub fn validate(&mut self) -> Result<()> {
        if self.messages.is_empty() {
            return Err(AppError::validation(
                "messages",
                "messages must contain at least one turn",
            ));
        }
        if let Some(i) = self
            .messages
            .iter()
            .position(|turn| turn.content.trim().is_empty())
        {
            return Err(AppError::validation(
                format!("messages[{}].content", i),
                "content must not be empty",
            ));
        }
        if self.messages.iter().all(|turn| turn.role == Role::System) {
            return Err(AppError::validation(
                "messages",
                "messages must contain at least one user or model turn",
            ));
        }
        validate_temperature(self.temperature)?;
        validate_max_output_tokens(self.max_output_tokens)?;
        self.model = normalize_model(self.model.as_deref())?;
        Ok(())
    }
}

fn rejection_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"target type: (?:(?P<path>[A-Za-z0-9_\.\[\]]+): )?").expect("valid regex")
    })
}

fn missing_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"missing field `(?P<field>[^`]+)`").expect("valid regex"))
}

/// Best-effort extraction of the offending field from a JSON body rejection.
pub fn field_from_rejection(body_text: &str) -> Option<String> {
    let path = rejection_path_regex()
        .captures(body_text)
        .and_then(|c| c.name("path"))
        .map(|m| m.as_str().to_string())
        .filter(|p| p != ".");
    let missing = missing_field_regex()
        .captures(body_text)
        .and_then(|c| c.name("field"))
        .map(|m| m.as_str().to_string());

    match (path, missing) {
        (Some(path), Some(field)) => Some(format!("{}.{}", path, field)),
        (Some(path), None) => Some(path),
        (None, Some(field)) => Some(field),
        (None, None) => None,
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        AppError::Validation {
            field: field_from_rejection(&message),
            message,
        }
    }
}
