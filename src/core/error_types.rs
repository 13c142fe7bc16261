//! Shared constants for structured API errors.

use std::fmt;

pub const ERROR_KIND_VALIDATION: &str = "ValidationError";
pub const ERROR_KIND_UPSTREAM_AUTH: &str = "UpstreamAuthError";
pub const ERROR_KIND_UPSTREAM_RATE_LIMIT: &str = "UpstreamRateLimitError";
pub const ERROR_KIND_UPSTREAM_CONTENT_POLICY: &str = "UpstreamContentPolicyError";
pub const ERROR_KIND_UPSTREAM_TRANSPORT: &str = "UpstreamTransportError";
pub const ERROR_KIND_UPSTREAM_MALFORMED: &str = "UpstreamMalformedResponseError";
pub const ERROR_KIND_UPSTREAM_PROVIDER: &str = "UpstreamProviderError";
pub const ERROR_KIND_CONFIG: &str = "ConfigError";
pub const ERROR_KIND_INTERNAL: &str = "InternalError";

/// SSE event name for a successful terminal chunk.
pub const SSE_EVENT_DONE: &str = "done";
/// SSE event name for a terminal error chunk.
pub const SSE_EVENT_ERROR: &str = "error";

/// Upper bound on provider text echoed into logs and error messages.
pub const MAX_ERROR_MESSAGE_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    UpstreamAuth,
    UpstreamRateLimit,
    UpstreamContentPolicy,
    UpstreamTransport,
    UpstreamMalformedResponse,
    UpstreamProvider,
    Config,
    Internal,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => ERROR_KIND_VALIDATION,
            Self::UpstreamAuth => ERROR_KIND_UPSTREAM_AUTH,
            Self::UpstreamRateLimit => ERROR_KIND_UPSTREAM_RATE_LIMIT,
            Self::UpstreamContentPolicy => ERROR_KIND_UPSTREAM_CONTENT_POLICY,
            Self::UpstreamTransport => ERROR_KIND_UPSTREAM_TRANSPORT,
            Self::UpstreamMalformedResponse => ERROR_KIND_UPSTREAM_MALFORMED,
            Self::UpstreamProvider => ERROR_KIND_UPSTREAM_PROVIDER,
            Self::Config => ERROR_KIND_CONFIG,
            Self::Internal => ERROR_KIND_INTERNAL,
        }
    }

    /// Whether the failure originated at the upstream provider.
    pub const fn is_upstream(self) -> bool {
        matches!(
            self,
            Self::UpstreamAuth
                | Self::UpstreamRateLimit
                | Self::UpstreamContentPolicy
                | Self::UpstreamTransport
                | Self::UpstreamMalformedResponse
                | Self::UpstreamProvider
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Truncate provider-supplied text to [`MAX_ERROR_MESSAGE_LEN`] characters.
pub fn truncate_message(message: &str) -> String {
    let mut chars = message.chars();
    let truncated: String = chars.by_ref().take(MAX_ERROR_MESSAGE_LEN).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}
