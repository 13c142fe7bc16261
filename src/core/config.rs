//! Configuration management for the gateway.
//!
//! Configuration is read once from the process environment (optionally
//! populated from a local `.env` file) into an immutable [`AppConfig`] that is
//! passed explicitly to every component needing it.

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_THINKING_BUDGET: i32 = 0;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Main application configuration.
#[derive(Clone)]
pub struct AppConfig {
    /// Upstream credential
    pub api_key: String,

    /// Model used when a request carries no override
    pub default_model: String,

    /// Base URL of the generative-language API
    pub api_base: String,

    /// Thinking budget forwarded to the provider; `None` leaves it unset
    pub thinking_budget: Option<i32>,

    /// Server configuration (host, port)
    pub server: ServerConfig,

    /// Upper bound on a single upstream call, in seconds
    pub request_timeout_secs: u64,
}

/// Server-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// The credential never appears in logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("default_model", &self.default_model)
            .field("api_base", &self.api_base)
            .field("thinking_budget", &self.thinking_budget)
            .field("server", &self.server)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl AppConfig {
    /// Build a configuration with defaults for everything but the credential.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            default_model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            thinking_budget: Some(DEFAULT_THINKING_BUDGET),
            server: ServerConfig::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Fails if neither `GOOGLE_API_KEY` nor `GEMINI_API_KEY` is set.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use gemini_gateway::core::config::AppConfig;
    ///
    /// dotenvy::dotenv().ok();
    /// let config = AppConfig::from_env().expect("GOOGLE_API_KEY must be set");
    /// ```
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = non_empty("GOOGLE_API_KEY")
            .or_else(|| non_empty("GEMINI_API_KEY"))
            .ok_or_else(|| {
                anyhow!("Missing GOOGLE_API_KEY. Set it in your environment or .env file.")
            })?;

        let mut config = Self::new(api_key);

        if let Some(model) = non_empty("GEMINI_MODEL") {
            config.default_model = model;
        }

        if let Some(api_base) = non_empty("GEMINI_API_BASE") {
            config.api_base = api_base.trim_end_matches('/').to_string();
        }

        if let Some(raw) = lookup("GEMINI_THINKING_BUDGET") {
            config.thinking_budget = parse_thinking_budget(&raw)?;
        }

        if let Some(host) = non_empty("HOST") {
            config.server.host = host;
        }

        if let Some(port) = non_empty("PORT") {
            config.server.port = port
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", port))?;
        }

        if let Some(timeout) = non_empty("REQUEST_TIMEOUT_SECS") {
            let secs = timeout.parse::<u64>().with_context(|| {
                format!(
                    "REQUEST_TIMEOUT_SECS must be a positive integer, got '{}'",
                    timeout
                )
            })?;
            if secs == 0 {
                return Err(anyhow!("REQUEST_TIMEOUT_SECS must be greater than zero"));
            }
            config.request_timeout_secs = secs;
        }

        Ok(config)
    }
}

/// Parse a thinking budget value.
///
/// Accepts an integer, or `off`/`none`/empty to leave the budget unset.
fn parse_thinking_budget(value: &str) -> Result<Option<i32>> {
    let value = value.trim();
    if value.is_empty() || matches!(value.to_lowercase().as_str(), "off" | "none") {
        return Ok(None);
    }
    value
        .parse::<i32>()
        .map(Some)
        .with_context(|| format!("GEMINI_THINKING_BUDGET must be an integer, got '{}'", value))
}
