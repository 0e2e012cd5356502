//! Retry provider - decorator that adds automatic retry with exponential backoff.
//!
//! Wraps any [`LLMProvider`] to transparently retry transient errors such as
//! HTTP 429 (rate limit), 5xx (server errors), timeouts and provider overload.
//! Once the retry budget is spent the last error is returned unchanged; the
//! agent treats it as terminal for the turn.
//!
//! # Example
//!
//! ```rust,ignore
//! use femtoclaw::providers::{OpenAIProvider, RetryProvider};
//!
//! let inner = OpenAIProvider::new("api-key");
//! let provider = RetryProvider::new(Box::new(inner))
//!     .with_max_retries(5)
//!     .with_base_delay_ms(500);
//! ```

use async_trait::async_trait;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{FemtoError, Result};
use crate::session::Message;

use super::{ChatOptions, LLMProvider, LLMResponse, ToolDefinition};

/// Patterns in untyped error messages that indicate a transient failure.
const RETRYABLE_PATTERNS: &[&str] = &[
    "429",
    "500",
    "502",
    "503",
    "504",
    "rate limit",
    "rate_limit",
    "overloaded",
    "too many requests",
    "service unavailable",
    "gateway timeout",
];

/// A decorator provider that retries transient LLM errors with exponential backoff.
///
/// Non-transient errors (bad request, auth, unknown model) are returned
/// immediately without retry.
pub struct RetryProvider {
    inner: Box<dyn LLMProvider>,
    /// Maximum number of retry attempts before giving up. Default: 3.
    max_retries: u32,
    /// Base delay in milliseconds for exponential backoff. Default: 1000.
    base_delay_ms: u64,
    /// Maximum delay cap in milliseconds. Default: 30000.
    max_delay_ms: u64,
}

impl std::fmt::Debug for RetryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryProvider")
            .field("inner", &self.inner.name())
            .field("max_retries", &self.max_retries)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .finish()
    }
}

impl RetryProvider {
    /// Wrap `inner` with the default policy (3 retries, 1s base, 30s cap).
    pub fn new(inner: Box<dyn LLMProvider>) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }

    /// Wrap `inner` using the `providers.retry` config section.
    pub fn from_config(inner: Box<dyn LLMProvider>, config: &RetryConfig) -> Self {
        Self::new(inner)
            .with_max_retries(config.max_retries)
            .with_base_delay_ms(config.base_delay_ms)
            .with_max_delay_ms(config.max_delay_ms)
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The delay before retry `n` (0-indexed) is
    /// `min(base_delay_ms * 2^n + jitter, max_delay_ms)`.
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }
}

/// Check whether a [`FemtoError`] represents a transient failure that should be retried.
///
/// Classified provider errors decide for themselves. Transport errors are
/// retried on timeouts and connection failures. Untyped provider messages
/// fall back to substring matching.
pub fn is_retryable(err: &FemtoError) -> bool {
    match err {
        FemtoError::ProviderTyped(pe) => pe.is_retryable(),
        FemtoError::Http(e) => e.is_timeout() || e.is_connect(),
        FemtoError::Provider(msg) => {
            let msg = msg.to_lowercase();
            if ["400", "401", "403", "404"].iter().any(|p| msg.contains(p)) {
                return false;
            }
            RETRYABLE_PATTERNS.iter().any(|p| msg.contains(p))
        }
        _ => false,
    }
}

/// Compute the backoff delay for a given attempt (without sleeping).
pub fn compute_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64, jitter_ms: u64) -> u64 {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(16));
    exponential.saturating_add(jitter_ms).min(max_delay_ms)
}

/// Sleep for the backoff delay of `attempt`.
///
/// Jitter comes from the nanosecond component of the system clock.
async fn delay_with_jitter(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) {
    let jitter_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % (base_delay_ms.max(1)))
        .unwrap_or(0);
    let delay = compute_delay(attempt, base_delay_ms, max_delay_ms, jitter_ms);
    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
}

#[async_trait]
impl LLMProvider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let mut attempt = 0;
        loop {
            match self
                .inner
                .chat(messages.clone(), tools.clone(), model, options.clone())
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.max_retries && is_retryable(&err) => {
                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %err,
                        "Retrying chat request after transient error"
                    );
                    delay_with_jitter(attempt, self.base_delay_ms, self.max_delay_ms).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
