//! Error types for femtoclaw
//!
//! Every fallible operation in the orchestration core returns [`Result`],
//! whose error side is [`FemtoError`]. Model-client failures carry a
//! [`ProviderError`] classification so the retry layer can decide whether a
//! second attempt is worthwhile without matching on strings.

use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Classified failure reported by an LLM completion client.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 401: invalid API key or authentication failure
    #[error("Authentication error: {0}")]
    Auth(String),
    /// 429: rate limit or quota exceeded
    #[error("Rate limit error: {0}")]
    RateLimit(String),
    /// 402: payment required
    #[error("Billing error: {0}")]
    Billing(String),
    /// 5xx responses
    #[error("Server error: {0}")]
    ServerError(String),
    /// 400: malformed request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// 404: unknown model or endpoint
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    /// Connect or read timeout
    #[error("Timeout: {0}")]
    Timeout(String),
    /// Provider reported it is overloaded
    #[error("Overloaded error: {0}")]
    Overloaded(String),
    /// The response body could not be understood
    #[error("Format error: {0}")]
    Format(String),
    /// Anything not covered above
    #[error("Unknown provider error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Returns `true` if this error is transient and the request may succeed
    /// when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
        )
    }

    /// HTTP status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) | ProviderError::Format(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Timeout(_) | ProviderError::Unknown(_) => None,
        }
    }

    /// Classify an HTTP status code and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, body);
        match status {
            401 | 403 => ProviderError::Auth(detail),
            402 => ProviderError::Billing(detail),
            404 => ProviderError::ModelNotFound(detail),
            408 => ProviderError::Timeout(detail),
            429 => ProviderError::RateLimit(detail),
            400 | 422 => ProviderError::InvalidRequest(detail),
            503 | 529 => ProviderError::Overloaded(detail),
            500..=599 => ProviderError::ServerError(detail),
            _ => ProviderError::Unknown(detail),
        }
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for femtoclaw operations.
#[derive(Error, Debug)]
pub enum FemtoError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider failure (missing provider, unusable response)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Classified provider failure
    #[error("Provider error: {0}")]
    ProviderTyped(#[from] ProviderError),

    /// Transport adapter failures
    #[error("Channel error: {0}")]
    Channel(String),

    /// Tool lookup, validation or execution failures
    #[error("Tool error: {0}")]
    Tool(String),

    /// Session persistence failures
    #[error("Session error: {0}")]
    Session(String),

    /// Job store or schedule failures
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A bus queue was closed while publishing
    #[error("Bus error: channel closed")]
    BusClosed,

    /// Resource not found (sessions, tools, jobs)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A turn exceeded its wall-clock budget
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The tool-calling loop hit its iteration cap
    #[error("Tool loop exceeded {0} iterations without a final answer")]
    IterationLimit(u32),
}

/// A specialized `Result` type for femtoclaw operations.
pub type Result<T> = std::result::Result<T, FemtoError>;
