//! Upstream failure taxonomy and retry policy.
//!
//! Every failure, whatever its source, is folded into one of nine kinds.
//! Each kind carries a fixed retryability flag and a localized message.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use selah_core::config::RetryConfig;
use selah_core::Lang;

/// Default wait suggested for rate limiting when the service gives no hint.
const DEFAULT_RATE_LIMIT_WAIT_MS: u64 = 5_000;

/// Jitter applied around the computed backoff, as a fraction.
const JITTER: f64 = 0.2;

// =============================================================================
// ErrorKind
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimit,
    TokenLimit,
    Auth,
    Server,
    InvalidRequest,
    ContentFilter,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimit
                | ErrorKind::Server
                | ErrorKind::Unknown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::TokenLimit => "token_limit",
            ErrorKind::Auth => "auth",
            ErrorKind::Server => "server",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ContentFilter => "content_filter",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// User-facing message in the given language.
    pub fn message(&self, lang: Lang) -> &'static str {
        match (self, lang) {
            (ErrorKind::Network, Lang::En) => {
                "Unable to connect. Please check your internet connection and try again."
            }
            (ErrorKind::Network, Lang::Es) => {
                "No se pudo conectar. Revisa tu conexión a internet e inténtalo de nuevo."
            }
            (ErrorKind::Timeout, Lang::En) => "The response took too long. Please try again.",
            (ErrorKind::Timeout, Lang::Es) => {
                "La respuesta tardó demasiado. Por favor, inténtalo de nuevo."
            }
            (ErrorKind::RateLimit, Lang::En) => {
                "Too many requests right now. Please wait a moment and try again."
            }
            (ErrorKind::RateLimit, Lang::Es) => {
                "Demasiadas solicitudes en este momento. Espera un momento e inténtalo de nuevo."
            }
            (ErrorKind::TokenLimit, Lang::En) => {
                "This conversation is too long. Please start a new conversation."
            }
            (ErrorKind::TokenLimit, Lang::Es) => {
                "Esta conversación es demasiado larga. Por favor, inicia una nueva conversación."
            }
            (ErrorKind::Auth, Lang::En) => {
                "There was a problem with authentication. Please check your settings."
            }
            (ErrorKind::Auth, Lang::Es) => {
                "Hubo un problema de autenticación. Revisa tu configuración."
            }
            (ErrorKind::Server, Lang::En) => {
                "The service is temporarily unavailable. Please try again shortly."
            }
            (ErrorKind::Server, Lang::Es) => {
                "El servicio no está disponible temporalmente. Inténtalo de nuevo en breve."
            }
            (ErrorKind::InvalidRequest, Lang::En) => {
                "Something went wrong with this request. Please rephrase and try again."
            }
            (ErrorKind::InvalidRequest, Lang::Es) => {
                "Algo salió mal con esta solicitud. Intenta reformular tu mensaje."
            }
            (ErrorKind::ContentFilter, Lang::En) => {
                "I can't respond to that request. Please try asking in a different way."
            }
            (ErrorKind::ContentFilter, Lang::Es) => {
                "No puedo responder a esa solicitud. Intenta preguntar de otra manera."
            }
            (ErrorKind::Unknown, Lang::En) => "Something unexpected happened. Please try again.",
            (ErrorKind::Unknown, Lang::Es) => {
                "Ocurrió algo inesperado. Por favor, inténtalo de nuevo."
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// RawFailure
// =============================================================================

/// An unclassified failure from any layer below the orchestrator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawFailure {
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Distinguishing name such as `"timeout"` or an upstream error type.
    pub marker: Option<String>,
    pub retry_after: Option<Duration>,
}

impl RawFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    /// A connect or stall timer fired.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(message).with_marker("timeout")
    }
}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => f.write_str(&self.message),
        }
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(err: reqwest::Error) -> Self {
        let mut raw = RawFailure::new(err.to_string());
        raw.status = err.status().map(|s| s.as_u16());
        if err.is_timeout() {
            raw.marker = Some("timeout".to_string());
        } else if err.is_connect() || err.is_request() || err.is_body() {
            raw.marker = Some("network".to_string());
        } else if err.is_decode() {
            raw.marker = Some("decode".to_string());
        }
        raw
    }
}

impl From<std::io::Error> for RawFailure {
    fn from(err: std::io::Error) -> Self {
        let marker = match err.kind() {
            std::io::ErrorKind::TimedOut => "timeout",
            _ => "network",
        };
        RawFailure::new(err.to_string()).with_marker(marker)
    }
}

// =============================================================================
// AiError
// =============================================================================

/// A classified failure. Immutable once built.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind}: {human_message}")]
pub struct AiError {
    pub kind: ErrorKind,
    pub retryable: bool,
    /// Minimum wait suggested before retrying.
    pub retry_after: Option<Duration>,
    pub human_message: String,
    pub localized_message: String,
    /// Description of the underlying failure. Not for display to users.
    pub cause: String,
}

impl AiError {
    pub fn new(kind: ErrorKind, lang: Lang, cause: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            retry_after: None,
            human_message: kind.message(Lang::En).to_string(),
            localized_message: kind.message(lang).to_string(),
            cause: cause.into(),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "rate_limit", "too many requests", "429", "overloaded_error", "quota"];
const TOKEN_LIMIT_PATTERNS: &[&str] = &[
    "context length",
    "context_length",
    "maximum context",
    "too many tokens",
    "token limit",
    "prompt is too long",
    "max_tokens",
];
const AUTH_PATTERNS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "authentication",
    "invalid api key",
    "invalid x-api-key",
    "permission",
];
const CONTENT_FILTER_PATTERNS: &[&str] = &["content filter", "content_filter", "content policy", "safety", "blocked"];
const INVALID_REQUEST_PATTERNS: &[&str] = &["400", "invalid_request", "invalid request", "bad request", "malformed"];
const SERVER_PATTERNS: &[&str] = &[
    "500",
    "502",
    "503",
    "504",
    "529",
    "server error",
    "internal error",
    "api_error",
    "service unavailable",
    "bad gateway",
    "overloaded",
];
const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "aborterror", "aborted", "deadline"];
const NETWORK_PATTERNS: &[&str] = &[
    "network",
    "connection",
    "connect",
    "dns",
    "socket",
    "econnreset",
    "econnrefused",
    "unreachable",
    "fetch failed",
    "stream ended",
];

/// Classify any failure. Total: unmatched input becomes `Unknown`.
pub fn classify_error(raw: &RawFailure, lang: Lang) -> AiError {
    let kind = classify_kind(raw);
    let mut err = AiError::new(kind, lang, raw.to_string());
    if kind == ErrorKind::RateLimit {
        err.retry_after = Some(
            raw.retry_after
                .unwrap_or(Duration::from_millis(DEFAULT_RATE_LIMIT_WAIT_MS)),
        );
    }
    tracing::debug!(kind = %kind, status = ?raw.status, marker = ?raw.marker, "Classified upstream failure");
    err
}

fn classify_kind(raw: &RawFailure) -> ErrorKind {
    if let Some(kind) = raw.status.and_then(kind_for_status) {
        return kind;
    }

    let marker = raw.marker.as_deref().unwrap_or_default().to_lowercase();
    if let Some(kind) = kind_for_marker(&marker, &raw.message.to_lowercase()) {
        return kind;
    }

    let status = raw.status.map(|s| s.to_string()).unwrap_or_default();
    let haystack = format!("{} {} {}", marker, status, raw.message.to_lowercase());
    let hit = |patterns: &[&str]| patterns.iter().any(|p| haystack.contains(p));

    // Specific kinds before the broad transport kinds
    if hit(RATE_LIMIT_PATTERNS) {
        ErrorKind::RateLimit
    } else if hit(TOKEN_LIMIT_PATTERNS) {
        ErrorKind::TokenLimit
    } else if hit(AUTH_PATTERNS) {
        ErrorKind::Auth
    } else if hit(CONTENT_FILTER_PATTERNS) {
        ErrorKind::ContentFilter
    } else if hit(INVALID_REQUEST_PATTERNS) {
        ErrorKind::InvalidRequest
    } else if hit(SERVER_PATTERNS) {
        ErrorKind::Server
    } else if hit(TIMEOUT_PATTERNS) {
        ErrorKind::Timeout
    } else if hit(NETWORK_PATTERNS) {
        ErrorKind::Network
    } else {
        ErrorKind::Unknown
    }
}

/// Markers set by the transport or named by the upstream error type.
fn kind_for_marker(marker: &str, message: &str) -> Option<ErrorKind> {
    match marker {
        "timeout" | "aborterror" => Some(ErrorKind::Timeout),
        "network" => Some(ErrorKind::Network),
        "rate_limit_error" | "overloaded_error" => Some(ErrorKind::RateLimit),
        "authentication_error" | "permission_error" => Some(ErrorKind::Auth),
        "request_too_large" => Some(ErrorKind::TokenLimit),
        "api_error" => Some(ErrorKind::Server),
        "invalid_request_error" => {
            if TOKEN_LIMIT_PATTERNS.iter().any(|p| message.contains(p)) {
                Some(ErrorKind::TokenLimit)
            } else {
                Some(ErrorKind::InvalidRequest)
            }
        }
        _ => None,
    }
}

fn kind_for_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 | 403 => Some(ErrorKind::Auth),
        408 => Some(ErrorKind::Timeout),
        413 => Some(ErrorKind::TokenLimit),
        429 => Some(ErrorKind::RateLimit),
        // 400 needs the message to tell token limits from bad requests
        400 => None,
        500..=599 => Some(ErrorKind::Server),
        _ => None,
    }
}

// =============================================================================
// Retry policy
// =============================================================================

/// `min(base * factor^attempt, cap)` without jitter.
pub fn base_retry_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exp = config.backoff_factor.max(1.0).powi(attempt.min(64) as i32);
    let raw = (config.base_delay_ms as f64 * exp).min(config.max_delay_ms as f64);
    Duration::from_millis(raw.max(0.0) as u64)
}

/// Backoff for `attempt` with ±20% jitter.
pub fn calculate_retry_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = base_retry_delay(attempt, config).as_millis() as f64;
    let factor = rand::rng().random_range((1.0 - JITTER)..=(1.0 + JITTER));
    Duration::from_millis((base * factor).round() as u64)
}

pub fn should_retry(error: &AiError, attempt: u32, config: &RetryConfig) -> bool {
    error.retryable && attempt < config.max_retries
}
