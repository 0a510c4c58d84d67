//! Error types for SFDaaS.

use thiserror::Error;

/// Every failure the core can surface.
///
/// `Clone` so one single-flight outcome can be handed to all waiters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameter(Vec<String>),

    #[error("Domain error: {0}")]
    Domain(String),

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Raw backend failure. The fingerprint cache converts this into a
    /// fail-open miss or `CacheUnavailable`; it never reaches a caller.
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status the boundary layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Parse(_) | Error::MissingParameter(_) => 400,
            Error::Domain(_) | Error::LimitExceeded(_) => 422,
            Error::CacheUnavailable(_) => 503,
            Error::Backend(_) | Error::Config(_) | Error::Internal(_) => 500,
        }
    }

    /// Stable machine-readable name of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Parse(_) => "parse_error",
            Error::MissingParameter(_) => "missing_parameter",
            Error::Domain(_) => "domain_error",
            Error::LimitExceeded(_) => "limit_exceeded",
            Error::CacheUnavailable(_) => "cache_unavailable",
            Error::Backend(_) => "cache_backend",
            Error::Config(_) => "config_error",
            Error::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("JSON: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
