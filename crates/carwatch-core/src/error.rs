use thiserror::Error;

/// Application-wide error types for carwatch.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed or returned a non-success status.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// The source served a login wall, checkpoint, or explicit block page.
    #[error("Access blocked on {worker}: {signature}")]
    AccessBlocked { worker: String, signature: String },

    /// Raw content could not be turned into listings.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    /// Returns true if the source explicitly refused us.
    ///
    /// Blocks earn a longer cooldown than plain unavailability.
    pub fn is_block(&self) -> bool {
        matches!(self, AppError::AccessBlocked { .. } | AppError::RateLimitExceeded)
    }

    /// Returns true if this error should be charged to the source worker
    /// that produced it.
    pub fn counts_against_worker(&self) -> bool {
        match self {
            AppError::HttpError(_)
            | AppError::AccessBlocked { .. }
            | AppError::ExtractionError(_)
            | AppError::SerializationError(_)
            | AppError::Timeout(_)
            | AppError::RateLimitExceeded
            | AppError::NetworkError(_)
            | AppError::Generic(_) => true,
            AppError::DatabaseError(_) | AppError::ConfigError(_) => false,
        }
    }
}
