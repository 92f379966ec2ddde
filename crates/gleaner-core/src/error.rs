use thiserror::Error;

/// Application-wide error types for Gleaner.
#[derive(Error, Debug)]
pub enum AppError {
    /// Page navigation failed (DNS, connection, HTTP status, CDP navigation error).
    #[error("Navigation error: {0}")]
    NavigationError(String),

    /// Navigation or a page-level operation exceeded its time bound.
    #[error("Timed out after {0} seconds")]
    Timeout(u64),

    /// A readiness marker never appeared on the page.
    #[error("Page not ready: marker '{marker}' not found within {seconds} seconds")]
    ReadinessTimeout { marker: String, seconds: u64 },

    /// Reading field values from a loaded page failed.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// The browser process or its DevTools connection failed.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// A locator uses a syntax the session backend cannot evaluate.
    #[error("Unsupported locator '{0}'")]
    UnsupportedLocator(String),

    /// A page profile is malformed or does not match the known field set.
    #[error("Profile error: {0}")]
    ProfileError(String),

    /// A run date is not a valid `YYYYMMDD` calendar date.
    #[error("Invalid run date '{0}': expected YYYYMMDD")]
    InvalidRunDate(String),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Navigation failures, timeouts, readiness waits and page-side
    /// extraction failures all depend on the remote page and may succeed
    /// on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NavigationError(_)
                | AppError::Timeout(_)
                | AppError::ReadinessTimeout { .. }
                | AppError::ExtractionError(_)
                | AppError::BrowserError(_)
        )
    }

    /// Returns true for errors that point at a bug or a misconfiguration
    /// rather than at the remote page.
    pub fn is_unexpected(&self) -> bool {
        !self.is_retryable()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Generic(format!("I/O error: {err}"))
    }
}
