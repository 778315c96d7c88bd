//! Common Error Types
//!
//! Every fallible operation in the crate reports an `AppError` tagged with an
//! `ErrorCode`, so callers can branch on the failure class without parsing
//! messages.

/// Failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// A value handed to a constructor has the wrong shape
    InvalidArgument,
    /// The token source failed to produce a token
    TokenSource,
    /// The cache backend failed to read or write
    Cache,
    /// Transport-level HTTP failure
    Http,
    /// The server answered with a non-success status
    HttpStatus,
    /// Configuration could not be loaded
    Config,
    Io,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::TokenSource => "token_source",
            ErrorCode::Cache => "cache",
            ErrorCode::Http => "http",
            ErrorCode::HttpStatus => "http_status",
            ErrorCode::Config => "config",
            ErrorCode::Io => "io",
        }
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
#[error("[{}] {message}", .code.as_str())]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn token_source(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TokenSource, message)
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cache, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }

    /// Create an error for a non-success HTTP response
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::HttpStatus, message).with_data(serde_json::json!({ "status": status }))
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidArgument, format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::new(ErrorCode::Http, format!("HTTP request failed: {}", err))
    }
}
