//! HTTP Client Utilities
//!
//! Shared HTTP client creation with consistent configuration.

use std::time::Duration;

use super::error::{AppError, ErrorCode};
use super::result::AppResult;

/// Default request timeout for dispatched requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Create a reqwest HTTP client with standard configuration
///
/// - 30 second timeout
/// - 10 second connect timeout
pub fn create_http_client() -> AppResult<reqwest::Client> {
    create_http_client_with_timeout(DEFAULT_TIMEOUT_SECS)
}

/// Create a reqwest HTTP client with custom timeout
pub fn create_http_client_with_timeout(timeout_secs: u64) -> AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("scopegate/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::new(ErrorCode::Http, format!("Failed to build HTTP client: {}", e)))
}
