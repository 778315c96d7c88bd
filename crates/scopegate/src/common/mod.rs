//! Common Utilities
//!
//! Shared error handling, paths, and HTTP client construction.

pub mod error;
pub mod http;
pub mod paths;
pub mod result;

pub use error::{AppError, ErrorCode};
pub use http::{create_http_client, create_http_client_with_timeout};
pub use paths::{config_path, scopegate_dir, scopegate_path, token_cache_path};
pub use result::AppResult;
