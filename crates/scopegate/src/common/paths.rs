//! Path Utilities
//!
//! Common path resolution for scopegate's home directory.

use std::path::PathBuf;

use super::error::AppError;
use super::result::AppResult;

/// Get the scopegate base directory (`~/.scopegate/`)
pub fn scopegate_dir() -> AppResult<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))?;
    Ok(home.join(".scopegate"))
}

/// Get a path within the scopegate directory
pub fn scopegate_path(relative_path: &str) -> AppResult<PathBuf> {
    Ok(scopegate_dir()?.join(relative_path))
}

/// Default config file location
pub fn config_path() -> AppResult<PathBuf> {
    scopegate_path("config.json")
}

/// Default token cache location
pub fn token_cache_path() -> AppResult<PathBuf> {
    scopegate_path("token_cache.json")
}
