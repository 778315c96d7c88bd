//! Configuration management
//!
//! Reads `~/.scopegate/config.json` (or an explicit path) and applies
//! `SCOPEGATE_*` environment overrides. Every field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CacheConfig;
use crate::common::{self, AppError, AppResult};
use crate::request::SCOPED_AUTH;
use crate::scope::Scope;

pub const ENV_SCOPES: &str = "SCOPEGATE_SCOPES";
pub const ENV_TOKEN_COMMAND: &str = "SCOPEGATE_TOKEN_COMMAND";
pub const ENV_CACHE_PATH: &str = "SCOPEGATE_CACHE_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Default scope when none is given on the command line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Scope>,
    /// argv of the program that prints a token; scopes are appended
    pub token_command: Vec<String>,
    pub cache: CacheConfig,
    /// Token cache file, defaults to `~/.scopegate/token_cache.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    /// Auth-mode marker applied to requests that do not set one
    pub default_auth: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            scopes: None,
            token_command: Vec::new(),
            cache: CacheConfig::default(),
            cache_path: None,
            default_auth: SCOPED_AUTH.to_string(),
        }
    }
}

impl GateConfig {
    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (common::config_path()?, false),
        };

        if !path.exists() {
            if explicit {
                return Err(AppError::config(format!("Config file not found at {:?}", path)));
            }
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| AppError::config(format!("Failed to read config: {}", e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> AppResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| AppError::config(format!("Failed to parse config JSON: {}", e)))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_SCOPES) {
            let scopes: Vec<String> = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !scopes.is_empty() {
                self.scopes = Some(match scopes.len() {
                    1 => Scope::Single(scopes[0].clone()),
                    _ => Scope::List(scopes),
                });
            }
        }

        if let Some(val) = lookup(ENV_TOKEN_COMMAND) {
            let argv: Vec<String> = val.split_whitespace().map(String::from).collect();
            if !argv.is_empty() {
                self.token_command = argv;
            }
        }

        if let Some(val) = lookup(ENV_CACHE_PATH) {
            if !val.trim().is_empty() {
                self.cache_path = Some(PathBuf::from(val.trim()));
            }
        }
    }

    pub fn cache_path(&self) -> AppResult<PathBuf> {
        match &self.cache_path {
            Some(p) => Ok(p.clone()),
            None => common::token_cache_path(),
        }
    }
}
