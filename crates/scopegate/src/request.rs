//! Outgoing Requests
//!
//! Requests carry a per-request config map next to their headers. The `auth`
//! entry selects how the request is authenticated; only [`SCOPED_AUTH`] is
//! acted on by the gate.

use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
pub use reqwest::Method;
use serde_json::Value;

use crate::common::{AppError, AppResult};

/// Config key holding the auth-mode marker
pub const AUTH_CONFIG_KEY: &str = "auth";
/// Marker value that asks for a scoped bearer token
pub const SCOPED_AUTH: &str = "scoped";

/// Anything the gate can sign.
pub trait AuthorizableRequest {
    /// Current auth-mode marker, if any.
    fn auth_marker(&self) -> Option<&str>;

    /// Set the authorization header, replacing any previous value.
    fn set_authorization(&mut self, value: &str) -> AppResult<()>;
}

/// A request that has not been sent yet.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub config: HashMap<String, String>,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            config: HashMap::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, url).json(body)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the auth-mode marker.
    pub fn auth(self, mode: impl Into<String>) -> Self {
        self.config_value(AUTH_CONFIG_KEY, mode)
    }

    pub fn config_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> AppResult<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| {
                AppError::invalid_argument(format!("Invalid header name {}: {}", name, e))
            })?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::invalid_argument(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Fill in config entries the request does not set itself.
    pub fn merge_defaults(&mut self, defaults: &HashMap<String, String>) {
        for (key, value) in defaults {
            self.config.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    pub fn authorization(&self) -> Option<&str> {
        self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
    }
}

impl AuthorizableRequest for OutgoingRequest {
    fn auth_marker(&self) -> Option<&str> {
        self.config.get(AUTH_CONFIG_KEY).map(String::as_str)
    }

    fn set_authorization(&mut self, value: &str) -> AppResult<()> {
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| {
                AppError::invalid_argument(format!("Invalid authorization header: {}", e))
            })?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}
