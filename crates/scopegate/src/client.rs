//! Request Dispatcher
//!
//! `ScopedClient` runs every registered [`BeforeHook`] over an
//! [`OutgoingRequest`], highest priority first, then sends it with reqwest.
//! Signing hooks such as the scoped token gate sit at [`SIGN_REQUEST`] so
//! they see the request after every other hook has shaped it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::common::{create_http_client, AppError, AppResult, ErrorCode};
use crate::request::{OutgoingRequest, AUTH_CONFIG_KEY};

/// Priority for hooks that sign the request. Runs after default-priority hooks.
pub const SIGN_REQUEST: i32 = -10000;
/// Priority for ordinary hooks
pub const DEFAULT_PRIORITY: i32 = 0;

/// Mutates a request before it is sent.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    /// Higher runs earlier.
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    async fn before(&self, request: &mut OutgoingRequest) -> AppResult<()>;
}

/// HTTP client with before-send hooks and per-request config defaults
pub struct ScopedClient {
    client: Client,
    base_url: Option<String>,
    defaults: HashMap<String, String>,
    hooks: Vec<Arc<dyn BeforeHook>>,
}

impl ScopedClient {
    pub fn new() -> AppResult<Self> {
        Ok(Self::with_client(create_http_client()?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: None,
            defaults: HashMap::new(),
            hooks: Vec::new(),
        }
    }

    /// Resolve relative request URLs against `base_url`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Default config entry applied to requests that do not set it.
    pub fn default_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Default auth-mode marker, e.g. `"scoped"` to sign every request.
    pub fn default_auth(self, mode: impl Into<String>) -> Self {
        self.default_config(AUTH_CONFIG_KEY, mode)
    }

    /// Register a hook. Hooks with equal priority keep registration order.
    pub fn attach(&mut self, hook: Arc<dyn BeforeHook>) {
        self.hooks.push(hook);
        self.hooks.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub fn with_hook(mut self, hook: Arc<dyn BeforeHook>) -> Self {
        self.attach(hook);
        self
    }

    /// Merge defaults and run all hooks, without sending.
    pub async fn prepare(&self, mut request: OutgoingRequest) -> AppResult<OutgoingRequest> {
        request.merge_defaults(&self.defaults);
        request.url = self.resolve_url(&request.url);

        for hook in &self.hooks {
            hook.before(&mut request).await?;
        }
        Ok(request)
    }

    pub async fn get(&self, url: &str) -> AppResult<Value> {
        self.send(OutgoingRequest::get(url)).await
    }

    pub async fn post(&self, url: &str, body: Value) -> AppResult<Value> {
        self.send(OutgoingRequest::post(url, body)).await
    }

    pub async fn delete(&self, url: &str) -> AppResult<Value> {
        self.send(OutgoingRequest::new(Method::DELETE, url)).await
    }

    /// Prepare and send `request`, returning the parsed JSON body.
    pub async fn send(&self, request: OutgoingRequest) -> AppResult<Value> {
        let request = self.prepare(request).await?;
        debug!("Sending {} {}", request.method, request.url);

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!("Response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by {}", request.url);
        }

        let body = response
            .text()
            .await
            .map_err(|e| {
                AppError::new(ErrorCode::Http, format!("Failed to read response body: {}", e))
            })?;

        if status.is_success() && body.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let message = extract_error_message(parsed.as_ref(), status);
            error!("HTTP error from {}: {}", request.url, message);
            return Err(AppError::http_status(status.as_u16(), message));
        }

        parsed.ok_or_else(|| {
            AppError::new(
                ErrorCode::Http,
                format!("Failed to parse JSON response (body: {})", body),
            )
        })
    }

    fn resolve_url(&self, url: &str) -> String {
        match &self.base_url {
            Some(base) if !url.contains("://") => {
                format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
            }
            _ => url.to_string(),
        }
    }
}

/// Pull a message out of a Google-style error body, falling back to the status.
///
/// ```json
/// { "error": { "code": 403, "message": "Permission denied" } }
/// ```
fn extract_error_message(body: Option<&Value>, status: StatusCode) -> String {
    if let Some(error_obj) = body.and_then(|b| b.get("error")) {
        if let Some(message) = error_obj.get("message").and_then(|v| v.as_str()) {
            let code = error_obj
                .get("code")
                .and_then(|v| v.as_i64())
                .unwrap_or(status.as_u16() as i64);
            return format!("API error {}: {}", code, message);
        }
        if let Some(kind) = error_obj.as_str() {
            let desc = body
                .and_then(|b| b.get("error_description"))
                .and_then(|v| v.as_str())
                .unwrap_or("no description");
            return format!("{}: {}", kind, desc);
        }
    }

    format!("HTTP {} error", status)
}
