//! Scoped Token Gate
//!
//! Signs requests whose auth marker is `"scoped"` with
//! `authorization: Bearer <token>`. Tokens come from a [`TokenSource`] and,
//! when a backend is configured, are cached under the scope's key for the
//! configured lifetime.
//!
//! ```ignore
//! let gate = ScopedTokenGate::new(source, "https://www.googleapis.com/auth/indexing")
//!     .with_cache(Arc::new(MemoryCache::new()), CacheConfig::default().with_prefix("idx::"));
//!
//! let mut req = OutgoingRequest::get(url).auth("scoped");
//! gate.on_before(&mut req).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cache::{CacheBackend, CacheConfig};
use crate::client::{BeforeHook, SIGN_REQUEST};
use crate::common::AppResult;
use crate::request::{AuthorizableRequest, OutgoingRequest, SCOPED_AUTH};
use crate::scope::Scope;
use crate::token::TokenSource;

/// Whether resolved tokens are cached. Decided once at construction.
enum TokenCacheMode {
    Disabled,
    Enabled {
        backend: Arc<dyn CacheBackend>,
        config: CacheConfig,
    },
}

pub struct ScopedTokenGate {
    source: Arc<dyn TokenSource>,
    scope: Scope,
    cache: TokenCacheMode,
}

impl ScopedTokenGate {
    /// Create a gate with caching disabled.
    pub fn new(source: Arc<dyn TokenSource>, scope: impl Into<Scope>) -> Self {
        Self {
            source,
            scope: scope.into(),
            cache: TokenCacheMode::Disabled,
        }
    }

    /// Create a gate from an untyped scope value.
    ///
    /// Fails with `InvalidArgument` unless `scope` is a string or an array of
    /// strings.
    pub fn from_value(source: Arc<dyn TokenSource>, scope: &Value) -> AppResult<Self> {
        Ok(Self::new(source, Scope::from_value(scope)?))
    }

    /// Cache tokens in `backend` using `config`.
    pub fn with_cache(mut self, backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        self.cache = TokenCacheMode::Enabled { backend, config };
        self
    }

    /// Cache tokens only when a backend is given.
    pub fn with_optional_cache(
        self,
        backend: Option<Arc<dyn CacheBackend>>,
        config: Option<CacheConfig>,
    ) -> Self {
        match backend {
            Some(backend) => self.with_cache(backend, config.unwrap_or_default()),
            None => self,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn is_caching(&self) -> bool {
        matches!(self.cache, TokenCacheMode::Enabled { .. })
    }

    /// Key the token is cached under, before any prefix.
    pub fn cache_key(&self) -> String {
        self.scope.cache_key()
    }

    /// Return a cached token for the scope, or mint and cache a new one.
    pub async fn fetch_token(&self) -> AppResult<String> {
        match &self.cache {
            TokenCacheMode::Disabled => self.source.fetch(&self.scope).await,
            TokenCacheMode::Enabled { backend, config } => {
                let key = config.full_key(&self.cache_key());

                if let Some(cached) = backend.get(&key).await? {
                    if !cached.is_empty() {
                        debug!("Token cache hit for {}", key);
                        return Ok(cached);
                    }
                }

                debug!("Token cache miss for {}", key);
                let token = self.source.fetch(&self.scope).await?;
                backend.set(&key, &token, config.lifetime()).await?;
                Ok(token)
            }
        }
    }

    /// Sign `request` if its auth marker asks for a scoped token.
    ///
    /// Requests with any other marker, or none, are left untouched. On error
    /// the request is not modified.
    pub async fn on_before<R>(&self, request: &mut R) -> AppResult<()>
    where
        R: AuthorizableRequest + Send + ?Sized,
    {
        if request.auth_marker() != Some(SCOPED_AUTH) {
            return Ok(());
        }

        let token = self.fetch_token().await?;
        request.set_authorization(&format!("Bearer {}", token))
    }
}

impl fmt::Debug for ScopedTokenGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cache = match &self.cache {
            TokenCacheMode::Disabled => None,
            TokenCacheMode::Enabled { config, .. } => Some(config),
        };
        f.debug_struct("ScopedTokenGate")
            .field("scope", &self.scope)
            .field("cache", &cache)
            .finish()
    }
}

#[async_trait]
impl BeforeHook for ScopedTokenGate {
    fn priority(&self) -> i32 {
        SIGN_REQUEST
    }

    async fn before(&self, request: &mut OutgoingRequest) -> AppResult<()> {
        self.on_before(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::common::{AppError, ErrorCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Token source that counts calls and records the scopes it saw.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        seen: Mutex<Vec<Scope>>,
    }

    impl CountingSource {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for CountingSource {
        async fn fetch(&self, scope: &Scope) -> AppResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(scope.clone());
            Ok(format!("token-{}", n))
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TokenSource for FailingSource {
        async fn fetch(&self, _scope: &Scope) -> AppResult<String> {
            Err(AppError::token_source("metadata server unreachable"))
        }
    }

    #[tokio::test]
    async fn test_non_scoped_requests_untouched() {
        let source = Arc::new(CountingSource::default());
        let gate = ScopedTokenGate::new(source.clone(), "read");

        let mut unmarked = OutgoingRequest::get("https://x");
        gate.on_before(&mut unmarked).await.unwrap();
        assert_eq!(unmarked.authorization(), None);

        let mut other = OutgoingRequest::get("https://x")
            .auth("google_auth")
            .header("authorization", "Basic keep")
            .unwrap();
        gate.on_before(&mut other).await.unwrap();
        assert_eq!(other.authorization(), Some("Basic keep"));

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_scoped_request_gets_bearer() {
        let source = Arc::new(CountingSource::default());
        let gate = ScopedTokenGate::new(source.clone(), "read");

        let mut req = OutgoingRequest::get("https://x")
            .auth("scoped")
            .header("Authorization", "Bearer stale")
            .unwrap();
        gate.on_before(&mut req).await.unwrap();

        assert_eq!(req.authorization(), Some("Bearer token-1"));
    }

    #[test]
    fn test_cache_keys() {
        let source = Arc::new(CountingSource::default());
        assert_eq!(ScopedTokenGate::new(source.clone(), "read").cache_key(), "read");
        assert_eq!(
            ScopedTokenGate::new(source, ["read", "write"]).cache_key(),
            "read:write"
        );
    }

    #[tokio::test]
    async fn test_cached_token_reused() {
        let source = Arc::new(CountingSource::default());
        let cache = Arc::new(MemoryCache::new());
        let gate = ScopedTokenGate::new(source.clone(), ["read", "write"])
            .with_cache(cache.clone(), CacheConfig::default());

        assert_eq!(gate.fetch_token().await.unwrap(), "token-1");
        assert_eq!(gate.fetch_token().await.unwrap(), "token-1");
        assert_eq!(source.calls(), 1);
        assert_eq!(
            cache.get("read:write").await.unwrap().as_deref(),
            Some("token-1")
        );
    }

    #[tokio::test]
    async fn test_prestored_value_skips_source() {
        let source = Arc::new(CountingSource::default());
        let cache = Arc::new(MemoryCache::new());
        cache
            .set("svc::read", "from-cache", Duration::from_secs(60))
            .await
            .unwrap();

        let gate = ScopedTokenGate::new(source.clone(), "read")
            .with_cache(cache, CacheConfig::default().with_prefix("svc::"));

        let mut req = OutgoingRequest::get("https://x").auth("scoped");
        gate.on_before(&mut req).await.unwrap();
        assert_eq!(req.authorization(), Some("Bearer from-cache"));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_cached_value_is_miss() {
        let source = Arc::new(CountingSource::default());
        let cache = Arc::new(MemoryCache::new());
        cache.set("read", "", Duration::from_secs(60)).await.unwrap();

        let gate =
            ScopedTokenGate::new(source.clone(), "read").with_cache(cache, CacheConfig::default());
        assert_eq!(gate.fetch_token().await.unwrap(), "token-1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_without_cache_calls_source_every_time() {
        let source = Arc::new(CountingSource::default());
        let gate = ScopedTokenGate::new(source.clone(), "read");
        assert!(!gate.is_caching());

        for expected in 1..=3 {
            assert_eq!(gate.fetch_token().await.unwrap(), format!("token-{}", expected));
        }
        assert_eq!(source.calls(), 3);
        assert!(source.seen.lock().unwrap().iter().all(|s| *s == Scope::from("read")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_refetched() {
        let source = Arc::new(CountingSource::default());
        let gate = ScopedTokenGate::new(source.clone(), "read")
            .with_cache(Arc::new(MemoryCache::new()), CacheConfig::default().with_lifetime(30));

        assert_eq!(gate.fetch_token().await.unwrap(), "token-1");
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(gate.fetch_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn test_oversized_lifetime_is_cache_error() {
        let source = Arc::new(CountingSource::default());
        let gate = ScopedTokenGate::new(source.clone(), "read").with_cache(
            Arc::new(MemoryCache::new()),
            CacheConfig::default().with_lifetime(u64::MAX),
        );

        let err = gate.fetch_token().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Cache);
    }

    #[test]
    fn test_invalid_scope_rejected() {
        let source = Arc::new(CountingSource::default());
        let err = ScopedTokenGate::from_value(source, &serde_json::json!(42)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_optional_cache_absent() {
        let source = Arc::new(CountingSource::default());
        let gate = ScopedTokenGate::new(source, "read")
            .with_optional_cache(None, Some(CacheConfig::default().with_prefix("ignored")));
        assert!(!gate.is_caching());
    }

    #[tokio::test]
    async fn test_source_error_leaves_header_unset() {
        let gate = ScopedTokenGate::new(Arc::new(FailingSource), "read");
        let mut req = OutgoingRequest::get("https://x").auth("scoped");

        let err = gate.on_before(&mut req).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenSource);
        assert_eq!(req.authorization(), None);
    }

    #[test]
    fn test_debug_hides_source() {
        let gate = ScopedTokenGate::new(Arc::new(FailingSource), "read");
        let out = format!("{:?}", gate);
        assert!(out.contains("read"));
        assert!(out.contains("cache: None"));
    }
}
