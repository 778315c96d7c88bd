//! scopegate
//!
//! Attaches scoped bearer tokens to outgoing HTTP requests. Requests whose
//! `auth` config is `"scoped"` get `authorization: Bearer <token>`, with the
//! token minted by a [`TokenSource`] and optionally cached per scope.

pub mod cache;
pub mod client;
pub mod common;
pub mod config;
pub mod crypto;
pub mod gate;
pub mod logging;
pub mod request;
pub mod scope;
pub mod token;

pub use cache::{CacheBackend, CacheConfig, FileCache, MemoryCache, DEFAULT_CACHE_LIFETIME};
pub use client::{BeforeHook, ScopedClient, DEFAULT_PRIORITY, SIGN_REQUEST};
pub use common::{AppError, AppResult, ErrorCode};
pub use config::GateConfig;
pub use gate::ScopedTokenGate;
pub use request::{AuthorizableRequest, Method, OutgoingRequest, SCOPED_AUTH};
pub use scope::Scope;
pub use token::{CommandTokenSource, FnTokenSource, TokenSource};
