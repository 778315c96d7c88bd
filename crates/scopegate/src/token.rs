//! Token Sources
//!
//! A token source mints a fresh access token for a scope. The gate only
//! calls it on a cache miss; it never retries or wraps its errors.

use std::future::Future;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::common::{AppError, AppResult};
use crate::scope::Scope;

/// Produces an access token for a scope.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch(&self, scope: &Scope) -> AppResult<String>;
}

/// Adapts an async closure into a [`TokenSource`].
///
/// ```ignore
/// let source = FnTokenSource::new(|scope: Scope| async move {
///     Ok::<_, AppError>(format!("token-for-{}", scope))
/// });
/// ```
pub struct FnTokenSource<F> {
    func: F,
}

impl<F> FnTokenSource<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> TokenSource for FnTokenSource<F>
where
    F: Fn(Scope) -> Fut + Send + Sync,
    Fut: Future<Output = AppResult<String>> + Send + 'static,
{
    async fn fetch(&self, scope: &Scope) -> AppResult<String> {
        (self.func)(scope.clone()).await
    }
}

/// Runs an external program and reads the token from its stdout.
///
/// The scope elements are appended to the configured arguments, so
/// `["gcloud", "auth", "print-access-token"]` with scope `["a", "b"]`
/// runs `gcloud auth print-access-token a b`.
#[derive(Debug, Clone)]
pub struct CommandTokenSource {
    program: String,
    args: Vec<String>,
    append_scopes: bool,
}

impl CommandTokenSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            append_scopes: true,
        }
    }

    /// Build from a full argv, program first.
    pub fn from_argv(argv: &[String]) -> AppResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| AppError::invalid_argument("token command is empty"))?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Do not pass the scope to the program.
    pub fn without_scopes(mut self) -> Self {
        self.append_scopes = false;
        self
    }

    fn argv(&self, scope: &Scope) -> Vec<String> {
        let mut argv = self.args.clone();
        if self.append_scopes {
            argv.extend(scope.as_slice().iter().cloned());
        }
        argv
    }
}

#[async_trait]
impl TokenSource for CommandTokenSource {
    async fn fetch(&self, scope: &Scope) -> AppResult<String> {
        let argv = self.argv(scope);
        debug!("Running token command {} ({} args)", self.program, argv.len());

        let output = Command::new(&self.program)
            .args(&argv)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::token_source(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::token_source(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let token = String::from_utf8(output.stdout)
            .map_err(|e| AppError::token_source(format!("Token is not UTF-8: {}", e)))?
            .trim()
            .to_string();
        if token.is_empty() {
            return Err(AppError::token_source(format!("{} printed no token", self.program)));
        }

        info!("Fetched token for scope {} via {}", scope, self.program);
        Ok(token)
    }
}
