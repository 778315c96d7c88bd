use std::sync::Arc;

use anyhow::{bail, Context};
use scopegate::{
    CacheBackend, CommandTokenSource, FileCache, GateConfig, Method, OutgoingRequest, Scope,
    ScopedClient, ScopedTokenGate,
};
use serde_json::Value;
use tracing::info;

use crate::{Args, CacheAction, Command};

pub async fn run(args: &Args, config: &GateConfig) -> anyhow::Result<()> {
    match &args.command {
        Command::Key { scopes } => {
            let scope = resolve_scope(scopes, config)?;
            println!("{}", scope.cache_key());
        }
        Command::Token { scopes } => {
            let gate = build_gate(resolve_scope(scopes, config)?, config, args.no_cache)?;
            println!("{}", gate.fetch_token().await?);
        }
        Command::Request {
            url,
            method,
            data,
            auth,
            scopes,
        } => {
            let gate = build_gate(resolve_scope(scopes, config)?, config, args.no_cache)?;
            let client = ScopedClient::new()?
                .default_auth(config.default_auth.clone())
                .with_hook(Arc::new(gate));

            let method = method
                .to_uppercase()
                .parse::<Method>()
                .with_context(|| format!("invalid HTTP method {}", method))?;
            let mut request = OutgoingRequest::new(method, url.clone());
            if let Some(data) = data {
                let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
                request = request.json(body);
            }
            if let Some(auth) = auth {
                request = request.auth(auth.clone());
            }

            let response = client.send(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Cache { action: CacheAction::Clear } => {
            let path = config.cache_path()?;
            let cache = FileCache::open(&path)?;
            cache.clear().await?;
            info!("Cleared token cache at {:?}", path);
        }
    }
    Ok(())
}

/// Scopes from the command line win over the configured default.
fn resolve_scope(scopes: &[String], config: &GateConfig) -> anyhow::Result<Scope> {
    match scopes {
        [] => config
            .scopes
            .clone()
            .context("no scope given: pass --scope or set scopes in the config"),
        [single] => Ok(Scope::Single(single.clone())),
        many => Ok(Scope::List(many.to_vec())),
    }
}

fn build_gate(
    scope: Scope,
    config: &GateConfig,
    no_cache: bool,
) -> anyhow::Result<ScopedTokenGate> {
    if config.token_command.is_empty() {
        bail!(
            "no token command configured: set token_command in the config or {}",
            scopegate::config::ENV_TOKEN_COMMAND
        );
    }
    let source = Arc::new(CommandTokenSource::from_argv(&config.token_command)?);

    let gate = ScopedTokenGate::new(source, scope);
    if no_cache {
        return Ok(gate);
    }

    let cache = FileCache::open(config.cache_path()?)?;
    Ok(gate.with_cache(Arc::new(cache), config.cache.clone()))
}
