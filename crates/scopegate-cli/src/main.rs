mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "scopegate", version, about = "Scoped bearer tokens for HTTP requests")]
pub struct Args {
    /// Config file (default: ~/.scopegate/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Skip the token cache entirely
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the cache key for a scope
    Key {
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Resolve and print a token
    Token {
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Send a request through the gate and print the JSON response
    Request {
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,
        /// Auth-mode marker for this request (default from config)
        #[arg(long)]
        auth: Option<String>,
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
    /// Manage the token cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached token
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    scopegate::logging::init(args.verbose);

    let mut config = scopegate::GateConfig::load(args.config.as_deref())?;
    config.apply_env();

    commands::run(&args, &config).await
}
