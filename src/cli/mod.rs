//! CLI entry point for tokenrelay.

pub mod auth;
pub mod fetch;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};

use crate::auth::{BrowserLauncher, PrintUrl, SystemBrowser};
use crate::config::{RelayConfig, DEFAULT_CONFIG_FILE};
use crate::context::AppContext;
use crate::error::Result;

/// tokenrelay CLI
#[derive(Parser, Debug)]
#[command(
    name = "tokenrelay",
    version,
    about = "OAuth2 token lifecycle and paginated API pulls"
)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory holding persisted state (overrides the config file)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Print the authorization URL instead of opening a browser
    #[arg(long, global = true)]
    pub no_browser: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the loopback receiver for the authorization redirect
    Callback(CallbackArgs),
    /// Obtain tokens, authorizing in the browser if needed
    Token(TokenArgs),
    /// Pull a collection (or a single resource) from the API
    Fetch(FetchArgs),
    /// Show which records are stored
    Status,
    /// Remove stored tokens and any authorization in progress
    Logout(LogoutArgs),
}

#[derive(Parser, Debug)]
pub struct CallbackArgs {
    /// Seconds to keep listening (defaults to the polling ceiling)
    #[arg(long)]
    pub lifetime_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TokenKind {
    App,
    User,
    All,
}

#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Which token to obtain
    #[arg(value_enum, default_value = "all")]
    pub kind: TokenKind,
}

#[derive(Parser, Debug)]
pub struct FetchArgs {
    /// Absolute URL, or a path relative to the API base (e.g. `me/tracks`)
    pub target: String,

    /// Page size sent as `limit` on the first request
    #[arg(long)]
    pub limit: Option<u32>,

    /// Single GET without following `next` links
    #[arg(long)]
    pub single: bool,

    /// Write the result here; an existing file is reused unless --refresh
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Ignore an existing output file
    #[arg(long)]
    pub refresh: bool,

    /// Fail instead of keeping a partial result
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Debug)]
pub struct LogoutArgs {
    /// Also forget the stored client credentials
    #[arg(long)]
    pub all: bool,
}

impl Cli {
    /// Load configuration and build the application context.
    pub fn context(&self) -> Result<AppContext> {
        let mut config = RelayConfig::load_from_path(&self.config)?;
        if let Some(dir) = &self.state_dir {
            config.state_dir = Some(dir.clone());
        }
        AppContext::from_config(config)
    }

    pub fn browser(&self) -> Arc<dyn BrowserLauncher> {
        if self.no_browser {
            Arc::new(PrintUrl)
        } else {
            Arc::new(SystemBrowser)
        }
    }
}

/// Run a parsed command.
pub async fn run(cli: Cli) -> Result<()> {
    let ctx = cli.context()?;
    match &cli.command {
        Commands::Callback(args) => auth::handle_callback(&ctx, args).await,
        Commands::Token(args) => auth::handle_token(&ctx, cli.browser(), args.kind).await,
        Commands::Fetch(args) => fetch::handle_fetch(&ctx, cli.browser(), args).await,
        Commands::Status => auth::handle_status(&ctx),
        Commands::Logout(args) => auth::handle_logout(&ctx, args.all),
    }
}
