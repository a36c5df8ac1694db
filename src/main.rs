//! tokenrelay CLI binary entry point.

use clap::Parser;
use tokenrelay::cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tokenrelay=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = tokenrelay::cli::run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
