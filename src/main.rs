//! Somnia CLI - dream interpretation service
//!
//! # Commands
//!
//! - `serve` - Start the HTTP service
//! - `interpret` - Interpret a dream from the terminal (interactive without TEXT)
//! - `verify` - Compute or verify model file digests
//! - `info` - Show version and configuration

use clap::Parser;
use somnia::{
    cli::{self, Cli},
    config::ServiceConfig,
    error::Result,
};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::from_env();

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .compact()
        .init();

    cli::entrypoint(cli, config).await
}
