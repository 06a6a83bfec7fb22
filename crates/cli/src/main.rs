//! Trolley CLI

use std::process;

use crate::config::CliConfig;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod config;
mod observability;

/// Trolley CLI entry point
#[tokio::main]
pub async fn main() {
    // Load configuration from .env and CLI arguments
    let config = match CliConfig::load() {
        Ok(config) => config,
        Err(error) => error.exit(),
    };

    if let Err(error) = observability::init_subscriber(&config.logging) {
        #[expect(
            clippy::print_stderr,
            reason = "logging failed to initialise, must use eprintln"
        )]
        {
            eprintln!("{error}");
        }

        process::exit(1);
    }

    if let Err(error) = commands::run(config).await {
        #[expect(clippy::print_stderr, reason = "errors are reported even when logs are filtered")]
        {
            eprintln!("{error}");
        }

        process::exit(1);
    }
}
