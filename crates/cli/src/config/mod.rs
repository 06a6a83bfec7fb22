//! CLI configuration module

use clap::Parser;

use crate::{
    commands::Command,
    config::{carts::CartsConfig, observability::LoggingConfig},
};

pub(crate) mod carts;
pub(crate) mod observability;

pub(crate) use observability::LogFormat;

/// Trolley CLI configuration
#[derive(Debug, Parser)]
#[command(name = "trolley", about = "Trolley cart session engine", long_about = None)]
pub(crate) struct CliConfig {
    /// Cart engine settings.
    #[command(flatten)]
    pub carts: CartsConfig,

    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub(crate) fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }
}
