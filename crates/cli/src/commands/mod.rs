//! CLI commands.

use std::{sync::Arc, time::Duration};

use clap::Subcommand;
use serde::Serialize;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use trolley_app::{
    config::CartsSettings,
    context::{AppContext, AppInitError},
    domain::{
        carts::CartsServiceError,
        catalog::{InMemoryCatalog, models::ProductSummary},
    },
};

use crate::config::CliConfig;

mod session;
mod simulate;

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run one scripted cart session and print the cart as JSON.
    Session(session::SessionArgs),

    /// Run concurrent shoppers against shared and private carts.
    Simulate(simulate::SimulateArgs),
}

#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error("failed to initialise app context: {0}")]
    Init(#[from] AppInitError),

    #[error("cart operation failed: {0}")]
    Carts(#[from] CartsServiceError),

    #[error("invalid product id {0:?}")]
    ProductId(String),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("shopper task failed: {0}")]
    Join(#[from] JoinError),

    #[error("{0} cart(s) ended with unexpected quantities")]
    Mismatch(usize),
}

pub(crate) async fn run(config: CliConfig) -> Result<(), CliError> {
    let settings = config.carts.settings()?;
    let sweep_interval = config.carts.sweep_interval();

    match config.command {
        Command::Session(args) => {
            let (ctx, sweeper) = start(&settings, sweep_interval, args.products.clone())?;
            let result = session::run(&ctx, args).await;
            sweeper.abort();

            result
        }
        Command::Simulate(args) => {
            let (ctx, sweeper) = start(&settings, sweep_interval, simulate::catalog(&args))?;
            let result = simulate::run(&ctx, args).await;
            sweeper.abort();

            result
        }
    }
}

fn start(
    settings: &CartsSettings,
    sweep_interval: Duration,
    products: Vec<ProductSummary>,
) -> Result<(AppContext, JoinHandle<()>), CliError> {
    let catalog = Arc::new(InMemoryCatalog::with_products(products));
    let ctx = AppContext::in_memory(settings, catalog)?;
    let sweeper = ctx.store.clone().spawn_sweeper(sweep_interval);

    Ok((ctx, sweeper))
}

/// Write a value to stdout as pretty JSON.
fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;

    #[expect(clippy::print_stdout, reason = "command output goes to stdout")]
    {
        println!("{rendered}");
    }

    Ok(())
}
