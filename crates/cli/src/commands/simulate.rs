//! `trolley simulate`
//!
//! Half of the shoppers share one cart, the rest get a cart each. Every
//! shopper adds random products one unit at a time; afterwards each cart's
//! stored quantities must equal the sum of what its shoppers added.

use std::collections::BTreeMap;

use clap::Args;
use rand::Rng;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use trolley_app::{
    context::AppContext,
    domain::{
        carts::CartsServiceError,
        catalog::models::{ProductId, ProductSummary},
    },
    ids::CartId,
};

use super::{CliError, print_json};

#[derive(Debug, Args)]
pub(crate) struct SimulateArgs {
    /// Number of concurrent shoppers
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u32).range(1..))]
    pub shoppers: u32,

    /// Number of products in the generated catalog
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u32).range(1..))]
    pub products: u32,

    /// Items each shopper adds
    #[arg(long, default_value_t = 25)]
    pub adds: u32,
}

type Counts = BTreeMap<ProductId, u32>;

#[derive(Debug, Serialize)]
struct CartReport {
    cart_id: CartId,
    shoppers: u32,
    expected: Counts,
    stored: Counts,
    matches: bool,
}

fn product_id(n: u32) -> Option<ProductId> {
    ProductId::new(format!("sku-{n}"))
}

/// Generated catalog `sku-1` to `sku-N`.
pub(crate) fn catalog(args: &SimulateArgs) -> Vec<ProductSummary> {
    (1..=args.products)
        .filter_map(|n| {
            product_id(n).map(|product_id| ProductSummary {
                product_id,
                name: format!("Product {n}"),
                price: u64::from(n) * 100,
            })
        })
        .collect()
}

/// Random picks for one shopper.
fn plan(adds: u32, products: u32) -> Vec<ProductId> {
    let mut rng = rand::thread_rng();

    (0..adds)
        .filter_map(|_| product_id(rng.gen_range(1..=products)))
        .collect()
}

async fn shop(
    ctx: AppContext,
    cart: CartId,
    picks: Vec<ProductId>,
) -> Result<(CartId, Counts), CartsServiceError> {
    let mut added = Counts::new();

    for product in picks {
        ctx.carts.add_first_time(&cart, &product).await?;

        *added.entry(product).or_default() += 1;
    }

    Ok((cart, added))
}

pub(crate) async fn run(ctx: &AppContext, args: SimulateArgs) -> Result<(), CliError> {
    let sharing = args.shoppers / 2;
    let shared = if sharing > 0 {
        Some(ctx.carts.create_cart().await?)
    } else {
        None
    };

    let mut shoppers = BTreeMap::<CartId, u32>::new();
    let mut tasks = JoinSet::new();

    for n in 0..args.shoppers {
        let cart = match &shared {
            Some(shared) if n < sharing => shared.clone(),
            _ => ctx.carts.create_cart().await?,
        };

        *shoppers.entry(cart.clone()).or_default() += 1;

        tasks.spawn(shop(ctx.clone(), cart, plan(args.adds, args.products)));
    }

    let mut expected = BTreeMap::<CartId, Counts>::new();

    while let Some(joined) = tasks.join_next().await {
        let (cart, added) = joined??;
        let totals = expected.entry(cart).or_default();

        for (product, count) in added {
            *totals.entry(product).or_default() += count;
        }
    }

    let mut reports = Vec::with_capacity(expected.len());

    for (cart, expected) in expected {
        let mut stored = Counts::new();

        for product in expected.keys() {
            stored.insert(product.clone(), ctx.carts.quantity(&cart, product).await?);
        }

        let matches = stored == expected;

        if !matches {
            warn!(cart_id = %cart, "stored quantities differ from what shoppers added");
        }

        reports.push(CartReport {
            shoppers: shoppers.get(&cart).copied().unwrap_or_default(),
            cart_id: cart,
            expected,
            stored,
            matches,
        });
    }

    let mismatched = reports.iter().filter(|report| !report.matches).count();

    info!(carts = reports.len(), mismatched, "simulation finished");

    print_json(&reports)?;

    if mismatched > 0 {
        return Err(CliError::Mismatch(mismatched));
    }

    Ok(())
}
