//! `trolley session`

use clap::Args;
use serde::Serialize;
use tracing::info;
use trolley_app::{
    context::AppContext,
    domain::{
        carts::{CartState, models::{CartLine, subtotal}},
        catalog::models::{ProductId, ProductSummary},
    },
    ids::CartId,
};

use super::{CliError, print_json};

#[derive(Debug, Args)]
pub(crate) struct SessionArgs {
    /// Catalog entry as `id=name:price`, price in minor units (repeatable)
    #[arg(long = "product", value_name = "ID=NAME:PRICE", value_parser = parse_product)]
    pub products: Vec<ProductSummary>,

    /// Product id to add one unit of (repeatable)
    #[arg(long = "add", value_name = "ID")]
    pub adds: Vec<String>,

    /// Begin checkout after adding
    #[arg(long)]
    pub checkout: bool,

    /// Record a successful payment after checkout
    #[arg(long, requires = "checkout")]
    pub pay: bool,
}

#[derive(Debug, Serialize)]
struct SessionReport {
    cart_id: CartId,
    state: CartState,
    lines: Vec<CartLine>,
    subtotal: Option<u64>,
}

pub(crate) async fn run(ctx: &AppContext, args: SessionArgs) -> Result<(), CliError> {
    let cart = ctx.carts.create_cart().await?;

    for raw in args.adds {
        let product = ProductId::new(raw.as_str()).ok_or(CliError::ProductId(raw))?;

        ctx.carts.add_first_time(&cart, &product).await?;
    }

    let lines = if args.checkout {
        ctx.carts.checkout_handoff(&cart).await?
    } else {
        ctx.carts.get_all(&cart).await?
    };

    let state = if args.pay {
        ctx.carts.payment_success(&cart).await?;

        CartState::Closed
    } else {
        ctx.carts.state(&cart).await?
    };

    info!(cart_id = %cart, %state, lines = lines.len(), "session finished");

    print_json(&SessionReport {
        cart_id: cart,
        state,
        subtotal: subtotal(&lines),
        lines,
    })
}

/// Parse `id=name:price`. The price is split at the last `:`.
fn parse_product(raw: &str) -> Result<ProductSummary, String> {
    let (id, rest) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ID=NAME:PRICE, got {raw:?}"))?;

    let (name, price) = rest
        .rsplit_once(':')
        .ok_or_else(|| format!("missing :PRICE in {raw:?}"))?;

    let product_id = ProductId::new(id).ok_or_else(|| format!("blank product id in {raw:?}"))?;

    let price = price
        .parse()
        .map_err(|error| format!("invalid price {price:?}: {error}"))?;

    Ok(ProductSummary {
        product_id,
        name: name.to_string(),
        price,
    })
}
