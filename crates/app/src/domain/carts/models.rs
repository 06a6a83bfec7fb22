//! Cart Models

use serde::{Deserialize, Serialize};

use crate::domain::catalog::models::ProductSummary;

/// A resolved cart entry: the product as the catalog describes it now and
/// the carted quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Current catalog summary.
    pub product: ProductSummary,

    /// Carted quantity, at least 1.
    pub quantity: u32,
}

impl CartLine {
    /// Unit price times quantity, `None` on overflow.
    #[must_use]
    pub fn line_total(&self) -> Option<u64> {
        self.product.price.checked_mul(u64::from(self.quantity))
    }
}

/// Sum of all line totals, `None` on overflow.
#[must_use]
pub fn subtotal(lines: &[CartLine]) -> Option<u64> {
    lines
        .iter()
        .try_fold(0_u64, |acc, line| acc.checked_add(line.line_total()?))
}
