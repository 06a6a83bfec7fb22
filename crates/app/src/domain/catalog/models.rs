//! Catalog Models

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

/// Product identifier as issued by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Wrap a raw product id. Returns `None` for blank ids.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();

        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// The raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ProductId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl From<&ProductId> for String {
    fn from(value: &ProductId) -> Self {
        value.0.clone()
    }
}

/// Product Summary
///
/// The slice of a product a cart needs for display: id, name and unit price
/// in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    /// Catalog id.
    pub product_id: ProductId,

    /// Display name.
    pub name: String,

    /// Unit price in minor currency units.
    pub price: u64,
}
