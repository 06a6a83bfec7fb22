//! Carts service errors.

use std::fmt::{Display, Formatter, Result as FmtResult};

use thiserror::Error;

use crate::{
    domain::{
        carts::fsm::CartState,
        catalog::{CatalogError, models::ProductId},
    },
    ids::CartId,
    store::StoreError,
};

/// Why an otherwise valid request cannot be applied to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidOperation {
    /// Checkout needs at least one item.
    EmptyCart,

    /// Quantities never drop below one; removal is explicit.
    BelowMinimumQuantity { current: u32, delta: i64 },

    /// The change would overflow the quantity counter.
    AboveMaximumQuantity { current: u32, delta: i64 },

    /// The product is not in the cart.
    ItemNotInCart { product: ProductId },

    /// The operation is only allowed in `required`.
    RequiresState { required: CartState },
}

impl Display for InvalidOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::EmptyCart => f.write_str("cannot check out an empty cart"),
            Self::BelowMinimumQuantity { current, delta } => write!(
                f,
                "quantity {current} changed by {delta} would drop below the minimum of 1"
            ),
            Self::AboveMaximumQuantity { current, delta } => write!(
                f,
                "quantity {current} changed by {delta} exceeds the maximum of {}",
                u32::MAX
            ),
            Self::ItemNotInCart { product } => write!(f, "product {product} is not in the cart"),
            Self::RequiresState { required } => write!(f, "operation requires state {required}"),
        }
    }
}

/// Failures of cart operations.
#[derive(Debug, Error)]
pub enum CartsServiceError {
    /// No live session exists for the cart.
    #[error("cart session expired or not found: {cart}")]
    Expired { cart: CartId },

    /// The cart's state forbids the operation outright.
    #[error("cart cannot be modified in state {state}")]
    InvalidState { state: CartState },

    /// The request cannot be applied in the cart's current state.
    #[error("{reason} (cart is {state})")]
    InvalidOperation {
        state: CartState,
        reason: InvalidOperation,
    },

    /// The catalog does not know the product.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// Another mutation held the cart's lease for the whole wait.
    #[error("cart {cart} is busy, retry later")]
    Busy { cart: CartId },

    /// Every fresh id tried already had a session.
    #[error("no free cart id after {attempts} attempts")]
    IdCollision { attempts: usize },

    /// A session key holds a value the engine never writes.
    #[error("corrupt session value at {key}")]
    CorruptSession { key: String },

    /// The store command failed.
    #[error("storage error")]
    Store(#[from] StoreError),

    /// The catalog lookup failed.
    #[error("catalog error")]
    Catalog(#[from] CatalogError),
}

/// Transport-neutral error classes for boundary layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The session is gone (410-class).
    Gone,

    /// The request conflicts with the cart state (409-class).
    Conflict,

    /// A referenced resource does not exist (404-class).
    NotFound,

    /// Transient infrastructure failure (503-class).
    Unavailable,

    /// Unexpected failure (500-class).
    Internal,
}

impl CartsServiceError {
    /// Class a boundary layer should map this error to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Expired { .. } => ErrorClass::Gone,
            Self::InvalidState { .. } | Self::InvalidOperation { .. } => ErrorClass::Conflict,
            Self::ProductNotFound(_) => ErrorClass::NotFound,
            Self::Busy { .. } => ErrorClass::Unavailable,
            Self::Store(source) if source.is_transient() => ErrorClass::Unavailable,
            Self::Catalog(source) if source.is_transient() => ErrorClass::Unavailable,
            Self::IdCollision { .. }
            | Self::CorruptSession { .. }
            | Self::Store(_)
            | Self::Catalog(_) => ErrorClass::Internal,
        }
    }

    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Unavailable
    }

    /// The cart state reported with the rejection, if any.
    #[must_use]
    pub fn state(&self) -> Option<CartState> {
        match self {
            Self::InvalidState { state } | Self::InvalidOperation { state, .. } => Some(*state),
            _ => None,
        }
    }
}
