//! Cart lifecycle state machine.
//!
//! ```text
//! EMPTY --ADD_ITEM--> IN_PROGRESS --CHECKOUT--> CHECKOUT_PENDING --PAYMENT_SUCCESS--> CLOSED
//! ```
//!
//! `ADD_ITEM` and `REMOVE_ITEM` loop on `IN_PROGRESS`; `CANCEL` returns a
//! pending checkout to `IN_PROGRESS`.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cart lifecycle states. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartState {
    /// Freshly created, nothing added yet.
    Empty,
    /// Items are being added and removed.
    InProgress,
    /// Checkout has begun; items are frozen.
    CheckoutPending,
    /// Paid. The session is destroyed right after.
    Closed,
}

/// Events that drive state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartEvent {
    /// An item was added or its quantity raised.
    AddItem,
    /// An item was removed or its quantity lowered.
    RemoveItem,
    /// Checkout was requested.
    Checkout,
    /// The payment for a pending checkout went through.
    PaymentSuccess,
    /// A pending checkout was abandoned.
    Cancel,
}

impl CartState {
    /// Every state, in lifecycle order.
    pub const ALL: [Self; 4] = [
        Self::Empty,
        Self::InProgress,
        Self::CheckoutPending,
        Self::Closed,
    ];

    /// Stored representation, e.g. `CHECKOUT_PENDING`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::InProgress => "IN_PROGRESS",
            Self::CheckoutPending => "CHECKOUT_PENDING",
            Self::Closed => "CLOSED",
        }
    }

    /// Whether items and quantities may still change.
    #[must_use]
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::Empty | Self::InProgress)
    }

    /// Whether no event leads out of this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl CartEvent {
    /// Every event.
    pub const ALL: [Self; 5] = [
        Self::AddItem,
        Self::RemoveItem,
        Self::Checkout,
        Self::PaymentSuccess,
        Self::Cancel,
    ];

    /// Logged representation, e.g. `PAYMENT_SUCCESS`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddItem => "ADD_ITEM",
            Self::RemoveItem => "REMOVE_ITEM",
            Self::Checkout => "CHECKOUT",
            Self::PaymentSuccess => "PAYMENT_SUCCESS",
            Self::Cancel => "CANCEL",
        }
    }
}

/// Next state for `event` in `state`, or `None` when the pair has no
/// transition and the state stays as it is.
#[must_use]
pub const fn next(state: CartState, event: CartEvent) -> Option<CartState> {
    match (state, event) {
        (CartState::Empty | CartState::InProgress, CartEvent::AddItem)
        | (CartState::InProgress, CartEvent::RemoveItem)
        | (CartState::CheckoutPending, CartEvent::Cancel) => Some(CartState::InProgress),
        (CartState::InProgress, CartEvent::Checkout) => Some(CartState::CheckoutPending),
        (CartState::CheckoutPending, CartEvent::PaymentSuccess) => Some(CartState::Closed),
        _ => None,
    }
}

/// Apply `event`, keeping the current state when there is no transition.
#[must_use]
pub const fn apply(state: CartState, event: CartEvent) -> CartState {
    match next(state, event) {
        Some(next) => next,
        None => state,
    }
}

impl Display for CartState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl Display for CartEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A stored state value that names no [`CartState`].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown cart state: {0}")]
pub struct UnknownCartState(pub String);

impl FromStr for CartState {
    type Err = UnknownCartState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownCartState(s.to_string()))
    }
}
