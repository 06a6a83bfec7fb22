//! Cart key scheme.
//!
//! Every key of a session is `{prefix}:{cart}:{role}`. Cart ids never contain
//! `:`, so two carts can never share a key.

use crate::ids::CartId;

/// Default namespace prefix for cart keys.
pub const DEFAULT_KEY_PREFIX: &str = "cart";

/// Builds the store keys of cart sessions under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartKeys {
    prefix: String,
}

impl CartKeys {
    /// Keys under `prefix`, which must not contain `:`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn key(&self, cart: &CartId, role: &str) -> String {
        format!("{}:{cart}:{role}", self.prefix)
    }

    /// Current lifecycle state; its presence is what keeps a session alive.
    #[must_use]
    pub fn state(&self, cart: &CartId) -> String {
        self.key(cart, "state")
    }

    /// Hash of product id to quantity.
    #[must_use]
    pub fn quantities(&self, cart: &CartId) -> String {
        self.key(cart, "items")
    }

    /// List of product ids in insertion order.
    #[must_use]
    pub fn item_index(&self, cart: &CartId) -> String {
        self.key(cart, "itemset")
    }

    /// Advisory lease guarding mutations. Not part of the session lifetime.
    #[must_use]
    pub fn lease(&self, cart: &CartId) -> String {
        self.key(cart, "lock")
    }

    /// Every key that makes up the session.
    #[must_use]
    pub fn session(&self, cart: &CartId) -> [String; 3] {
        [
            self.item_index(cart),
            self.quantities(cart),
            self.state(cart),
        ]
    }

    /// Prefix shared by all keys of one cart.
    #[must_use]
    pub fn cart_prefix(&self, cart: &CartId) -> String {
        format!("{}:{cart}:", self.prefix)
    }
}

impl Default for CartKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}
