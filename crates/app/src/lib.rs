//! Cart session engine: identifiers, the key-value store port, the catalog
//! port and the cart state machine.

pub mod config;
pub mod context;
pub mod domain;
pub mod ids;
pub mod store;

#[cfg(test)]
mod test;
