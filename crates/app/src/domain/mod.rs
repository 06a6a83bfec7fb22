//! Trolley Domain Concerns

pub mod carts;
pub mod catalog;
