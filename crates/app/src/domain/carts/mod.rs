//! Carts

pub mod errors;
pub mod fsm;
pub mod keys;
pub mod models;
mod repositories;
pub mod service;

pub use errors::{CartsServiceError, ErrorClass, InvalidOperation};
pub use fsm::{CartEvent, CartState};
pub use service::*;
