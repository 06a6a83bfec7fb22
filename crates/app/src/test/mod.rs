//! Shared fixtures for unit tests.


pub(crate) use context::{TestContext, sku};
pub(crate) use store::{FailOnceStore, FailingCall};
