//! App Context

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
    time::Duration,
};

use thiserror::Error;

use crate::{
    config::CartsSettings,
    domain::{
        carts::{CartsService, KvCartsService},
        catalog::ProductCatalog,
    },
    ids::IdError,
    store::{MemoryStore, TimedStore},
};

/// Settings rejected while building the application context.
#[derive(Debug, Error)]
pub enum AppInitError {
    /// The named duration setting is zero.
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    /// The lease could lapse while a mutation still runs.
    #[error("lease_ttl {lease_ttl:?} is shorter than the {required:?} a mutation may take")]
    LeaseTooShort {
        lease_ttl: Duration,
        required: Duration,
    },

    /// The key prefix is empty or contains `:`.
    #[error("key prefix must be non-empty and must not contain ':', got {0:?}")]
    KeyPrefix(String),

    /// The cart id alphabet is malformed.
    #[error("invalid cart id alphabet")]
    IdAlphabet(#[from] IdError),
}

/// Wired cart engine and the adapters behind it.
#[derive(Clone)]
pub struct AppContext {
    /// Cart operations.
    pub carts: Arc<dyn CartsService>,

    /// Backing store, for expiry sweeps and inspection.
    pub store: Arc<MemoryStore>,

    /// Product catalog the engine resolves lines against.
    pub catalog: Arc<dyn ProductCatalog>,
}

impl Debug for AppContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AppContext")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl AppContext {
    /// Build application context over an in-process store.
    ///
    /// Every store call the engine makes is bounded by
    /// `settings.store_timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings are invalid.
    pub fn in_memory(
        settings: &CartsSettings,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Result<Self, AppInitError> {
        settings.validate()?;

        let store = Arc::new(MemoryStore::new());
        let timed = Arc::new(TimedStore::new(store.clone(), settings.store_timeout));

        Ok(Self {
            carts: Arc::new(KvCartsService::new(timed, catalog.clone(), settings)),
            store,
            catalog,
        })
    }
}
