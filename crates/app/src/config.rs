//! Cart engine settings.

use std::time::Duration;

use crate::{context::AppInitError, domain::carts::keys::DEFAULT_KEY_PREFIX, ids::IdAlphabet};

/// Default session lifetime, refreshed by every mutation.
pub const DEFAULT_CART_TTL: Duration = Duration::from_secs(300);

/// Most store calls one leased mutation makes. The lease must outlive all of
/// them timing out in turn.
pub const LEASED_STORE_CALLS: u32 = 10;

/// Load-time settings for the cart engine. Not mutable at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartsSettings {
    /// Session lifetime after the last successful mutation.
    pub ttl: Duration,

    /// Namespace prefix of every cart key.
    pub key_prefix: String,

    /// Symbols used to render cart ids.
    pub id_alphabet: IdAlphabet,

    /// Expiry of a per-cart lease key.
    pub lease_ttl: Duration,

    /// How long a mutation waits for a contended lease before `Busy`.
    pub lease_wait: Duration,

    /// Pause between lease attempts.
    pub lease_retry_interval: Duration,

    /// Upper bound on a single store round trip.
    pub store_timeout: Duration,
}

impl Default for CartsSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CART_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            id_alphabet: IdAlphabet::crockford(),
            lease_ttl: Duration::from_millis(5000),
            lease_wait: Duration::from_millis(1000),
            lease_retry_interval: Duration::from_millis(5),
            store_timeout: Duration::from_millis(250),
        }
    }
}

impl CartsSettings {
    /// Check the settings once before building the engine.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero session or lease TTL, a zero store
    /// timeout, a lease TTL shorter than [`LEASED_STORE_CALLS`] store
    /// timeouts, or a key prefix that is empty or contains `:`.
    pub fn validate(&self) -> Result<(), AppInitError> {
        if self.ttl.is_zero() {
            return Err(AppInitError::ZeroDuration("ttl"));
        }

        if self.lease_ttl.is_zero() {
            return Err(AppInitError::ZeroDuration("lease_ttl"));
        }

        if self.store_timeout.is_zero() {
            return Err(AppInitError::ZeroDuration("store_timeout"));
        }

        let required = self.store_timeout.saturating_mul(LEASED_STORE_CALLS);

        if self.lease_ttl < required {
            return Err(AppInitError::LeaseTooShort {
                lease_ttl: self.lease_ttl,
                required,
            });
        }

        if self.key_prefix.is_empty() || self.key_prefix.contains(':') {
            return Err(AppInitError::KeyPrefix(self.key_prefix.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let result = CartsSettings::default().validate();

        assert!(result.is_ok(), "expected valid defaults, got {result:?}");
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let settings = CartsSettings {
            ttl: Duration::ZERO,
            ..CartsSettings::default()
        };

        let result = settings.validate();

        assert!(
            matches!(result, Err(AppInitError::ZeroDuration("ttl"))),
            "expected ZeroDuration, got {result:?}"
        );
    }

    #[test]
    fn lease_must_outlive_a_mutation_of_timeouts() {
        let settings = CartsSettings {
            lease_ttl: Duration::from_millis(500),
            store_timeout: Duration::from_millis(100),
            ..CartsSettings::default()
        };

        let result = settings.validate();

        assert!(
            matches!(
                result,
                Err(AppInitError::LeaseTooShort { required, .. })
                    if required == Duration::from_secs(1)
            ),
            "expected LeaseTooShort, got {result:?}"
        );

        let settings = CartsSettings {
            lease_ttl: Duration::from_secs(1),
            ..settings
        };

        assert!(settings.validate().is_ok(), "exactly enough is accepted");
    }

    #[test]
    fn prefix_must_be_non_empty_and_colon_free() {
        for prefix in ["", "shop:cart"] {
            let settings = CartsSettings {
                key_prefix: prefix.to_string(),
                ..CartsSettings::default()
            };

            let result = settings.validate();

            assert!(
                matches!(&result, Err(AppInitError::KeyPrefix(p)) if p == prefix),
                "expected KeyPrefix for {prefix:?}, got {result:?}"
            );
        }
    }
}
