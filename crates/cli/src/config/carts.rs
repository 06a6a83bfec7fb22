//! Cart Engine Config

use std::time::Duration;

use clap::Args;
use trolley_app::{
    config::CartsSettings,
    context::AppInitError,
    domain::carts::keys::DEFAULT_KEY_PREFIX,
    ids::{CROCKFORD_ALPHABET, IdAlphabet},
};

/// Cart engine settings.
#[derive(Debug, Args)]
pub(crate) struct CartsConfig {
    /// Session lifetime in seconds, restarted by every mutation
    #[arg(long, env = "CART_TTL_SECONDS", default_value_t = 300)]
    pub cart_ttl_seconds: u64,

    /// Namespace prefix of every cart key
    #[arg(long, env = "CART_KEY_PREFIX", default_value = DEFAULT_KEY_PREFIX)]
    pub cart_key_prefix: String,

    /// 32 ascending symbols used to render cart ids
    #[arg(long, env = "CART_ID_ALPHABET", default_value = CROCKFORD_ALPHABET)]
    pub cart_id_alphabet: String,

    /// Expiry of a per-cart lease in milliseconds
    #[arg(long, env = "LEASE_TTL_MS", default_value_t = 5_000)]
    pub lease_ttl_ms: u64,

    /// How long a mutation waits for a contended lease, in milliseconds
    #[arg(long, env = "LEASE_WAIT_MS", default_value_t = 1_000)]
    pub lease_wait_ms: u64,

    /// Pause between lease attempts in milliseconds
    #[arg(long, env = "LEASE_RETRY_MS", default_value_t = 5)]
    pub lease_retry_ms: u64,

    /// Upper bound on a single store call in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 250)]
    pub store_timeout_ms: u64,

    /// Interval between sweeps of expired keys, in seconds
    #[arg(
        long,
        env = "SWEEP_INTERVAL_SECONDS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sweep_interval_seconds: u64,
}

impl CartsConfig {
    /// Engine settings described by these arguments.
    ///
    /// # Errors
    ///
    /// Returns an error when the id alphabet is malformed.
    pub(crate) fn settings(&self) -> Result<CartsSettings, AppInitError> {
        Ok(CartsSettings {
            ttl: Duration::from_secs(self.cart_ttl_seconds),
            key_prefix: self.cart_key_prefix.clone(),
            id_alphabet: IdAlphabet::new(&self.cart_id_alphabet)?,
            lease_ttl: Duration::from_millis(self.lease_ttl_ms),
            lease_wait: Duration::from_millis(self.lease_wait_ms),
            lease_retry_interval: Duration::from_millis(self.lease_retry_ms),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        })
    }

    pub(crate) fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use testresult::TestResult;

    use super::*;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        carts: CartsConfig,
    }

    #[test]
    fn defaults_match_engine_defaults() -> TestResult {
        let harness = Harness::try_parse_from(["trolley"])?;

        assert_eq!(harness.carts.settings()?, CartsSettings::default());
        assert_eq!(harness.carts.sweep_interval(), Duration::from_secs(30));

        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> TestResult {
        let harness = Harness::try_parse_from([
            "trolley",
            "--cart-ttl-seconds",
            "60",
            "--cart-key-prefix",
            "shop",
            "--lease-wait-ms",
            "10",
        ])?;

        let settings = harness.carts.settings()?;

        assert_eq!(settings.ttl, Duration::from_secs(60));
        assert_eq!(settings.key_prefix, "shop");
        assert_eq!(settings.lease_wait, Duration::from_millis(10));

        Ok(())
    }

    #[test]
    fn malformed_alphabet_is_an_init_error() -> TestResult {
        let harness = Harness::try_parse_from(["trolley", "--cart-id-alphabet", "abc"])?;

        let result = harness.carts.settings();

        assert!(
            matches!(result, Err(AppInitError::IdAlphabet(_))),
            "expected IdAlphabet, got {result:?}"
        );

        Ok(())
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let result = Harness::try_parse_from(["trolley", "--sweep-interval-seconds", "0"]);

        assert!(result.is_err(), "zero interval should not parse");
    }
}
