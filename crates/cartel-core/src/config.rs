//! Engine configuration, parsed once at process startup.
//!
//! Every tunable arrives as an environment variable, is validated here, and
//! is rejected with a descriptive error when out of range. Rates given in
//! decimal grams are converted to integer milligrams (or milli-XP) at load
//! time so the engine itself never touches floating point.

use std::fmt;
use std::time::Duration;

use contracts::MG_PER_GRAM;

pub const DEFAULT_SHARE_PRICE_CHIPS: u64 = 100;
pub const DEFAULT_SHARE_RATE_MG_PER_HOUR: u64 = 100;
pub const DEFAULT_BASE_PRICE_PER_GRAM: u64 = 3;
pub const DEFAULT_WAREHOUSE_FEE_BPS: u64 = 6_000;
pub const DEFAULT_PRODUCTION_XP_MILLI_PER_GRAM: u64 = 1_000;
pub const DEFAULT_SALE_XP_MILLI_PER_GRAM: u64 = 2_000;
pub const DEFAULT_MIN_TICK_INTERVAL_SECONDS: u64 = 300;
pub const MIN_TICK_INTERVAL_FLOOR_SECONDS: u64 = 30;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 60_000;
pub const TICK_INTERVAL_FLOOR_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartelConfig {
    pub share_price_chips: u64,
    pub share_rate_mg_per_hour: u64,
    pub base_price_per_gram: u64,
    pub warehouse_fee_bps: u64,
    pub production_xp_milli_per_gram: u64,
    pub sale_xp_milli_per_gram: u64,
    pub min_tick_interval_seconds: u64,
    pub tick_interval: Duration,
}

impl Default for CartelConfig {
    fn default() -> Self {
        Self {
            share_price_chips: DEFAULT_SHARE_PRICE_CHIPS,
            share_rate_mg_per_hour: DEFAULT_SHARE_RATE_MG_PER_HOUR,
            base_price_per_gram: DEFAULT_BASE_PRICE_PER_GRAM,
            warehouse_fee_bps: DEFAULT_WAREHOUSE_FEE_BPS,
            production_xp_milli_per_gram: DEFAULT_PRODUCTION_XP_MILLI_PER_GRAM,
            sale_xp_milli_per_gram: DEFAULT_SALE_XP_MILLI_PER_GRAM,
            min_tick_interval_seconds: DEFAULT_MIN_TICK_INTERVAL_SECONDS,
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: &'static str,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}={:?}: {}", self.key, self.value, self.reason)
    }
}

impl std::error::Error for ConfigError {}

fn invalid(key: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError {
        key,
        value: value.to_string(),
        reason,
    }
}

fn env_u64(key: &'static str, default: u64, minimum: u64) -> Result<u64, ConfigError> {
    let Some(raw) = read_env(key) else {
        return Ok(default);
    };
    let parsed = raw
        .parse::<u64>()
        .map_err(|_| invalid(key, &raw, "expected a non-negative integer"))?;
    if parsed < minimum {
        return Err(invalid(key, &raw, "value below the allowed minimum"));
    }
    Ok(parsed)
}

/// Parses a decimal grams figure into integer milligrams (or, with the same
/// scale, decimal XP-per-gram into milli-XP). Conversion happens exactly once
/// here; the engine only ever sees the integer form.
fn env_grams_as_milli(key: &'static str, default: u64, minimum: u64) -> Result<u64, ConfigError> {
    let Some(raw) = read_env(key) else {
        return Ok(default);
    };
    let parsed = raw
        .parse::<f64>()
        .map_err(|_| invalid(key, &raw, "expected a decimal number"))?;
    if !parsed.is_finite() || parsed < 0.0 {
        return Err(invalid(key, &raw, "expected a finite non-negative number"));
    }
    let milli = (parsed * MG_PER_GRAM as f64).round() as u64;
    if milli < minimum {
        return Err(invalid(key, &raw, "value below the allowed minimum"));
    }
    Ok(milli)
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl CartelConfig {
    /// Loads configuration from `CARTEL_*` environment variables, falling
    /// back to defaults for unset keys and rejecting out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let tick_interval_ms = env_u64(
            "CARTEL_TICK_INTERVAL_MS",
            DEFAULT_TICK_INTERVAL_MS,
            TICK_INTERVAL_FLOOR_MS,
        )?;
        Ok(Self {
            share_price_chips: env_u64("CARTEL_SHARE_PRICE", DEFAULT_SHARE_PRICE_CHIPS, 1)?,
            share_rate_mg_per_hour: env_grams_as_milli(
                "CARTEL_SHARE_RATE_GRAMS_PER_HOUR",
                DEFAULT_SHARE_RATE_MG_PER_HOUR,
                1,
            )?,
            base_price_per_gram: env_u64(
                "CARTEL_BASE_PRICE_PER_GRAM",
                DEFAULT_BASE_PRICE_PER_GRAM,
                1,
            )?,
            warehouse_fee_bps: env_u64("CARTEL_WAREHOUSE_FEE_BPS", DEFAULT_WAREHOUSE_FEE_BPS, 0)?,
            production_xp_milli_per_gram: env_grams_as_milli(
                "CARTEL_XP_PER_GRAM_PRODUCED",
                DEFAULT_PRODUCTION_XP_MILLI_PER_GRAM,
                0,
            )?,
            sale_xp_milli_per_gram: env_grams_as_milli(
                "CARTEL_XP_PER_GRAM_SOLD",
                DEFAULT_SALE_XP_MILLI_PER_GRAM,
                0,
            )?,
            min_tick_interval_seconds: env_u64(
                "CARTEL_MIN_TICK_SECONDS",
                DEFAULT_MIN_TICK_INTERVAL_SECONDS,
                MIN_TICK_INTERVAL_FLOOR_SECONDS,
            )?,
            tick_interval: Duration::from_millis(tick_interval_ms),
        })
    }
}
