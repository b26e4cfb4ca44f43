//! Market configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use lendmarket_common::{
    LendingError, DEFAULT_ACCURACY_FACTOR, DEFAULT_COOLDOWN_IN_PERIODS,
    DEFAULT_INSTALLMENT_COUNT_MAX, DEFAULT_INTEREST_RATE_FACTOR, DEFAULT_NEGATIVE_TIME_OFFSET,
    DEFAULT_PERIOD_IN_SECONDS,
};

/// Global accrual and lifecycle parameters
///
/// Fixed for the lifetime of a market: every stored timestamp and balance
/// is interpreted against these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Length of one compounding period
    pub period_in_seconds: u64,
    /// Shift subtracted from raw timestamps before period arithmetic
    pub negative_time_offset: u64,
    /// Fixed-point scale of interest rates
    pub interest_rate_factor: u64,
    /// Rounding granularity of payable amounts
    pub accuracy_factor: u64,
    /// Periods after origination during which the borrower may revoke
    pub cooldown_in_periods: u32,
    /// Upper bound of an installment batch
    pub installment_count_max: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            period_in_seconds: DEFAULT_PERIOD_IN_SECONDS,
            negative_time_offset: DEFAULT_NEGATIVE_TIME_OFFSET,
            interest_rate_factor: DEFAULT_INTEREST_RATE_FACTOR,
            accuracy_factor: DEFAULT_ACCURACY_FACTOR,
            cooldown_in_periods: DEFAULT_COOLDOWN_IN_PERIODS,
            installment_count_max: DEFAULT_INSTALLMENT_COUNT_MAX,
        }
    }
}

impl MarketConfig {
    /// Load configuration from `.env` and `LENDMARKET_*` environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        if let Some(v) = env_override("LENDMARKET_PERIOD_IN_SECONDS")? {
            cfg.period_in_seconds = v;
        }
        if let Some(v) = env_override("LENDMARKET_NEGATIVE_TIME_OFFSET")? {
            cfg.negative_time_offset = v;
        }
        if let Some(v) = env_override("LENDMARKET_INTEREST_RATE_FACTOR")? {
            cfg.interest_rate_factor = v;
        }
        if let Some(v) = env_override("LENDMARKET_ACCURACY_FACTOR")? {
            cfg.accuracy_factor = v;
        }
        if let Some(v) = env_override("LENDMARKET_COOLDOWN_IN_PERIODS")? {
            cfg.cooldown_in_periods = v;
        }
        if let Some(v) = env_override("LENDMARKET_INSTALLMENT_COUNT_MAX")? {
            cfg.installment_count_max = v;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject parameter combinations the accrual engine cannot work with
    pub fn validate(&self) -> std::result::Result<(), LendingError> {
        if self.period_in_seconds == 0 {
            return Err(LendingError::Config("period_in_seconds must be positive".into()));
        }
        if self.interest_rate_factor == 0 {
            return Err(LendingError::Config("interest_rate_factor must be positive".into()));
        }
        // Half-up rounding adds accuracy_factor / 2
        if self.accuracy_factor == 0 || self.accuracy_factor % 2 != 0 {
            return Err(LendingError::Config(
                "accuracy_factor must be a positive even number".into(),
            ));
        }
        if self.installment_count_max == 0 {
            return Err(LendingError::Config("installment_count_max must be positive".into()));
        }
        Ok(())
    }
}

fn env_override<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", key, raw))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}
