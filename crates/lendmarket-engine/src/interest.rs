//! Interest accrual engine
//!
//! Compounds a checkpoint balance over whole periods:
//!
//! ```text
//! balance = tracked × (1 + r₁/F)^n₁ × (1 + r₂/F)^n₂
//! ```
//!
//! Where:
//! - r₁: primary rate, applied to periods before the due period
//! - r₂: secondary rate, applied to periods from the due period on
//! - F: interest rate factor (fixed-point scale of both rates)
//!
//! Growth factors are computed in `rust_decimal` fixed point by
//! exponentiation-by-squaring. The chain is truncated to whole token units
//! once, at the end (the precise balance); the payable balance rounds that
//! figure half-up to the accuracy factor.

use lendmarket_common::OverflowError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::trace;

/// Compound `original_balance` over `num_periods` at one rate
///
/// Returns the precise (truncated, unrounded) balance.
pub fn calculate_outstanding_balance(
    original_balance: u64,
    num_periods: u64,
    interest_rate: u64,
    interest_rate_factor: u64,
) -> Result<u64, OverflowError> {
    let growth = growth_factor(num_periods, interest_rate, interest_rate_factor)?;
    to_token_units(Decimal::from(original_balance), &[growth])
}

/// Round half-up to the nearest multiple of `accuracy_factor`
pub fn round_half_up(value: u64, accuracy_factor: u64) -> u64 {
    let value = u128::from(value);
    let accuracy = u128::from(accuracy_factor);
    let rounded = (value + accuracy / 2) / accuracy * accuracy;
    // Only the top half-step of u64 can leave the range
    u64::try_from(rounded).unwrap_or(u64::MAX / accuracy_factor * accuracy_factor)
}

/// `(1 + rate / factor) ^ periods`
fn growth_factor(periods: u64, rate: u64, factor: u64) -> Result<Decimal, OverflowError> {
    if periods == 0 || rate == 0 {
        return Ok(Decimal::ONE);
    }
    let per_period = Decimal::from(rate)
        .checked_div(Decimal::from(factor))
        .ok_or(OverflowError::Balance("rate scaling"))?;
    checked_powu(Decimal::ONE + per_period, periods)
        .ok_or(OverflowError::Balance("compounding"))
}

/// Exponentiation by squaring without the trailing unused square
fn checked_powu(base: Decimal, mut exp: u64) -> Option<Decimal> {
    let mut result = Decimal::ONE;
    let mut base = base;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(base)?;
        }
        exp >>= 1;
        if exp > 0 {
            base = base.checked_mul(base)?;
        }
    }
    Some(result)
}

fn to_token_units(balance: Decimal, growth: &[Decimal]) -> Result<u64, OverflowError> {
    let mut value = balance;
    for factor in growth {
        value = value
            .checked_mul(*factor)
            .ok_or(OverflowError::Balance("compounding"))?;
    }
    value
        .trunc()
        .to_u64()
        .ok_or(OverflowError::Balance("token conversion"))
}

/// Inputs to one accrual evaluation, all period indices offset-adjusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualInput {
    pub tracked_balance: u64,
    pub tracked_period_index: u64,
    pub current_period_index: u64,
    pub start_period_index: u64,
    pub duration_in_periods: u32,
    pub interest_rate_primary: u32,
    pub interest_rate_secondary: u32,
}

/// Result of one accrual evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    /// Truncated balance, the next checkpoint value
    pub precise_balance: u64,
    /// Payable balance
    pub rounded_balance: u64,
    pub primary_periods: u64,
    pub secondary_periods: u64,
}

/// Period split of an accrual window around the due period
///
/// Secondary periods start at `max(due, tracked)`, so a checkpoint past due
/// is never charged the secondary rate twice.
pub fn split_periods(
    tracked_period_index: u64,
    current_period_index: u64,
    due_period_index: u64,
) -> (u64, u64) {
    if current_period_index <= tracked_period_index {
        return (0, 0);
    }
    let primary = current_period_index
        .min(due_period_index)
        .saturating_sub(tracked_period_index);
    let secondary =
        current_period_index.saturating_sub(due_period_index.max(tracked_period_index));
    (primary, secondary)
}

/// Accrual engine bound to one market's rate factor and accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterestEngine {
    interest_rate_factor: u64,
    accuracy_factor: u64,
}

impl InterestEngine {
    pub fn new(interest_rate_factor: u64, accuracy_factor: u64) -> Self {
        Self {
            interest_rate_factor,
            accuracy_factor,
        }
    }

    pub fn interest_rate_factor(&self) -> u64 {
        self.interest_rate_factor
    }

    pub fn accuracy_factor(&self) -> u64 {
        self.accuracy_factor
    }

    #[inline]
    pub fn round(&self, value: u64) -> u64 {
        round_half_up(value, self.accuracy_factor)
    }

    #[inline]
    pub fn is_rounded(&self, value: u64) -> bool {
        value % self.accuracy_factor == 0
    }

    /// Compound the checkpoint balance up to the current period
    pub fn accrue(&self, input: &AccrualInput) -> Result<Accrual, OverflowError> {
        let due_period_index = input
            .start_period_index
            .saturating_add(u64::from(input.duration_in_periods));
        let (primary_periods, secondary_periods) = split_periods(
            input.tracked_period_index,
            input.current_period_index,
            due_period_index,
        );

        let precise_balance = if primary_periods == 0 && secondary_periods == 0 {
            input.tracked_balance
        } else {
            // Primary growth is applied before secondary growth
            let primary = growth_factor(
                primary_periods,
                u64::from(input.interest_rate_primary),
                self.interest_rate_factor,
            )?;
            let secondary = growth_factor(
                secondary_periods,
                u64::from(input.interest_rate_secondary),
                self.interest_rate_factor,
            )?;
            to_token_units(Decimal::from(input.tracked_balance), &[primary, secondary])?
        };

        trace!(
            tracked = input.tracked_balance,
            primary_periods,
            secondary_periods,
            precise_balance,
            "Accrued balance"
        );

        Ok(Accrual {
            precise_balance,
            rounded_balance: self.round(precise_balance),
            primary_periods,
            secondary_periods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const FACTOR: u64 = 1_000_000_000;
    const RATE: u64 = 2_724_943; // ~170% a year compounded daily
    const PRINCIPAL: u64 = 1_000_000_000;

    fn engine() -> InterestEngine {
        InterestEngine::new(FACTOR, 10_000)
    }

    fn input(tracked: u64, current: u64, duration: u32) -> AccrualInput {
        AccrualInput {
            tracked_balance: PRINCIPAL,
            tracked_period_index: tracked,
            current_period_index: current,
            start_period_index: 0,
            duration_in_periods: duration,
            interest_rate_primary: RATE as u32,
            interest_rate_secondary: 5_000_000,
        }
    }

    #[test]
    fn test_single_rate_compounding() {
        let cases = [
            (0, 1_000_000_000),
            (1, 1_002_724_943),
            (2, 1_005_457_311),
            (10, 1_027_586_008),
            (30, 1_085_061_982),
            (365, 2_699_999_348),
        ];
        for (periods, expected) in cases {
            assert_eq!(
                calculate_outstanding_balance(PRINCIPAL, periods, RATE, FACTOR).unwrap(),
                expected,
                "periods = {}",
                periods
            );
        }
    }

    #[test]
    fn test_zero_rate_keeps_balance() {
        assert_eq!(
            calculate_outstanding_balance(PRINCIPAL, 1_000, 0, FACTOR).unwrap(),
            PRINCIPAL
        );
    }

    #[test]
    fn test_powu() {
        assert_eq!(checked_powu(dec!(2), 10), Some(dec!(1024)));
        assert_eq!(checked_powu(dec!(1.5), 0), Some(Decimal::ONE));
        assert_eq!(checked_powu(dec!(1.1), 3), Some(dec!(1.331)));
    }

    #[test]
    fn test_overflow_is_reported() {
        let result = calculate_outstanding_balance(u64::MAX, 10_000, FACTOR, FACTOR);
        assert!(matches!(result, Err(OverflowError::Balance(_))));
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(1_002_724_943, 10_000), 1_002_720_000);
        assert_eq!(round_half_up(1_005_457_311, 10_000), 1_005_460_000);
        assert_eq!(round_half_up(14_999, 10_000), 10_000);
        assert_eq!(round_half_up(15_000, 10_000), 20_000);
        assert_eq!(round_half_up(0, 10_000), 0);
        assert_eq!(round_half_up(u64::MAX, 10_000), u64::MAX / 10_000 * 10_000);
    }

    #[test]
    fn test_split_periods() {
        // Entirely before due
        assert_eq!(split_periods(0, 5, 10), (5, 0));
        // Crossing due
        assert_eq!(split_periods(0, 15, 10), (10, 5));
        // Checkpoint already past due
        assert_eq!(split_periods(12, 15, 10), (0, 3));
        // Current exactly at due is a secondary-free window
        assert_eq!(split_periods(4, 10, 10), (6, 0));
        // No time elapsed or query before checkpoint
        assert_eq!(split_periods(7, 7, 10), (0, 0));
        assert_eq!(split_periods(7, 3, 10), (0, 0));
    }

    #[test]
    fn test_accrue_primary_only() {
        let accrual = engine().accrue(&input(0, 10, 30)).unwrap();
        assert_eq!(accrual.precise_balance, 1_027_586_008);
        assert_eq!(accrual.rounded_balance, 1_027_590_000);
        assert_eq!((accrual.primary_periods, accrual.secondary_periods), (10, 0));
    }

    #[test]
    fn test_accrue_crossing_due_period() {
        let accrual = engine().accrue(&input(0, 15, 10)).unwrap();
        assert_eq!(accrual.precise_balance, 1_053_533_843);
        assert_eq!(accrual.rounded_balance, 1_053_530_000);
        assert_eq!((accrual.primary_periods, accrual.secondary_periods), (10, 5));
    }

    #[test]
    fn test_accrue_past_due_checkpoint_uses_secondary_only() {
        let mut past_due = input(20, 35, 10);
        past_due.start_period_index = 0;
        let accrual = engine().accrue(&past_due).unwrap();
        assert_eq!((accrual.primary_periods, accrual.secondary_periods), (0, 15));
        assert_eq!(accrual.precise_balance, 1_077_682_737);
    }

    #[test]
    fn test_accrue_without_elapsed_periods_returns_checkpoint() {
        let mut unrounded = input(4, 4, 10);
        unrounded.tracked_balance = 1_234_567;
        let accrual = engine().accrue(&unrounded).unwrap();
        assert_eq!(accrual.precise_balance, 1_234_567);
        assert_eq!(accrual.rounded_balance, 1_230_000);
    }

    #[test]
    fn test_rounding_happens_once_per_chain() {
        // Rounding each step would drift away from the single-rounding figure
        let chained = engine().accrue(&input(0, 30, 100)).unwrap();
        let mut stepwise = PRINCIPAL;
        for _ in 0..30 {
            stepwise = round_half_up(
                calculate_outstanding_balance(stepwise, 1, RATE, FACTOR).unwrap(),
                10_000,
            );
        }
        assert_eq!(chained.precise_balance, 1_085_061_982);
        assert_ne!(chained.rounded_balance, stepwise);
    }
}
