//! Period model - wall-clock timestamps to discrete period indices
//!
//! A period boundary sits `negative_time_offset` seconds after the natural
//! boundary of `period_in_seconds`: with a daily period and a three hour
//! offset, a new period starts at 03:00 UTC.

use lendmarket_common::ArgumentError;

use crate::config::MarketConfig;

/// Index of the period containing `timestamp`
///
/// No offset is applied. Panics if `period_in_seconds` is zero.
#[inline]
pub const fn calculate_period_index(timestamp: u64, period_in_seconds: u64) -> u64 {
    timestamp / period_in_seconds
}

/// Offset-aware period arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodModel {
    period_in_seconds: u64,
    negative_time_offset: u64,
}

impl PeriodModel {
    pub fn new(period_in_seconds: u64, negative_time_offset: u64) -> Self {
        Self {
            period_in_seconds,
            negative_time_offset,
        }
    }

    pub fn from_config(config: &MarketConfig) -> Self {
        Self::new(config.period_in_seconds, config.negative_time_offset)
    }

    pub fn period_in_seconds(&self) -> u64 {
        self.period_in_seconds
    }

    pub fn negative_time_offset(&self) -> u64 {
        self.negative_time_offset
    }

    /// Shift a raw timestamp into the offset-adjusted domain stored on loans
    pub fn adjust(&self, raw_timestamp: u64) -> Result<u64, ArgumentError> {
        raw_timestamp
            .checked_sub(self.negative_time_offset)
            .ok_or(ArgumentError::TimestampBeforeOffset {
                timestamp: raw_timestamp,
                offset: self.negative_time_offset,
            })
    }

    /// Period index of an already adjusted timestamp
    #[inline]
    pub fn period_index(&self, adjusted_timestamp: u64) -> u64 {
        calculate_period_index(adjusted_timestamp, self.period_in_seconds)
    }

    /// Period index of a raw timestamp
    pub fn period_index_of_raw(&self, raw_timestamp: u64) -> Result<u64, ArgumentError> {
        Ok(self.period_index(self.adjust(raw_timestamp)?))
    }

    /// Whole periods between two adjusted timestamps, zero if `to` precedes `from`
    pub fn periods_between(&self, from_adjusted: u64, to_adjusted: u64) -> u64 {
        self.period_index(to_adjusted)
            .saturating_sub(self.period_index(from_adjusted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86_400;
    const OFFSET: u64 = 3 * 3_600;

    fn model() -> PeriodModel {
        PeriodModel::new(DAY, OFFSET)
    }

    #[test]
    fn test_pure_period_index() {
        assert_eq!(calculate_period_index(0, DAY), 0);
        assert_eq!(calculate_period_index(DAY - 1, DAY), 0);
        assert_eq!(calculate_period_index(DAY, DAY), 1);
        assert_eq!(calculate_period_index(10 * DAY + 5, DAY), 10);
    }

    #[test]
    fn test_boundary_is_shifted_by_offset() {
        let m = model();
        let midnight = 100 * DAY;

        // Between midnight and 03:00 still belongs to the previous period
        assert_eq!(m.period_index_of_raw(midnight).unwrap(), 99);
        assert_eq!(m.period_index_of_raw(midnight + OFFSET - 1).unwrap(), 99);
        assert_eq!(m.period_index_of_raw(midnight + OFFSET).unwrap(), 100);
    }

    #[test]
    fn test_adjust_rejects_timestamps_before_offset() {
        let m = model();
        assert_eq!(m.adjust(OFFSET).unwrap(), 0);
        assert_eq!(
            m.adjust(OFFSET - 1),
            Err(ArgumentError::TimestampBeforeOffset {
                timestamp: OFFSET - 1,
                offset: OFFSET,
            })
        );
    }

    #[test]
    fn test_periods_between() {
        let m = model();
        let start = m.adjust(50 * DAY + OFFSET).unwrap();
        assert_eq!(m.periods_between(start, start + DAY - 1), 0);
        assert_eq!(m.periods_between(start, start + 3 * DAY), 3);
        assert_eq!(m.periods_between(start + 3 * DAY, start), 0);
    }
}
