//! Tick-to-wall-clock configuration.
//!
//! Channel durations are stored as tick counts. [`TickConfig`] fixes how long
//! one tick lasts so register values can be read as milliseconds with the
//! default period. [`LEGACY_TICK_PERIOD`] keeps the 500 µs cadence older
//! hosts were calibrated against, where every register value covers half a
//! millisecond.

use core::fmt;
use core::time::Duration;

/// One tick per millisecond.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Half-millisecond cadence of earlier firmware revisions.
pub const LEGACY_TICK_PERIOD: Duration = Duration::from_micros(500);

/// Interval between samples of the laser key and SPAD switch inputs.
pub const INPUT_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Rejected tick configurations.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TickConfigError {
    ZeroPeriod,
}

impl fmt::Display for TickConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Fixed tick cadence for the pulse-train engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TickConfig {
    period: Duration,
}

impl TickConfig {
    /// Configuration using [`DEFAULT_TICK_PERIOD`].
    pub const DEFAULT: TickConfig = TickConfig {
        period: DEFAULT_TICK_PERIOD,
    };

    /// Configuration using [`LEGACY_TICK_PERIOD`].
    pub const LEGACY: TickConfig = TickConfig {
        period: LEGACY_TICK_PERIOD,
    };

    /// Builds a configuration with a custom period.
    ///
    /// # Errors
    ///
    /// Returns [`TickConfigError::ZeroPeriod`] for a zero-length period.
    pub const fn try_new(period: Duration) -> Result<Self, TickConfigError> {
        if period.is_zero() {
            Err(TickConfigError::ZeroPeriod)
        } else {
            Ok(Self { period })
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Whole ticks elapsed within `duration`, saturating at `u32::MAX`.
    #[must_use]
    pub fn ticks_for(&self, duration: Duration) -> u32 {
        let ticks = duration.as_nanos() / self.period.as_nanos();
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }

    /// Wall-clock length of `ticks` ticks.
    #[must_use]
    pub fn duration_of(&self, ticks: u32) -> Duration {
        self.period.saturating_mul(ticks)
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_period_maps_ticks_to_milliseconds() {
        let config = TickConfig::default();
        assert_eq!(config.duration_of(250), Duration::from_millis(250));
        assert_eq!(config.ticks_for(Duration::from_millis(250)), 250);
    }

    #[test]
    fn legacy_period_doubles_tick_rate() {
        let config = TickConfig::LEGACY;
        assert_eq!(config.ticks_for(Duration::from_millis(10)), 20);
        assert_eq!(config.duration_of(3), Duration::from_micros(1_500));
    }

    #[test]
    fn partial_ticks_round_down() {
        let config = TickConfig::try_new(Duration::from_micros(300)).unwrap();
        assert_eq!(config.ticks_for(Duration::from_micros(899)), 2);
    }

    #[test]
    fn zero_period_is_rejected() {
        assert_eq!(
            TickConfig::try_new(Duration::ZERO),
            Err(TickConfigError::ZeroPeriod)
        );
    }
}
