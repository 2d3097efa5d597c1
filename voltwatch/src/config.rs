//! Threshold configuration for voltage supply-quality analysis.
//!
//! All limits encode the ESO (Lithuanian grid operator) supply-quality rules
//! for a 230 V phase-to-neutral network. They are fixed at process start and
//! shared by value across the pipeline; nothing mutates them at runtime.

use serde::{Deserialize, Serialize};

/// Nominal phase-to-neutral voltage in volts.
pub const NOMINAL_VOLTAGE_1PH: f64 = 230.0;

/// Lower edge of the acceptable voltage envelope (inclusive).
pub const VOLTAGE_MIN_1PH: f64 = 220.0;

/// Upper edge of the acceptable voltage envelope (inclusive).
pub const VOLTAGE_MAX_1PH: f64 = 240.0;

/// Voltages below this are treated as loss of supply rather than deviation.
pub const VOLTAGE_ZERO_THRESHOLD: f64 = 10.0;

/// Length of the fixed RMS aggregation window in seconds.
pub const WINDOW_SECONDS: i64 = 600;

/// Maximum out-of-envelope seconds for a window to count as compliant (5 %).
pub const WINDOW_OOB_MAX_SECONDS: i64 = 30;

/// Interruptions strictly longer than this are classified as long.
pub const LONG_INTERRUPTION_SECONDS: i64 = 180;

/// Minimum per-phase share of compliant windows for weekly compliance.
pub const WEEKLY_COMPLIANCE_PCT: f64 = 95.0;

/// Default assumed spacing between meter samples in seconds.
pub const DEFAULT_POLL_INTERVAL_SECONDS: i64 = 10;

/// Frozen set of analysis thresholds.
///
/// The only tunable field is `poll_interval_seconds`, which must match the
/// cadence of the meter poller because it converts out-of-envelope sample
/// counts into seconds for window compliance accounting.
///
/// # Example
///
/// ```rust
/// use voltwatch::config::Thresholds;
///
/// let thresholds = Thresholds::default();
/// assert!(thresholds.in_bounds(230.0));
/// assert!(!thresholds.in_bounds(219.999));
/// assert!(thresholds.is_zero(9.999));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Nominal phase-to-neutral voltage in volts.
    pub nominal_voltage: f64,
    /// Lower envelope edge in volts (inclusive).
    pub voltage_min: f64,
    /// Upper envelope edge in volts (inclusive).
    pub voltage_max: f64,
    /// Below this voltage the phase is considered de-energized.
    pub zero_threshold: f64,
    /// RMS window length in seconds.
    pub window_seconds: i64,
    /// Window compliance limit on out-of-envelope seconds.
    pub window_oob_max_seconds: i64,
    /// Interruption duration boundary between short and long, in seconds.
    pub long_interruption_seconds: i64,
    /// Weekly per-phase compliance floor in percent.
    pub weekly_compliance_pct: f64,
    /// Assumed seconds between consecutive meter samples.
    pub poll_interval_seconds: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            nominal_voltage: NOMINAL_VOLTAGE_1PH,
            voltage_min: VOLTAGE_MIN_1PH,
            voltage_max: VOLTAGE_MAX_1PH,
            zero_threshold: VOLTAGE_ZERO_THRESHOLD,
            window_seconds: WINDOW_SECONDS,
            window_oob_max_seconds: WINDOW_OOB_MAX_SECONDS,
            long_interruption_seconds: LONG_INTERRUPTION_SECONDS,
            weekly_compliance_pct: WEEKLY_COMPLIANCE_PCT,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
        }
    }
}

impl Thresholds {
    /// Returns a copy with a different poll interval.
    ///
    /// Intervals below one second are clamped to one second; the accounting
    /// in [`crate::window`] multiplies sample counts by this value and a zero
    /// interval would make every window trivially compliant.
    #[must_use]
    pub fn with_poll_interval(mut self, seconds: i64) -> Self {
        self.poll_interval_seconds = seconds.max(1);
        self
    }

    /// Whether a voltage lies inside the acceptable envelope (inclusive).
    #[inline]
    #[must_use]
    pub fn in_bounds(&self, voltage: f64) -> bool {
        voltage >= self.voltage_min && voltage <= self.voltage_max
    }

    /// Whether a voltage counts as loss of supply.
    ///
    /// The comparison is strict: exactly `zero_threshold` volts is treated
    /// as energized.
    #[inline]
    #[must_use]
    pub fn is_zero(&self, voltage: f64) -> bool {
        voltage < self.zero_threshold
    }

    /// Window length in milliseconds.
    #[inline]
    #[must_use]
    pub fn window_ms(&self) -> i64 {
        self.window_seconds * 1_000
    }
}
