//! In-memory state store coordinating the analytics pipeline.
//!
//! The [`StateStore`] owns the three bounded ring buffers (readings,
//! completed RMS windows, emitted anomalies) plus the live aggregator and
//! anomaly tracker. Every reading enters through [`StateStore::push`], which
//! runs event detection and window aggregation inline and appends the
//! results; read methods serve filtered copies of the buffered data.
//!
//! # Concurrency
//!
//! The store itself is single-threaded (`&mut self` on the write path, as
//! usual for embedded engines); callers that share it across tasks
//! wrap it in a mutex held across whole operations so every query observes a
//! consistent snapshot. All operations are bounded and non-blocking, so
//! nothing ever suspends while holding that lock.
//!
//! # Time
//!
//! "Now" is injected at construction so weekly boundaries are deterministic
//! under test; production code uses the system clock.

use std::fmt;

use serde::Serialize;

use crate::anomaly::{ActiveAnomaly, Anomaly, AnomalyKind, AnomalyTracker};
use crate::compliance::{self, WeeklyCompliance};
use crate::config::Thresholds;
use crate::error::{RecordError, Result};
use crate::reading::{Phase, Reading};
use crate::ring::RingBuffer;
use crate::window::{RmsAggregator, RmsWindow};

/// Maximum retained readings (24 h at 1 Hz).
pub const READING_CAPACITY: usize = 86_400;

/// Maximum retained completed windows (two weeks of 10-minute slots).
pub const WINDOW_CAPACITY: usize = 2_016;

/// Maximum retained anomaly events.
pub const ANOMALY_CAPACITY: usize = 1_000;

const WEEK_MS: i64 = 7 * 86_400_000;

/// Injected time source returning Unix milliseconds.
pub type NowFn = Box<dyn Fn() -> i64 + Send + Sync>;

/// Everything a single `push` produced.
#[derive(Debug, Clone, Default)]
pub struct PushOutcome {
    /// Anomaly events triggered by this reading (usually empty).
    pub anomalies: Vec<Anomaly>,
    /// The previous 10-minute window, when this reading crossed a boundary.
    pub completed_window: Option<RmsWindow>,
}

/// Counters over the store's current contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Readings currently buffered.
    pub total_readings: usize,
    /// Completed windows currently buffered.
    pub total_windows: usize,
    /// Anomaly events currently buffered.
    pub total_anomalies: usize,
    /// Sub-machines currently mid-episode.
    pub active_anomalies: usize,
}

/// Conjunctive filter for [`StateStore::anomalies`].
///
/// `from`/`to` are inclusive and compare against `started_at`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyFilter {
    /// Restrict to one anomaly kind.
    pub kind: Option<AnomalyKind>,
    /// Restrict to one phase.
    pub phase: Option<Phase>,
    /// Earliest `started_at`, Unix milliseconds.
    pub from: Option<i64>,
    /// Latest `started_at`, Unix milliseconds.
    pub to: Option<i64>,
}

/// Bounded in-memory store and pipeline coordinator.
pub struct StateStore {
    thresholds: Thresholds,
    readings: RingBuffer<Reading>,
    windows: RingBuffer<RmsWindow>,
    anomalies: RingBuffer<Anomaly>,
    aggregator: RmsAggregator,
    tracker: AnomalyTracker,
    now: NowFn,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("readings", &self.readings.len())
            .field("windows", &self.windows.len())
            .field("anomalies", &self.anomalies.len())
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Creates a store using the system clock.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_clock(
            thresholds,
            Box::new(|| chrono::Utc::now().timestamp_millis()),
        )
    }

    /// Creates a store with an injected time source.
    ///
    /// Only [`StateStore::weekly_compliance`] consults the clock (for its
    /// default week); the pipeline itself is driven purely by reading
    /// timestamps.
    #[must_use]
    pub fn with_clock(thresholds: Thresholds, now: NowFn) -> Self {
        Self {
            thresholds,
            readings: RingBuffer::new(READING_CAPACITY),
            windows: RingBuffer::new(WINDOW_CAPACITY),
            anomalies: RingBuffer::new(ANOMALY_CAPACITY),
            aggregator: RmsAggregator::new(thresholds),
            tracker: AnomalyTracker::new(thresholds),
            now,
        }
    }

    /// The thresholds this store analyzes against.
    #[must_use]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Current time from the injected source, Unix milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        (self.now)()
    }

    /// Ingests one reading and runs the full pipeline on it.
    ///
    /// Records the reading, feeds the anomaly tracker, feeds the window
    /// aggregator, and appends whatever either produced to the respective
    /// ring buffers. Ring eviction happens inline; the latest reading is
    /// always retained.
    ///
    /// # Errors
    ///
    /// Rejects non-finite voltages and non-positive timestamps without
    /// touching any state.
    pub fn push(&mut self, reading: Reading) -> Result<PushOutcome> {
        for phase in Phase::ALL {
            let v = reading.voltage(phase);
            if !v.is_finite() {
                return Err(RecordError::NonFiniteVoltage {
                    phase: phase.as_str(),
                    value: v,
                }
                .into());
            }
        }
        if reading.ts_ms <= 0 {
            return Err(RecordError::InvalidTimestamp {
                timestamp_ms: reading.ts_ms,
            }
            .into());
        }

        if let Some(latest) = self.readings.latest()
            && reading.ts_ms < latest.ts_ms
        {
            tracing::warn!(
                reading_ts = reading.ts_ms,
                latest_ts = latest.ts_ms,
                "out-of-order reading accepted; stream contract is monotonic"
            );
        }

        self.readings.push(reading);

        let anomalies = self.tracker.observe(&reading);
        for anomaly in &anomalies {
            // Interruptions are only ever emitted closed.
            debug_assert!(
                anomaly.kind == AnomalyKind::VoltageDeviation || anomaly.ended_at.is_some(),
                "interruption emitted without end timestamp"
            );
            self.anomalies.push(*anomaly);
        }

        let completed_window = self.aggregator.add(&reading);
        if let Some(window) = completed_window {
            tracing::debug!(
                window_start = window.window_start,
                samples = window.sample_count,
                "completed RMS window"
            );
            self.windows.push(window);
        }

        Ok(PushOutcome {
            anomalies,
            completed_window,
        })
    }

    /// The most recently ingested reading.
    #[must_use]
    pub fn latest(&self) -> Option<Reading> {
        self.readings.latest().copied()
    }

    /// Buffered readings within an inclusive time filter.
    #[must_use]
    pub fn readings(&self, from: Option<i64>, to: Option<i64>) -> Vec<Reading> {
        self.readings
            .iter()
            .filter(|r| from.is_none_or(|f| r.ts_ms >= f))
            .filter(|r| to.is_none_or(|t| r.ts_ms <= t))
            .copied()
            .collect()
    }

    /// Filtered readings thinned to at most `max_points` evenly spaced
    /// samples, plus the final reading when thinning would drop it.
    ///
    /// The result never exceeds `max_points + 1` entries and, when the
    /// filter matches anything, always contains the newest matching reading.
    #[must_use]
    pub fn readings_downsampled(&self, from: i64, to: i64, max_points: usize) -> Vec<Reading> {
        let filtered = self.readings(Some(from), Some(to));
        if max_points == 0 {
            return Vec::new();
        }
        let n = filtered.len();
        if n <= max_points {
            return filtered;
        }

        let mut picked = Vec::with_capacity(max_points + 1);
        let mut last_index = 0;
        for i in 0..max_points {
            let index = i * n / max_points;
            picked.push(filtered[index]);
            last_index = index;
        }
        if last_index != n - 1 {
            picked.push(filtered[n - 1]);
        }
        picked
    }

    /// Completed windows fully inside an inclusive time filter.
    ///
    /// `from` compares against `window_start`, `to` against `window_end`, so
    /// only windows wholly contained in the range are returned.
    #[must_use]
    pub fn windows(&self, from: Option<i64>, to: Option<i64>) -> Vec<RmsWindow> {
        self.windows
            .iter()
            .filter(|w| from.is_none_or(|f| w.window_start >= f))
            .filter(|w| to.is_none_or(|t| w.window_end <= t))
            .copied()
            .collect()
    }

    /// Buffered anomalies matching a conjunctive filter, oldest first.
    #[must_use]
    pub fn anomalies(&self, filter: &AnomalyFilter) -> Vec<Anomaly> {
        self.anomalies
            .iter()
            .filter(|a| filter.kind.is_none_or(|k| a.kind == k))
            .filter(|a| filter.phase.is_none_or(|p| a.phase == p))
            .filter(|a| filter.from.is_none_or(|f| a.started_at >= f))
            .filter(|a| filter.to.is_none_or(|t| a.started_at <= t))
            .copied()
            .collect()
    }

    /// Ongoing episodes not yet emitted as anomalies.
    #[must_use]
    pub fn active_anomalies(&self) -> Vec<ActiveAnomaly> {
        self.tracker.active()
    }

    /// Weekly compliance for the week containing `date_ms` (default: now).
    ///
    /// The week runs Monday 00:00 UTC for seven days; windows are selected
    /// by `window_start` within `[week_start, week_end)`.
    #[must_use]
    pub fn weekly_compliance(&self, date_ms: Option<i64>) -> WeeklyCompliance {
        let week_start = compliance::week_start_utc(date_ms.unwrap_or_else(|| (self.now)()));
        let week_end = week_start + WEEK_MS;

        let windows: Vec<RmsWindow> = self
            .windows
            .iter()
            .filter(|w| w.window_start >= week_start && w.window_start < week_end)
            .copied()
            .collect();

        compliance::evaluate_week(&windows, week_start, &self.thresholds)
    }

    /// Counters over the current buffer contents.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_readings: self.readings.len(),
            total_windows: self.windows.len(),
            total_anomalies: self.anomalies.len(),
            active_anomalies: self.tracker.active().len(),
        }
    }

    /// Aggregates the open window, if any, into the window buffer.
    ///
    /// Used on shutdown so a partially filled slot is not lost; the regular
    /// flow closes windows from `push` alone.
    pub fn flush_window(&mut self) -> Option<RmsWindow> {
        let window = self.aggregator.flush()?;
        self.windows.push(window);
        Some(window)
    }

    /// Empties every buffer and returns all state machines to idle.
    ///
    /// Intended for tests; production code never resets a running store.
    pub fn reset(&mut self) {
        self.readings.clear();
        self.windows.clear();
        self.anomalies.clear();
        self.aggregator.clear();
        self.tracker.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StateStore {
        StateStore::with_clock(Thresholds::default(), Box::new(|| 0))
    }

    fn flat(ts_ms: i64, v: f64) -> Reading {
        Reading::new(ts_ms, v, v, v)
    }

    #[test]
    fn test_push_records_latest() {
        let mut s = store();
        assert!(s.latest().is_none());

        s.push(flat(1_000, 230.0)).unwrap();
        s.push(flat(2_000, 231.0)).unwrap();

        assert_eq!(s.latest().unwrap().ts_ms, 2_000);
        assert_eq!(s.stats().total_readings, 2);
    }

    #[test]
    fn test_push_rejects_non_finite_voltage() {
        let mut s = store();
        let err = s.push(Reading::new(1_000, f64::NAN, 230.0, 230.0));
        assert!(err.is_err());

        let err = s.push(Reading::new(1_000, 230.0, f64::INFINITY, 230.0));
        assert!(err.is_err());

        // Nothing was recorded.
        assert!(s.latest().is_none());
    }

    #[test]
    fn test_push_rejects_non_positive_timestamp() {
        let mut s = store();
        assert!(s.push(flat(0, 230.0)).is_err());
        assert!(s.push(flat(-5, 230.0)).is_err());
    }

    #[test]
    fn test_readings_inclusive_filter() {
        let mut s = store();
        for ts in [1_000, 2_000, 3_000, 4_000] {
            s.push(flat(ts, 230.0)).unwrap();
        }

        let all = s.readings(None, None);
        assert_eq!(all.len(), 4);

        let mid = s.readings(Some(2_000), Some(3_000));
        assert_eq!(mid.len(), 2);
        assert_eq!(mid[0].ts_ms, 2_000);
        assert_eq!(mid[1].ts_ms, 3_000);
    }

    #[test]
    fn test_downsampling_bounds_and_final_point() {
        let mut s = store();
        for i in 1..=100 {
            s.push(flat(i64::from(i) * 1_000, 230.0)).unwrap();
        }

        let thin = s.readings_downsampled(1_000, 100_000, 10);
        assert!(thin.len() <= 11);
        assert_eq!(thin.last().unwrap().ts_ms, 100_000);

        // Under the cap the data comes back untouched.
        let all = s.readings_downsampled(1_000, 100_000, 500);
        assert_eq!(all.len(), 100);

        // Zero points yields nothing.
        assert!(s.readings_downsampled(1_000, 100_000, 0).is_empty());
    }

    #[test]
    fn test_window_range_is_containment() {
        let mut s = store();
        // Two complete windows: slots [600s, 1200s) and [1200s, 1800s).
        for i in 0..121 {
            s.push(flat(600_000 + i * 10_000, 230.0)).unwrap();
        }
        assert_eq!(s.stats().total_windows, 2);

        // Only the first window is fully inside [600s, 1200s].
        let contained = s.windows(Some(600_000), Some(1_200_000));
        assert_eq!(contained.len(), 1);
        assert_eq!(contained[0].window_start, 600_000);

        assert_eq!(s.windows(None, None).len(), 2);
    }

    #[test]
    fn test_anomaly_filtering() {
        let mut s = store();
        // L1 interruption, L2 deviation episode.
        s.push(Reading::new(10_000, 0.0, 245.0, 230.0)).unwrap();
        s.push(Reading::new(20_000, 230.0, 230.0, 230.0)).unwrap();

        let all = s.anomalies(&AnomalyFilter::default());
        assert_eq!(all.len(), 3); // deviation open + interruption close + deviation close

        let l1_only = s.anomalies(&AnomalyFilter {
            phase: Some(Phase::L1),
            ..AnomalyFilter::default()
        });
        assert_eq!(l1_only.len(), 1);
        assert_eq!(l1_only[0].kind, AnomalyKind::ShortInterruption);

        let deviations = s.anomalies(&AnomalyFilter {
            kind: Some(AnomalyKind::VoltageDeviation),
            ..AnomalyFilter::default()
        });
        assert_eq!(deviations.len(), 2);

        let late = s.anomalies(&AnomalyFilter {
            from: Some(15_000),
            ..AnomalyFilter::default()
        });
        assert!(late.is_empty()); // both episodes started at 10s
    }

    #[test]
    fn test_weekly_compliance_uses_injected_clock() {
        // Monday 2024-01-01 plus one hour.
        let now = 1_704_067_200_000 + 3_600_000;
        let mut s = StateStore::with_clock(Thresholds::default(), Box::new(move || now));

        for i in 0..61 {
            s.push(flat(1_704_067_200_000 + i * 10_000, 230.0)).unwrap();
        }

        let verdict = s.weekly_compliance(None);
        assert_eq!(verdict.week_start, 1_704_067_200_000);
        assert_eq!(verdict.total_windows, 1);
        assert_eq!(verdict.compliance_pct_l1, 100.0);
    }

    #[test]
    fn test_flush_window_on_shutdown() {
        let mut s = store();
        s.push(flat(1_000, 230.0)).unwrap();
        s.push(flat(11_000, 230.0)).unwrap();
        assert_eq!(s.stats().total_windows, 0);

        let window = s.flush_window().expect("open window flushed");
        assert_eq!(window.sample_count, 2);
        assert_eq!(s.stats().total_windows, 1);
        assert!(s.flush_window().is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut s = store();
        s.push(Reading::new(10_000, 0.0, 245.0, 230.0)).unwrap();

        s.reset();
        let stats = s.stats();
        assert_eq!(stats.total_readings, 0);
        assert_eq!(stats.total_windows, 0);
        assert_eq!(stats.total_anomalies, 0);
        assert_eq!(stats.active_anomalies, 0);
        assert!(s.latest().is_none());
    }
}
