//! Fixed-window RMS aggregation.
//!
//! Readings are grouped into 10-minute wall-clock slots (minutes floored to a
//! multiple of ten). The [`RmsAggregator`] holds at most one open window's
//! worth of readings; when a reading belonging to a later slot arrives, the
//! buffered slot is aggregated into an [`RmsWindow`] and handed back to the
//! caller.
//!
//! Aggregation is RMS (`sqrt(mean(v²))`) per phase, plus the out-of-envelope
//! seconds accounting that drives window compliance: a window is compliant on
//! a phase when its voltage spent at most 30 seconds outside [220, 240] V.

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::reading::{Phase, Reading};

/// Rounds to three decimals, ties away from zero.
#[inline]
fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}

/// Aggregate of one completed 10-minute window.
///
/// Invariants: `window_end - window_start` is exactly the configured window
/// length, `0 <= oob_seconds <= window_seconds` per phase, and
/// `compliant_lX ⇔ oob_seconds_lX <= 30`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmsWindow {
    /// Window start, Unix milliseconds, aligned to a 10-minute boundary.
    pub window_start: i64,
    /// Window end, `window_start + 600_000` ms.
    pub window_end: i64,
    /// Number of readings aggregated into this window.
    pub sample_count: u32,
    /// RMS voltage on L1, rounded to three decimals.
    pub rms_v1: f64,
    /// RMS voltage on L2, rounded to three decimals.
    pub rms_v2: f64,
    /// RMS voltage on L3, rounded to three decimals.
    pub rms_v3: f64,
    /// Seconds L1 spent outside the envelope.
    pub oob_seconds_l1: i64,
    /// Seconds L2 spent outside the envelope.
    pub oob_seconds_l2: i64,
    /// Seconds L3 spent outside the envelope.
    pub oob_seconds_l3: i64,
    /// Whether L1 satisfied the 30-second compliance limit.
    pub compliant_l1: bool,
    /// Whether L2 satisfied the 30-second compliance limit.
    pub compliant_l2: bool,
    /// Whether L3 satisfied the 30-second compliance limit.
    pub compliant_l3: bool,
}

impl RmsWindow {
    /// Aggregates buffered readings of one slot into a window.
    ///
    /// With no readings the window reports 0 V RMS on every phase, a full
    /// window of out-of-envelope seconds, and non-compliance. That path is
    /// unreachable through [`RmsAggregator::add`], which never opens an
    /// empty window.
    #[must_use]
    pub fn aggregate(window_start: i64, readings: &[Reading], thresholds: &Thresholds) -> Self {
        let window_end = window_start + thresholds.window_ms();

        let mut rms = [0.0_f64; 3];
        let mut oob_seconds = [thresholds.window_seconds; 3];
        let mut compliant = [false; 3];

        if !readings.is_empty() {
            #[allow(clippy::cast_precision_loss)] // sample counts stay far below 2^52
            let n = readings.len() as f64;

            for phase in Phase::ALL {
                let i = phase.index();

                let sum_sq: f64 = readings
                    .iter()
                    .map(|r| {
                        let v = r.voltage(phase);
                        v * v
                    })
                    .sum();
                rms[i] = round3((sum_sq / n).sqrt());

                #[allow(clippy::cast_possible_wrap)] // bounded by ring capacity
                let oob_count = readings
                    .iter()
                    .filter(|r| !thresholds.in_bounds(r.voltage(phase)))
                    .count() as i64;

                // Over-sampled slots would otherwise exceed the window length.
                oob_seconds[i] =
                    (oob_count * thresholds.poll_interval_seconds).min(thresholds.window_seconds);
                compliant[i] = oob_seconds[i] <= thresholds.window_oob_max_seconds;
            }
        }

        #[allow(clippy::cast_possible_truncation)] // bounded by ring capacity
        let sample_count = readings.len() as u32;

        Self {
            window_start,
            window_end,
            sample_count,
            rms_v1: rms[0],
            rms_v2: rms[1],
            rms_v3: rms[2],
            oob_seconds_l1: oob_seconds[0],
            oob_seconds_l2: oob_seconds[1],
            oob_seconds_l3: oob_seconds[2],
            compliant_l1: compliant[0],
            compliant_l2: compliant[1],
            compliant_l3: compliant[2],
        }
    }

    /// RMS voltage of the given phase.
    #[must_use]
    pub fn rms(&self, phase: Phase) -> f64 {
        match phase {
            Phase::L1 => self.rms_v1,
            Phase::L2 => self.rms_v2,
            Phase::L3 => self.rms_v3,
        }
    }

    /// Out-of-envelope seconds of the given phase.
    #[must_use]
    pub fn oob_seconds(&self, phase: Phase) -> i64 {
        match phase {
            Phase::L1 => self.oob_seconds_l1,
            Phase::L2 => self.oob_seconds_l2,
            Phase::L3 => self.oob_seconds_l3,
        }
    }

    /// Whether the given phase was compliant in this window.
    #[must_use]
    pub fn compliant(&self, phase: Phase) -> bool {
        match phase {
            Phase::L1 => self.compliant_l1,
            Phase::L2 => self.compliant_l2,
            Phase::L3 => self.compliant_l3,
        }
    }
}

/// Single-slot buffer that turns a reading stream into completed windows.
///
/// The aggregator assumes in-order timestamps. A reading whose slot is
/// strictly before the open slot is out of contract; it is folded into the
/// open window and logged rather than dropped, so the sample still counts
/// toward out-of-envelope accounting.
#[derive(Debug)]
pub struct RmsAggregator {
    thresholds: Thresholds,
    open: Option<OpenWindow>,
}

#[derive(Debug)]
struct OpenWindow {
    slot_start: i64,
    readings: Vec<Reading>,
}

impl RmsAggregator {
    /// Creates an aggregator with no open window.
    #[must_use]
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            open: None,
        }
    }

    /// Computes the 10-minute slot a timestamp belongs to.
    #[inline]
    #[must_use]
    pub fn slot_start(&self, ts_ms: i64) -> i64 {
        ts_ms - ts_ms.rem_euclid(self.thresholds.window_ms())
    }

    /// Feeds one reading; returns a completed window when a slot boundary
    /// was crossed.
    ///
    /// The returned window covers the previous slot; the new reading is
    /// already buffered as the first sample of the next one.
    pub fn add(&mut self, reading: &Reading) -> Option<RmsWindow> {
        let slot = self.slot_start(reading.ts_ms);

        let Some(open) = self.open.as_mut() else {
            self.open = Some(OpenWindow {
                slot_start: slot,
                readings: vec![*reading],
            });
            return None;
        };

        if slot == open.slot_start {
            open.readings.push(*reading);
            return None;
        }

        if slot < open.slot_start {
            tracing::warn!(
                reading_ts = reading.ts_ms,
                open_slot = open.slot_start,
                "reading predates open window; folding into open slot"
            );
            open.readings.push(*reading);
            return None;
        }

        // Boundary crossed: close the buffered slot, open the next.
        let closed = self.open.replace(OpenWindow {
            slot_start: slot,
            readings: vec![*reading],
        })?;
        Some(RmsWindow::aggregate(
            closed.slot_start,
            &closed.readings,
            &self.thresholds,
        ))
    }

    /// Aggregates and clears the open window, if one holds any readings.
    pub fn flush(&mut self) -> Option<RmsWindow> {
        let open = self.open.take()?;
        if open.readings.is_empty() {
            return None;
        }
        Some(RmsWindow::aggregate(
            open.slot_start,
            &open.readings,
            &self.thresholds,
        ))
    }

    /// Start of the currently open slot, if any.
    #[must_use]
    pub fn open_slot(&self) -> Option<i64> {
        self.open.as_ref().map(|o| o.slot_start)
    }

    /// Number of readings buffered in the open window.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.open.as_ref().map_or(0, |o| o.readings.len())
    }

    /// Discards the open window without aggregating.
    pub fn clear(&mut self) {
        self.open = None;
    }
}
