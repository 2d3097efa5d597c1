//! Weekly compliance evaluation against the ESO 95 % rule.
//!
//! A week is compliant when, on every phase, at least 95 % of its 10-minute
//! windows were compliant. Weeks run Monday 00:00 to Monday 00:00 in UTC;
//! the regulator's text does not pin a timezone, and UTC keeps the
//! computation deterministic (see DESIGN.md).

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::reading::Phase;
use crate::window::RmsWindow;

const DAY_MS: i64 = 86_400_000;
const WEEK_MS: i64 = 7 * DAY_MS;

/// Rounds to two decimals, ties away from zero.
#[inline]
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weekly compliance verdict over one Monday-aligned week.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyCompliance {
    /// Week start (Monday 00:00 UTC), Unix milliseconds.
    pub week_start: i64,
    /// Week end (`week_start` + 7 days), Unix milliseconds.
    pub week_end: i64,
    /// Number of windows evaluated.
    pub total_windows: u32,
    /// Compliant window count on L1.
    pub compliant_windows_l1: u32,
    /// Compliant window count on L2.
    pub compliant_windows_l2: u32,
    /// Compliant window count on L3.
    pub compliant_windows_l3: u32,
    /// Percentage of compliant windows on L1, rounded to two decimals.
    pub compliance_pct_l1: f64,
    /// Percentage of compliant windows on L2, rounded to two decimals.
    pub compliance_pct_l2: f64,
    /// Percentage of compliant windows on L3, rounded to two decimals.
    pub compliance_pct_l3: f64,
    /// Whether every phase reached the 95 % floor.
    pub overall_compliant: bool,
}

impl WeeklyCompliance {
    /// Compliance percentage of the given phase.
    #[must_use]
    pub fn pct(&self, phase: Phase) -> f64 {
        match phase {
            Phase::L1 => self.compliance_pct_l1,
            Phase::L2 => self.compliance_pct_l2,
            Phase::L3 => self.compliance_pct_l3,
        }
    }
}

/// Returns the Monday 00:00 UTC start of the week containing `ts_ms`.
///
/// Works on raw day arithmetic: the Unix epoch fell on a Thursday, so
/// shifting by three days makes Monday the zero weekday.
#[must_use]
pub fn week_start_utc(ts_ms: i64) -> i64 {
    let days = ts_ms.div_euclid(DAY_MS);
    let weekday = (days + 3).rem_euclid(7);
    (days - weekday) * DAY_MS
}

/// Evaluates a set of windows against the weekly 95 % rule.
///
/// The caller is responsible for pre-filtering `windows` to the week; this
/// function only counts. With no windows every percentage is zero and the
/// week is non-compliant.
#[must_use]
pub fn evaluate_week(
    windows: &[RmsWindow],
    week_start: i64,
    thresholds: &Thresholds,
) -> WeeklyCompliance {
    let total = windows.len();
    let mut compliant = [0_u32; 3];

    for window in windows {
        for phase in Phase::ALL {
            if window.compliant(phase) {
                compliant[phase.index()] += 1;
            }
        }
    }

    let pct = |count: u32| -> f64 {
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)] // window counts stay tiny
        round2(f64::from(count) / total as f64 * 100.0)
    };

    let pct_l1 = pct(compliant[0]);
    let pct_l2 = pct(compliant[1]);
    let pct_l3 = pct(compliant[2]);

    let floor = thresholds.weekly_compliance_pct;
    let overall_compliant =
        total > 0 && pct_l1 >= floor && pct_l2 >= floor && pct_l3 >= floor;

    #[allow(clippy::cast_possible_truncation)] // bounded by window ring capacity
    let total_windows = total as u32;

    WeeklyCompliance {
        week_start,
        week_end: week_start + WEEK_MS,
        total_windows,
        compliant_windows_l1: compliant[0],
        compliant_windows_l2: compliant[1],
        compliant_windows_l3: compliant[2],
        compliance_pct_l1: pct_l1,
        compliance_pct_l2: pct_l2,
        compliance_pct_l3: pct_l3,
        overall_compliant,
    }
}
