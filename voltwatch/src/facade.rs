//! Query facade translating external requests into store calls.
//!
//! This is the read-side routing layer the HTTP handlers delegate to. It
//! parses raw query parameters, applies defaults and caps, calls the
//! [`StateStore`], and shapes the JSON response envelopes. It holds no state
//! and never mutates the store; every failure is a validation error carrying
//! a short token (`INVALID_RANGE`, `NO_DATA`, ...) the transport maps to a
//! status code.
//!
//! Dates are parsed loosely: RFC 3339, plain `YYYY-MM-DD`, or raw Unix
//! milliseconds are accepted, and anything unparseable falls back to the
//! caller-supplied default instead of failing the request. Anomaly type and
//! phase tokens are strict and reject unknown values.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::anomaly::{ActiveKind, Anomaly, AnomalyKind, Severity};
use crate::config::Thresholds;
use crate::error::QueryError;
use crate::reading::{Phase, PhaseAnalysis, Reading, analyze_reading};
use crate::store::{AnomalyFilter, StateStore, StoreStats};
use crate::window::RmsWindow;

/// Default number of points for history queries.
pub const DEFAULT_HISTORY_POINTS: usize = 500;

/// Hard cap on history points per request.
pub const MAX_HISTORY_POINTS: usize = 5_000;

/// Default anomaly list length.
pub const DEFAULT_ANOMALY_LIMIT: usize = 100;

/// Hard cap on anomaly list length.
pub const MAX_ANOMALY_LIMIT: usize = 1_000;

/// Default history span when `from` is absent: 24 hours.
const DEFAULT_HISTORY_SPAN_MS: i64 = 24 * 3_600_000;

/// Formats Unix milliseconds as RFC 3339 UTC.
fn format_ts(ts_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ts_ms).map_or_else(
        || ts_ms.to_string(),
        |dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Loose timestamp parsing: RFC 3339, `YYYY-MM-DD`, or raw milliseconds.
fn parse_ts(input: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(date) = input.parse::<NaiveDate>() {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
    }
    input.parse::<i64>().ok()
}

/// Parses an optional date parameter, falling back to `default`.
fn parse_ts_or(input: Option<&str>, default: i64) -> i64 {
    input.and_then(parse_ts).unwrap_or(default)
}

/// The voltage envelope echoed in most responses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    /// Nominal voltage.
    pub nominal: f64,
    /// Lower envelope edge.
    pub min: f64,
    /// Upper envelope edge.
    pub max: f64,
}

impl From<&Thresholds> for Bounds {
    fn from(t: &Thresholds) -> Self {
        Self {
            nominal: t.nominal_voltage,
            min: t.voltage_min,
            max: t.voltage_max,
        }
    }
}

/// Response of the latest-reading endpoint.
#[derive(Debug, Serialize)]
pub struct LatestResponse {
    /// Reading timestamp, RFC 3339 UTC.
    pub timestamp: String,
    /// Per-phase analysis in L1, L2, L3 order.
    pub phases: [PhaseAnalysis; 3],
    /// The envelope the phases were judged against.
    pub bounds: Bounds,
}

/// Analysis of the most recent reading.
///
/// # Errors
///
/// [`QueryError::NoData`] when nothing has been ingested yet.
pub fn latest(store: &StateStore) -> Result<LatestResponse, QueryError> {
    let reading = store.latest().ok_or(QueryError::NoData)?;
    Ok(LatestResponse {
        timestamp: format_ts(reading.ts_ms),
        phases: analyze_reading(&reading, store.thresholds()),
        bounds: store.thresholds().into(),
    })
}

/// Raw query parameters of the history endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    /// Range start; loose date.
    pub from: Option<String>,
    /// Range end; loose date.
    pub to: Option<String>,
    /// Maximum points for raw history.
    pub points: Option<usize>,
    /// `"raw"` (default) or `"10min"`.
    pub interval: Option<String>,
}

/// One raw sample of the history payload.
#[derive(Debug, Serialize)]
pub struct RawPoint {
    /// Sample timestamp, RFC 3339 UTC.
    pub timestamp: String,
    /// Voltage on L1.
    pub voltage_l1: f64,
    /// Voltage on L2.
    pub voltage_l2: f64,
    /// Voltage on L3.
    pub voltage_l3: f64,
}

impl From<&Reading> for RawPoint {
    fn from(r: &Reading) -> Self {
        Self {
            timestamp: format_ts(r.ts_ms),
            voltage_l1: r.v1,
            voltage_l2: r.v2,
            voltage_l3: r.v3,
        }
    }
}

/// One aggregated window of the history payload.
#[derive(Debug, Serialize)]
pub struct WindowPoint {
    /// Window start, RFC 3339 UTC.
    pub window_start: String,
    /// Window end, RFC 3339 UTC.
    pub window_end: String,
    /// Readings aggregated into the window.
    pub sample_count: u32,
    /// RMS voltage on L1.
    pub voltage_l1: f64,
    /// RMS voltage on L2.
    pub voltage_l2: f64,
    /// RMS voltage on L3.
    pub voltage_l3: f64,
    /// Out-of-envelope seconds on L1.
    pub oob_seconds_l1: i64,
    /// Out-of-envelope seconds on L2.
    pub oob_seconds_l2: i64,
    /// Out-of-envelope seconds on L3.
    pub oob_seconds_l3: i64,
    /// Window compliance on L1.
    pub compliant_l1: bool,
    /// Window compliance on L2.
    pub compliant_l2: bool,
    /// Window compliance on L3.
    pub compliant_l3: bool,
}

impl From<&RmsWindow> for WindowPoint {
    fn from(w: &RmsWindow) -> Self {
        Self {
            window_start: format_ts(w.window_start),
            window_end: format_ts(w.window_end),
            sample_count: w.sample_count,
            voltage_l1: w.rms_v1,
            voltage_l2: w.rms_v2,
            voltage_l3: w.rms_v3,
            oob_seconds_l1: w.oob_seconds_l1,
            oob_seconds_l2: w.oob_seconds_l2,
            oob_seconds_l3: w.oob_seconds_l3,
            compliant_l1: w.compliant_l1,
            compliant_l2: w.compliant_l2,
            compliant_l3: w.compliant_l3,
        }
    }
}

/// History payload body: raw samples or aggregated windows.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum HistoryData {
    /// Downsampled raw readings.
    Raw(Vec<RawPoint>),
    /// Completed 10-minute windows.
    Windows(Vec<WindowPoint>),
}

impl HistoryData {
    fn len(&self) -> usize {
        match self {
            HistoryData::Raw(points) => points.len(),
            HistoryData::Windows(windows) => windows.len(),
        }
    }
}

/// Response of the history endpoint.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Echoed interval token.
    pub interval: String,
    /// Effective range start, RFC 3339 UTC.
    pub from: String,
    /// Effective range end, RFC 3339 UTC.
    pub to: String,
    /// Number of entries in `data`.
    pub count: usize,
    /// The payload body.
    pub data: HistoryData,
    /// The configured envelope.
    pub bounds: Bounds,
}

/// Voltage history, raw or windowed.
///
/// # Errors
///
/// [`QueryError::InvalidInterval`] for unknown interval tokens and
/// [`QueryError::InvalidRange`] when the effective range is empty.
pub fn history(store: &StateStore, params: &HistoryParams) -> Result<HistoryResponse, QueryError> {
    let interval = params.interval.as_deref().unwrap_or("raw");
    if interval != "raw" && interval != "10min" {
        return Err(QueryError::InvalidInterval {
            given: interval.to_string(),
        });
    }

    let to = parse_ts_or(params.to.as_deref(), store.now_ms());
    let from = parse_ts_or(params.from.as_deref(), to - DEFAULT_HISTORY_SPAN_MS);
    if from >= to {
        return Err(QueryError::InvalidRange);
    }

    let points = params
        .points
        .unwrap_or(DEFAULT_HISTORY_POINTS)
        .min(MAX_HISTORY_POINTS);

    let data = if interval == "raw" {
        HistoryData::Raw(
            store
                .readings_downsampled(from, to, points)
                .iter()
                .map(RawPoint::from)
                .collect(),
        )
    } else {
        HistoryData::Windows(
            store
                .windows(Some(from), Some(to))
                .iter()
                .map(WindowPoint::from)
                .collect(),
        )
    };

    Ok(HistoryResponse {
        interval: interval.to_string(),
        from: format_ts(from),
        to: format_ts(to),
        count: data.len(),
        data,
        bounds: store.thresholds().into(),
    })
}

/// Raw query parameters of the anomaly list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnomalyParams {
    /// Anomaly kind token filter, e.g. `VOLTAGE_DEVIATION`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Phase label filter, e.g. `L2`.
    pub phase: Option<String>,
    /// Earliest episode start; loose date.
    pub from: Option<String>,
    /// Latest episode start; loose date.
    pub to: Option<String>,
    /// Maximum entries returned.
    pub limit: Option<usize>,
}

/// One anomaly event on the wire.
#[derive(Debug, Serialize)]
pub struct AnomalyPayload {
    /// Episode start, RFC 3339 UTC.
    pub started_at: String,
    /// Episode end, RFC 3339 UTC; absent on deviation-open events.
    pub ended_at: Option<String>,
    /// Affected phase.
    pub phase: Phase,
    /// Kind token.
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    /// Severity token.
    pub severity: Severity,
    /// Lowest observed voltage.
    pub v_min: Option<f64>,
    /// Highest observed voltage.
    pub v_max: Option<f64>,
    /// Episode length in whole seconds.
    pub duration_s: Option<i64>,
}

impl From<&Anomaly> for AnomalyPayload {
    fn from(a: &Anomaly) -> Self {
        Self {
            started_at: format_ts(a.started_at),
            ended_at: a.ended_at.map(format_ts),
            phase: a.phase,
            kind: a.kind,
            severity: a.severity,
            v_min: a.v_min,
            v_max: a.v_max,
            duration_s: a.duration_s,
        }
    }
}

/// Response of the anomaly list endpoint.
#[derive(Debug, Serialize)]
pub struct AnomalyListResponse {
    /// Number of entries in `data`.
    pub count: usize,
    /// Matching anomalies, newest first.
    pub data: Vec<AnomalyPayload>,
}

/// Filtered anomaly events, newest first.
///
/// The limit (default 100, cap 1 000) is applied after filtering by taking
/// the most recent entries.
///
/// # Errors
///
/// [`QueryError::InvalidType`] / [`QueryError::InvalidPhase`] on unknown
/// filter tokens.
pub fn anomalies(
    store: &StateStore,
    params: &AnomalyParams,
) -> Result<AnomalyListResponse, QueryError> {
    let kind = match params.kind.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<AnomalyKind>().map_err(|()| {
            QueryError::InvalidType {
                given: raw.to_string(),
            }
        })?),
    };
    let phase = match params.phase.as_deref() {
        None => None,
        Some(raw) => Some(raw.parse::<Phase>().map_err(|()| QueryError::InvalidPhase {
            given: raw.to_string(),
        })?),
    };

    let filter = AnomalyFilter {
        kind,
        phase,
        from: params.from.as_deref().and_then(parse_ts),
        to: params.to.as_deref().and_then(parse_ts),
    };
    let limit = params
        .limit
        .unwrap_or(DEFAULT_ANOMALY_LIMIT)
        .min(MAX_ANOMALY_LIMIT);

    // Store order is oldest first; keep the newest `limit` and flip.
    let matched = store.anomalies(&filter);
    let skip = matched.len().saturating_sub(limit);
    let data: Vec<AnomalyPayload> = matched[skip..].iter().rev().map(AnomalyPayload::from).collect();

    Ok(AnomalyListResponse {
        count: data.len(),
        data,
    })
}

/// One ongoing episode on the wire.
#[derive(Debug, Serialize)]
pub struct ActiveAnomalyPayload {
    /// Affected phase.
    pub phase: Phase,
    /// `"interruption"` or `"deviation"`.
    #[serde(rename = "type")]
    pub kind: ActiveKind,
    /// Episode start, RFC 3339 UTC.
    pub started_at: String,
}

/// Response of the active-anomalies endpoint.
#[derive(Debug, Serialize)]
pub struct ActiveAnomaliesResponse {
    /// Number of ongoing episodes.
    pub count: usize,
    /// The ongoing episodes.
    pub data: Vec<ActiveAnomalyPayload>,
}

/// Episodes currently mid-flight (not yet emitted).
#[must_use]
pub fn active_anomalies(store: &StateStore) -> ActiveAnomaliesResponse {
    let data: Vec<ActiveAnomalyPayload> = store
        .active_anomalies()
        .into_iter()
        .map(|a| ActiveAnomalyPayload {
            phase: a.phase,
            kind: a.kind,
            started_at: format_ts(a.started_at),
        })
        .collect();

    ActiveAnomaliesResponse {
        count: data.len(),
        data,
    }
}

/// Response of the weekly-compliance endpoint.
#[derive(Debug, Serialize)]
pub struct WeeklyComplianceResponse {
    /// Week start (Monday 00:00 UTC), RFC 3339.
    pub week_start: String,
    /// Week end, RFC 3339.
    pub week_end: String,
    /// Windows evaluated.
    pub total_windows: u32,
    /// Compliant windows on L1.
    pub compliant_windows_l1: u32,
    /// Compliant windows on L2.
    pub compliant_windows_l2: u32,
    /// Compliant windows on L3.
    pub compliant_windows_l3: u32,
    /// Compliance percentage on L1.
    pub compliance_pct_l1: f64,
    /// Compliance percentage on L2.
    pub compliance_pct_l2: f64,
    /// Compliance percentage on L3.
    pub compliance_pct_l3: f64,
    /// Whether every phase reached the floor.
    pub overall_compliant: bool,
    /// The regulatory floor, percent.
    pub eso_threshold_pct: f64,
    /// Window length in minutes.
    pub window_duration_minutes: i64,
    /// Number of 10-minute windows in a full week.
    pub windows_per_week: u32,
}

/// Weekly compliance for the week containing `date` (default: now).
#[must_use]
pub fn weekly_compliance(store: &StateStore, date: Option<&str>) -> WeeklyComplianceResponse {
    let date_ms = date.and_then(parse_ts);
    let verdict = store.weekly_compliance(date_ms);
    let thresholds = store.thresholds();

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // 7 days of windows
    let windows_per_week = (7 * 86_400 / thresholds.window_seconds) as u32;

    WeeklyComplianceResponse {
        week_start: format_ts(verdict.week_start),
        week_end: format_ts(verdict.week_end),
        total_windows: verdict.total_windows,
        compliant_windows_l1: verdict.compliant_windows_l1,
        compliant_windows_l2: verdict.compliant_windows_l2,
        compliant_windows_l3: verdict.compliant_windows_l3,
        compliance_pct_l1: verdict.compliance_pct_l1,
        compliance_pct_l2: verdict.compliance_pct_l2,
        compliance_pct_l3: verdict.compliance_pct_l3,
        overall_compliant: verdict.overall_compliant,
        eso_threshold_pct: thresholds.weekly_compliance_pct,
        window_duration_minutes: thresholds.window_seconds / 60,
        windows_per_week,
    }
}

/// Weekly compliance digest embedded in the summary.
#[derive(Debug, Serialize)]
pub struct SummaryCompliance {
    /// Compliance percentage on L1.
    pub pct_l1: f64,
    /// Compliance percentage on L2.
    pub pct_l2: f64,
    /// Compliance percentage on L3.
    pub pct_l3: f64,
    /// Whether every phase reached the floor.
    pub overall_compliant: bool,
}

/// Response of the summary endpoint.
#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    /// Whether any reading has been ingested.
    pub has_data: bool,
    /// Timestamp of the newest reading, RFC 3339 UTC.
    pub latest_timestamp: Option<String>,
    /// Buffer counters.
    pub stats: StoreStats,
    /// This week's compliance digest.
    pub weekly_compliance: SummaryCompliance,
    /// The configured envelope.
    pub bounds: Bounds,
}

/// Store-wide status digest.
#[must_use]
pub fn summary(store: &StateStore) -> SummaryResponse {
    let latest = store.latest();
    let verdict = store.weekly_compliance(None);

    SummaryResponse {
        has_data: latest.is_some(),
        latest_timestamp: latest.map(|r| format_ts(r.ts_ms)),
        stats: store.stats(),
        weekly_compliance: SummaryCompliance {
            pct_l1: verdict.compliance_pct_l1,
            pct_l2: verdict.compliance_pct_l2,
            pct_l3: verdict.compliance_pct_l3,
            overall_compliant: verdict.overall_compliant,
        },
        bounds: store.thresholds().into(),
    }
}
