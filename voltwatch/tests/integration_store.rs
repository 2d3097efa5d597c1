//! Integration tests for the state store: buffer bounds, query filters,
//! downsampling, and weekly compliance selection.

use voltwatch::store::{ANOMALY_CAPACITY, READING_CAPACITY, StateStore, WINDOW_CAPACITY};
use voltwatch::{AnomalyFilter, Reading, Thresholds};

/// 2024-01-01 00:00 UTC, a Monday.
const MONDAY_MS: i64 = 1_704_067_200_000;

fn store() -> StateStore {
    StateStore::with_clock(Thresholds::default(), Box::new(|| MONDAY_MS))
}

fn flat(ts_ms: i64, v: f64) -> Reading {
    Reading::new(ts_ms, v, v, v)
}

#[test]
fn test_reading_ring_never_exceeds_capacity() {
    let mut store = store();

    let extra = 100;
    for i in 0..(READING_CAPACITY + extra) {
        store.push(flat(1_000 + (i as i64) * 1_000, 230.0)).unwrap();
    }

    let stats = store.stats();
    assert_eq!(stats.total_readings, READING_CAPACITY);

    // Eldest entries were evicted; the newest survives.
    let latest = store.latest().unwrap();
    assert_eq!(
        latest.ts_ms,
        1_000 + ((READING_CAPACITY + extra - 1) as i64) * 1_000
    );
    let all = store.readings(None, None);
    assert_eq!(all[0].ts_ms, 1_000 + (extra as i64) * 1_000);
}

#[test]
fn test_window_ring_never_exceeds_capacity() {
    let mut store = store();

    // One reading per 10-minute slot: every push after the first closes a
    // single-sample window.
    let slots = WINDOW_CAPACITY + 50;
    for i in 0..slots {
        store.push(flat(600_000 + (i as i64) * 600_000, 230.0)).unwrap();
    }

    assert_eq!(store.stats().total_windows, WINDOW_CAPACITY);
}

#[test]
fn test_anomaly_ring_never_exceeds_capacity() {
    let mut store = store();

    // Each dead/live pair emits one interruption anomaly.
    let mut ts = 1_000;
    for _ in 0..(ANOMALY_CAPACITY + 100) {
        store.push(flat(ts, 0.0)).unwrap();
        store.push(flat(ts + 1_000, 230.0)).unwrap();
        ts += 2_000;
    }

    assert_eq!(store.stats().total_anomalies, ANOMALY_CAPACITY);

    // The newest anomaly is retained.
    let all = store.anomalies(&AnomalyFilter::default());
    assert_eq!(all.last().unwrap().ended_at, Some(ts - 1_000));
}

#[test]
fn test_latest_reflects_most_recent_push() {
    let mut store = store();

    for i in 1..=10 {
        store.push(flat(i * 1_000, 229.0 + i as f64)).unwrap();
        assert_eq!(store.latest().unwrap().ts_ms, i * 1_000);
    }
}

#[test]
fn test_downsampling_keeps_final_point() {
    let mut store = store();
    for i in 1..=1_000 {
        store.push(flat(i * 1_000, 230.0)).unwrap();
    }

    for max_points in [1, 2, 7, 100, 999, 1_000, 4_096] {
        let thin = store.readings_downsampled(1_000, 1_000_000, max_points);
        assert!(
            thin.len() <= max_points + 1,
            "{max_points} points returned {}",
            thin.len()
        );
        assert_eq!(thin.last().unwrap().ts_ms, 1_000_000);
    }
}

#[test]
fn test_downsampling_is_evenly_spaced() {
    let mut store = store();
    for i in 1..=100 {
        store.push(flat(i * 1_000, 230.0)).unwrap();
    }

    let thin = store.readings_downsampled(1_000, 100_000, 10);
    // Indices 0, 10, 20, ... 90 plus the appended final point.
    assert_eq!(thin.len(), 11);
    assert_eq!(thin[0].ts_ms, 1_000);
    assert_eq!(thin[1].ts_ms, 11_000);
    assert_eq!(thin[9].ts_ms, 91_000);
    assert_eq!(thin[10].ts_ms, 100_000);
}

#[test]
fn test_weekly_compliance_selects_only_the_requested_week() {
    let mut store = store();

    // One window in the target week, one the week before.
    let prev_week_slot = MONDAY_MS - 3 * 86_400_000;
    for i in 0..61 {
        store.push(flat(prev_week_slot + i * 10_000, 230.0)).unwrap();
    }
    store.flush_window();
    let this_week_slot = MONDAY_MS + 86_400_000;
    for i in 0..61 {
        store.push(flat(this_week_slot + i * 10_000, 230.0)).unwrap();
    }
    store.flush_window();

    // Each burst produced two windows (one full slot plus the flushed stub).
    assert_eq!(store.stats().total_windows, 4);

    let this_week = store.weekly_compliance(Some(MONDAY_MS));
    assert_eq!(this_week.week_start, MONDAY_MS);
    assert_eq!(this_week.total_windows, 2);

    let prev_week = store.weekly_compliance(Some(prev_week_slot));
    assert_eq!(prev_week.week_start, MONDAY_MS - 7 * 86_400_000);
    assert_eq!(prev_week.total_windows, 2);
}

#[test]
fn test_weekly_compliance_defaults_to_injected_now() {
    let mut store = store();
    for i in 0..61 {
        store.push(flat(MONDAY_MS + i * 10_000, 230.0)).unwrap();
    }

    let verdict = store.weekly_compliance(None);
    assert_eq!(verdict.week_start, MONDAY_MS);
    assert_eq!(verdict.total_windows, 1);
    assert!(verdict.overall_compliant);
}

#[test]
fn test_stats_track_all_buffers() {
    let mut store = store();

    store.push(Reading::new(10_000, 0.0, 245.0, 230.0)).unwrap();
    let stats = store.stats();
    assert_eq!(stats.total_readings, 1);
    assert_eq!(stats.total_windows, 0);
    assert_eq!(stats.total_anomalies, 1); // deviation open on L2
    assert_eq!(stats.active_anomalies, 2); // L1 interruption + L2 deviation

    store.push(Reading::new(20_000, 230.0, 230.0, 230.0)).unwrap();
    let stats = store.stats();
    assert_eq!(stats.total_anomalies, 3);
    assert_eq!(stats.active_anomalies, 0);
}

#[test]
fn test_reset_restores_empty_store() {
    let mut store = store();

    for i in 1..=100 {
        store.push(flat(i * 10_000, if i % 2 == 0 { 0.0 } else { 250.0 })).unwrap();
    }
    store.reset();

    let stats = store.stats();
    assert_eq!(stats.total_readings, 0);
    assert_eq!(stats.total_windows, 0);
    assert_eq!(stats.total_anomalies, 0);
    assert_eq!(stats.active_anomalies, 0);

    // The store keeps working after a reset.
    store.push(flat(1_000, 230.0)).unwrap();
    assert_eq!(store.stats().total_readings, 1);
}
