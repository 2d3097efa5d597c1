//! Integration tests for RMS window aggregation through the full store.

use voltwatch::store::StateStore;
use voltwatch::{Phase, Reading, Thresholds};

const MIN_MS: i64 = 60_000;

fn store() -> StateStore {
    StateStore::with_clock(Thresholds::default(), Box::new(|| 0))
}

fn flat(ts_ms: i64, v: f64) -> Reading {
    Reading::new(ts_ms, v, v, v)
}

/// Fills one 10-minute slot with 60 readings, `oob_count` of them at 250 V
/// on L1, then crosses the boundary to close the window.
fn run_slot_with_oob(oob_count: usize) -> voltwatch::RmsWindow {
    let mut store = store();
    let slot = 10 * MIN_MS;

    for i in 0..60 {
        let v1 = if (i as usize) < oob_count { 250.0 } else { 230.0 };
        store
            .push(Reading::new(slot + i * 10_000, v1, 230.0, 230.0))
            .unwrap();
    }

    let outcome = store.push(flat(slot + 10 * MIN_MS, 230.0)).unwrap();
    outcome.completed_window.expect("boundary closed the window")
}

#[test]
fn test_window_compliance_at_five_percent_edge() {
    // 3 out-of-envelope samples at 10 s cadence: exactly 30 s, compliant.
    let window = run_slot_with_oob(3);
    assert_eq!(window.sample_count, 60);
    assert_eq!(window.oob_seconds_l1, 30);
    assert!(window.compliant_l1);
    assert!(window.compliant_l2);
    assert!(window.compliant_l3);

    // One more sample tips it over.
    let window = run_slot_with_oob(4);
    assert_eq!(window.oob_seconds_l1, 40);
    assert!(!window.compliant_l1);
    assert!(window.compliant_l2);
}

#[test]
fn test_window_invariants() {
    let window = run_slot_with_oob(7);

    assert_eq!(window.window_end - window.window_start, 600_000);
    for phase in Phase::ALL {
        let oob = window.oob_seconds(phase);
        assert!((0..=600).contains(&oob));
        assert_eq!(window.compliant(phase), oob <= 30);
    }
}

#[test]
fn test_windows_align_to_ten_minute_boundaries() {
    let mut store = store();

    // Start mid-slot at 12:34:56 UTC on 2024-01-01.
    let start = 1_704_112_496_000_i64;
    let mut completed = Vec::new();
    for i in 0..180 {
        let outcome = store.push(flat(start + i * 10_000, 230.0)).unwrap();
        completed.extend(outcome.completed_window);
    }

    assert!(!completed.is_empty());
    for window in &completed {
        assert_eq!(window.window_start % 600_000, 0);
        assert_eq!(window.window_end, window.window_start + 600_000);
    }

    // Consecutive windows tile the timeline.
    for pair in completed.windows(2) {
        assert_eq!(pair[0].window_end, pair[1].window_start);
    }
}

#[test]
fn test_rms_reflects_sustained_sag() {
    let mut store = store();
    let slot = 10 * MIN_MS;

    // A sagging L1 at 210 V for the whole slot.
    for i in 0..60 {
        store
            .push(Reading::new(slot + i * 10_000, 210.0, 230.0, 230.0))
            .unwrap();
    }
    let window = store
        .push(flat(slot + 10 * MIN_MS, 230.0))
        .unwrap()
        .completed_window
        .unwrap();

    assert_eq!(window.rms_v1, 210.0);
    assert_eq!(window.rms_v2, 230.0);
    assert_eq!(window.oob_seconds_l1, 600);
    assert!(!window.compliant_l1);
}

#[test]
fn test_flush_closes_partial_window() {
    let mut store = store();

    store.push(flat(10 * MIN_MS, 230.0)).unwrap();
    store.push(flat(10 * MIN_MS + 10_000, 230.0)).unwrap();

    let window = store.flush_window().expect("partial window");
    assert_eq!(window.sample_count, 2);
    assert_eq!(window.window_start, 10 * MIN_MS);

    // Flushed window is queryable like any other.
    assert_eq!(store.windows(None, None).len(), 1);
}

#[test]
fn test_push_outcome_carries_window_exactly_once() {
    let mut store = store();

    let mut windows = 0;
    for i in 0..300 {
        let outcome = store.push(flat(600_000 + i * 10_000, 230.0)).unwrap();
        windows += usize::from(outcome.completed_window.is_some());
    }

    // 300 samples at 10 s span 50 minutes: four boundary crossings.
    assert_eq!(windows, 4);
    assert_eq!(store.stats().total_windows, 4);
}
