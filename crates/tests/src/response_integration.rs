//! Integration tests for the response-curve engine
//!
//! Covers change detection across threads, sample-rate tracking through a
//! shared processor cell and the shape of the sampled curve.

use dualpeak_core::domain::params::{ParamId, ParameterSet};
use dualpeak_core::domain::processor::{Processor, SampleRateCell};
use dualpeak_core::domain::response::{frequency_position, Grid, ResponseCurveEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn engine_at(params: &Arc<ParameterSet>, sample_rate: f64) -> ResponseCurveEngine {
    ResponseCurveEngine::new(Arc::clone(params), Arc::new(SampleRateCell::new(sample_rate)))
}

// ============================================================================
// CHANGE DETECTION
// ============================================================================

#[test]
fn test_idle_engine_does_not_redraw() {
    let params = Arc::new(ParameterSet::new());
    let mut engine = engine_at(&params, 48000.0);

    engine.tick();
    for _ in 0..10 {
        assert!(!engine.tick());
    }
}

#[test]
fn test_burst_of_changes_coalesces_into_one_redraw() {
    let params = Arc::new(ParameterSet::new());
    let mut engine = engine_at(&params, 48000.0);
    engine.tick();

    for i in 0..100 {
        params.set(ParamId::Peak1Gain, (i % 24) as f32);
    }

    assert!(engine.tick());
    assert!(!engine.tick());
    assert_eq!(engine.settings().peak1_gain_db, 3.0);
}

#[test]
fn test_writes_from_another_thread_are_picked_up() {
    let params = Arc::new(ParameterSet::new());
    let mut engine = engine_at(&params, 48000.0);
    engine.tick();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let params = Arc::clone(&params);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..2000 {
                params.set(ParamId::Peak1Freq, 100.0 + (i % 900) as f32);
                params.set(ParamId::Balance, ((i % 24) as f32) - 12.0);
            }
            params.set(ParamId::Peak1Freq, 4321.0);
            params.set(ParamId::Balance, 5.5);
            done.store(true, Ordering::Release);
        })
    };

    let mut redraws = 0;
    while !done.load(Ordering::Acquire) {
        if engine.tick() {
            redraws += 1;
            let settings = engine.settings();
            assert!((20.0..=10000.0).contains(&settings.peak1_freq));
            assert!((-12.0..=12.0).contains(&settings.balance));
        }
        thread::yield_now();
    }
    writer.join().unwrap();

    // Whatever the interleaving, the last writes are never lost
    if engine.tick() {
        redraws += 1;
    }
    assert!(redraws >= 1);
    assert_eq!(engine.settings().peak1_freq, 4321.0);
    assert_eq!(engine.settings().balance, 5.5);
}

#[test]
fn test_dropped_engine_unregisters() {
    let params = Arc::new(ParameterSet::new());
    let engine = engine_at(&params, 48000.0);
    let flag = engine.change_flag();
    flag.take();
    drop(engine);

    params.set(ParamId::Span, 3.0);
    assert!(!flag.is_set());
}

#[test]
fn test_engines_are_independent() {
    let params = Arc::new(ParameterSet::new());
    let mut first = engine_at(&params, 48000.0);
    let mut second = engine_at(&params, 48000.0);
    first.tick();
    second.tick();

    params.set(ParamId::Peak1Quality, 2.0);
    assert!(first.tick());
    assert!(second.tick());
}

#[test]
fn test_refresh_rebuilds_and_clears_pending_change() {
    let params = Arc::new(ParameterSet::new());
    let mut engine = engine_at(&params, 48000.0);
    engine.tick();

    params.set(ParamId::Peak1Gain, 6.0);
    engine.refresh();
    assert_eq!(engine.settings().peak1_gain_db, 6.0);
    assert!(!engine.tick());
}

// ============================================================================
// SAMPLE RATE
// ============================================================================

#[test]
fn test_engine_follows_processor_rate() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 5000.0);
    params.set(ParamId::Peak1Gain, 10.0);

    let mut processor = Processor::new(Arc::clone(&params));
    let mut engine = ResponseCurveEngine::new(Arc::clone(&params), processor.sample_rate_cell());
    engine.tick();
    assert_eq!(engine.sample_rate(), 48000.0);

    processor.prepare(44100.0, 256).unwrap();
    assert!(engine.tick());
    assert_eq!(engine.sample_rate(), 44100.0);
    assert!((engine.magnitude_db_at(5000.0) - 20.0).abs() < 0.01);
}

// ============================================================================
// CURVE SHAPE
// ============================================================================

#[test]
fn test_curve_peaks_at_both_centers() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 200.0);
    params.set(ParamId::Peak1Gain, 9.0);
    params.set(ParamId::Peak1Quality, 8.0);
    params.set(ParamId::Span, 25.0);
    let engine = engine_at(&params, 48000.0);

    // Span clamps to 10, so peak 2 sits at 200 * 6 = 1200 Hz
    assert_eq!(engine.settings().span, 10.0);
    let at_peak1 = engine.magnitude_db_at(200.0);
    let at_peak2 = engine.magnitude_db_at(1200.0);
    let between = engine.magnitude_db_at(500.0);

    assert!(at_peak1 > 8.9);
    assert!(at_peak2 > 8.9);
    assert!(between < 2.0);
}

#[test]
fn test_curve_is_restartable_after_parameter_change() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 1000.0);
    params.set(ParamId::Peak1Gain, 12.0);
    let mut engine = engine_at(&params, 48000.0);

    let snapshot = engine.curve(200);
    let before: Vec<f64> = snapshot.iter().map(|p| p.magnitude_db).collect();

    params.set(ParamId::Peak1Gain, -12.0);
    engine.tick();

    // The snapshot keeps its own chain
    let again: Vec<f64> = snapshot.iter().map(|p| p.magnitude_db).collect();
    assert_eq!(before, again);

    let after: Vec<f64> = engine.curve(200).iter().map(|p| p.magnitude_db).collect();
    let center = (frequency_position(1000.0) * 200.0) as usize;
    assert!(before[center] > 20.0);
    assert!(after[center] < -20.0);
}

#[test]
fn test_curve_points_fit_render_area() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 3000.0);
    params.set(ParamId::Peak1Gain, 24.0);
    params.set(ParamId::Balance, 12.0);
    let engine = engine_at(&params, 48000.0);

    let (top, bottom) = (10.0, 310.0);
    let curve = engine.curve(640);
    assert_eq!(curve.iter().len(), 640);

    for point in &curve {
        let y = point.y(top, bottom);
        assert!((top..=bottom).contains(&y), "y = {y}");
    }
    assert!(curve.iter().any(|p| p.magnitude_db > 24.0));
    assert!(curve.iter().any(|p| p.y(top, bottom) == top));
}

#[test]
fn test_flat_curve_lies_on_zero_line() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::OutputGain, -30.0);
    let engine = engine_at(&params, 48000.0);
    let grid = Grid::standard();

    let zero = grid
        .gains
        .iter()
        .find(|line| line.highlighted)
        .unwrap();
    assert_eq!(zero.label, "0");

    // Output gain is not part of the displayed response
    for point in &engine.curve(50) {
        assert!(point.magnitude_db.abs() < 1e-4);
        assert!((point.y(0.0, 1.0) - 0.5).abs() < 1e-4);
        assert!((point.y(0.0, 1.0) - zero.position).abs() < 1e-4);
    }
}
