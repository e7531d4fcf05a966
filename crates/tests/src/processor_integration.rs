//! Integration tests for the stereo processor
//!
//! These tests run real signals through the full update-then-filter pipeline
//! and compare the measured levels against the response the display engine
//! predicts for the same parameters.

use dualpeak_core::domain::audio::AudioError;
use dualpeak_core::domain::dsp::{decibels_to_gain, FilterChain, PeakSlot};
use dualpeak_core::domain::params::{ParamId, ParameterSet};
use dualpeak_core::domain::processor::Processor;
use dualpeak_core::domain::response::ResponseCurveEngine;
use std::sync::Arc;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK: usize = 512;

fn generate_sine_wave(frequency: f32, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| 2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32)
        .map(|phase| phase.sin() * 0.25)
        .collect()
}

fn rms(buffer: &[f32]) -> f32 {
    let sum_sq: f32 = buffer.iter().map(|&s| s * s).sum();
    (sum_sq / buffer.len() as f32).sqrt()
}

fn prepared_processor(params: &Arc<ParameterSet>) -> Processor {
    let mut processor = Processor::new(Arc::clone(params));
    processor.prepare(SAMPLE_RATE, BLOCK).unwrap();
    processor
}

/// Run a mono signal through the processor block by block
fn run_mono(processor: &mut Processor, signal: &[f32]) -> Vec<f32> {
    let mut output = signal.to_vec();
    for block in output.chunks_mut(BLOCK) {
        processor.process(block, None).unwrap();
    }
    output
}

/// Steady-state gain in dB of a sine after filtering
fn measured_gain_db(processor: &mut Processor, frequency: f32) -> f32 {
    let input = generate_sine_wave(frequency, SAMPLE_RATE, 48000);
    let output = run_mono(processor, &input);
    let tail = input.len() / 2;
    20.0 * (rms(&output[tail..]) / rms(&input[tail..])).log10()
}

// ============================================================================
// PASSTHROUGH
// ============================================================================

#[test]
fn test_default_parameters_pass_audio_unchanged() {
    let params = Arc::new(ParameterSet::new());
    let mut processor = prepared_processor(&params);

    let input = generate_sine_wave(440.0, SAMPLE_RATE, 4096);
    let output = run_mono(&mut processor, &input);

    for (a, b) in input.iter().zip(&output) {
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }
}

#[test]
fn test_silence_stays_silent() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 800.0);
    params.set(ParamId::Peak1Gain, 24.0);
    let mut processor = prepared_processor(&params);

    let output = run_mono(&mut processor, &vec![0.0; 2048]);
    assert!(output.iter().all(|&s| s == 0.0));
}

// ============================================================================
// FILTERING
// ============================================================================

#[test]
fn test_boost_matches_predicted_response() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 1000.0);
    params.set(ParamId::Peak1Gain, 6.0);
    params.set(ParamId::Span, 1.0);
    params.set(ParamId::Balance, 2.0);

    let engine = ResponseCurveEngine::new(Arc::clone(&params), Arc::new(Default::default()));
    let mut processor = prepared_processor(&params);

    for frequency in [250.0_f32, 1000.0, 1500.0, 4000.0] {
        let predicted = engine.magnitude_db_at(frequency as f64) as f32;
        let measured = measured_gain_db(&mut processor, frequency);
        assert!(
            (predicted - measured).abs() < 0.25,
            "{frequency} Hz: predicted {predicted} dB, measured {measured} dB"
        );
    }
}

#[test]
fn test_coincident_peaks_stack() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 1000.0);
    params.set(ParamId::Peak1Gain, -6.0);
    let mut processor = prepared_processor(&params);

    // Span 0 puts both -6 dB peaks on 1 kHz
    let measured = measured_gain_db(&mut processor, 1000.0);
    assert!((measured + 12.0).abs() < 0.25, "measured {measured} dB");
}

#[test]
fn test_output_gain_applied_once() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::OutputGain, -6.0);
    let mut processor = prepared_processor(&params);

    let input = generate_sine_wave(440.0, SAMPLE_RATE, BLOCK);
    let output = run_mono(&mut processor, &input);

    let expected = decibels_to_gain(-6.0);
    for (a, b) in input.iter().zip(&output) {
        assert!((a * expected - b).abs() < 1e-5);
    }
}

#[test]
fn test_stereo_channels_filtered_identically() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 3000.0);
    params.set(ParamId::Peak1Gain, 9.0);
    params.set(ParamId::Peak1Quality, 4.0);
    let mut processor = prepared_processor(&params);

    let mut left = generate_sine_wave(2800.0, SAMPLE_RATE, BLOCK);
    let mut right = left.clone();
    processor.process(&mut left, Some(&mut right)).unwrap();

    assert_eq!(left, right);
    assert_eq!(
        processor.left_chain().peak(PeakSlot::Peak2).coeffs(),
        processor.right_chain().peak(PeakSlot::Peak2).coeffs()
    );
}

#[test]
fn test_interleaved_matches_planar() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 600.0);
    params.set(ParamId::Peak1Gain, -9.0);
    params.set(ParamId::Span, 2.0);

    let left_in = generate_sine_wave(500.0, SAMPLE_RATE, BLOCK);
    let right_in = generate_sine_wave(1700.0, SAMPLE_RATE, BLOCK);

    let mut planar = prepared_processor(&params);
    let mut left = left_in.clone();
    let mut right = right_in.clone();
    planar.process(&mut left, Some(&mut right)).unwrap();

    let mut interleaved = prepared_processor(&params);
    let mut buffer: Vec<f32> = left_in
        .iter()
        .zip(&right_in)
        .flat_map(|(&l, &r)| [l, r, 0.9, 0.9])
        .collect();
    interleaved.process_interleaved(&mut buffer, 4).unwrap();

    for (i, frame) in buffer.chunks_exact(4).enumerate() {
        assert_eq!(frame[0], left[i]);
        assert_eq!(frame[1], right[i]);
        assert_eq!(&frame[2..], &[0.0, 0.0]);
    }
}

// ============================================================================
// PARAMETER UPDATES
// ============================================================================

#[test]
fn test_parameter_change_applies_at_next_block() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 1000.0);
    let mut processor = prepared_processor(&params);

    let input = generate_sine_wave(1000.0, SAMPLE_RATE, BLOCK);
    let mut first = input.clone();
    processor.process(&mut first, None).unwrap();
    assert!((rms(&first) - rms(&input)).abs() < 1e-4);

    params.set(ParamId::Peak1Gain, 12.0);
    let coeffs_before = *processor.left_chain().peak(PeakSlot::Peak1).coeffs();

    let mut second = input.clone();
    processor.process(&mut second, None).unwrap();
    assert_ne!(*processor.left_chain().peak(PeakSlot::Peak1).coeffs(), coeffs_before);
    assert!(rms(&second) > rms(&input) * 1.5);
}

#[test]
fn test_prepare_updates_coefficients_for_new_rate() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 2000.0);
    params.set(ParamId::Peak1Gain, 6.0);

    let mut processor = prepared_processor(&params);
    let at_48k = *processor.left_chain().peak(PeakSlot::Peak1).coeffs();

    processor.prepare(96000.0, BLOCK).unwrap();
    assert_eq!(processor.sample_rate(), 96000.0);
    assert_ne!(*processor.left_chain().peak(PeakSlot::Peak1).coeffs(), at_48k);
}

#[test]
fn test_silence_after_impulse_has_no_subnormals() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 1000.0);
    params.set(ParamId::Peak1Gain, 12.0);
    let mut processor = prepared_processor(&params);

    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    left[0] = 1.0;
    right[0] = 1.0;
    processor.process(&mut left, Some(&mut right)).unwrap();

    let mut subnormals = 0;
    for _ in 0..400 {
        left.fill(0.0);
        right.fill(0.0);
        processor.process(&mut left, Some(&mut right)).unwrap();
        subnormals += left.iter().chain(&right).filter(|s| s.is_subnormal()).count();
    }

    assert_eq!(subnormals, 0);
    assert!(left.iter().chain(&right).all(|&s| s == 0.0));
}

#[test]
fn test_extreme_settings_stay_finite() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::Peak1Freq, 10000.0);
    params.set(ParamId::Peak1Gain, 24.0);
    params.set(ParamId::Peak1Quality, 10.0);
    params.set(ParamId::Span, 10.0);
    params.set(ParamId::Balance, 12.0);
    let mut processor = prepared_processor(&params);

    let input = generate_sine_wave(15000.0, SAMPLE_RATE, 48000);
    let output = run_mono(&mut processor, &input);
    assert!(output.iter().all(|s| s.is_finite()));
    assert!(rms(&output[24000..]) < 100.0);
}

// ============================================================================
// ERRORS
// ============================================================================

#[test]
fn test_prepare_records_block_size() {
    let params = Arc::new(ParameterSet::new());
    let mut processor = Processor::new(Arc::clone(&params));
    assert!(!processor.is_prepared());
    assert_eq!(processor.max_block_size(), 0);

    processor.prepare(SAMPLE_RATE, 1024).unwrap();
    assert!(processor.is_prepared());
    assert_eq!(processor.max_block_size(), 1024);
    assert!(Arc::ptr_eq(processor.parameters(), &params));

    assert!(matches!(
        processor.prepare(0.0, 1024),
        Err(AudioError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_unprepared_processor_rejects_audio() {
    let params = Arc::new(ParameterSet::new());
    let mut processor = Processor::new(params);

    let mut block = vec![0.5; 64];
    assert!(matches!(
        processor.process(&mut block, None),
        Err(AudioError::NotPrepared)
    ));
    assert!(block.iter().all(|&s| s == 0.5));
}

#[test]
fn test_oversized_block_leaves_buffers_untouched() {
    let params = Arc::new(ParameterSet::new());
    params.set(ParamId::OutputGain, -12.0);
    let mut processor = prepared_processor(&params);

    let mut left = vec![0.5; BLOCK];
    let mut right = vec![0.5; BLOCK + 1];
    let result = processor.process(&mut left, Some(&mut right));

    assert!(matches!(
        result,
        Err(AudioError::BlockTooLarge { len, max }) if len == BLOCK + 1 && max == BLOCK
    ));
    assert!(left.iter().all(|&s| s == 0.5));
    assert!(right.iter().all(|&s| s == 0.5));
}

#[test]
fn test_released_processor_needs_prepare() {
    let params = Arc::new(ParameterSet::new());
    let mut processor = prepared_processor(&params);
    processor.release();

    let mut buffer = vec![0.1; 128];
    assert!(matches!(
        processor.process_interleaved(&mut buffer, 2),
        Err(AudioError::NotPrepared)
    ));

    processor.prepare(SAMPLE_RATE, 64).unwrap();
    assert!(processor.process_interleaved(&mut buffer, 2).is_ok());
}

#[test]
fn test_unprepared_chain_still_reports_response() {
    let params = ParameterSet::new();
    params.set(ParamId::Peak1Freq, 1000.0);
    params.set(ParamId::Peak1Gain, 6.0);

    let mut processor = Processor::new(Arc::new(params));
    processor.update_chains();

    let chain: &FilterChain = processor.left_chain();
    assert!(!chain.is_prepared());
    let magnitude = chain.magnitude_at(1000.0, SAMPLE_RATE);
    assert!((20.0 * magnitude.log10() - 12.0).abs() < 1e-3);
}

// ============================================================================
// PROPERTIES
// ============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn output_is_bounded_for_any_settings(
            freq in 20.0f32..10000.0,
            gain in -24.0f32..24.0,
            quality in 0.1f32..10.0,
            span in 0.0f32..10.0,
            balance in -12.0f32..12.0,
            output in -60.0f32..0.0,
            tone in 20.0f32..20000.0,
        ) {
            let params = Arc::new(ParameterSet::new());
            params.set(ParamId::Peak1Freq, freq);
            params.set(ParamId::Peak1Gain, gain);
            params.set(ParamId::Peak1Quality, quality);
            params.set(ParamId::Span, span);
            params.set(ParamId::Balance, balance);
            params.set(ParamId::OutputGain, output);
            let mut processor = prepared_processor(&params);

            let input = generate_sine_wave(tone, SAMPLE_RATE, 8 * BLOCK);
            let result = run_mono(&mut processor, &input);

            // Two peaks of at most +36 dB each bound the steady-state gain
            prop_assert!(result.iter().all(|s| s.is_finite()));
            prop_assert!(rms(&result[4 * BLOCK..]) < rms(&input) * 10f32.powf(72.0 / 20.0));
        }
    }
}
