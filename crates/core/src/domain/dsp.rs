//! Digital Signal Processing for the dual peak chain
//!
//! This module provides:
//! - Peaking biquad coefficient factory (`make_peak1`, `make_peak2`)
//! - Direct Form I biquad stage
//! - Output gain stage
//! - Per-channel `FilterChain`: Peak1 -> Peak2 -> Gain
//!
//! The chain is designed for:
//! - Zero allocations in the hot path
//! - Coefficient replacement between blocks without tearing
//! - Delay-line state carried across block boundaries

use crate::domain::audio::AudioError;
use crate::domain::settings::ChainSettings;
use num_complex::Complex64;
use std::f64::consts::PI;

pub type Result<T> = std::result::Result<T, AudioError>;

/// Decibel level treated as silence
pub const MINUS_INFINITY_DB: f32 = -100.0;

/// Lowest frequency either peak may be centered on
pub const MIN_PEAK_FREQUENCY: f64 = 20.0;

/// Core trait for the chain's stages
///
/// All stages process one channel in-place on f32 buffers.
pub trait Effect: Send + Sync {
    /// Process a buffer of audio samples in-place
    ///
    /// # Requirements
    /// - No allocations in the hot path
    /// - Handle buffer of any size
    fn process(&mut self, buffer: &mut [f32]) -> Result<()>;

    /// Reset stage state to initial conditions
    fn reset(&mut self);

    /// Get stage name for debugging/display
    fn name(&self) -> &str;
}

/// Convert decibels to linear gain; at or below -100 dB the gain is 0
#[inline]
pub fn decibels_to_gain(db: f32) -> f32 {
    if db > MINUS_INFINITY_DB {
        10.0_f32.powf(db * 0.05)
    } else {
        0.0
    }
}

/// Convert linear gain to decibels, floored at -100 dB
#[inline]
pub fn gain_to_decibels(gain: f32) -> f32 {
    if gain > 0.0 {
        (20.0 * gain.log10()).max(MINUS_INFINITY_DB)
    } else {
        MINUS_INFINITY_DB
    }
}

// ============================================================================
// BIQUAD FILTER
// ============================================================================

/// Biquad filter coefficients
///
/// `a0` is normalized to 1.0. Computed in f64 and stored as f32, the
/// precision the audio path runs at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Calculate coefficients for a peaking filter
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Center frequency in Hz
    /// - `q`: Quality factor
    /// - `gain_factor`: Linear gain at the center frequency
    ///
    /// The design frequency is kept just below Nyquist: at exactly half the
    /// sample rate both poles land on the unit circle.
    #[must_use]
    pub fn peaking(sample_rate: f64, freq: f64, q: f64, gain_factor: f64) -> Self {
        let a = gain_factor.max(1e-9).sqrt();
        let freq = freq.clamp(2.0, sample_rate * 0.4999);
        let w0 = 2.0 * PI * freq / sample_rate;
        let alpha = w0.sin() / (2.0 * q);
        let c2 = -2.0 * w0.cos();

        let b0 = 1.0 + alpha * a;
        let b1 = c2;
        let b2 = 1.0 - alpha * a;

        let a0 = 1.0 + alpha / a;
        let a1 = c2;
        let a2 = 1.0 - alpha / a;

        // Normalize by a0
        Self {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
        }
    }

    /// Magnitude of the transfer function at `frequency`
    ///
    /// Evaluates `|H(e^jw)|` with `w = 2*pi*f/fs`.
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        let z1 = Complex64::from_polar(1.0, -w);
        let z2 = z1 * z1;

        let numerator =
            Complex64::new(self.b0 as f64, 0.0) + z1 * self.b1 as f64 + z2 * self.b2 as f64;
        let denominator = Complex64::new(1.0, 0.0) + z1 * self.a1 as f64 + z2 * self.a2 as f64;

        (numerator / denominator).norm()
    }
}

/// Feedback values below this are flushed to zero
pub const DENORMAL_THRESHOLD: f32 = 1e-15;

/// Zero out values small enough to decay into subnormals
#[inline]
fn flush_denormal(value: f32) -> f32 {
    if value.abs() < DENORMAL_THRESHOLD {
        0.0
    } else {
        value
    }
}

/// Stateful biquad filter using Direct Form I
///
/// The output, and with it the feedback history, is flushed to zero once it
/// falls below [`DENORMAL_THRESHOLD`], so a decaying tail never reaches
/// subnormal range.
#[derive(Debug, Clone, PartialEq)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Create a bypass filter (unity gain)
    pub fn bypass() -> Self {
        Self::new(BiquadCoeffs::default())
    }

    /// Replace the coefficient set wholesale. Delay-line state is kept.
    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        let y = flush_denormal(y);

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }
}

impl Effect for BiquadFilter {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    fn name(&self) -> &str {
        "Peak"
    }
}

// ============================================================================
// GAIN
// ============================================================================

/// Per-sample multiplicative gain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gain {
    linear: f32,
}

impl Gain {
    pub fn new(linear: f32) -> Self {
        Self { linear }
    }

    pub fn unity() -> Self {
        Self::new(1.0)
    }

    #[inline]
    pub fn set_gain_linear(&mut self, linear: f32) {
        self.linear = linear;
    }

    pub fn set_gain_decibels(&mut self, db: f32) {
        self.linear = decibels_to_gain(db);
    }

    pub fn gain_linear(&self) -> f32 {
        self.linear
    }

    pub fn gain_decibels(&self) -> f32 {
        gain_to_decibels(self.linear)
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::unity()
    }
}

impl Effect for Gain {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        let gain = self.linear;
        for sample in buffer.iter_mut() {
            *sample *= gain;
        }
        Ok(())
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "Gain"
    }
}

// ============================================================================
// COEFFICIENT FACTORY
// ============================================================================

/// Center frequency of peak 2: `peak1_freq * (1 + span / 2)`, then clamped
/// to `[20 Hz, sample_rate / 2]`
///
/// The clamp runs after the spread so large spans saturate at Nyquist.
pub fn peak2_frequency(settings: &ChainSettings, sample_rate: f64) -> f64 {
    let spread = settings.peak1_freq as f64 * (1.0 + settings.span as f64 / 2.0);
    spread.max(MIN_PEAK_FREQUENCY).min(sample_rate / 2.0)
}

/// Peak 1: centered on `peak1_freq`, gain `peak1_gain_db - balance`
pub fn make_peak1(settings: &ChainSettings, sample_rate: f64) -> BiquadCoeffs {
    BiquadCoeffs::peaking(
        sample_rate,
        settings.peak1_freq as f64,
        settings.peak1_quality as f64,
        decibels_to_gain(settings.peak1_band_gain_db()) as f64,
    )
}

/// Peak 2: centered on [`peak2_frequency`], same Q, gain `peak1_gain_db + balance`
pub fn make_peak2(settings: &ChainSettings, sample_rate: f64) -> BiquadCoeffs {
    BiquadCoeffs::peaking(
        sample_rate,
        peak2_frequency(settings, sample_rate),
        settings.peak1_quality as f64,
        decibels_to_gain(settings.peak2_band_gain_db()) as f64,
    )
}

// ============================================================================
// FILTER CHAIN
// ============================================================================

/// Sample rate and maximum block length a chain is prepared for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f64,
    pub max_block_size: usize,
}

/// Addressable peak stages of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeakSlot {
    Peak1,
    Peak2,
}

/// One channel's serial chain: Peak1 -> Peak2 -> Gain
///
/// Every instance owns its stages exclusively. The left and right audio
/// chains and the display chain are separate values and never share state.
#[derive(Debug, Clone)]
pub struct FilterChain {
    peak1: BiquadFilter,
    peak2: BiquadFilter,
    gain: Gain,
    spec: Option<ProcessSpec>,
}

impl FilterChain {
    /// Create an unprepared chain with unity stages
    pub fn new() -> Self {
        Self {
            peak1: BiquadFilter::bypass(),
            peak2: BiquadFilter::bypass(),
            gain: Gain::unity(),
            spec: None,
        }
    }

    /// Prepare for processing, clearing all delay-line state
    pub fn prepare(&mut self, spec: ProcessSpec) -> Result<()> {
        if !spec.sample_rate.is_finite() || spec.sample_rate <= 0.0 {
            return Err(AudioError::InvalidConfiguration(format!(
                "Sample rate must be positive, got {}",
                spec.sample_rate
            )));
        }
        if spec.max_block_size == 0 {
            return Err(AudioError::InvalidConfiguration(
                "Maximum block size must be at least 1".to_string(),
            ));
        }

        self.reset();
        self.spec = Some(spec);
        Ok(())
    }

    /// Return to the unprepared state
    pub fn release(&mut self) {
        self.reset();
        self.spec = None;
    }

    pub fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    pub fn spec(&self) -> Option<ProcessSpec> {
        self.spec
    }

    /// Install a new coefficient set into one peak stage
    ///
    /// The stage's coefficients are replaced in a single assignment; `&mut`
    /// access guarantees no `process` call observes a partial set.
    #[inline]
    pub fn update_coefficients(&mut self, slot: PeakSlot, coeffs: BiquadCoeffs) {
        match slot {
            PeakSlot::Peak1 => self.peak1.set_coeffs(coeffs),
            PeakSlot::Peak2 => self.peak2.set_coeffs(coeffs),
        }
    }

    #[inline]
    pub fn set_gain_linear(&mut self, linear: f32) {
        self.gain.set_gain_linear(linear);
    }

    pub fn peak(&self, slot: PeakSlot) -> &BiquadFilter {
        match slot {
            PeakSlot::Peak1 => &self.peak1,
            PeakSlot::Peak2 => &self.peak2,
        }
    }

    pub fn gain(&self) -> &Gain {
        &self.gain
    }

    /// Combined magnitude of both peak stages at `frequency`
    ///
    /// The output gain stage is not part of the displayed response.
    pub fn magnitude_at(&self, frequency: f64, sample_rate: f64) -> f64 {
        self.peak1.coeffs().magnitude_at(frequency, sample_rate)
            * self.peak2.coeffs().magnitude_at(frequency, sample_rate)
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for FilterChain {
    fn process(&mut self, buffer: &mut [f32]) -> Result<()> {
        let spec = self.spec.ok_or(AudioError::NotPrepared)?;
        if buffer.len() > spec.max_block_size {
            return Err(AudioError::BlockTooLarge {
                len: buffer.len(),
                max: spec.max_block_size,
            });
        }

        self.peak1.process(buffer)?;
        self.peak2.process(buffer)?;
        self.gain.process(buffer)
    }

    fn reset(&mut self) {
        self.peak1.reset();
        self.peak2.reset();
        self.gain.reset();
    }

    fn name(&self) -> &str {
        "FilterChain"
    }
}

// ============================================================================
// TESTS
// ============================================================================
