//! Frequency response curve for display
//!
//! [`ResponseCurveEngine`] keeps its own [`FilterChain`], separate from the
//! audio chains, and rebuilds it from a fresh [`ChainSettings`] snapshot when
//! a parameter listener has flagged a change. The display timer calls
//! [`ResponseCurveEngine::tick`] at a fixed cadence; the only state it shares
//! with the parameter writers is the atomic [`ChangeFlag`].

use crate::domain::dsp::{make_peak1, make_peak2, FilterChain, PeakSlot};
use crate::domain::params::{ListenerId, ParamId, ParameterListener, ParameterSet};
use crate::domain::processor::SampleRateCell;
use crate::domain::settings::ChainSettings;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Left edge of the display axis
pub const MIN_FREQUENCY: f64 = 20.0;
/// Right edge of the display axis
pub const MAX_FREQUENCY: f64 = 20000.0;
/// The display shows `[-DISPLAY_RANGE_DB, DISPLAY_RANGE_DB]`
pub const DISPLAY_RANGE_DB: f64 = 24.0;

const MAGNITUDE_FLOOR_DB: f64 = -100.0;

/// Map a position in [0, 1] onto the 20 Hz - 20 kHz log axis
pub fn log_frequency(position: f64) -> f64 {
    let low = MIN_FREQUENCY.log10();
    let high = MAX_FREQUENCY.log10();
    10.0_f64.powf(low + position * (high - low))
}

/// Inverse of [`log_frequency`]
pub fn frequency_position(frequency: f64) -> f64 {
    let low = MIN_FREQUENCY.log10();
    let high = MAX_FREQUENCY.log10();
    (frequency.max(f64::MIN_POSITIVE).log10() - low) / (high - low)
}

fn magnitude_to_decibels(magnitude: f64) -> f64 {
    if magnitude > 0.0 {
        (20.0 * magnitude.log10()).max(MAGNITUDE_FLOOR_DB)
    } else {
        MAGNITUDE_FLOOR_DB
    }
}

// ============================================================================
// CHANGE FLAG
// ============================================================================

/// Coalesced "parameters changed" signal
///
/// Any number of `mark` calls between two `take` calls produce exactly one
/// `true` from `take`.
#[derive(Debug, Default)]
pub struct ChangeFlag(AtomicBool);

impl ChangeFlag {
    pub fn new(set: bool) -> Self {
        Self(AtomicBool::new(set))
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Test and clear in one atomic step
    pub fn take(&self) -> bool {
        self.0
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl ParameterListener for ChangeFlag {
    fn parameter_value_changed(&self, _id: ParamId, _value: f32) {
        self.mark();
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Display-side response engine
pub struct ResponseCurveEngine {
    params: Arc<ParameterSet>,
    sample_rate: Arc<SampleRateCell>,
    changed: Arc<ChangeFlag>,
    listener: ListenerId,
    chain: FilterChain,
    settings: ChainSettings,
    built_for_rate: f64,
}

impl ResponseCurveEngine {
    /// Register for parameter changes and build the display chain
    pub fn new(params: Arc<ParameterSet>, sample_rate: Arc<SampleRateCell>) -> Self {
        let changed = Arc::new(ChangeFlag::default());
        let listener = params.add_listener(Arc::clone(&changed) as Arc<dyn ParameterListener>);

        let mut engine = Self {
            params,
            sample_rate,
            changed,
            listener,
            chain: FilterChain::new(),
            settings: ChainSettings::default(),
            built_for_rate: 0.0,
        };
        engine.rebuild();
        engine
    }

    /// Timer callback. Returns true when the curve changed and needs a redraw.
    ///
    /// A new sample rate triggers a rebuild as well.
    pub fn tick(&mut self) -> bool {
        let params_changed = self.changed.take();
        let rate_changed = self.sample_rate.get() != self.built_for_rate;

        if params_changed || rate_changed {
            self.rebuild();
            true
        } else {
            false
        }
    }

    /// Rebuild unconditionally
    pub fn refresh(&mut self) {
        self.changed.take();
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let settings = ChainSettings::from_parameters(&self.params);
        let sample_rate = self.sample_rate.get();

        self.chain.update_coefficients(PeakSlot::Peak1, make_peak1(&settings, sample_rate));
        self.chain.update_coefficients(PeakSlot::Peak2, make_peak2(&settings, sample_rate));

        self.settings = settings;
        self.built_for_rate = sample_rate;
        debug!(
            peak1_freq = settings.peak1_freq,
            peak1_gain_db = settings.peak1_gain_db,
            span = settings.span,
            balance = settings.balance,
            sample_rate,
            "Response chain rebuilt"
        );
    }

    /// Flag shared with the parameter listeners
    pub fn change_flag(&self) -> Arc<ChangeFlag> {
        Arc::clone(&self.changed)
    }

    /// Settings the display chain was last built from
    pub fn settings(&self) -> ChainSettings {
        self.settings
    }

    pub fn sample_rate(&self) -> f64 {
        self.built_for_rate
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    /// Combined peak magnitude in dB at one frequency
    pub fn magnitude_db_at(&self, frequency: f64) -> f64 {
        magnitude_to_decibels(self.chain.magnitude_at(frequency, self.built_for_rate))
    }

    /// Response sampled at `width` points across the log axis
    pub fn curve(&self, width: usize) -> ResponseCurve {
        trace!(width, "Sampling response curve");
        ResponseCurve {
            chain: self.chain.clone(),
            sample_rate: self.built_for_rate,
            width,
        }
    }
}

impl Drop for ResponseCurveEngine {
    fn drop(&mut self) {
        self.params.remove_listener(self.listener);
    }
}

impl std::fmt::Debug for ResponseCurveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCurveEngine")
            .field("settings", &self.settings)
            .field("sample_rate", &self.built_for_rate)
            .field("pending", &self.changed.is_set())
            .finish()
    }
}

// ============================================================================
// CURVE
// ============================================================================

/// One sampled point of the response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    /// Pixel column, `0..width`
    pub x: usize,
    pub frequency: f64,
    /// Unclamped combined magnitude
    pub magnitude_db: f64,
}

impl CurvePoint {
    /// Magnitude clamped to the display range
    pub fn display_db(&self) -> f64 {
        self.magnitude_db.clamp(-DISPLAY_RANGE_DB, DISPLAY_RANGE_DB)
    }

    /// Vertical pixel for a render area where +24 dB maps to `top`, -24 dB to `bottom`
    pub fn y(&self, top: f64, bottom: f64) -> f64 {
        let proportion = (self.display_db() + DISPLAY_RANGE_DB) / (2.0 * DISPLAY_RANGE_DB);
        bottom + proportion * (top - bottom)
    }
}

/// A snapshot of the display chain, sampled lazily
///
/// Each call to [`ResponseCurve::iter`] starts over from the left edge.
#[derive(Debug, Clone)]
pub struct ResponseCurve {
    chain: FilterChain,
    sample_rate: f64,
    width: usize,
}

impl ResponseCurve {
    pub fn iter(&self) -> ResponseCurveIter<'_> {
        ResponseCurveIter {
            curve: self,
            next: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0
    }

    fn point(&self, x: usize) -> CurvePoint {
        let frequency = log_frequency(x as f64 / self.width as f64);
        let magnitude = self.chain.magnitude_at(frequency, self.sample_rate);
        CurvePoint {
            x,
            frequency,
            magnitude_db: magnitude_to_decibels(magnitude),
        }
    }
}

impl<'a> IntoIterator for &'a ResponseCurve {
    type Item = CurvePoint;
    type IntoIter = ResponseCurveIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ResponseCurveIter<'a> {
    curve: &'a ResponseCurve,
    next: usize,
}

impl Iterator for ResponseCurveIter<'_> {
    type Item = CurvePoint;

    fn next(&mut self) -> Option<CurvePoint> {
        if self.next >= self.curve.width {
            return None;
        }
        let point = self.curve.point(self.next);
        self.next += 1;
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.curve.width.saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ResponseCurveIter<'_> {}

// ============================================================================
// GRID
// ============================================================================

/// Vertical gridline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyLine {
    pub frequency: f64,
    /// 0 at 20 Hz, 1 at 20 kHz
    pub position: f64,
    pub label: String,
}

/// Horizontal gridline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GainLine {
    pub gain_db: f64,
    /// 0 at +24 dB (top), 1 at -24 dB (bottom)
    pub position: f64,
    pub label: String,
    pub highlighted: bool,
}

/// Labeled gridlines of the response display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub frequencies: Vec<FrequencyLine>,
    pub gains: Vec<GainLine>,
}

impl Grid {
    pub const FREQUENCIES: [f64; 10] = [
        20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0,
    ];
    pub const GAINS: [f64; 5] = [-24.0, -12.0, 0.0, 12.0, 24.0];

    pub fn standard() -> Self {
        let frequencies = Self::FREQUENCIES
            .iter()
            .map(|&frequency| FrequencyLine {
                frequency,
                position: frequency_position(frequency),
                label: frequency_label(frequency),
            })
            .collect();

        let gains = Self::GAINS
            .iter()
            .map(|&gain_db| GainLine {
                gain_db,
                position: (DISPLAY_RANGE_DB - gain_db) / (2.0 * DISPLAY_RANGE_DB),
                label: gain_label(gain_db),
                highlighted: gain_db == 0.0,
            })
            .collect();

        Self { frequencies, gains }
    }
}

fn frequency_label(frequency: f64) -> String {
    if frequency > 999.0 {
        format!("{}kHz", frequency / 1000.0)
    } else {
        format!("{frequency}Hz")
    }
}

fn gain_label(gain_db: f64) -> String {
    if gain_db > 0.0 {
        format!("+{gain_db}")
    } else {
        format!("{gain_db}")
    }
}
