//! Host-automatable parameter surface
//!
//! Six named, ranged parameters with lock-free storage. Values are written by
//! the host or UI thread and read from the audio thread and the display timer,
//! so every read and write goes through an atomic bit pattern.
//!
//! Parameter kinds are a tagged variant ([`ParameterKind`]) and display
//! formatting is a pure function of kind and value ([`format_value`]).

use crate::domain::settings::ChainSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, StateError>;

/// Errors raised while encoding or decoding persisted parameter state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unsupported state version: {0}")]
    UnsupportedVersion(u32),

    #[error("Unexpected state tree type: {0}")]
    UnexpectedType(String),
}

/// Stable identifiers for the six parameters, in host index order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    #[serde(rename = "Peak1 Freq")]
    Peak1Freq,
    #[serde(rename = "Peak1 Gain")]
    Peak1Gain,
    #[serde(rename = "Peak1 Quality")]
    Peak1Quality,
    #[serde(rename = "Span")]
    Span,
    #[serde(rename = "Balance")]
    Balance,
    #[serde(rename = "Output Gain")]
    OutputGain,
}

impl ParamId {
    pub const ALL: [ParamId; 6] = [
        ParamId::Peak1Freq,
        ParamId::Peak1Gain,
        ParamId::Peak1Quality,
        ParamId::Span,
        ParamId::Balance,
        ParamId::OutputGain,
    ];

    /// Unique string key, also used as the display name
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamId::Peak1Freq => "Peak1 Freq",
            ParamId::Peak1Gain => "Peak1 Gain",
            ParamId::Peak1Quality => "Peak1 Quality",
            ParamId::Span => "Span",
            ParamId::Balance => "Balance",
            ParamId::OutputGain => "Output Gain",
        }
    }

    /// Host-facing parameter index
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == key)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RANGES AND KINDS
// ============================================================================

/// Value range with a skewed normalized mapping
///
/// `to_normalized(v) = ((v - start) / (end - start))^skew`. A skew below 1
/// spends more of the normalized travel on the low end of the range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalisableRange {
    pub start: f32,
    pub end: f32,
    pub interval: f32,
    pub skew: f32,
}

impl NormalisableRange {
    pub const fn new(start: f32, end: f32, interval: f32, skew: f32) -> Self {
        Self {
            start,
            end,
            interval,
            skew,
        }
    }

    /// Clamp a plain value into the range
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.start, self.end)
    }

    /// Map a plain value to [0, 1]
    pub fn to_normalized(&self, value: f32) -> f32 {
        let proportion =
            ((self.clamp(value) - self.start) / (self.end - self.start)).clamp(0.0, 1.0);
        if self.skew == 1.0 {
            proportion
        } else {
            proportion.powf(self.skew)
        }
    }

    /// Map a normalized value in [0, 1] back to a plain value
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let mut proportion = normalized.clamp(0.0, 1.0);
        if self.skew != 1.0 && proportion > 0.0 {
            proportion = (proportion.ln() / self.skew).exp();
        }
        self.clamp(self.start + (self.end - self.start) * proportion)
    }

    /// Snap to the nearest step of the interval grid
    pub fn snap(&self, value: f32) -> f32 {
        if self.interval > 0.0 {
            let steps = ((value - self.start) / self.interval).round();
            self.clamp(self.start + steps * self.interval)
        } else {
            self.clamp(value)
        }
    }

    /// Decimal places implied by the step interval
    pub fn decimals(&self) -> usize {
        if self.interval <= 0.0 || self.interval >= 1.0 {
            0
        } else {
            (-self.interval.log10()).round().clamp(0.0, 6.0) as usize
        }
    }
}

/// Parameter variants
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterKind {
    Continuous {
        range: NormalisableRange,
        unit: &'static str,
    },
    Choice {
        choices: &'static [&'static str],
    },
    Boolean,
}

impl ParameterKind {
    /// Plain range of the stored value (choice index, 0/1 for booleans)
    pub fn range(&self) -> NormalisableRange {
        match self {
            ParameterKind::Continuous { range, .. } => *range,
            ParameterKind::Choice { choices } => {
                NormalisableRange::new(0.0, choices.len().saturating_sub(1) as f32, 1.0, 1.0)
            }
            ParameterKind::Boolean => NormalisableRange::new(0.0, 1.0, 1.0, 1.0),
        }
    }
}

/// Format a plain value for display
///
/// Continuous values above 999 are shown in thousands with a `k` in front of the
/// unit ("2.50 kHz").
pub fn format_value(kind: &ParameterKind, value: f32) -> String {
    match kind {
        ParameterKind::Continuous { range, unit } => {
            let (shown, prefix, decimals) = if value > 999.0 {
                (value / 1000.0, "k", 2)
            } else {
                (value, "", range.decimals())
            };

            let mut text = format!("{shown:.decimals$}");
            if !unit.is_empty() {
                text.push(' ');
                text.push_str(prefix);
                text.push_str(unit);
            }
            text
        }
        ParameterKind::Choice { choices } => {
            let index = value.round().max(0.0) as usize;
            choices.get(index).copied().unwrap_or_default().to_string()
        }
        ParameterKind::Boolean => {
            if value >= 0.5 {
                "On".to_string()
            } else {
                "Off".to_string()
            }
        }
    }
}

/// Parse display text back into a plain value
///
/// Accepts the output of [`format_value`] as well as bare numbers.
pub fn parse_value(kind: &ParameterKind, text: &str) -> Option<f32> {
    let text = text.trim();
    match kind {
        ParameterKind::Continuous { range, unit } => {
            let mut body = text;
            if !unit.is_empty() {
                body = body.strip_suffix(unit).unwrap_or(body).trim_end();
            }
            let (body, multiplier) = match body.strip_suffix(['k', 'K']) {
                Some(stripped) => (stripped.trim_end(), 1000.0),
                None => (body, 1.0),
            };
            let value = body.parse::<f32>().ok()?;
            value.is_finite().then(|| range.clamp(value * multiplier))
        }
        ParameterKind::Choice { choices } => choices
            .iter()
            .position(|c| c.eq_ignore_ascii_case(text))
            .map(|i| i as f32)
            .or_else(|| {
                text.parse::<usize>()
                    .ok()
                    .filter(|i| *i < choices.len())
                    .map(|i| i as f32)
            }),
        ParameterKind::Boolean => match text.to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => Some(1.0),
            "off" | "false" | "0" => Some(0.0),
            _ => None,
        },
    }
}

// ============================================================================
// PARAMETER
// ============================================================================

/// Observer notified after a parameter's stored value changes
///
/// Called synchronously on the thread that performed the write.
pub trait ParameterListener: Send + Sync {
    fn parameter_value_changed(&self, id: ParamId, value: f32);
}

impl<F> ParameterListener for F
where
    F: Fn(ParamId, f32) + Send + Sync,
{
    fn parameter_value_changed(&self, id: ParamId, value: f32) {
        self(id, value)
    }
}

/// Handle returned by listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type ListenerList = Vec<(ListenerId, Arc<dyn ParameterListener>)>;

/// A single ranged parameter with atomic storage
pub struct Parameter {
    id: ParamId,
    kind: ParameterKind,
    default: f32,
    value: AtomicU32,
    listeners: RwLock<ListenerList>,
}

impl Parameter {
    pub fn new(id: ParamId, kind: ParameterKind, default: f32) -> Self {
        let default = kind.range().clamp(default);
        Self {
            id,
            kind,
            default,
            value: AtomicU32::new(default.to_bits()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.id.as_str()
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    pub fn range(&self) -> NormalisableRange {
        self.kind.range()
    }

    pub fn default_value(&self) -> f32 {
        self.default
    }

    /// Current plain value. Lock-free, safe on the audio thread.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Store a plain value, clamped to the range
    ///
    /// Non-finite values are rejected. Listeners fire only when the stored bits change.
    pub fn set(&self, value: f32) {
        if !value.is_finite() {
            warn!(parameter = self.name(), "Ignoring non-finite parameter value");
            return;
        }

        let clamped = self.range().clamp(value);
        let previous = self.value.swap(clamped.to_bits(), Ordering::AcqRel);
        if previous != clamped.to_bits() {
            self.notify(clamped);
        }
    }

    pub fn get_normalized(&self) -> f32 {
        self.range().to_normalized(self.get())
    }

    /// Host automation entry point
    pub fn set_normalized(&self, normalized: f32) {
        if !normalized.is_finite() {
            warn!(parameter = self.name(), "Ignoring non-finite normalized value");
            return;
        }
        self.set(self.range().from_normalized(normalized));
    }

    pub fn reset(&self) {
        self.set(self.default);
    }

    /// Display string for the current value
    pub fn display(&self) -> String {
        format_value(&self.kind, self.get())
    }

    pub fn add_listener(&self, listener: Arc<dyn ParameterListener>) -> ListenerId {
        let id = ListenerId::next();
        self.insert_listener(id, listener);
        id
    }

    /// Returns false if no listener was registered under `id`
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        match self.listeners.write() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(existing, _)| *existing != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    fn insert_listener(&self, id: ListenerId, listener: Arc<dyn ParameterListener>) {
        if let Ok(mut listeners) = self.listeners.write() {
            listeners.push((id, listener));
        }
    }

    fn notify(&self, value: f32) {
        // Release the lock before calling out so listeners may (un)register.
        let listeners: Vec<Arc<dyn ParameterListener>> = match self.listeners.read() {
            Ok(guard) => guard.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => return,
        };

        for listener in listeners {
            listener.parameter_value_changed(self.id, value);
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("default", &self.default)
            .field("value", &self.get())
            .finish()
    }
}

// ============================================================================
// PARAMETER SET
// ============================================================================

const STATE_TREE_TYPE: &str = "Parameters";
const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateTree {
    #[serde(rename = "type")]
    tree_type: String,
    version: u32,
    #[serde(default)]
    params: Vec<StateEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StateEntry {
    id: String,
    value: f32,
}

/// The full parameter layout
#[derive(Debug)]
pub struct ParameterSet {
    parameters: [Parameter; 6],
}

impl ParameterSet {
    pub fn new() -> Self {
        Self {
            parameters: ParamId::ALL.map(Self::declare),
        }
    }

    fn declare(id: ParamId) -> Parameter {
        let range = |start, end, interval, skew, unit| ParameterKind::Continuous {
            range: NormalisableRange::new(start, end, interval, skew),
            unit,
        };

        match id {
            ParamId::Peak1Freq => Parameter::new(id, range(20.0, 10000.0, 1.0, 0.25, "Hz"), 20.0),
            ParamId::Peak1Gain => Parameter::new(id, range(-24.0, 24.0, 0.1, 1.0, "dB"), 0.0),
            ParamId::Peak1Quality => Parameter::new(id, range(0.1, 10.0, 0.1, 0.25, ""), 1.0),
            ParamId::Span => Parameter::new(id, range(0.0, 10.0, 0.01, 1.0, ""), 0.0),
            ParamId::Balance => Parameter::new(id, range(-12.0, 12.0, 0.1, 1.0, ""), 0.0),
            ParamId::OutputGain => Parameter::new(id, range(-60.0, 0.0, 0.1, 0.25, "dB"), 0.0),
        }
    }

    pub fn get(&self, id: ParamId) -> &Parameter {
        &self.parameters[id.index()]
    }

    pub fn by_index(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    pub fn by_key(&self, key: &str) -> Option<&Parameter> {
        ParamId::from_key(key).map(|id| self.get(id))
    }

    #[inline]
    pub fn value(&self, id: ParamId) -> f32 {
        self.get(id).get()
    }

    pub fn set(&self, id: ParamId, value: f32) {
        self.get(id).set(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Register one listener on every parameter
    pub fn add_listener(&self, listener: Arc<dyn ParameterListener>) -> ListenerId {
        let id = ListenerId::next();
        for parameter in &self.parameters {
            parameter.insert_listener(id, Arc::clone(&listener));
        }
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        for parameter in &self.parameters {
            parameter.remove_listener(id);
        }
    }

    pub fn reset_all(&self) {
        for parameter in &self.parameters {
            parameter.reset();
        }
    }

    /// Write every value of a settings snapshot
    pub fn apply(&self, settings: &ChainSettings) {
        self.set(ParamId::Peak1Freq, settings.peak1_freq);
        self.set(ParamId::Peak1Gain, settings.peak1_gain_db);
        self.set(ParamId::Peak1Quality, settings.peak1_quality);
        self.set(ParamId::Span, settings.span);
        self.set(ParamId::Balance, settings.balance);
        self.set(ParamId::OutputGain, settings.output_gain_db);
    }

    /// Serialize all values as a parameter tree
    pub fn save_state(&self) -> Result<Vec<u8>> {
        let tree = StateTree {
            tree_type: STATE_TREE_TYPE.to_string(),
            version: STATE_VERSION,
            params: self
                .parameters
                .iter()
                .map(|p| StateEntry {
                    id: p.name().to_string(),
                    value: p.get(),
                })
                .collect(),
        };
        Ok(serde_json::to_vec(&tree)?)
    }

    /// Restore values from a parameter tree
    ///
    /// The tree is fully decoded before anything is written, so a failure leaves
    /// every value untouched. Parameters absent from the tree return to their
    /// defaults; unknown entries are ignored.
    pub fn load_state(&self, data: &[u8]) -> Result<()> {
        let tree: StateTree = serde_json::from_slice(data)?;

        if tree.tree_type != STATE_TREE_TYPE {
            return Err(StateError::UnexpectedType(tree.tree_type));
        }
        if tree.version != STATE_VERSION {
            return Err(StateError::UnsupportedVersion(tree.version));
        }

        for entry in &tree.params {
            if ParamId::from_key(&entry.id).is_none() {
                debug!(id = %entry.id, "Ignoring unknown parameter in state");
            }
        }

        for parameter in &self.parameters {
            match tree.params.iter().find(|e| e.id == parameter.name()) {
                Some(entry) => parameter.set(entry.value),
                None => {
                    debug!(id = parameter.name(), "Parameter missing from state, using default");
                    parameter.reset();
                }
            }
        }

        Ok(())
    }
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self::new()
    }
}
