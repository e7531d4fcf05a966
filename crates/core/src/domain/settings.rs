//! Point-in-time snapshot of the parameter set

use crate::domain::params::{ParamId, ParameterSet};
use serde::{Deserialize, Serialize};

/// Value snapshot of all six parameters
///
/// Built fresh from the live [`ParameterSet`] once per audio block and once per
/// response rebuild. Both peaks are derived from these fields: peak 2 has no
/// frequency, gain or quality of its own. Its frequency is spread from
/// `peak1_freq` by `span` and the two gains are split around `peak1_gain_db`
/// by `balance`. Do not add independent peak 2 fields.
///
/// Also the `[parameters]` section of the config file, so every field falls
/// back to the declared default when missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub peak1_freq: f32,
    pub peak1_gain_db: f32,
    pub peak1_quality: f32,
    pub span: f32,
    pub balance: f32,
    pub output_gain_db: f32,
}

impl ChainSettings {
    /// Read every parameter once. Lock-free.
    pub fn from_parameters(params: &ParameterSet) -> Self {
        Self {
            peak1_freq: params.value(ParamId::Peak1Freq),
            peak1_gain_db: params.value(ParamId::Peak1Gain),
            peak1_quality: params.value(ParamId::Peak1Quality),
            span: params.value(ParamId::Span),
            balance: params.value(ParamId::Balance),
            output_gain_db: params.value(ParamId::OutputGain),
        }
    }

    /// Gain of peak 1 in dB (`peak1_gain_db - balance`)
    pub fn peak1_band_gain_db(&self) -> f32 {
        self.peak1_gain_db - self.balance
    }

    /// Gain of peak 2 in dB (`peak1_gain_db + balance`)
    pub fn peak2_band_gain_db(&self) -> f32 {
        self.peak1_gain_db + self.balance
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            peak1_freq: 20.0,
            peak1_gain_db: 0.0,
            peak1_quality: 1.0,
            span: 0.0,
            balance: 0.0,
            output_gain_db: 0.0,
        }
    }
}
