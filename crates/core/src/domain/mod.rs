//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod params;
pub mod processor;
pub mod response;
pub mod settings;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioEnumerator, AudioError, DeviceId, DeviceInfo, DeviceType};
pub use config::{
    AppConfig, AudioDeviceConfig, ConfigError, ConfigManager, ConfigWatcher, DualPeakConfig,
};
pub use dsp::{
    decibels_to_gain, gain_to_decibels, make_peak1, make_peak2, peak2_frequency, BiquadCoeffs,
    BiquadFilter, Effect, FilterChain, Gain, PeakSlot, ProcessSpec,
};
pub use params::{
    format_value, parse_value, ListenerId, NormalisableRange, ParamId, Parameter, ParameterKind,
    ParameterListener, ParameterSet, StateError,
};
pub use processor::{Processor, SampleRateCell};
pub use response::{ChangeFlag, CurvePoint, Grid, ResponseCurve, ResponseCurveEngine};
pub use settings::ChainSettings;
