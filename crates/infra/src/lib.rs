//! Platform integration for DualPeak
//!
//! - `audio`: CPAL device enumeration and the duplex stream hosting the processor
//! - `display`: the fixed-rate response curve timer

pub mod audio;
pub mod display;
