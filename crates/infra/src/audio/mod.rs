//! Platform audio I/O using CPAL
//!
//! CPAL abstracts the platform-specific APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod stream;

pub use cpal_backend::{find_input_device, find_output_device, CpalEnumerator};
pub use stream::{DuplexConfig, DuplexStream, StreamStats};
