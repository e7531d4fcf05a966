//! CPAL-based device enumeration
//!
//! Lists the host's devices for `dualpeak devices` and resolves configured
//! device names to CPAL handles for the duplex stream.

use cpal::traits::{DeviceTrait, HostTrait};
use dualpeak_core::domain::audio::{
    AudioEnumerator, AudioError, DeviceId, DeviceInfo, DeviceType, Result,
};
use tracing::{debug, info};

/// Device name used as its stable ID
#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown Device".to_string())
}

/// Describe a CPAL device in domain terms
fn describe(device: &cpal::Device, device_type: DeviceType) -> DeviceInfo {
    let name = device_name(device);

    let input_channels = device
        .supported_input_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);
    let output_channels = device
        .supported_output_configs()
        .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
        .unwrap_or(0);

    let max_channels = match device_type {
        DeviceType::Input => input_channels,
        DeviceType::Output => output_channels,
        DeviceType::Duplex => input_channels.min(output_channels),
    };

    let default_sample_rate = match device_type {
        DeviceType::Input => device.default_input_config().ok(),
        DeviceType::Output | DeviceType::Duplex => device.default_output_config().ok(),
    }
    .map(|config| config.sample_rate());

    debug!(name = %name, ?device_type, max_channels, "Described device");

    DeviceInfo {
        id: DeviceId::new(name.clone()),
        name,
        device_type,
        default_sample_rate,
        max_channels,
    }
}

fn device_type(device: &cpal::Device) -> Option<DeviceType> {
    let has_input = device
        .supported_input_configs()
        .map(|mut configs| configs.next().is_some())
        .unwrap_or(false);
    let has_output = device
        .supported_output_configs()
        .map(|mut configs| configs.next().is_some())
        .unwrap_or(false);

    match (has_input, has_output) {
        (true, true) => Some(DeviceType::Duplex),
        (true, false) => Some(DeviceType::Input),
        (false, true) => Some(DeviceType::Output),
        (false, false) => None,
    }
}

/// Resolve an input device by name; an empty name selects the default
pub fn find_input_device(host: &cpal::Host, name: &str) -> Result<cpal::Device> {
    if name.is_empty() {
        return host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()));
    }

    host.input_devices()
        .map_err(|e| AudioError::OsError(e.to_string()))?
        .find(|d| device_name(d) == name)
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// Resolve an output device by name; an empty name selects the default
pub fn find_output_device(host: &cpal::Host, name: &str) -> Result<cpal::Device> {
    if name.is_empty() {
        return host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()));
    }

    host.output_devices()
        .map_err(|e| AudioError::OsError(e.to_string()))?
        .find(|d| device_name(d) == name)
        .ok_or_else(|| AudioError::DeviceNotFound(name.to_string()))
}

/// CPAL-based audio enumerator
pub struct CpalEnumerator {
    host: cpal::Host,
}

impl Default for CpalEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalEnumerator {
    pub fn new() -> Self {
        let host = cpal::default_host();
        info!(host = ?host.id(), "Initializing CPAL enumerator");
        Self { host }
    }
}

impl AudioEnumerator for CpalEnumerator {
    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let cpal_devices = self
            .host
            .devices()
            .map_err(|e| AudioError::OsError(e.to_string()))?;

        let devices: Vec<DeviceInfo> = cpal_devices
            .filter_map(|device| device_type(&device).map(|kind| describe(&device, kind)))
            .collect();

        info!("Found {} audio devices", devices.len());
        Ok(devices)
    }

    fn default_input_device(&self) -> Result<DeviceInfo> {
        find_input_device(&self.host, "").map(|d| describe(&d, DeviceType::Input))
    }

    fn default_output_device(&self) -> Result<DeviceInfo> {
        find_output_device(&self.host, "").map(|d| describe(&d, DeviceType::Output))
    }
}
