//! Real-time duplex stream hosting the processor
//!
//! Captured samples travel from the input callback to the output callback
//! through a preallocated lock-free queue. The [`Processor`] is moved into the
//! output callback, so the audio thread is its only owner.

use crate::audio::cpal_backend::{find_input_device, find_output_device};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig as CpalStreamConfig};
use crossbeam::queue::ArrayQueue;
use dualpeak_core::domain::audio::{AudioError, Result};
use dualpeak_core::domain::config::DualPeakConfig;
use dualpeak_core::domain::processor::Processor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Blocks of slack between capture and playback
const QUEUE_BLOCKS: usize = 8;

/// Device and stream settings for a duplex stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplexConfig {
    /// Input device name (empty = default)
    pub input_device: String,
    /// Output device name (empty = default)
    pub output_device: String,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub channels: u16,
}

impl From<&DualPeakConfig> for DuplexConfig {
    fn from(config: &DualPeakConfig) -> Self {
        Self {
            input_device: config.audio.input_device.clone(),
            output_device: config.audio.output_device.clone(),
            sample_rate: config.app.sample_rate,
            buffer_size: config.app.buffer_size,
            channels: config.audio.channels,
        }
    }
}

/// Counters updated from the audio callbacks
#[derive(Debug, Default)]
struct StreamCounters {
    underruns: AtomicU64,
    overruns: AtomicU64,
    process_errors: AtomicU64,
}

/// Snapshot of the stream counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStats {
    /// Output samples played as silence because no input was queued
    pub underruns: u64,
    /// Input samples dropped because the queue was full
    pub overruns: u64,
    /// Blocks the processor rejected
    pub process_errors: u64,
}

/// Running input + output stream pair
pub struct DuplexStream {
    _input: Stream,
    _output: Stream,
    config: DuplexConfig,
    counters: Arc<StreamCounters>,
}

impl DuplexStream {
    /// Open both devices, prepare the processor and start playback
    pub fn start(config: &DuplexConfig, mut processor: Processor) -> Result<Self> {
        info!(
            input = %display_name(&config.input_device),
            output = %display_name(&config.output_device),
            sample_rate = config.sample_rate,
            buffer_size = config.buffer_size,
            channels = config.channels,
            "Starting duplex stream"
        );

        if config.channels == 0 || config.buffer_size == 0 {
            return Err(AudioError::InvalidConfiguration(format!(
                "channels and buffer size must be positive (channels={}, buffer_size={})",
                config.channels, config.buffer_size
            )));
        }

        let host = cpal::default_host();
        let input_device = find_input_device(&host, &config.input_device)?;
        let output_device = find_output_device(&host, &config.output_device)?;

        let channels = config.channels as usize;
        let block_frames = config.buffer_size as usize;
        processor.prepare(config.sample_rate as f64, block_frames)?;

        let cpal_config = CpalStreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        };

        let queue = Arc::new(ArrayQueue::<f32>::new(block_frames * channels * QUEUE_BLOCKS));
        let counters = Arc::new(StreamCounters::default());

        let input_queue = Arc::clone(&queue);
        let input_counters = Arc::clone(&counters);
        let input = input_device
            .build_input_stream(
                &cpal_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        if input_queue.push(sample).is_err() {
                            input_counters.overruns.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                |err| error!("Input stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build input stream: {}", e)))?;

        let output_counters = Arc::clone(&counters);
        let chunk = block_frames * channels;
        let output = output_device
            .build_output_stream(
                &cpal_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for sample in data.iter_mut() {
                        *sample = match queue.pop() {
                            Some(s) => s,
                            None => {
                                output_counters.underruns.fetch_add(1, Ordering::Relaxed);
                                0.0
                            }
                        };
                    }

                    // Devices may hand out larger buffers than requested.
                    for block in data.chunks_mut(chunk) {
                        if processor.process_interleaved(block, channels).is_err() {
                            output_counters.process_errors.fetch_add(1, Ordering::Relaxed);
                            block.fill(0.0);
                        }
                    }
                },
                |err| error!("Output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build output stream: {}", e)))?;

        input
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start input stream: {}", e)))?;
        output
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start output stream: {}", e)))?;

        info!("Duplex stream running");

        Ok(Self {
            _input: input,
            _output: output,
            config: config.clone(),
            counters,
        })
    }

    pub fn config(&self) -> &DuplexConfig {
        &self.config
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            underruns: self.counters.underruns.load(Ordering::Relaxed),
            overruns: self.counters.overruns.load(Ordering::Relaxed),
            process_errors: self.counters.process_errors.load(Ordering::Relaxed),
        }
    }

    /// Stop both streams, dropping the processor
    pub fn stop(self) -> StreamStats {
        let stats = self.stats();
        drop(self._output);
        drop(self._input);
        info!(
            underruns = stats.underruns,
            overruns = stats.overruns,
            process_errors = stats.process_errors,
            "Duplex stream stopped"
        );
        stats
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "<default>"
    } else {
        name
    }
}
