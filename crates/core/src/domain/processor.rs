//! Audio processor: the parameter set driving two filter chains
//!
//! Owns the left and right [`FilterChain`]s and runs the per-block update
//! protocol:
//! 1. snapshot every parameter into a [`ChainSettings`]
//! 2. compute peak 1 and peak 2 coefficients
//! 3. install the same coefficients into both channels
//! 4. set the output gain
//!
//! The update runs unconditionally on every block. Nothing in `process` or
//! `process_interleaved` allocates, locks or logs.

use crate::domain::audio::{AudioError, Result};
use crate::domain::dsp::{
    decibels_to_gain, make_peak1, make_peak2, Effect, FilterChain, PeakSlot, ProcessSpec,
};
use crate::domain::params::{ParameterSet, StateError};
use crate::domain::settings::ChainSettings;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sample rate used before the first `prepare`
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// Last prepared sample rate, shared with the response engine
#[derive(Debug)]
pub struct SampleRateCell(AtomicU64);

impl SampleRateCell {
    pub fn new(sample_rate: f64) -> Self {
        Self(AtomicU64::new(sample_rate.to_bits()))
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, sample_rate: f64) {
        self.0.store(sample_rate.to_bits(), Ordering::Release);
    }
}

impl Default for SampleRateCell {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

/// Stereo dual peak processor
pub struct Processor {
    params: Arc<ParameterSet>,
    sample_rate: Arc<SampleRateCell>,
    left: FilterChain,
    right: FilterChain,
    // Deinterleave buffers, sized in `prepare`
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
    max_block_size: usize,
}

impl Processor {
    pub fn new(params: Arc<ParameterSet>) -> Self {
        Self {
            params,
            sample_rate: Arc::new(SampleRateCell::default()),
            left: FilterChain::new(),
            right: FilterChain::new(),
            scratch_left: Vec::new(),
            scratch_right: Vec::new(),
            max_block_size: 0,
        }
    }

    pub fn parameters(&self) -> &Arc<ParameterSet> {
        &self.params
    }

    /// Handle for readers of the last prepared sample rate
    pub fn sample_rate_cell(&self) -> Arc<SampleRateCell> {
        Arc::clone(&self.sample_rate)
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate.get()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn is_prepared(&self) -> bool {
        self.left.is_prepared() && self.right.is_prepared()
    }

    /// Prepare both chains for a stream, clearing their delay lines
    ///
    /// Call at stream start and whenever the sample rate or maximum block
    /// size changes.
    pub fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> Result<()> {
        let spec = ProcessSpec {
            sample_rate,
            max_block_size,
        };
        self.left.prepare(spec)?;
        self.right.prepare(spec)?;

        self.scratch_left.clear();
        self.scratch_left.resize(max_block_size, 0.0);
        self.scratch_right.clear();
        self.scratch_right.resize(max_block_size, 0.0);
        self.max_block_size = max_block_size;

        self.sample_rate.set(sample_rate);
        self.update_chains();

        info!(sample_rate, max_block_size, "Processor prepared");
        Ok(())
    }

    /// Return to the unprepared state
    pub fn release(&mut self) {
        self.left.release();
        self.right.release();
        self.max_block_size = 0;
        info!("Processor released");
    }

    /// Snapshot the parameters and push fresh coefficients into both channels
    #[inline]
    pub fn update_chains(&mut self) -> ChainSettings {
        let settings = ChainSettings::from_parameters(&self.params);
        let sample_rate = self.sample_rate.get();

        let peak1 = make_peak1(&settings, sample_rate);
        let peak2 = make_peak2(&settings, sample_rate);
        let output_gain = decibels_to_gain(settings.output_gain_db);

        for chain in [&mut self.left, &mut self.right] {
            chain.update_coefficients(PeakSlot::Peak1, peak1);
            chain.update_coefficients(PeakSlot::Peak2, peak2);
            chain.set_gain_linear(output_gain);
        }

        settings
    }

    /// Process one block of planar audio in place
    ///
    /// `right` is `None` for mono. Both slices are checked against the
    /// prepared block size before anything is processed.
    pub fn process(&mut self, left: &mut [f32], right: Option<&mut [f32]>) -> Result<()> {
        if !self.is_prepared() {
            return Err(AudioError::NotPrepared);
        }

        let longest = left.len().max(right.as_ref().map_or(0, |r| r.len()));
        if longest > self.max_block_size {
            return Err(AudioError::BlockTooLarge {
                len: longest,
                max: self.max_block_size,
            });
        }

        self.update_chains();

        self.left.process(left)?;
        if let Some(right) = right {
            self.right.process(right)?;
        }
        Ok(())
    }

    /// Process one block of interleaved audio in place
    ///
    /// Channel 0 goes through the left chain and channel 1 through the right.
    /// Channels beyond the second and any trailing partial frame are cleared.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) -> Result<()> {
        if channels == 0 {
            return Ok(());
        }
        if !self.is_prepared() {
            return Err(AudioError::NotPrepared);
        }

        let frames = buffer.len() / channels;
        if frames > self.max_block_size {
            return Err(AudioError::BlockTooLarge {
                len: frames,
                max: self.max_block_size,
            });
        }

        // Taking the scratch buffers out of `self` swaps pointers only.
        let mut left = std::mem::take(&mut self.scratch_left);
        let mut right = std::mem::take(&mut self.scratch_right);

        for (i, frame) in buffer.chunks_exact(channels).enumerate() {
            left[i] = frame[0];
            if channels > 1 {
                right[i] = frame[1];
            }
        }

        let result = if channels > 1 {
            self.process(&mut left[..frames], Some(&mut right[..frames]))
        } else {
            self.process(&mut left[..frames], None)
        };

        if result.is_ok() {
            for (i, frame) in buffer.chunks_exact_mut(channels).enumerate() {
                frame[0] = left[i];
                if channels > 1 {
                    frame[1] = right[i];
                }
                if channels > 2 {
                    frame[2..].fill(0.0);
                }
            }
            buffer[frames * channels..].fill(0.0);
        }

        self.scratch_left = left;
        self.scratch_right = right;
        result
    }

    /// Serialize the parameter set
    pub fn get_state(&self) -> std::result::Result<Vec<u8>, StateError> {
        self.params.save_state()
    }

    /// Restore the parameter set; malformed data leaves every value untouched
    pub fn set_state(&self, data: &[u8]) {
        match self.params.load_state(data) {
            Ok(()) => debug!(bytes = data.len(), "Processor state restored"),
            Err(e) => warn!(error = %e, "Ignoring unreadable processor state"),
        }
    }

    pub fn left_chain(&self) -> &FilterChain {
        &self.left
    }

    pub fn right_chain(&self) -> &FilterChain {
        &self.right
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("sample_rate", &self.sample_rate.get())
            .field("max_block_size", &self.max_block_size)
            .field("prepared", &self.is_prepared())
            .finish()
    }
}
