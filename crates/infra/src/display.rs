//! Fixed-rate response curve refresh
//!
//! [`ResponseTimer`] owns a [`ResponseCurveEngine`] on a tokio task, ticks it
//! at the configured refresh rate and publishes a [`CurveFrame`] whenever the
//! engine requests a redraw. Consumers watch the latest frame; frames are
//! coalesced, never queued.

use dualpeak_core::domain::response::ResponseCurveEngine;
use dualpeak_core::domain::settings::ChainSettings;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

/// One redraw of the response display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveFrame {
    /// Increments with every published frame
    pub sequence: u64,
    pub settings: ChainSettings,
    pub sample_rate: f64,
    /// Display-clamped magnitude in dB per pixel column
    pub magnitudes_db: Vec<f64>,
}

impl CurveFrame {
    fn capture(engine: &ResponseCurveEngine, width: usize, sequence: u64) -> Self {
        Self {
            sequence,
            settings: engine.settings(),
            sample_rate: engine.sample_rate(),
            magnitudes_db: engine.curve(width).iter().map(|p| p.display_db()).collect(),
        }
    }
}

/// Background task driving the response engine
pub struct ResponseTimer {
    frames: watch::Receiver<CurveFrame>,
    handle: JoinHandle<()>,
}

impl ResponseTimer {
    /// Spawn the timer on the current tokio runtime
    pub fn spawn(mut engine: ResponseCurveEngine, refresh_rate_hz: u32, width: usize) -> Self {
        let period = Duration::from_secs_f64(1.0 / refresh_rate_hz.max(1) as f64);
        let (tx, frames) = watch::channel(CurveFrame::capture(&engine, width, 0));

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sequence = 0;

            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    debug!("No curve subscribers left, stopping response timer");
                    break;
                }
                if engine.tick() {
                    sequence += 1;
                    trace!(sequence, "Publishing response frame");
                    tx.send_replace(CurveFrame::capture(&engine, width, sequence));
                }
            }
        });

        debug!(refresh_rate_hz, width, "Response timer started");
        Self { frames, handle }
    }

    /// Receiver for the latest frame
    pub fn subscribe(&self) -> watch::Receiver<CurveFrame> {
        self.frames.clone()
    }

    pub fn latest(&self) -> CurveFrame {
        self.frames.borrow().clone()
    }

    /// Abort the timer task, dropping the engine
    pub fn stop(self) {
        self.handle.abort();
        debug!("Response timer stopped");
    }
}
