//! Time-windowed low-pass filter
//!
//! Keeps the samples of the last `windowDurationSec` seconds and runs a
//! first-order RC recurrence over them on every input. The smoothing factor is
//! recomputed from the real spacing between samples, so irregular sampling is
//! handled. The whole filtered window is reported in the output properties
//! under `lowpassFilter`.

use super::{numeric_input, BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::{Properties, Result, Timestamp};
use serde::Serialize;
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Low-pass filter block state
#[derive(Debug, Clone, Serialize)]
pub struct LowpassFilter {
    cutoff: f64,
    window_duration: f64,
    /// RC time constant derived from the cutoff frequency
    time_constant: f64,
    window: VecDeque<(Timestamp, f64)>,
}

impl LowpassFilter {
    pub fn new(cutoff: f64, window_duration: f64) -> Self {
        Self {
            cutoff,
            window_duration,
            time_constant: 1.0 / (2.0 * PI * cutoff),
            window: VecDeque::new(),
        }
    }

    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        let cutoff = params.positive_f64("cutoff")?;
        let window_duration = params.positive_f64("windowDurationSec")?;
        Ok(Self::new(cutoff, window_duration))
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Number of samples currently retained
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Smoothing factor for a step of `dt` seconds
    fn alpha(&self, dt: f64) -> f64 {
        if dt <= 0.0 {
            0.0
        } else {
            dt / (self.time_constant + dt)
        }
    }

    /// Filter the retained window from its oldest sample
    pub fn filtered_window(&self) -> Vec<f64> {
        let mut filtered = Vec::with_capacity(self.window.len());
        let mut samples = self.window.iter();

        let Some(&(mut prev_t, first)) = samples.next() else {
            return filtered;
        };
        let mut y = first;
        filtered.push(y);

        for &(t, x) in samples {
            y += self.alpha(t - prev_t) * (x - y);
            filtered.push(y);
            prev_t = t;
        }
        filtered
    }
}

impl BlockAlgorithm for LowpassFilter {
    fn evaluate(&mut self, ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let value = numeric_input("LowpassFilter", tick)?;
        let now = ctx.timestamp;

        self.window.push_back((now, value));
        let horizon = now - self.window_duration;
        while matches!(self.window.front(), Some(&(t, _)) if t < horizon) {
            self.window.pop_front();
        }

        let filtered = self.filtered_window();
        let latest = filtered.last().copied().unwrap_or(value);
        log::trace!("LowpassFilter window of {} samples, latest {}", filtered.len(), latest);

        let mut properties = Properties::new();
        properties.insert("lowpassFilter".to_string(), serde_json::json!(filtered));
        Ok(vec![Emission::output_with("filtered", latest, properties)])
    }
}
