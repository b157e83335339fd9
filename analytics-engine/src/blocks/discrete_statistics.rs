//! Windowed discrete statistics
//!
//! `value` is a continuous input: it only latches the current reading. The
//! `sample` pulse folds the latched reading into the window and reports the
//! window statistics; the `reset` pulse empties the window. A reset arriving at
//! the same timestamp as a sample keeps that sample as a one-element window.

use super::{numeric_input, BlockAlgorithm, BlockContext, Emission, Tick};
use crate::types::{EngineError, Result, Timestamp};
use serde::Serialize;

/// Running moments of the current window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    pub sum: f64,
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub sum_of_squares: f64,
}

impl Default for Moments {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum_of_squares: 0.0,
        }
    }
}

impl Moments {
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum_of_squares += value * value;
    }

    /// NaN for an empty window
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    /// Population standard deviation, NaN for an empty window
    pub fn standard_deviation(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        let mean = self.mean();
        // Rounding can push a zero variance slightly negative
        (self.sum_of_squares / self.count as f64 - mean * mean).max(0.0).sqrt()
    }

    fn extreme(&self, value: f64) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            value
        }
    }
}

/// Discrete statistics block state
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscreteStatistics {
    moments: Moments,
    /// Latest reading on the `value` input
    current: Option<f64>,
    /// Time and value of the last folded sample
    last_sample: Option<(Timestamp, f64)>,
}

impl DiscreteStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn moments(&self) -> &Moments {
        &self.moments
    }


    fn report(&self) -> Vec<Emission> {
        let m = &self.moments;
        vec![
            Emission::output("sum", m.sum),
            Emission::output("count", m.count as f64),
            Emission::output("min", m.extreme(m.min)),
            Emission::output("max", m.extreme(m.max)),
            Emission::output("mean", m.mean()),
            Emission::output("standardDeviation", m.standard_deviation()),
        ]
    }
}

impl BlockAlgorithm for DiscreteStatistics {
    fn evaluate(&mut self, ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        match tick.input {
            "value" => {
                self.current = Some(numeric_input("DiscreteStatistics", tick)?);
                Ok(Vec::new())
            }
            "sample" => {
                if !tick.value.as_bool() {
                    return Ok(Vec::new());
                }
                if let Some(value) = self.current {
                    self.moments.add(value);
                    self.last_sample = Some((ctx.timestamp, value));
                }
                Ok(self.report())
            }
            "reset" => {
                if !tick.value.as_bool() {
                    return Ok(Vec::new());
                }
                self.moments = Moments::default();
                if let Some((_, value)) = self.last_sample.filter(|(t, _)| *t == ctx.timestamp) {
                    self.moments.add(value);
                }
                Ok(self.report())
            }
            other => Err(EngineError::MalformedInput(format!(
                "DiscreteStatistics has no input '{}'",
                other
            ))),
        }
    }
}
