//! Step change detection
//!
//! Compares every reading with the previous one and reports `isEdge = true`
//! when they differ by more than `threshold`, `false` otherwise. The first
//! reading has nothing to compare against and produces no output.

use super::{numeric_input, BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::Result;
use serde::Serialize;

/// Edge detection block state
#[derive(Debug, Clone, Serialize)]
pub struct EdgeDetection {
    threshold: f64,
    previous: Option<f64>,
}

impl EdgeDetection {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            previous: None,
        }
    }

    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        let threshold = params.f64("threshold")?;
        if !(threshold >= 0.0) {
            return Err(params.invalid(format!("'threshold' must not be negative, got {}", threshold)));
        }
        Ok(Self::new(threshold))
    }

    pub fn is_edge(&self, previous: f64, value: f64) -> bool {
        (value - previous).abs() > self.threshold
    }
}

impl BlockAlgorithm for EdgeDetection {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let value = numeric_input("EdgeDetection", tick)?;
        let previous = self.previous.replace(value);
        Ok(previous
            .map(|previous| {
                let edge = self.is_edge(previous, value);
                if edge {
                    log::trace!("EdgeDetection: {} -> {}", previous, value);
                }
                vec![Emission::output("isEdge", edge)]
            })
            .unwrap_or_default())
    }
}
