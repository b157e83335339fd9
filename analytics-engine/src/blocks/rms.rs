//! Root mean square over the last `setSize` readings

use super::{numeric_input, BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::Result;
use serde::Serialize;
use std::collections::VecDeque;

/// Count-windowed RMS block state
#[derive(Debug, Clone, Serialize)]
pub struct RootMeanSquare {
    set_size: usize,
    window: VecDeque<f64>,
}

impl RootMeanSquare {
    pub fn new(set_size: usize) -> Self {
        Self {
            set_size,
            window: VecDeque::with_capacity(set_size),
        }
    }

    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        let set_size = params
            .optional_u64("setSize")?
            .ok_or_else(|| params.invalid("missing required parameter 'setSize'"))?;
        if set_size == 0 {
            return Err(params.invalid("'setSize' must be at least 1"));
        }
        Ok(Self::new(set_size as usize))
    }

    /// RMS of the retained readings (NaN when empty)
    pub fn current(&self) -> f64 {
        if self.window.is_empty() {
            return f64::NAN;
        }
        let sum_of_squares: f64 = self.window.iter().map(|v| v * v).sum();
        (sum_of_squares / self.window.len() as f64).sqrt()
    }
}

impl BlockAlgorithm for RootMeanSquare {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let value = numeric_input("RootMeanSquare", tick)?;
        if self.window.len() == self.set_size {
            self.window.pop_front();
        }
        self.window.push_back(value);
        Ok(vec![Emission::output("rootMeanSquareOutput", self.current())])
    }
}
