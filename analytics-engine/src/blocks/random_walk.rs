//! Two-dimensional random walk driven by a trigger pulse

use super::{BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RandomWalk2D {
    x: f64,
    y: f64,
    step_size: f64,
    #[serde(skip)]
    rng: StdRng,
}

impl RandomWalk2D {
    pub fn new(x: f64, y: f64, step_size: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { x, y, step_size, rng }
    }

    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        let step_size = params.f64_or("stepSize", 1.0)?;
        if !step_size.is_finite() || step_size <= 0.0 {
            return Err(params.invalid(format!("'stepSize' must be > 0, got {}", step_size)));
        }
        Ok(Self::new(
            params.f64_or("startingXPosition", 0.0)?,
            params.f64_or("startingYPosition", 0.0)?,
            step_size,
            params.optional_u64("seed")?,
        ))
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl BlockAlgorithm for RandomWalk2D {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        if !tick.value.as_bool() {
            return Ok(Vec::new());
        }
        let s = self.step_size;
        self.x += self.rng.gen_range(-s..=s);
        self.y += self.rng.gen_range(-s..=s);
        Ok(vec![
            Emission::output("currentXPosition", self.x),
            Emission::output("currentYPosition", self.y),
        ])
    }
}
