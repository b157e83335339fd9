//! Time-at-level counter
//!
//! Reports, on every reading, how long the signal has continuously been at
//! level: at or above the threshold, or at or below it for the `below`
//! direction.

use super::{numeric_input, BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::{Result, Timestamp};
use serde::Serialize;

/// Which side of the threshold counts as "at level"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LevelDirection {
    /// `value >= threshold`
    Above,
    /// `value <= threshold`
    Below,
}

impl LevelDirection {
    /// Direction used when none is configured: below for negative thresholds
    pub fn from_threshold_sign(threshold: f64) -> Self {
        if threshold < 0.0 {
            LevelDirection::Below
        } else {
            LevelDirection::Above
        }
    }
}

/// Time-at-level block state
#[derive(Debug, Clone, Serialize)]
pub struct TimeAtLevelCounting {
    threshold: f64,
    direction: LevelDirection,
    level_start: Option<Timestamp>,
}

impl TimeAtLevelCounting {
    pub fn new(threshold: f64, direction: LevelDirection) -> Self {
        Self {
            threshold,
            direction,
            level_start: None,
        }
    }

    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        let threshold = params.f64("threshold")?;
        let direction = match params.optional_string("direction")?.as_deref() {
            None => LevelDirection::from_threshold_sign(threshold),
            Some(d) if d.eq_ignore_ascii_case("above") => LevelDirection::Above,
            Some(d) if d.eq_ignore_ascii_case("below") => LevelDirection::Below,
            Some(other) => {
                return Err(params.invalid(format!(
                    "direction must be 'above' or 'below', got {:?}",
                    other
                )))
            }
        };
        Ok(Self::new(threshold, direction))
    }

    pub fn direction(&self) -> LevelDirection {
        self.direction
    }

    fn at_level(&self, value: f64) -> bool {
        match self.direction {
            LevelDirection::Above => value >= self.threshold,
            LevelDirection::Below => value <= self.threshold,
        }
    }
}

impl BlockAlgorithm for TimeAtLevelCounting {
    fn evaluate(&mut self, ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let value = numeric_input("TimeAtLevelCounting", tick)?;
        let now = ctx.timestamp;

        let time_at_level = if self.at_level(value) {
            let start = *self.level_start.get_or_insert(now);
            now - start
        } else {
            self.level_start = None;
            0.0
        };

        Ok(vec![Emission::output("timeAtLevelOutput", time_at_level)])
    }
}
