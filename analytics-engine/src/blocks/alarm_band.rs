//! Hysteresis alarm band
//!
//! Places every reading in one of three zones relative to an `[lower, upper]`
//! band and reports zone changes. The first reading only establishes the
//! starting zone.
//!
//! On a zone change all four outputs are emitted together:
//!
//! | output    | value                          |
//! |-----------|--------------------------------|
//! | `entered` | the new zone is the band       |
//! | `left`    | the previous zone was the band |
//! | `up`      | the new zone is above the band |
//! | `down`    | the new zone is below the band |

use super::{numeric_input, BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::Result;
use serde::Serialize;

/// Zone of a reading relative to the band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Zone {
    Below,
    InBand,
    Above,
}

/// Alarm band block state
#[derive(Debug, Clone, Serialize)]
pub struct AlarmBand {
    upper: f64,
    lower: f64,
    /// None until the first reading
    zone: Option<Zone>,
}

impl AlarmBand {
    /// Create a band; `upper` must be strictly greater than `lower`
    pub fn new(upper: f64, lower: f64) -> Self {
        Self {
            upper,
            lower,
            zone: None,
        }
    }

    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        let upper = params.f64("upper")?;
        let lower = params.f64("lower")?;
        if !(upper > lower) {
            return Err(params.invalid(format!(
                "upper ({}) must be greater than lower ({})",
                upper, lower
            )));
        }
        Ok(Self::new(upper, lower))
    }

    /// Current zone (None before the first reading)
    pub fn zone(&self) -> Option<Zone> {
        self.zone
    }

    /// Classify a reading
    pub fn classify(&self, value: f64) -> Zone {
        if value > self.upper {
            Zone::Above
        } else if value < self.lower {
            Zone::Below
        } else {
            Zone::InBand
        }
    }
}

impl BlockAlgorithm for AlarmBand {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let value = numeric_input("AlarmBand", tick)?;
        let new_zone = self.classify(value);

        let previous = match self.zone.replace(new_zone) {
            // First sample: placement only
            None => return Ok(Vec::new()),
            Some(previous) if previous == new_zone => return Ok(Vec::new()),
            Some(previous) => previous,
        };

        log::trace!("AlarmBand zone change {:?} -> {:?} at {}", previous, new_zone, value);

        Ok(vec![
            Emission::output("entered", new_zone == Zone::InBand),
            Emission::output("left", previous == Zone::InBand),
            Emission::output("up", new_zone == Zone::Above),
            Emission::output("down", new_zone == Zone::Below),
        ])
    }
}
