//! Base-N text to number conversion

use super::{BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::{EngineError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BaseNConverter {
    base: u32,
}

impl BaseNConverter {
    pub fn new(base: u32) -> Self {
        Self { base }
    }

    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        let base = params.optional_u64("base")?.unwrap_or(8);
        if !(2..=36).contains(&base) {
            return Err(params.invalid(format!("'base' must be between 2 and 36, got {}", base)));
        }
        Ok(Self::new(base as u32))
    }

    /// Parse `digits` in the configured base
    pub fn convert(&self, digits: &str) -> Result<i64> {
        i64::from_str_radix(digits.trim(), self.base).map_err(|e| {
            EngineError::MalformedInput(format!(
                "{:?} is not a base-{} number: {}",
                digits, self.base, e
            ))
        })
    }
}

impl BlockAlgorithm for BaseNConverter {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        let digits = match tick.value.as_str() {
            Some(text) => text.to_string(),
            // Numeric buses deliver "103" as 103.0
            None => match tick.value.as_f64() {
                Some(v) if v.fract() == 0.0 => format!("{}", v as i64),
                _ => {
                    return Err(EngineError::MalformedInput(format!(
                        "BaseNConverter.{} expects digits, got {}",
                        tick.input, tick.value
                    )))
                }
            },
        };
        let converted = self.convert(&digits)?;
        Ok(vec![Emission::output("numericConversion", converted as f64)])
    }
}
