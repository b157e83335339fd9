//! Running sum that also reports the previous sum

use super::{numeric_input, BlockAlgorithm, BlockContext, Emission, Tick};
use crate::types::{EngineError, Result};
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SumLast {
    sum: f64,
    last: f64,
}

impl SumLast {
    pub fn new() -> Self {
        Self::default()
    }

    fn report(&self) -> Vec<Emission> {
        vec![
            Emission::output("sum", self.sum),
            Emission::output("lastValue", self.last),
        ]
    }
}

impl BlockAlgorithm for SumLast {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        match tick.input {
            "value" => {
                let value = numeric_input("SumLast", tick)?;
                self.last = self.sum;
                self.sum += value;
                Ok(self.report())
            }
            "reset" if tick.value.as_bool() => {
                self.sum = 0.0;
                Ok(self.report())
            }
            "reset" => Ok(Vec::new()),
            other => Err(EngineError::MalformedInput(format!("SumLast has no input '{}'", other))),
        }
    }
}
