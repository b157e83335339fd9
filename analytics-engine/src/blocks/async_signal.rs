//! Async signal fan-out
//!
//! `SendAsyncSignal` puts a typed signal on the bus when its `send` pulse
//! fires; `ReceiveAsyncSignal` blocks in any deployed model pick it up and
//! emit a `true` pulse with the signal's properties attached verbatim.

use super::{BlockAlgorithm, BlockContext, Emission, Parameters, Tick};
use crate::types::{AsyncSignal, EngineError, Properties, Result, Value};
use serde::Serialize;

fn signal_type(params: &Parameters<'_>) -> Result<String> {
    let signal_type = params
        .optional_string("signalType")?
        .ok_or_else(|| params.invalid("missing required parameter 'signalType'"))?;
    if signal_type.trim().is_empty() {
        return Err(params.invalid("'signalType' must not be empty"));
    }
    Ok(signal_type)
}

/// Sender block state
#[derive(Debug, Clone, Serialize)]
pub struct SendAsyncSignal {
    signal_type: String,
    scope_to_model: bool,
    /// Properties latched from the `params` input
    properties: Properties,
    sent: u64,
}

impl SendAsyncSignal {
    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        Ok(Self {
            signal_type: signal_type(params)?,
            scope_to_model: params.bool_or("scopeToModel", false)?,
            properties: Properties::new(),
            sent: 0,
        })
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl BlockAlgorithm for SendAsyncSignal {
    fn evaluate(&mut self, ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        match tick.input {
            "params" => {
                self.properties = tick.properties.clone();
                Ok(Vec::new())
            }
            "send" => {
                if !tick.value.as_bool() {
                    return Ok(Vec::new());
                }
                self.sent += 1;
                let scope = if self.scope_to_model {
                    ctx.model_id.to_string()
                } else {
                    String::new()
                };
                log::debug!(
                    "Model {} sends signal '{}' (scope {:?})",
                    ctx.model_id,
                    self.signal_type,
                    scope
                );
                Ok(vec![Emission::Signal(AsyncSignal {
                    signal_type: self.signal_type.clone(),
                    scope,
                    correlation: ctx.correlation_id.to_string(),
                    properties: self.properties.clone(),
                })])
            }
            other => Err(EngineError::MalformedInput(format!(
                "SendAsyncSignal has no input '{}'",
                other
            ))),
        }
    }
}

/// Receiver block state
#[derive(Debug, Clone, Serialize)]
pub struct ReceiveAsyncSignal {
    signal_type: String,
    scope_to_model: bool,
    received: u64,
}

impl ReceiveAsyncSignal {
    pub(crate) fn from_params(params: &Parameters<'_>) -> Result<Self> {
        Ok(Self {
            signal_type: signal_type(params)?,
            scope_to_model: params.bool_or("scopeToModel", false)?,
            received: 0,
        })
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Global signals reach unscoped receivers; scoped signals only reach
    /// receivers of the model they are scoped to.
    pub fn matches(&self, model_id: &str, signal: &AsyncSignal) -> bool {
        if signal.signal_type != self.signal_type {
            return false;
        }
        if signal.is_global() {
            !self.scope_to_model
        } else {
            signal.scope == model_id
        }
    }
}

impl BlockAlgorithm for ReceiveAsyncSignal {
    fn evaluate(&mut self, _ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        Err(EngineError::MalformedInput(format!(
            "ReceiveAsyncSignal has no input '{}'",
            tick.input
        )))
    }

    fn on_signal(&mut self, ctx: &BlockContext<'_>, signal: &AsyncSignal) -> Vec<Emission> {
        if !self.matches(ctx.model_id, signal) {
            return Vec::new();
        }
        self.received += 1;
        vec![Emission::output_with(
            "value",
            Value::Boolean(true),
            signal.properties.clone(),
        )]
    }
}
