//! Core types for the analytics engine
//!
//! This module defines the values that flow through a deployed model: inbound
//! input events, outbound outputs, async signals, and the error type shared by
//! every component. Timestamps are logical seconds supplied by the event bus.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical timestamp in seconds (monotonic per model, never wall-clock)
pub type Timestamp = f64;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Auxiliary named fields carried alongside a value
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Errors that can occur while deploying models or delivering events
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid parameter for {block}: {reason}")]
    InvalidParameter { block: String, reason: String },

    #[error("Unknown block type: {0}")]
    UnknownBlockType(String),

    #[error("Model already deployed: {0}")]
    DuplicateModel(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown input '{input}' for model {model_id}")]
    UnknownInput { model_id: String, input: String },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Out-of-order event for model {model_id}: t={timestamp} is before t={last_seen}")]
    OutOfOrderEvent {
        model_id: String,
        timestamp: Timestamp,
        last_seen: Timestamp,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for building an `InvalidParameter` error
    pub fn invalid_parameter(block: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidParameter {
            block: block.into(),
            reason: reason.into(),
        }
    }

    /// True for errors that only affect a single event (the caller keeps going)
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownModel(_)
                | EngineError::UnknownInput { .. }
                | EngineError::MalformedInput(_)
                | EngineError::OutOfOrderEvent { .. }
        )
    }
}

/// A value carried by an input tick or an output
///
/// Pulses are plain `Boolean` values; only `true` triggers a pulse input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean value (also used for pulses)
    Boolean(bool),
    /// Floating-point value
    Float(f64),
    /// Text value
    Text(String),
    /// Nested structure (records, sequences, objects)
    Json(serde_json::Value),
}

impl Value {
    /// Numeric view of the value, if it has one
    ///
    /// Text is parsed so that loosely typed buses ("12.5") still feed numeric
    /// inputs.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Json(v) => v.as_f64(),
        }
    }

    /// Pulse view: true only for a truthy value
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Boolean(v) => *v,
            Value::Float(v) => *v != 0.0,
            Value::Text(s) => s.eq_ignore_ascii_case("true"),
            Value::Json(v) => v.as_bool().unwrap_or(false),
        }
    }

    /// Text view, for string inputs
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Json(serde_json::Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Type name used by the text output format
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Float(_) => "float",
            Value::Text(_) => "string",
            Value::Json(_) => "any",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Json(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

/// An inbound event from the host bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Logical time of the event
    pub timestamp: Timestamp,
    /// Target model
    #[serde(alias = "model")]
    pub model_id: String,
    /// Logical input name (resolved through the model's bindings)
    #[serde(alias = "input")]
    pub input_name: String,
    /// Input value
    pub value: Value,
    /// Optional auxiliary fields
    #[serde(default)]
    pub properties: Properties,
}

impl InputEvent {
    /// Create an input event without properties
    pub fn new(
        timestamp: Timestamp,
        model_id: impl Into<String>,
        input_name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            timestamp,
            model_id: model_id.into(),
            input_name: input_name.into(),
            value: value.into(),
            properties: Properties::new(),
        }
    }

    /// Builder method: attach properties
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// An outbound value produced by a block output slot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    /// Declared output slot name (e.g. `entered`, `sum`, `filtered`)
    pub output_id: String,
    /// Model that produced the output
    pub model_id: String,
    /// Block instance inside the model
    pub block_id: String,
    /// Correlation token of the run that produced the output
    pub correlation_id: String,
    /// Timestamp of the triggering delivery
    pub timestamp: Timestamp,
    /// Output value
    pub value: Value,
    /// Auxiliary fields (e.g. the filtered window sequence)
    pub properties: Properties,
}

/// A broadcast-style signal between models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncSignal {
    /// Signal type receivers match on
    pub signal_type: String,
    /// Empty for a global signal, otherwise the id of the model it is scoped to
    #[serde(default)]
    pub scope: String,
    /// Correlation token
    #[serde(default)]
    pub correlation: String,
    /// Properties carried verbatim to receivers
    #[serde(default)]
    pub properties: Properties,
}

impl AsyncSignal {
    /// Create an unscoped signal with no properties
    pub fn new(signal_type: impl Into<String>) -> Self {
        Self {
            signal_type: signal_type.into(),
            scope: String::new(),
            correlation: String::new(),
            properties: Properties::new(),
        }
    }

    /// True if this signal is not restricted to one model
    pub fn is_global(&self) -> bool {
        self.scope.is_empty()
    }
}
