//! Typed access to block parameters
//!
//! Deployment descriptors carry parameters as a loosely typed JSON map (the
//! bus often sends booleans and numbers as strings). Every accessor validates
//! and converts, reporting `InvalidParameter` with the block name.

use crate::types::{EngineError, Properties, Result};
use serde_json::Value as Json;

/// Read-only view over a block's parameter map
pub struct Parameters<'a> {
    block: &'static str,
    values: &'a Properties,
}

impl<'a> Parameters<'a> {
    pub fn new(block: &'static str, values: &'a Properties) -> Self {
        Self { block, values }
    }

    /// Build an `InvalidParameter` error for this block
    pub fn invalid(&self, reason: impl Into<String>) -> EngineError {
        EngineError::invalid_parameter(self.block, reason)
    }

    fn get(&self, name: &str) -> Option<&'a Json> {
        self.values.get(name).filter(|v| !v.is_null())
    }

    /// Optional float parameter (numbers or numeric strings)
    pub fn optional_f64(&self, name: &str) -> Result<Option<f64>> {
        match self.get(name) {
            None => Ok(None),
            Some(Json::Number(n)) => Ok(n.as_f64()),
            Some(Json::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| self.invalid(format!("'{}' must be a number, got {:?}", name, s))),
            Some(other) => Err(self.invalid(format!("'{}' must be a number, got {}", name, other))),
        }
    }

    /// Required float parameter
    pub fn f64(&self, name: &str) -> Result<f64> {
        self.optional_f64(name)?
            .ok_or_else(|| self.invalid(format!("missing required parameter '{}'", name)))
    }

    /// Float parameter with a default
    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        Ok(self.optional_f64(name)?.unwrap_or(default))
    }

    /// Strictly positive, finite float parameter
    pub fn positive_f64(&self, name: &str) -> Result<f64> {
        let value = self.f64(name)?;
        if !value.is_finite() || value <= 0.0 {
            return Err(self.invalid(format!("'{}' must be > 0, got {}", name, value)));
        }
        Ok(value)
    }

    /// Optional non-negative integer parameter
    pub fn optional_u64(&self, name: &str) -> Result<Option<u64>> {
        match self.optional_f64(name)? {
            None => Ok(None),
            Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 => Ok(Some(v as u64)),
            Some(v) => Err(self.invalid(format!("'{}' must be a non-negative integer, got {}", name, v))),
        }
    }

    /// Boolean parameter with a default ("true"/"false" strings accepted)
    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(Json::Bool(b)) => Ok(*b),
            Some(Json::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(format!("'{}' must be a boolean, got {:?}", name, s))),
            },
            Some(other) => Err(self.invalid(format!("'{}' must be a boolean, got {}", name, other))),
        }
    }

    /// Optional string parameter (numbers and booleans are stringified)
    pub fn optional_string(&self, name: &str) -> Result<Option<String>> {
        match self.get(name) {
            None => Ok(None),
            Some(Json::String(s)) => Ok(Some(s.clone())),
            Some(Json::Number(n)) => Ok(Some(n.to_string())),
            Some(Json::Bool(b)) => Ok(Some(b.to_string())),
            Some(other) => Err(self.invalid(format!("'{}' must be a string, got {}", name, other))),
        }
    }

    /// String parameter with a default
    pub fn string_or(&self, name: &str, default: &str) -> Result<String> {
        Ok(self.optional_string(name)?.unwrap_or_else(|| default.to_string()))
    }

    /// Non-empty delimiter string
    pub fn delimiter_or(&self, name: &str, default: &str) -> Result<String> {
        let value = self.string_or(name, default)?;
        if value.is_empty() {
            return Err(self.invalid(format!("'{}' must not be empty", name)));
        }
        Ok(value)
    }
}
