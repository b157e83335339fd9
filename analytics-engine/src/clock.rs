//! Per-model logical clock
//!
//! Tracks the latest timestamp a model has seen. Delivery never moves the
//! clock backwards; an earlier timestamp is reported back to the caller so it
//! can be rejected.

use crate::types::{EngineError, Result, Timestamp};

/// Logical clock of one model instance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventClock {
    now: Option<Timestamp>,
}

impl EventClock {
    /// Create a clock that has not seen any event yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Current logical time (None before the first event)
    pub fn now(&self) -> Option<Timestamp> {
        self.now
    }

    /// Check that `t` may be delivered without moving the clock
    ///
    /// # Errors
    /// * `MalformedInput` if `t` is negative, NaN or infinite
    /// * `OutOfOrderEvent` if `t` is strictly before the current time
    pub fn check(&self, model_id: &str, t: Timestamp) -> Result<()> {
        if !t.is_finite() || t < 0.0 {
            return Err(EngineError::MalformedInput(format!(
                "timestamp {} for model {} is not a finite non-negative number",
                t, model_id
            )));
        }

        match self.now {
            Some(last_seen) if t < last_seen => Err(EngineError::OutOfOrderEvent {
                model_id: model_id.to_string(),
                timestamp: t,
                last_seen,
            }),
            _ => Ok(()),
        }
    }

    /// Advance the clock to `t` (equal timestamps are allowed)
    pub fn advance(&mut self, model_id: &str, t: Timestamp) -> Result<()> {
        self.check(model_id, t)?;
        self.now = Some(t);
        Ok(())
    }
}
