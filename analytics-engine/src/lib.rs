//! Streaming Block Analytics Engine
//!
//! Evaluates small stateful blocks against a stream of timestamped input
//! events and produces timestamped outputs.
//!
//! # Architecture
//!
//! - Models are deployed from a [`ModelDescriptor`] into a [`ModelRegistry`]
//! - A [`Scheduler`] routes each [`InputEvent`] to its model, runs the bound
//!   blocks in wiring order and returns the [`Output`]s
//! - Async signals emitted by sender blocks are fanned out to receiver blocks
//!   of every deployed model once the originating evaluation is finished
//! - An [`OutputEmitter`] writes outputs as JSON lines or text
//!
//! The engine does NOT:
//! - Persist block state or configuration
//! - Talk to a transport; events come in and outputs go out as values
//!
//! # Example Usage
//!
//! ```
//! use analytics_engine::{EngineConfig, InputEvent, ModelDescriptor, ModelRegistry, Scheduler};
//! use serde_json::json;
//!
//! let mut registry = ModelRegistry::new();
//! let params = json!({"upper": 10.0, "lower": 5.0});
//! let descriptor = ModelDescriptor::single("AlarmBand", params.as_object().cloned().unwrap());
//! registry.deploy("model_0", &descriptor).unwrap();
//!
//! let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());
//! scheduler.deliver(&InputEvent::new(1.0, "model_0", "value", 3.0)).unwrap();
//! let outputs = scheduler.deliver(&InputEvent::new(2.0, "model_0", "value", 6.0)).unwrap();
//!
//! let entered = outputs.iter().find(|o| o.output_id == "entered").unwrap();
//! assert!(entered.value.as_bool());
//! ```

pub mod blocks;
pub mod clock;
pub mod config;
pub mod emitter;
pub mod model;
pub mod scheduler;
pub mod state;
pub mod types;

pub use blocks::{Block, BlockKind};
pub use clock::EventClock;
pub use config::EngineConfig;
pub use emitter::{OutputEmitter, OutputFormat};
pub use model::{BlockDescriptor, Evaluation, InputTarget, ModelDescriptor, ModelInstance, Wire};
pub use scheduler::{Dispatch, ModelRegistry, Scheduler, SchedulerStats};
pub use state::{BlockId, StateStore};
pub use types::{
    AsyncSignal, EngineError, InputEvent, Output, Properties, Result, Timestamp, Value,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
