//! Evaluation scheduler
//!
//! The [`ModelRegistry`] owns every deployed model. A [`Scheduler`] borrows a
//! registry for the duration of a run and routes events into it:
//!
//! 1. the event is handed to its model, which checks the timestamp against
//!    the model clock and evaluates the bound blocks
//! 2. async signals the model emitted are queued
//! 3. once the originating model is done, each queued signal is offered to
//!    every model with a matching receiver, in model id order; signals those
//!    receivers emit are queued in turn, up to `max_signal_depth` rounds
//!
//! No model is re-entered while it is being evaluated.

use crate::config::EngineConfig;
use crate::model::{Evaluation, ModelDescriptor, ModelInstance};
use crate::types::{AsyncSignal, EngineError, InputEvent, Output, Result, Timestamp};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

/// Deployed models by id
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelInstance>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and register a model
    ///
    /// Nothing is registered if any block fails to build.
    ///
    /// # Errors
    /// * `DuplicateModel` if `model_id` is already deployed
    /// * any creation error of [`ModelInstance::create`]
    pub fn deploy(&mut self, model_id: &str, descriptor: &ModelDescriptor) -> Result<()> {
        if self.models.contains_key(model_id) {
            return Err(EngineError::DuplicateModel(model_id.to_string()));
        }
        let model = ModelInstance::create(model_id, descriptor)?;
        log::info!("Deployed model {} ({} blocks)", model_id, model.store().len());
        self.models.insert(model_id.to_string(), model);
        Ok(())
    }

    /// Remove a model and drop its state
    pub fn undeploy(&mut self, model_id: &str) -> Result<ModelInstance> {
        let model = self
            .models
            .remove(model_id)
            .ok_or_else(|| EngineError::UnknownModel(model_id.to_string()))?;
        log::info!("Undeployed model {}", model_id);
        Ok(model)
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelInstance> {
        self.models.get(model_id)
    }

    pub fn get_mut(&mut self, model_id: &str) -> Option<&mut ModelInstance> {
        self.models.get_mut(model_id)
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.models.contains_key(model_id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Deployed model ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

/// Outputs and signals produced by one delivery
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dispatch {
    /// Outputs of the addressed model, then of signal receivers
    pub outputs: Vec<Output>,
    /// Every async signal emitted during the delivery
    pub signals: Vec<AsyncSignal>,
}

/// Scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Events evaluated by a model
    pub delivered: usize,
    /// Events whose input name was not bound
    pub ignored: usize,
    /// Events that failed with a per-event error
    pub rejected: usize,
    /// Outputs produced
    pub outputs: usize,
    /// Async signals emitted or injected
    pub signals: usize,
}

/// Routes events into the models of a registry
pub struct Scheduler<'r> {
    registry: &'r mut ModelRegistry,
    config: EngineConfig,
    stats: SchedulerStats,
}

impl<'r> Scheduler<'r> {
    /// Create a scheduler over `registry`
    pub fn new(registry: &'r mut ModelRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            stats: SchedulerStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &*self.registry
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Deploy a model into the underlying registry
    pub fn deploy(&mut self, model_id: &str, descriptor: &ModelDescriptor) -> Result<()> {
        self.registry.deploy(model_id, descriptor)
    }

    /// Undeploy a model from the underlying registry
    pub fn undeploy(&mut self, model_id: &str) -> Result<()> {
        self.registry.undeploy(model_id).map(|_| ())
    }

    /// Deliver one event and return the outputs it produced
    ///
    /// # Errors
    /// * `UnknownModel`, `UnknownInput`, `MalformedInput`, `OutOfOrderEvent`
    ///   (per-event: the caller logs and continues)
    pub fn deliver(&mut self, event: &InputEvent) -> Result<Vec<Output>> {
        self.dispatch(event).map(|dispatch| dispatch.outputs)
    }

    /// Deliver one event, fan out the signals it emits and return everything
    /// produced
    pub fn dispatch(&mut self, event: &InputEvent) -> Result<Dispatch> {
        let result = self.evaluate_event(event);
        let evaluation = match result {
            Ok(evaluation) => evaluation,
            Err(e) => {
                self.stats.rejected += 1;
                return Err(e);
            }
        };

        let mut dispatch = Dispatch {
            outputs: evaluation.outputs,
            signals: Vec::new(),
        };
        self.fan_out(event.timestamp, evaluation.signals, &mut dispatch);
        self.stats.outputs += dispatch.outputs.len();
        Ok(dispatch)
    }

    fn evaluate_event(&mut self, event: &InputEvent) -> Result<Evaluation> {
        let model = self
            .registry
            .get_mut(&event.model_id)
            .ok_or_else(|| EngineError::UnknownModel(event.model_id.clone()))?;

        let bound = !model.bound_slots(&event.input_name).is_empty();
        let evaluation = model.deliver(event, &self.config.correlation_id, self.config.strict_inputs)?;
        if bound {
            self.stats.delivered += 1;
        } else {
            self.stats.ignored += 1;
        }
        log::debug!(
            "Model {} t={} {}: {} outputs, {} signals",
            event.model_id,
            event.timestamp,
            event.input_name,
            evaluation.outputs.len(),
            evaluation.signals.len()
        );
        Ok(evaluation)
    }

    /// Inject a signal from the bus and return the receiver outputs
    pub fn broadcast(&mut self, timestamp: Timestamp, signal: AsyncSignal) -> Vec<Output> {
        let mut dispatch = Dispatch::default();
        self.fan_out(timestamp, vec![signal], &mut dispatch);
        self.stats.outputs += dispatch.outputs.len();
        dispatch.outputs
    }

    fn fan_out(&mut self, timestamp: Timestamp, signals: Vec<AsyncSignal>, dispatch: &mut Dispatch) {
        let mut queue: VecDeque<(AsyncSignal, usize)> =
            signals.into_iter().map(|signal| (signal, 0)).collect();

        while let Some((signal, depth)) = queue.pop_front() {
            self.stats.signals += 1;
            let receivers: Vec<String> = self
                .registry
                .models
                .iter()
                .filter(|(_, model)| model.has_receivers(&signal))
                .map(|(id, _)| id.clone())
                .collect();
            log::debug!(
                "Signal '{}' (scope {:?}) reaches {} models",
                signal.signal_type,
                signal.scope,
                receivers.len()
            );

            for model_id in receivers {
                let Some(model) = self.registry.get_mut(&model_id) else {
                    continue;
                };
                match model.signal(timestamp, &signal, &self.config.correlation_id) {
                    Ok(evaluation) => {
                        dispatch.outputs.extend(evaluation.outputs);
                        for emitted in evaluation.signals {
                            if depth + 1 > self.config.max_signal_depth {
                                log::warn!(
                                    "Dropping signal '{}' from model {}: fan-out depth {} exceeded",
                                    emitted.signal_type,
                                    model_id,
                                    self.config.max_signal_depth
                                );
                                continue;
                            }
                            queue.push_back((emitted, depth + 1));
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "Model {} could not receive signal '{}': {}",
                            model_id,
                            signal.signal_type,
                            e
                        );
                    }
                }
            }
            dispatch.signals.push(signal);
        }
    }
}
