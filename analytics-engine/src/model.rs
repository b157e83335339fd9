//! Model graph
//!
//! A deployed model is a fixed set of block instances plus two kinds of
//! wiring:
//! - input bindings, mapping logical input names of the event bus to block
//!   input slots
//! - wires, feeding a block output slot into a downstream block input slot
//!
//! Every declared block input that is not fed by a wire is bound by default
//! under its own slot name, so a single-block model receives `value` ticks
//! without any binding configuration. Descriptors can rebind a slot to a
//! different logical name or drop names entirely.
//!
//! Evaluation runs blocks in topological order of the wires, so a downstream
//! block always sees the outputs its upstream blocks produced for the same
//! delivery.

use crate::blocks::{Block, BlockContext, BlockKind, Emission, Tick};
use crate::clock::EventClock;
use crate::state::{BlockId, StateStore};
use crate::types::{
    AsyncSignal, EngineError, InputEvent, Output, Properties, Result, Timestamp, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One block of a deployment descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Block id, unique within the model
    pub id: String,
    /// Block type name, optionally fully qualified
    #[serde(rename = "type")]
    pub block_type: String,
    /// Raw parameter map, validated at deploy
    #[serde(default)]
    pub parameters: Properties,
}

/// A block input slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTarget {
    pub block: String,
    pub input: String,
}

/// Connection from a block output to a downstream block input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub from_block: String,
    pub output: String,
    pub to_block: String,
    pub input: String,
}

/// Deployment descriptor of one model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub blocks: Vec<BlockDescriptor>,
    /// Logical input name -> block slot overrides
    #[serde(default)]
    pub input_bindings: BTreeMap<String, InputTarget>,
    /// Logical input names removed from binding
    #[serde(default)]
    pub unbound_inputs: Vec<String>,
    #[serde(default)]
    pub wires: Vec<Wire>,
}

impl ModelDescriptor {
    /// Create an empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor of a model made of one block, with the block id equal to
    /// its short type name
    pub fn single(block_type: &str, parameters: Properties) -> Self {
        let id = block_type.rsplit('.').next().unwrap_or(block_type);
        Self::new().with_block(id, block_type, parameters)
    }

    /// Builder method: add a block
    pub fn with_block(
        mut self,
        id: impl Into<String>,
        block_type: impl Into<String>,
        parameters: Properties,
    ) -> Self {
        self.blocks.push(BlockDescriptor {
            id: id.into(),
            block_type: block_type.into(),
            parameters,
        });
        self
    }

    /// Builder method: bind a logical input name to a block slot
    pub fn bind(mut self, name: impl Into<String>, block: impl Into<String>, input: impl Into<String>) -> Self {
        self.input_bindings.insert(
            name.into(),
            InputTarget {
                block: block.into(),
                input: input.into(),
            },
        );
        self
    }

    /// Builder method: remove a logical input name from binding
    pub fn unbind(mut self, name: impl Into<String>) -> Self {
        self.unbound_inputs.push(name.into());
        self
    }

    /// Builder method: wire `from.output` into `to.input`
    pub fn wire(
        mut self,
        from_block: impl Into<String>,
        output: impl Into<String>,
        to_block: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        self.wires.push(Wire {
            from_block: from_block.into(),
            output: output.into(),
            to_block: to_block.into(),
            input: input.into(),
        });
        self
    }
}

/// A resolved block input slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub block: BlockId,
    pub input: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedWire {
    from: BlockId,
    output: &'static str,
    to: Slot,
}

/// Result of one evaluation of a model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// Outputs in emission order
    pub outputs: Vec<Output>,
    /// Async signals emitted by sender blocks
    pub signals: Vec<AsyncSignal>,
}

enum Pending {
    Tick {
        input: &'static str,
        value: Value,
        properties: Properties,
        wired: bool,
    },
    Signal,
}

/// A deployed model: blocks, wiring and logical clock
#[derive(Debug, Clone)]
pub struct ModelInstance {
    id: String,
    store: StateStore,
    bindings: BTreeMap<String, Vec<Slot>>,
    wires: Vec<ResolvedWire>,
    /// Blocks in evaluation order
    order: Vec<BlockId>,
    clock: EventClock,
}

fn declared_input(kind: BlockKind, input: &str) -> Option<&'static str> {
    kind.inputs().iter().copied().find(|i| *i == input)
}

fn declared_output(kind: BlockKind, output: &str) -> Option<&'static str> {
    kind.outputs().iter().copied().find(|o| *o == output)
}

impl ModelInstance {
    /// Build a model from its descriptor
    ///
    /// # Errors
    /// * `UnknownBlockType` for an unsupported block type
    /// * `InvalidParameter` for bad block parameters, duplicate block ids,
    ///   bindings or wires naming unknown blocks or slots, and wiring cycles
    pub fn create(model_id: &str, descriptor: &ModelDescriptor) -> Result<Self> {
        let mut store = StateStore::new();
        for block in &descriptor.blocks {
            let kind = BlockKind::from_type_name(&block.block_type)
                .ok_or_else(|| EngineError::UnknownBlockType(block.block_type.clone()))?;
            let instance = Block::create(kind, &block.parameters)?;
            if store.insert(block.id.clone(), instance).is_none() {
                return Err(EngineError::invalid_parameter(
                    block.id.clone(),
                    format!("duplicate block id in model {}", model_id),
                ));
            }
        }

        let wires = Self::resolve_wires(&store, &descriptor.wires)?;
        let order = Self::topological_order(&store, &wires)?;
        let bindings = Self::resolve_bindings(&store, &wires, descriptor)?;

        log::debug!(
            "Model {}: {} blocks, {} bound inputs, {} wires",
            model_id,
            store.len(),
            bindings.len(),
            wires.len()
        );

        Ok(Self {
            id: model_id.to_string(),
            store,
            bindings,
            wires,
            order,
            clock: EventClock::new(),
        })
    }

    fn lookup(store: &StateStore, block: &str, context: &str) -> Result<(BlockId, BlockKind)> {
        let id = store
            .by_name(block)
            .ok_or_else(|| EngineError::invalid_parameter(context, format!("unknown block '{}'", block)))?;
        let kind = store
            .get(id)
            .map(|slot| slot.kind())
            .ok_or_else(|| EngineError::invalid_parameter(context, format!("unknown block '{}'", block)))?;
        Ok((id, kind))
    }

    fn resolve_wires(store: &StateStore, wires: &[Wire]) -> Result<Vec<ResolvedWire>> {
        wires
            .iter()
            .map(|wire| {
                let context = format!(
                    "wire {}.{} -> {}.{}",
                    wire.from_block, wire.output, wire.to_block, wire.input
                );
                let (from, from_kind) = Self::lookup(store, &wire.from_block, &context)?;
                let (to, to_kind) = Self::lookup(store, &wire.to_block, &context)?;
                let output = declared_output(from_kind, &wire.output).ok_or_else(|| {
                    EngineError::invalid_parameter(
                        context.as_str(),
                        format!("{} has no output '{}'", from_kind, wire.output),
                    )
                })?;
                let input = declared_input(to_kind, &wire.input).ok_or_else(|| {
                    EngineError::invalid_parameter(
                        context.as_str(),
                        format!("{} has no input '{}'", to_kind, wire.input),
                    )
                })?;
                Ok(ResolvedWire {
                    from,
                    output,
                    to: Slot { block: to, input },
                })
            })
            .collect()
    }

    /// Kahn's algorithm, ties broken by declaration order
    fn topological_order(store: &StateStore, wires: &[ResolvedWire]) -> Result<Vec<BlockId>> {
        let n = store.len();
        let mut indegree = vec![0usize; n];
        for wire in wires {
            indegree[wire.to.block.0] += 1;
        }

        let mut order = Vec::with_capacity(n);
        let mut done = vec![false; n];
        while order.len() < n {
            let next = (0..n).find(|&i| !done[i] && indegree[i] == 0);
            let Some(next) = next else {
                let stuck: Vec<&str> = store
                    .iter()
                    .filter(|(id, _)| !done[id.0])
                    .map(|(_, slot)| slot.name.as_str())
                    .collect();
                return Err(EngineError::invalid_parameter(
                    "wires",
                    format!("wiring cycle between blocks {:?}", stuck),
                ));
            };
            done[next] = true;
            order.push(BlockId(next));
            for wire in wires.iter().filter(|w| w.from.0 == next) {
                indegree[wire.to.block.0] -= 1;
            }
        }
        Ok(order)
    }

    fn resolve_bindings(
        store: &StateStore,
        wires: &[ResolvedWire],
        descriptor: &ModelDescriptor,
    ) -> Result<BTreeMap<String, Vec<Slot>>> {
        let mut bindings: BTreeMap<String, Vec<Slot>> = BTreeMap::new();

        // Default: every unwired declared input under its own name
        for (id, slot) in store.iter() {
            for &input in slot.kind().inputs() {
                let target = Slot { block: id, input };
                if wires.iter().any(|w| w.to == target) {
                    continue;
                }
                bindings.entry(input.to_string()).or_default().push(target);
            }
        }

        for (name, target) in &descriptor.input_bindings {
            let context = format!("input binding '{}'", name);
            let (id, kind) = Self::lookup(store, &target.block, &context)?;
            let input = declared_input(kind, &target.input).ok_or_else(|| {
                EngineError::invalid_parameter(
                    context.as_str(),
                    format!("{} has no input '{}'", kind, target.input),
                )
            })?;
            let slot = Slot { block: id, input };

            // A slot answers to exactly one logical name
            for slots in bindings.values_mut() {
                slots.retain(|s| *s != slot);
            }
            bindings.entry(name.clone()).or_default().push(slot);
        }

        for name in &descriptor.unbound_inputs {
            bindings.remove(name);
        }
        bindings.retain(|_, slots| !slots.is_empty());
        Ok(bindings)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn clock(&self) -> &EventClock {
        &self.clock
    }

    /// Block slots bound to a logical input name
    pub fn bound_slots(&self, name: &str) -> &[Slot] {
        self.bindings.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Logical input names this model accepts
    pub fn input_names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// True if `name` is a bound logical name or a slot declared by any block
    pub fn declares_input(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
            || self.store.iter().any(|(_, slot)| slot.kind().has_input(name))
    }

    /// True if some receiver block of this model reacts to `signal`
    pub fn has_receivers(&self, signal: &AsyncSignal) -> bool {
        self.store
            .iter()
            .any(|(_, slot)| slot.block.receives(&self.id, signal))
    }

    /// Deliver one input event
    ///
    /// # Errors
    /// * `MalformedInput` for a bad timestamp or a value a block rejects
    /// * `OutOfOrderEvent` if the timestamp is before the model's clock
    /// * `UnknownInput` if `strict_inputs` is set and the name is unknown
    pub fn deliver(
        &mut self,
        event: &InputEvent,
        correlation_id: &str,
        strict_inputs: bool,
    ) -> Result<Evaluation> {
        self.clock.check(&self.id, event.timestamp)?;

        let slots = self.bound_slots(&event.input_name).to_vec();
        if slots.is_empty() {
            if strict_inputs && !self.declares_input(&event.input_name) {
                return Err(EngineError::UnknownInput {
                    model_id: self.id.clone(),
                    input: event.input_name.clone(),
                });
            }
            log::debug!(
                "Model {}: input '{}' is not bound, ignoring",
                self.id,
                event.input_name
            );
            self.clock.advance(&self.id, event.timestamp)?;
            return Ok(Evaluation::default());
        }

        // A value shared by several blocks is applied to all of them or to none
        let rollback = (slots.len() > 1).then(|| (self.store.clone(), self.clock.clone()));

        self.clock.advance(&self.id, event.timestamp)?;
        let mut pending = self.empty_pending();
        for slot in slots {
            pending[slot.block.0].push(Pending::Tick {
                input: slot.input,
                value: event.value.clone(),
                properties: event.properties.clone(),
                wired: false,
            });
        }

        let result = self.run(event.timestamp, correlation_id, pending, None);
        if result.is_err() {
            if let Some((store, clock)) = rollback {
                log::debug!(
                    "Model {}: input '{}' rejected, restoring block state",
                    self.id,
                    event.input_name
                );
                self.store = store;
                self.clock = clock;
            }
        }
        result
    }

    /// Offer a broadcast signal to every matching receiver of this model
    ///
    /// # Errors
    /// * `MalformedInput` for a bad timestamp
    /// * `OutOfOrderEvent` if the timestamp is before the model's clock
    pub fn signal(
        &mut self,
        timestamp: Timestamp,
        signal: &AsyncSignal,
        correlation_id: &str,
    ) -> Result<Evaluation> {
        self.clock.advance(&self.id, timestamp)?;

        let mut pending = self.empty_pending();
        for (id, slot) in self.store.iter() {
            if slot.block.receives(&self.id, signal) {
                pending[id.0].push(Pending::Signal);
            }
        }
        self.run(timestamp, correlation_id, pending, Some(signal))
    }

    fn empty_pending(&self) -> Vec<Vec<Pending>> {
        (0..self.store.len()).map(|_| Vec::new()).collect()
    }

    fn run(
        &mut self,
        timestamp: Timestamp,
        correlation_id: &str,
        mut pending: Vec<Vec<Pending>>,
        signal: Option<&AsyncSignal>,
    ) -> Result<Evaluation> {
        let mut evaluation = Evaluation::default();
        let order = self.order.clone();

        for id in order {
            let work = std::mem::take(&mut pending[id.0]);
            if work.is_empty() {
                continue;
            }
            let Some(slot) = self.store.get_mut(id) else {
                continue;
            };
            let ctx = BlockContext {
                model_id: &self.id,
                correlation_id,
                timestamp,
            };

            let mut emissions = Vec::new();
            for item in work {
                match item {
                    Pending::Tick {
                        input,
                        value,
                        properties,
                        wired,
                    } => {
                        let tick = Tick {
                            input,
                            value: &value,
                            properties: &properties,
                        };
                        log::trace!("Model {}: {}.{} <- {}", self.id, slot.name, input, value);
                        match slot.block.evaluate(&ctx, &tick) {
                            Ok(produced) => emissions.extend(produced),
                            Err(e) if wired => {
                                log::warn!(
                                    "Model {}: block {} rejected wired input {}: {}",
                                    self.id,
                                    slot.name,
                                    input,
                                    e
                                );
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    Pending::Signal => {
                        if let Some(signal) = signal {
                            emissions.extend(slot.block.on_signal(&ctx, signal));
                        }
                    }
                }
            }
            let block_name = slot.name.clone();
            self.store.touch(id, timestamp);

            for emission in emissions {
                match emission {
                    Emission::Output {
                        slot: output,
                        value,
                        properties,
                    } => {
                        for wire in self.wires.iter().filter(|w| w.from == id && w.output == output) {
                            pending[wire.to.block.0].push(Pending::Tick {
                                input: wire.to.input,
                                value: value.clone(),
                                properties: properties.clone(),
                                wired: true,
                            });
                        }
                        evaluation.outputs.push(Output {
                            output_id: output.to_string(),
                            model_id: self.id.clone(),
                            block_id: block_name.clone(),
                            correlation_id: correlation_id.to_string(),
                            timestamp,
                            value,
                            properties,
                        });
                    }
                    Emission::Signal(emitted) => evaluation.signals.push(emitted),
                }
            }
        }

        Ok(evaluation)
    }

    /// Serialize the model's block states for diagnostics
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "model_id": self.id,
            "clock": self.clock.now(),
            "blocks": self.store.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap_or_default()
    }

    fn values(evaluation: &Evaluation, output_id: &str) -> Vec<f64> {
        evaluation
            .outputs
            .iter()
            .filter(|o| o.output_id == output_id)
            .filter_map(|o| o.value.as_f64())
            .collect()
    }

    #[test]
    fn test_single_block_binds_declared_inputs() {
        let descriptor = ModelDescriptor::single(
            "apamax.analyticsbuilder.custom.AlarmBand",
            params(json!({"upper": 10.0, "lower": 5.0})),
        );
        let model = ModelInstance::create("model_0", &descriptor).unwrap();
        assert_eq!(model.input_names().collect::<Vec<_>>(), vec!["value"]);
        assert_eq!(model.bound_slots("value").len(), 1);
        assert_eq!(model.store().get(BlockId(0)).unwrap().name, "AlarmBand");
    }

    #[test]
    fn test_binding_override_and_unbind() {
        let descriptor = ModelDescriptor::new()
            .with_block("stats", "DiscreteStatistics", Properties::new())
            .bind("temperature", "stats", "value")
            .unbind("reset");
        let model = ModelInstance::create("m", &descriptor).unwrap();

        let names: Vec<_> = model.input_names().collect();
        assert_eq!(names, vec!["sample", "temperature"]);
        assert!(model.declares_input("reset"));
        assert!(!model.declares_input("pressure"));
    }

    #[test]
    fn test_unknown_block_type_rejected() {
        let descriptor = ModelDescriptor::single("CreateMultiMeasurement", Properties::new());
        assert!(matches!(
            ModelInstance::create("m", &descriptor),
            Err(EngineError::UnknownBlockType(_))
        ));
    }

    #[test]
    fn test_bad_binding_target_rejected() {
        let descriptor = ModelDescriptor::new()
            .with_block("sum", "SumLast", Properties::new())
            .bind("x", "sum", "sample");
        assert!(matches!(
            ModelInstance::create("m", &descriptor),
            Err(EngineError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_wire_cycle_rejected() {
        let descriptor = ModelDescriptor::new()
            .with_block("a", "SumLast", Properties::new())
            .with_block("b", "SumLast", Properties::new())
            .wire("a", "sum", "b", "value")
            .wire("b", "sum", "a", "value");
        let err = ModelInstance::create("m", &descriptor).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_wired_blocks_run_downstream() {
        // Declared out of order: the downstream block comes first
        let descriptor = ModelDescriptor::new()
            .with_block("rms", "RootMeanSquare", params(json!({"setSize": 2})))
            .with_block("sum", "SumLast", Properties::new())
            .wire("sum", "sum", "rms", "value");
        let mut model = ModelInstance::create("m", &descriptor).unwrap();

        // rms.value is wired, so only sum.value answers to "value"
        assert_eq!(model.bound_slots("value").len(), 1);

        let eval = model
            .deliver(&InputEvent::new(1.0, "m", "value", 3.0), "", false)
            .unwrap();
        assert_eq!(values(&eval, "sum"), vec![3.0]);
        assert_eq!(values(&eval, "rootMeanSquareOutput"), vec![3.0]);

        let eval = model
            .deliver(&InputEvent::new(2.0, "m", "value", 1.0), "", false)
            .unwrap();
        // rms of the running sums 3 and 4
        assert_eq!(values(&eval, "rootMeanSquareOutput"), vec![12.5f64.sqrt()]);
        let ids: Vec<_> = eval.outputs.iter().map(|o| o.block_id.as_str()).collect();
        assert_eq!(ids, vec!["sum", "sum", "rms"]);
    }

    #[test]
    fn test_unbound_input_ignored_and_strict_rejects() {
        let descriptor = ModelDescriptor::single("SumLast", Properties::new());
        let mut model = ModelInstance::create("m", &descriptor).unwrap();

        let eval = model
            .deliver(&InputEvent::new(1.0, "m", "bogus", 1.0), "", false)
            .unwrap();
        assert!(eval.outputs.is_empty());
        assert_eq!(model.clock().now(), Some(1.0));

        assert!(matches!(
            model.deliver(&InputEvent::new(2.0, "m", "bogus", 1.0), "", true),
            Err(EngineError::UnknownInput { .. })
        ));
        assert_eq!(model.clock().now(), Some(1.0));
    }

    #[test]
    fn test_out_of_order_touches_nothing() {
        let descriptor = ModelDescriptor::single("SumLast", Properties::new());
        let mut model = ModelInstance::create("m", &descriptor).unwrap();
        model
            .deliver(&InputEvent::new(5.0, "m", "value", 2.0), "", false)
            .unwrap();

        let err = model
            .deliver(&InputEvent::new(4.0, "m", "value", 2.0), "", false)
            .unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrderEvent { .. }));

        let eval = model
            .deliver(&InputEvent::new(5.0, "m", "value", 1.0), "", false)
            .unwrap();
        assert_eq!(values(&eval, "sum"), vec![3.0]);
        assert_eq!(
            model.store().get(BlockId(0)).unwrap().last_event_time,
            Some(5.0)
        );
    }

    #[test]
    fn test_shared_input_rejected_by_one_block_changes_nothing() {
        let descriptor = ModelDescriptor::new()
            .with_block("band", "AlarmBand", params(json!({"upper": 10.0, "lower": 5.0})))
            .with_block("sum", "SumLast", Properties::new())
            .with_block("writer", "CSVWriter", Properties::new());
        let mut model = ModelInstance::create("m", &descriptor).unwrap();
        assert_eq!(model.bound_slots("value").len(), 3);

        model
            .deliver(&InputEvent::new(1.0, "m", "value", 3.0), "", false)
            .unwrap_err();
        assert!(matches!(
            model.deliver(&InputEvent::new(2.0, "m", "value", 7.0), "", false),
            Err(EngineError::MalformedInput(_))
        ));

        assert_eq!(model.clock().now(), None);
        assert_eq!(model.store().stats().num_touched, 0);
        let snapshot = model.snapshot();
        assert_eq!(snapshot["blocks"][1]["block"]["state"]["sum"], 0.0);
        assert_eq!(snapshot["blocks"][0]["block"]["state"]["zone"], serde_json::Value::Null);
    }

    #[test]
    fn test_outputs_carry_correlation_id() {
        let descriptor = ModelDescriptor::single("SumLast", Properties::new());
        let mut model = ModelInstance::create("m", &descriptor).unwrap();
        let eval = model
            .deliver(&InputEvent::new(1.0, "m", "value", 2.0), "run-7", false)
            .unwrap();
        assert!(eval.outputs.iter().all(|o| o.correlation_id == "run-7"));
    }

    #[test]
    fn test_signal_reaches_receiver_and_wires() {
        let descriptor = ModelDescriptor::new()
            .with_block("sum", "SumLast", Properties::new())
            .with_block("rx", "ReceiveAsyncSignal", params(json!({"signalType": "Reset"})))
            .wire("rx", "value", "sum", "reset");
        let mut model = ModelInstance::create("m", &descriptor).unwrap();

        model
            .deliver(&InputEvent::new(1.0, "m", "value", 7.0), "", false)
            .unwrap();
        let signal = AsyncSignal::new("Reset");
        assert!(model.has_receivers(&signal));

        let eval = model.signal(2.0, &signal, "").unwrap();
        let ids: Vec<_> = eval.outputs.iter().map(|o| o.output_id.as_str()).collect();
        assert_eq!(ids, vec!["value", "sum", "lastValue"]);
        assert_eq!(values(&eval, "sum"), vec![0.0]);
    }
}
