// End-to-end scenarios driven through the public scheduler API
use analytics_engine::{
    AsyncSignal, EngineConfig, EngineError, InputEvent, ModelDescriptor, ModelRegistry, Output,
    Properties, Scheduler, Value,
};
use serde_json::json;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn params(value: serde_json::Value) -> Properties {
    value.as_object().cloned().unwrap_or_default()
}

/// Outputs of one delivery as (output_id, bool) pairs
fn flags(outputs: &[Output]) -> Vec<(String, bool)> {
    outputs
        .iter()
        .map(|o| (o.output_id.clone(), o.value.as_bool()))
        .collect()
}

fn flag(outputs: &[Output], id: &str) -> Option<bool> {
    outputs
        .iter()
        .find(|o| o.output_id == id)
        .map(|o| o.value.as_bool())
}

#[test]
fn test_alarm_band_reference_scenario() {
    init_logging();
    let mut registry = ModelRegistry::new();
    registry
        .deploy(
            "model_0",
            &ModelDescriptor::single("AlarmBand", params(json!({"upper": 10.0, "lower": 5.0}))),
        )
        .unwrap();
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());

    let readings = [3.0, 5.5, 7.5, 12.0, 6.0, 3.0];
    let outputs: Vec<Vec<Output>> = readings
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            scheduler
                .deliver(&InputEvent::new((i + 1) as f64, "model_0", "value", v))
                .unwrap()
        })
        .collect();

    // t=1: placement only
    assert!(outputs[0].is_empty());
    // t=2: into the band
    assert_eq!(flag(&outputs[1], "entered"), Some(true));
    assert_eq!(flag(&outputs[1], "left"), Some(false));
    // t=3: no change
    assert!(outputs[2].is_empty());
    // t=4: out of the top
    assert_eq!(flag(&outputs[3], "left"), Some(true));
    assert_eq!(flag(&outputs[3], "up"), Some(true));
    assert_eq!(flag(&outputs[3], "entered"), Some(false));
    // t=5: back in
    assert_eq!(flag(&outputs[4], "entered"), Some(true));
    assert_eq!(flag(&outputs[4], "down"), Some(false));
    // t=6: out of the bottom
    assert_eq!(flag(&outputs[5], "left"), Some(true));
    assert_eq!(flag(&outputs[5], "down"), Some(true));

    assert_eq!(
        flags(&outputs[5]),
        vec![
            ("entered".to_string(), false),
            ("left".to_string(), true),
            ("up".to_string(), false),
            ("down".to_string(), true),
        ]
    );
    assert!(outputs.iter().flatten().all(|o| o.timestamp >= 2.0 && o.model_id == "model_0"));
}

#[test]
fn test_models_are_isolated() {
    let mut registry = ModelRegistry::new();
    let descriptor = ModelDescriptor::single("SumLast", Properties::new());
    registry.deploy("a", &descriptor).unwrap();
    registry.deploy("b", &descriptor).unwrap();
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());

    scheduler.deliver(&InputEvent::new(10.0, "a", "value", 5.0)).unwrap();
    // "b" has its own clock: an earlier timestamp is fine there
    let outputs = scheduler.deliver(&InputEvent::new(1.0, "b", "value", 2.0)).unwrap();
    assert_eq!(outputs[0].value, Value::Float(2.0));

    let err = scheduler
        .deliver(&InputEvent::new(9.0, "a", "value", 1.0))
        .unwrap_err();
    assert!(matches!(err, EngineError::OutOfOrderEvent { .. }));
    assert!(err.is_per_event());
}

#[test]
fn test_malformed_events_are_rejected() {
    init_logging();
    let mut registry = ModelRegistry::new();
    registry
        .deploy("m", &ModelDescriptor::single("LowpassFilter", params(json!({"cutoff": 1.0, "windowDurationSec": 5.0}))))
        .unwrap();
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());

    assert!(matches!(
        scheduler.deliver(&InputEvent::new(-1.0, "m", "value", 1.0)),
        Err(EngineError::MalformedInput(_))
    ));
    assert!(matches!(
        scheduler.deliver(&InputEvent::new(f64::INFINITY, "m", "value", 1.0)),
        Err(EngineError::MalformedInput(_))
    ));
    assert!(matches!(
        scheduler.deliver(&InputEvent::new(1.0, "m", "value", "not a number")),
        Err(EngineError::MalformedInput(_))
    ));

    // The model keeps working after rejected events
    let outputs = scheduler.deliver(&InputEvent::new(2.0, "m", "value", 4.0)).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].properties["lowpassFilter"], json!([4.0]));
    assert_eq!(scheduler.stats().rejected, 3);
}

#[test]
fn test_strict_inputs() {
    let mut registry = ModelRegistry::new();
    registry
        .deploy("m", &ModelDescriptor::single("SumLast", Properties::new()))
        .unwrap();

    let mut lenient = Scheduler::new(&mut registry, EngineConfig::new());
    assert!(lenient.deliver(&InputEvent::new(1.0, "m", "pressure", 1.0)).unwrap().is_empty());
    assert_eq!(lenient.stats().ignored, 1);

    let mut strict = Scheduler::new(&mut registry, EngineConfig::new().with_strict_inputs(true));
    assert!(matches!(
        strict.deliver(&InputEvent::new(2.0, "m", "pressure", 1.0)),
        Err(EngineError::UnknownInput { .. })
    ));
}

#[test]
fn test_signal_fan_out_across_models() {
    init_logging();
    let sender = ModelDescriptor::new()
        .with_block("tx", "SendAsyncSignal", params(json!({"signalType": "Reset"})));
    let receiver = ModelDescriptor::new()
        .with_block("sum", "SumLast", Properties::new())
        .with_block("rx", "ReceiveAsyncSignal", params(json!({"signalType": "Reset"})))
        .wire("rx", "value", "sum", "reset");
    let scoped_receiver = ModelDescriptor::new().with_block(
        "rx",
        "ReceiveAsyncSignal",
        params(json!({"signalType": "Reset", "scopeToModel": true})),
    );

    let mut registry = ModelRegistry::new();
    registry.deploy("sender", &sender).unwrap();
    registry.deploy("counter", &receiver).unwrap();
    registry.deploy("scoped", &scoped_receiver).unwrap();
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new().with_correlation_id("c-9"));

    scheduler.deliver(&InputEvent::new(1.0, "counter", "value", 4.0)).unwrap();

    let carried = params(json!({"a": 100}));
    scheduler
        .deliver(&InputEvent::new(2.0, "sender", "params", true).with_properties(carried))
        .unwrap();
    let dispatch = scheduler
        .dispatch(&InputEvent::new(2.0, "sender", "send", true))
        .unwrap();

    assert_eq!(dispatch.signals.len(), 1);
    assert_eq!(dispatch.signals[0].correlation, "c-9");

    // Only the unscoped receiver in "counter" reacts
    let models: Vec<&str> = dispatch.outputs.iter().map(|o| o.model_id.as_str()).collect();
    assert_eq!(models, vec!["counter", "counter", "counter"]);
    assert_eq!(dispatch.outputs[0].properties["a"], json!(100));
    let sum = dispatch.outputs.iter().find(|o| o.output_id == "sum").unwrap();
    assert_eq!(sum.value, Value::Float(0.0));
}

#[test]
fn test_broadcast_scoped_signal() {
    let scoped_receiver = ModelDescriptor::new().with_block(
        "rx",
        "ReceiveAsyncSignal",
        params(json!({"signalType": "Reset", "scopeToModel": true})),
    );
    let mut registry = ModelRegistry::new();
    registry.deploy("model_1", &scoped_receiver).unwrap();
    registry.deploy("model_2", &scoped_receiver).unwrap();
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());

    let mut signal = AsyncSignal::new("Reset");
    signal.scope = "model_2".to_string();
    let outputs = scheduler.broadcast(1.0, signal);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].model_id, "model_2");

    // Global signals do not reach model-scoped receivers
    assert!(scheduler.broadcast(2.0, AsyncSignal::new("Reset")).is_empty());
}

#[test]
fn test_csv_reader_wired_to_writer() {
    init_logging();
    let descriptor = ModelDescriptor::new()
        .with_block(
            "reader",
            "apamax.analyticsbuilder.custom.CSVReader",
            params(json!({"fragmentName": "infile"})),
        )
        .with_block(
            "writer",
            "apamax.analyticsbuilder.custom.CSVWriter",
            params(json!({"lineDelimitor": "|", "colDelimitor": ";"})),
        )
        .wire("reader", "jsonOutput", "writer", "value");

    let mut registry = ModelRegistry::new();
    registry.deploy("csv", &descriptor).unwrap();
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());

    let outputs = scheduler
        .deliver(&InputEvent::new(
            0.0,
            "csv",
            "csv",
            "field1,field2,field3\n11,12,13\n21,22,23\n31,32,33\n",
        ))
        .unwrap();

    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].output_id, "jsonOutput");
    assert_eq!(outputs[1].output_id, "csvOutput");
    assert_eq!(
        outputs[1].value.as_str(),
        Some("field1;field2;field3|11;12;13|21;22;23|31;32;33")
    );
}

#[test]
fn test_undeploy_drops_state() {
    let mut registry = ModelRegistry::new();
    let descriptor = ModelDescriptor::single("SumLast", Properties::new());
    registry.deploy("m", &descriptor).unwrap();

    {
        let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());
        scheduler.deliver(&InputEvent::new(5.0, "m", "value", 10.0)).unwrap();
        scheduler.undeploy("m").unwrap();
        assert!(matches!(
            scheduler.deliver(&InputEvent::new(6.0, "m", "value", 1.0)),
            Err(EngineError::UnknownModel(_))
        ));
        scheduler.deploy("m", &descriptor).unwrap();
    }

    // A fresh deploy starts from a clean state and clock
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());
    let outputs = scheduler.deliver(&InputEvent::new(1.0, "m", "value", 1.0)).unwrap();
    assert_eq!(outputs[0].value, Value::Float(1.0));
}

#[test]
fn test_shared_input_rejected_by_one_block() {
    init_logging();
    let shared = ModelDescriptor::new()
        .with_block("band", "AlarmBand", params(json!({"upper": 10.0, "lower": 5.0})))
        .with_block("writer", "CSVWriter", Properties::new());
    let rebound = shared.clone().bind("reading", "band", "value");

    let mut registry = ModelRegistry::new();
    registry.deploy("shared", &shared).unwrap();
    registry.deploy("rebound", &rebound).unwrap();

    {
        let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());
        for (t, v) in [(1.0, 3.0), (2.0, 7.0)] {
            assert!(matches!(
                scheduler.deliver(&InputEvent::new(t, "shared", "value", v)),
                Err(EngineError::MalformedInput(_))
            ));
        }
        assert_eq!(scheduler.stats().rejected, 2);
        assert_eq!(scheduler.stats().outputs, 0);
    }

    // The band never saw the rejected readings
    let model = registry.get("shared").unwrap();
    assert_eq!(model.clock().now(), None);
    let snapshot = model.snapshot();
    assert!(snapshot["blocks"][0]["block"]["state"]["zone"].is_null());
    assert!(snapshot["blocks"][0]["last_event_time"].is_null());

    // With the band on its own input name the same readings work
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new());
    assert!(scheduler
        .deliver(&InputEvent::new(1.0, "rebound", "reading", 3.0))
        .unwrap()
        .is_empty());
    let outputs = scheduler
        .deliver(&InputEvent::new(2.0, "rebound", "reading", 7.0))
        .unwrap();
    assert_eq!(outputs.len(), 4);
    assert_eq!(flag(&outputs, "entered"), Some(true));
}

#[test]
fn test_edge_detection_reference_scenario() {
    let mut registry = ModelRegistry::new();
    registry
        .deploy(
            "model_0",
            &ModelDescriptor::single(
                "apamax.analyticsbuilder.custom.EdgeDetection",
                params(json!({"threshold": 1.0})),
            ),
        )
        .unwrap();
    let mut scheduler = Scheduler::new(&mut registry, EngineConfig::new().with_correlation_id("edge"));

    let readings = [
        (1.1, 1.5),
        (2.1, 2.9),
        (4.1, 1.9),
        (5.1, 2.3),
        (6.1, 1.1),
        (7.1, 8.0),
        (8.1, 9.5),
        (9.1, 9.2),
    ];
    let mut edges = Vec::new();
    for (t, v) in readings {
        edges.extend(scheduler.deliver(&InputEvent::new(t, "model_0", "value", v)).unwrap());
    }

    // First reading only primes the block
    assert_eq!(edges.len(), readings.len() - 1);
    let jump = edges.iter().find(|o| o.timestamp == 7.1).unwrap();
    assert_eq!(jump.output_id, "isEdge");
    assert_eq!(jump.value, Value::Boolean(true));
    assert_eq!(jump.correlation_id, "edge");
}
