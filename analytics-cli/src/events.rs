//! Event file reading
//!
//! Event files are JSON lines. Each line is either an input event
//! (`timestamp`, `model`/`model_id`, `input`/`input_name`, `value`,
//! `properties`) or an externally injected signal (`timestamp`, `signal`).
//! Blank lines and lines starting with `#` are skipped; lines that do not
//! parse are logged and counted.

use analytics_engine::{AsyncSignal, InputEvent, Timestamp};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One record of an event file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BusEvent {
    Signal {
        timestamp: Timestamp,
        signal: AsyncSignal,
    },
    Input(InputEvent),
}

/// Parsed content of one event file
#[derive(Debug, Default)]
pub struct EventFile {
    pub events: Vec<BusEvent>,
    /// Lines that were not valid events
    pub malformed: usize,
}

/// Parse event lines from any reader
pub fn parse_events(reader: impl BufRead, source: &str) -> Result<EventFile> {
    let mut file = EventFile::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {} of {}", index + 1, source))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match serde_json::from_str::<BusEvent>(trimmed) {
            Ok(event) => file.events.push(event),
            Err(e) => {
                log::warn!("{}:{}: skipping malformed event: {}", source, index + 1, e);
                file.malformed += 1;
            }
        }
    }

    log::debug!(
        "Read {} events from {} ({} malformed lines)",
        file.events.len(),
        source,
        file.malformed
    );
    Ok(file)
}

/// Read an event file from disk
pub fn read_events(path: &Path) -> Result<EventFile> {
    let file = File::open(path).with_context(|| format!("Failed to open event file: {:?}", path))?;
    parse_events(BufReader::new(file), &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics_engine::Value;

    #[test]
    fn test_parse_mixed_lines() {
        let text = r#"
# warm-up
{"timestamp": 1.0, "model": "model_0", "input": "value", "value": 3.0}
{"timestamp": 2.0, "model_id": "model_0", "input_name": "csv", "value": "a,b\n1,2"}

{"timestamp": 3.0, "signal": {"signal_type": "Reset", "properties": {"a": 100}}}
{"timestamp": 4.0, "model": "model_0"}
not json
"#;
        let file = parse_events(text.as_bytes(), "inline").unwrap();
        assert_eq!(file.events.len(), 3);
        assert_eq!(file.malformed, 2);

        match &file.events[0] {
            BusEvent::Input(event) => {
                assert_eq!(event.model_id, "model_0");
                assert_eq!(event.value, Value::Float(3.0));
            }
            other => panic!("unexpected event {:?}", other),
        }
        match &file.events[2] {
            BusEvent::Signal { timestamp, signal } => {
                assert_eq!(*timestamp, 3.0);
                assert_eq!(signal.signal_type, "Reset");
                assert!(signal.is_global());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = read_events(Path::new("/nonexistent/events.jsonl")).unwrap_err();
        assert!(err.to_string().contains("Failed to open event file"));
    }
}
