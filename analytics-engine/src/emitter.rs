//! Output emitter
//!
//! Writes outputs and async signals in one of two formats:
//! - JSON lines: one object per record, non-finite floats rendered as `null`
//!   and a `wall_time` field holding the timestamp as RFC 3339
//! - text: `Output("id","model","corr",t,any(type,value),{props})`

use crate::types::{AsyncSignal, Output, Properties, Result, Timestamp, Value};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "json")]
    JsonLines,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" | "json_lines" | "json-lines" => Ok(OutputFormat::JsonLines),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(format!("unknown output format '{}' (expected json or text)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::JsonLines => f.write_str("json"),
            OutputFormat::Text => f.write_str("text"),
        }
    }
}

/// Serialized form of one output
#[derive(Debug, Clone, Serialize)]
pub struct OutputRecord<'a> {
    pub output_id: &'a str,
    pub model_id: &'a str,
    pub block_id: &'a str,
    pub correlation_id: &'a str,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_time: Option<String>,
    pub value: &'a Value,
    pub properties: &'a Properties,
}

impl<'a> OutputRecord<'a> {
    pub fn new(output: &'a Output) -> Self {
        Self {
            output_id: &output.output_id,
            model_id: &output.model_id,
            block_id: &output.block_id,
            correlation_id: &output.correlation_id,
            timestamp: output.timestamp,
            wall_time: wall_time(output.timestamp),
            value: &output.value,
            properties: &output.properties,
        }
    }
}

#[derive(Serialize)]
struct SignalRecord<'a> {
    timestamp: Timestamp,
    signal: &'a AsyncSignal,
}

/// Render seconds since the epoch as RFC 3339 (UTC, millisecond precision)
pub fn wall_time(timestamp: Timestamp) -> Option<String> {
    if !timestamp.is_finite() {
        return None;
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

fn format_properties(properties: &Properties) -> String {
    let fields: Vec<String> = properties
        .iter()
        .map(|(k, v)| format!("{:?}:{}", k, v))
        .collect();
    format!("{{{}}}", fields.join(","))
}

/// Text rendering of one output
pub fn format_text(output: &Output) -> String {
    let value = match &output.value {
        Value::Float(v) => format_number(*v),
        Value::Text(s) => format!("{:?}", s),
        other => other.to_string(),
    };
    format!(
        "Output({:?},{:?},{:?},{},any({},{}),{})",
        output.output_id,
        output.model_id,
        output.correlation_id,
        format_number(output.timestamp),
        output.value.type_name(),
        value,
        format_properties(&output.properties)
    )
}

/// Writes records to any `Write` sink
pub struct OutputEmitter<W: Write> {
    writer: W,
    format: OutputFormat,
    written: usize,
}

impl<W: Write> OutputEmitter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            written: 0,
        }
    }

    /// Number of records written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn emit(&mut self, output: &Output) -> Result<()> {
        match self.format {
            OutputFormat::JsonLines => {
                let record = OutputRecord::new(output);
                serde_json::to_writer(&mut self.writer, &record).map_err(std::io::Error::from)?;
                self.writer.write_all(b"\n")?;
            }
            OutputFormat::Text => {
                writeln!(self.writer, "{}", format_text(output))?;
            }
        }
        self.written += 1;
        Ok(())
    }

    pub fn emit_all<'o>(&mut self, outputs: impl IntoIterator<Item = &'o Output>) -> Result<()> {
        for output in outputs {
            self.emit(output)?;
        }
        Ok(())
    }

    pub fn emit_signal(&mut self, timestamp: Timestamp, signal: &AsyncSignal) -> Result<()> {
        match self.format {
            OutputFormat::JsonLines => {
                let record = SignalRecord { timestamp, signal };
                serde_json::to_writer(&mut self.writer, &record).map_err(std::io::Error::from)?;
                self.writer.write_all(b"\n")?;
            }
            OutputFormat::Text => {
                writeln!(
                    self.writer,
                    "AsyncSignal({:?},{:?},{:?},{})",
                    signal.signal_type,
                    signal.scope,
                    signal.correlation,
                    format_properties(&signal.properties)
                )?;
            }
        }
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
