//! Block algorithms
//!
//! Every supported block kind is a variant of the closed [`Block`] union. Each
//! variant carries its own parameters and state record and implements
//! [`BlockAlgorithm`]; the scheduler dispatches through [`Block::evaluate`],
//! so adding a kind means extending every `match` below.

use crate::types::{AsyncSignal, Properties, Result, Timestamp, Value};
use serde::Serialize;
use std::fmt;

pub mod alarm_band;
pub mod async_signal;
pub mod base_n;
pub mod csv;
pub mod discrete_statistics;
pub mod edge_detection;
pub mod lowpass;
pub mod params;
pub mod random_walk;
pub mod rms;
pub mod sum_last;
pub mod time_at_level;

pub use alarm_band::{AlarmBand, Zone};
pub use async_signal::{ReceiveAsyncSignal, SendAsyncSignal};
pub use base_n::BaseNConverter;
pub use csv::{CsvReader, CsvWriter};
pub use discrete_statistics::DiscreteStatistics;
pub use edge_detection::EdgeDetection;
pub use lowpass::LowpassFilter;
pub use params::Parameters;
pub use random_walk::RandomWalk2D;
pub use rms::RootMeanSquare;
pub use sum_last::SumLast;
pub use time_at_level::{LevelDirection, TimeAtLevelCounting};

/// Evaluation context handed to a block for one transition
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    /// Model the block belongs to
    pub model_id: &'a str,
    /// Correlation token stamped on outbound signals
    pub correlation_id: &'a str,
    /// Logical time of the delivery
    pub timestamp: Timestamp,
}

/// One input delivered to a block slot
#[derive(Debug, Clone, Copy)]
pub struct Tick<'a> {
    /// Block input slot name
    pub input: &'a str,
    /// Delivered value
    pub value: &'a Value,
    /// Properties delivered with the value
    pub properties: &'a Properties,
}

/// Something a transition produced
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// A value on one of the block's declared output slots
    Output {
        slot: &'static str,
        value: Value,
        properties: Properties,
    },
    /// An async signal for the bus
    Signal(AsyncSignal),
}

impl Emission {
    /// Output without properties
    pub fn output(slot: &'static str, value: impl Into<Value>) -> Self {
        Emission::Output {
            slot,
            value: value.into(),
            properties: Properties::new(),
        }
    }

    /// Output with properties
    pub fn output_with(slot: &'static str, value: impl Into<Value>, properties: Properties) -> Self {
        Emission::Output {
            slot,
            value: value.into(),
            properties,
        }
    }
}

/// State transition interface implemented by every block kind
pub trait BlockAlgorithm {
    /// Apply one input tick and return what the block emits
    ///
    /// Implementations validate the tick before mutating any state, so an
    /// `Err` leaves the block exactly as it was.
    fn evaluate(&mut self, ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>>;

    /// React to a broadcast signal (only receivers do)
    fn on_signal(&mut self, _ctx: &BlockContext<'_>, _signal: &AsyncSignal) -> Vec<Emission> {
        Vec::new()
    }
}

/// Supported block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockKind {
    AlarmBand,
    DiscreteStatistics,
    LowpassFilter,
    TimeAtLevelCounting,
    CsvReader,
    CsvWriter,
    SendAsyncSignal,
    ReceiveAsyncSignal,
    RootMeanSquare,
    SumLast,
    BaseNConverter,
    RandomWalk2D,
    EdgeDetection,
}

impl BlockKind {
    /// All kinds, in declaration order
    pub const ALL: [BlockKind; 13] = [
        BlockKind::AlarmBand,
        BlockKind::DiscreteStatistics,
        BlockKind::LowpassFilter,
        BlockKind::TimeAtLevelCounting,
        BlockKind::CsvReader,
        BlockKind::CsvWriter,
        BlockKind::SendAsyncSignal,
        BlockKind::ReceiveAsyncSignal,
        BlockKind::RootMeanSquare,
        BlockKind::SumLast,
        BlockKind::BaseNConverter,
        BlockKind::RandomWalk2D,
        BlockKind::EdgeDetection,
    ];

    /// Resolve a block type name from a deployment descriptor
    ///
    /// Fully qualified names are accepted; only the last `.`-separated
    /// segment selects the kind (`apamax.analyticsbuilder.custom.AlarmBand`).
    pub fn from_type_name(name: &str) -> Option<Self> {
        let short = name.rsplit('.').next().unwrap_or(name);
        Self::ALL.iter().copied().find(|kind| kind.type_name() == short)
    }

    /// Canonical type name
    pub fn type_name(self) -> &'static str {
        match self {
            BlockKind::AlarmBand => "AlarmBand",
            BlockKind::DiscreteStatistics => "DiscreteStatistics",
            BlockKind::LowpassFilter => "LowpassFilter",
            BlockKind::TimeAtLevelCounting => "TimeAtLevelCounting",
            BlockKind::CsvReader => "CSVReader",
            BlockKind::CsvWriter => "CSVWriter",
            BlockKind::SendAsyncSignal => "SendAsyncSignal",
            BlockKind::ReceiveAsyncSignal => "ReceiveAsyncSignal",
            BlockKind::RootMeanSquare => "RootMeanSquare",
            BlockKind::SumLast => "SumLast",
            BlockKind::BaseNConverter => "BaseNConverter",
            BlockKind::RandomWalk2D => "RandomWalk2D",
            BlockKind::EdgeDetection => "EdgeDetection",
        }
    }

    /// Declared input slots
    pub fn inputs(self) -> &'static [&'static str] {
        match self {
            BlockKind::AlarmBand => &["value"],
            BlockKind::DiscreteStatistics => &["value", "sample", "reset"],
            BlockKind::LowpassFilter => &["value"],
            BlockKind::TimeAtLevelCounting => &["value"],
            BlockKind::CsvReader => &["csv"],
            BlockKind::CsvWriter => &["value"],
            BlockKind::SendAsyncSignal => &["send", "params"],
            BlockKind::ReceiveAsyncSignal => &[],
            BlockKind::RootMeanSquare => &["value"],
            BlockKind::SumLast => &["value", "reset"],
            BlockKind::BaseNConverter => &["input"],
            BlockKind::RandomWalk2D => &["trigger"],
            BlockKind::EdgeDetection => &["value"],
        }
    }

    /// Declared output slots
    pub fn outputs(self) -> &'static [&'static str] {
        match self {
            BlockKind::AlarmBand => &["entered", "left", "up", "down"],
            BlockKind::DiscreteStatistics => {
                &["sum", "count", "min", "max", "mean", "standardDeviation"]
            }
            BlockKind::LowpassFilter => &["filtered"],
            BlockKind::TimeAtLevelCounting => &["timeAtLevelOutput"],
            BlockKind::CsvReader => &["jsonOutput"],
            BlockKind::CsvWriter => &["csvOutput"],
            BlockKind::SendAsyncSignal => &[],
            BlockKind::ReceiveAsyncSignal => &["value"],
            BlockKind::RootMeanSquare => &["rootMeanSquareOutput"],
            BlockKind::SumLast => &["sum", "lastValue"],
            BlockKind::BaseNConverter => &["numericConversion"],
            BlockKind::RandomWalk2D => &["currentXPosition", "currentYPosition"],
            BlockKind::EdgeDetection => &["isEdge"],
        }
    }

    /// Check whether `input` is a declared input slot
    pub fn has_input(self, input: &str) -> bool {
        self.inputs().contains(&input)
    }

    /// Check whether `output` is a declared output slot
    pub fn has_output(self, output: &str) -> bool {
        self.outputs().contains(&output)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A block instance: one variant per kind, each with its own state record
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "state")]
pub enum Block {
    AlarmBand(AlarmBand),
    DiscreteStatistics(DiscreteStatistics),
    LowpassFilter(LowpassFilter),
    TimeAtLevelCounting(TimeAtLevelCounting),
    CsvReader(CsvReader),
    CsvWriter(CsvWriter),
    SendAsyncSignal(SendAsyncSignal),
    ReceiveAsyncSignal(ReceiveAsyncSignal),
    RootMeanSquare(RootMeanSquare),
    SumLast(SumLast),
    BaseNConverter(BaseNConverter),
    RandomWalk2D(RandomWalk2D),
    EdgeDetection(EdgeDetection),
}

impl Block {
    /// Create a block of `kind` from its parameter map
    ///
    /// # Errors
    /// * `InvalidParameter` if a parameter is missing, mistyped or inconsistent
    pub fn create(kind: BlockKind, parameters: &Properties) -> Result<Self> {
        let params = Parameters::new(kind.type_name(), parameters);
        let block = match kind {
            BlockKind::AlarmBand => Block::AlarmBand(AlarmBand::from_params(&params)?),
            BlockKind::DiscreteStatistics => Block::DiscreteStatistics(DiscreteStatistics::new()),
            BlockKind::LowpassFilter => Block::LowpassFilter(LowpassFilter::from_params(&params)?),
            BlockKind::TimeAtLevelCounting => {
                Block::TimeAtLevelCounting(TimeAtLevelCounting::from_params(&params)?)
            }
            BlockKind::CsvReader => Block::CsvReader(CsvReader::from_params(&params)?),
            BlockKind::CsvWriter => Block::CsvWriter(CsvWriter::from_params(&params)?),
            BlockKind::SendAsyncSignal => {
                Block::SendAsyncSignal(SendAsyncSignal::from_params(&params)?)
            }
            BlockKind::ReceiveAsyncSignal => {
                Block::ReceiveAsyncSignal(ReceiveAsyncSignal::from_params(&params)?)
            }
            BlockKind::RootMeanSquare => Block::RootMeanSquare(RootMeanSquare::from_params(&params)?),
            BlockKind::SumLast => Block::SumLast(SumLast::new()),
            BlockKind::BaseNConverter => Block::BaseNConverter(BaseNConverter::from_params(&params)?),
            BlockKind::RandomWalk2D => Block::RandomWalk2D(RandomWalk2D::from_params(&params)?),
            BlockKind::EdgeDetection => Block::EdgeDetection(EdgeDetection::from_params(&params)?),
        };
        Ok(block)
    }

    /// Kind tag of this instance
    pub fn kind(&self) -> BlockKind {
        match self {
            Block::AlarmBand(_) => BlockKind::AlarmBand,
            Block::DiscreteStatistics(_) => BlockKind::DiscreteStatistics,
            Block::LowpassFilter(_) => BlockKind::LowpassFilter,
            Block::TimeAtLevelCounting(_) => BlockKind::TimeAtLevelCounting,
            Block::CsvReader(_) => BlockKind::CsvReader,
            Block::CsvWriter(_) => BlockKind::CsvWriter,
            Block::SendAsyncSignal(_) => BlockKind::SendAsyncSignal,
            Block::ReceiveAsyncSignal(_) => BlockKind::ReceiveAsyncSignal,
            Block::RootMeanSquare(_) => BlockKind::RootMeanSquare,
            Block::SumLast(_) => BlockKind::SumLast,
            Block::BaseNConverter(_) => BlockKind::BaseNConverter,
            Block::RandomWalk2D(_) => BlockKind::RandomWalk2D,
            Block::EdgeDetection(_) => BlockKind::EdgeDetection,
        }
    }

    fn algorithm(&mut self) -> &mut dyn BlockAlgorithm {
        match self {
            Block::AlarmBand(b) => b,
            Block::DiscreteStatistics(b) => b,
            Block::LowpassFilter(b) => b,
            Block::TimeAtLevelCounting(b) => b,
            Block::CsvReader(b) => b,
            Block::CsvWriter(b) => b,
            Block::SendAsyncSignal(b) => b,
            Block::ReceiveAsyncSignal(b) => b,
            Block::RootMeanSquare(b) => b,
            Block::SumLast(b) => b,
            Block::BaseNConverter(b) => b,
            Block::RandomWalk2D(b) => b,
            Block::EdgeDetection(b) => b,
        }
    }

    /// Apply one input tick
    pub fn evaluate(&mut self, ctx: &BlockContext<'_>, tick: &Tick<'_>) -> Result<Vec<Emission>> {
        self.algorithm().evaluate(ctx, tick)
    }

    /// Offer a broadcast signal to the block
    pub fn on_signal(&mut self, ctx: &BlockContext<'_>, signal: &AsyncSignal) -> Vec<Emission> {
        self.algorithm().on_signal(ctx, signal)
    }

    /// True if this block reacts to `signal` when deployed in `model_id`
    pub fn receives(&self, model_id: &str, signal: &AsyncSignal) -> bool {
        match self {
            Block::ReceiveAsyncSignal(b) => b.matches(model_id, signal),
            _ => false,
        }
    }
}

/// Read a numeric tick value or report which input was malformed
pub(crate) fn numeric_input(block: &str, tick: &Tick<'_>) -> Result<f64> {
    tick.value
        .as_f64()
        .filter(|v| !v.is_nan())
        .ok_or_else(|| {
            crate::types::EngineError::MalformedInput(format!(
                "{}.{} expects a number, got {}",
                block, tick.input, tick.value
            ))
        })
}
