//! The watch pipeline: sources run commands, their output is parsed into
//! records, and monitors push the records of each fresh snapshot to gauges.

pub mod command;
pub mod data;
pub mod extract;
pub mod monitor;
pub mod parser;
pub mod scan;
pub mod service;
pub mod sink;
pub mod source;
pub mod traits;
pub mod xpath;

pub use command::ShellCommand;
pub use data::{RecordSpec, Records, Row, Snapshot};
pub use extract::{extract, LabelRule, Metric, ValueRule};
pub use monitor::Monitor;
pub use parser::{OutputParser, ParserKind};
pub use scan::ScanPattern;
pub use service::{Admission, Aggregator, StalenessGate, WatchService};
pub use sink::{MemoryGauge, PrometheusGauge};
pub use source::Source;
pub use traits::{CommandRunner, GaugeSink};
