//! Sources bind a command runner and a parser to one data origin.

use crate::config::SourceConfig;
use crate::error::{Result, WatchError};
use crate::watch::command::ShellCommand;
use crate::watch::data::{RecordSpec, Records};
use crate::watch::parser::OutputParser;
use crate::watch::traits::CommandRunner;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A named external command plus its output parsing configuration.
pub struct Source {
    id: String,
    command: String,
    deadline: Duration,
    parser: OutputParser,
    records: Vec<RecordSpec>,
    runner: Option<Arc<dyn CommandRunner>>,
    in_flight: AtomicBool,
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("deadline", &self.deadline)
            .field("parser", &self.parser)
            .field("records", &self.records)
            .field("runner", &self.runner.is_some())
            .finish()
    }
}

impl Source {
    /// Create a source without a command runner.
    pub fn new(
        id: impl Into<String>,
        command: impl Into<String>,
        deadline: Duration,
        parser: OutputParser,
        records: Vec<RecordSpec>,
    ) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            deadline,
            parser,
            records,
            runner: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Build a shell backed source from its configuration.
    pub fn from_config(config: &SourceConfig) -> Self {
        let records = config.output.records.iter().map(RecordSpec::from).collect();
        Self::new(
            &config.id,
            &config.command,
            config.timeout,
            config.output.parser.into(),
            records,
        )
        .with_runner(Arc::new(ShellCommand::new()))
    }

    /// Attach the runner executing the command.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn records(&self) -> &[RecordSpec] {
        &self.records
    }

    /// Run the command and parse every declared record out of its output.
    ///
    /// A source serves one pull at a time; a second concurrent pull fails
    /// with [`WatchError::SourceBusy`] without running the command.
    pub async fn pull(&self) -> Result<Records> {
        let runner = self.runner.as_ref().ok_or(WatchError::UndefinedCommand)?;
        let _guard = InFlight::acquire(&self.in_flight)
            .ok_or_else(|| WatchError::SourceBusy(self.id.clone()))?;

        let output = runner.execute(&self.command, self.deadline).await?;
        let records = self.parser.parse(&self.records, &output)?;
        debug!(source = %self.id, records = ?records, "Parsed records");
        Ok(records)
    }
}

/// Clears the in-flight flag when the pull ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
