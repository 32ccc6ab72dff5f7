//! Error handling for the gaugewatch pipeline.

use std::collections::BTreeMap;
use std::process::ExitStatus;
use std::time::Duration;

/// A specialized `Result` type for gaugewatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// The main error type for gaugewatch operations.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source command could not produce output
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The source output could not be turned into records
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The source has no command runner attached
    #[error("source: undefined command")]
    UndefinedCommand,

    /// The source is still serving a pull from an earlier cycle
    #[error("source '{0}' is still busy with a previous fetch")]
    SourceBusy(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),
}

impl WatchError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }
}

/// Failures of a single command execution.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {status}: {output}")]
    Exit {
        command: String,
        status: ExitStatus,
        /// Standard output followed by standard error.
        output: String,
    },

    #[error("'{command}' exceeded its deadline of {deadline:?}")]
    Timeout { command: String, deadline: Duration },

    #[error("failed to collect command output: {0}")]
    Wait(#[source] std::io::Error),
}

/// Failures turning raw command output into records.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("csv parser: {0}")]
    Delimited(#[from] csv::Error),

    #[error("{parser} parser: invalid parser option '{option}': {options:?}")]
    InvalidOption {
        parser: &'static str,
        option: &'static str,
        options: BTreeMap<String, String>,
    },

    #[error("htmlquery parser: invalid path '{path}': {reason}")]
    InvalidSelector { path: String, reason: String },

    #[error("record '{record}': row {row} has {found} cells, header needs {expected}")]
    MissingCells {
        record: String,
        row: usize,
        expected: usize,
        found: usize,
    },
}

impl ParseError {
    pub(crate) fn invalid_option(
        parser: &'static str,
        option: &'static str,
        options: &BTreeMap<String, String>,
    ) -> Self {
        Self::InvalidOption {
            parser,
            option,
            options: options.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_command_message() {
        assert_eq!(WatchError::UndefinedCommand.to_string(), "source: undefined command");
    }

    #[test]
    fn invalid_option_names_the_option_and_the_map() {
        let options = BTreeMap::from([("format".to_string(), "table".to_string())]);
        let err = ParseError::invalid_option("htmlquery", "path", &options);
        assert_eq!(
            err.to_string(),
            r#"htmlquery parser: invalid parser option 'path': {"format": "table"}"#
        );
    }

    #[test]
    fn command_errors_convert_transparently() {
        let err: WatchError = CommandError::Timeout {
            command: "sleep 5".to_string(),
            deadline: Duration::from_millis(10),
        }
        .into();
        assert!(err.to_string().contains("exceeded its deadline"));
    }
}
