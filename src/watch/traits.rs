//! Seams between the pipeline and the outside world.

use crate::error::CommandError;
use async_trait::async_trait;
use std::time::Duration;

/// Runs the data-producing command of a source.
///
/// Implementations must give up once `deadline` has elapsed and make sure
/// the spawned process does not outlive the call.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Execute `command` and return its standard output.
    async fn execute(&self, command: &str, deadline: Duration) -> Result<Vec<u8>, CommandError>;
}

/// A label-addressed gauge owned by a monitor.
///
/// Setting the same label set to the same value twice has no further effect.
pub trait GaugeSink: Send + Sync {
    /// Set the gauge addressed by `labels` to `value`.
    fn set(&self, labels: &[String], value: f64);
}
