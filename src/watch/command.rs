//! Shell command runner.

use crate::error::CommandError;
use crate::watch::traits::CommandRunner;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, trace};

/// Runs source commands through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    shell: String,
}

impl Default for ShellCommand {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another POSIX compatible shell.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

#[async_trait]
impl CommandRunner for ShellCommand {
    async fn execute(&self, command: &str, deadline: Duration) -> Result<Vec<u8>, CommandError> {
        if deadline.is_zero() {
            return Err(CommandError::Timeout {
                command: command.to_string(),
                deadline,
            });
        }

        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // Dropping the wait future drops the child, which kills it.
        let output = match time::timeout(deadline, child.wait_with_output()).await {
            Ok(output) => output.map_err(CommandError::Wait)?,
            Err(_) => {
                debug!(command, ?deadline, "Command deadline exceeded, process killed");
                return Err(CommandError::Timeout {
                    command: command.to_string(),
                    deadline,
                });
            }
        };

        if !output.status.success() {
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);
            let combined = String::from_utf8_lossy(&combined).into_owned();
            debug!(command, status = %output.status, "{}", combined);
            return Err(CommandError::Exit {
                command: command.to_string(),
                status: output.status,
                output: combined,
            });
        }

        if !output.stderr.is_empty() {
            trace!(command, stderr = %String::from_utf8_lossy(&output.stderr));
        }
        trace!(command, "{}", String::from_utf8_lossy(&output.stdout));
        Ok(output.stdout)
    }
}
