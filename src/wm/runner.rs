use async_trait::async_trait;
use tokio::process::Command;
use tracing::trace;

use crate::common::error::HelperError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Seam between the backends and the helper binaries they shell out to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` to completion. A non-zero exit is reported through
    /// `CommandOutput::success`, not as an error.
    async fn run(&self, program: String, args: Vec<String>) -> Result<CommandOutput, HelperError>;
}

pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: String, args: Vec<String>) -> Result<CommandOutput, HelperError> {
        trace!(%program, ?args, "Running helper command");
        let output = Command::new(&program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|error| {
                HelperError::Backend(format!("Failed to run {} - {}", program, error))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
