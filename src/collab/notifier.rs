use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::common::{error::HelperError, types::APP_DISPLAY_NAME};

#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Debug,
    EnumString,
    Display,
    IntoStaticStr,
)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn urgency(&self) -> &'static str {
        match self {
            Severity::Info => "low",
            Severity::Warning => "normal",
            Severity::Error => "critical",
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn show(&self, message: &str, severity: Severity) -> Result<(), HelperError>;
}

/// Desktop notifications through a `notify-send` compatible command.
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn show(&self, message: &str, severity: Severity) -> Result<(), HelperError> {
        debug!(command = %self.command, %severity, "Showing notification");
        let status = Command::new(&self.command)
            .arg("-u")
            .arg(severity.urgency())
            .arg(APP_DISPLAY_NAME)
            .arg(message)
            .status()
            .await?;

        if !status.success() {
            return Err(HelperError::Backend(format!(
                "{} exited with {}",
                self.command, status
            )));
        }
        Ok(())
    }
}

/// Writes notifications to the log only. Used when no notification daemon
/// is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, message: &str, severity: Severity) -> Result<(), HelperError> {
        match severity {
            Severity::Info => info!(notification = %message),
            Severity::Warning => warn!(notification = %message),
            Severity::Error => error!(notification = %message),
        }
        Ok(())
    }
}
