use std::sync::Arc;

use tracing::warn;

use crate::{
    collab::{CommandNotifier, Notifier, Severity},
    config::Config,
};

/// Process-wide collaborators, built once in `main` and handed to every
/// component constructor.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub notifier: Arc<dyn Notifier>,
}

impl Context {
    pub fn new(config: Config) -> Self {
        let notifier = Arc::new(CommandNotifier::new(config.notify_command.clone()));
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: Arc::new(config),
            notifier,
        }
    }

    /// Shows a notification. Delivery failures are logged, never returned.
    pub async fn notify(&self, message: &str, severity: Severity) {
        if let Some(error) = self.notifier.show(message, severity).await.err() {
            warn!(%severity, "Notification not delivered - {}", error);
        }
    }
}
