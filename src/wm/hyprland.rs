use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    window::ensure_focusable, CommandRunner, Window, WindowManager, FOCUS_SETTLE_DELAY,
};
use crate::common::{error::HelperError, utils::require_binary};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HyprClient {
    address: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    initial_class: String,
    #[serde(default)]
    title: String,
}

impl HyprClient {
    fn has_class(&self, class: &str) -> bool {
        self.class.eq_ignore_ascii_case(class) || self.initial_class.eq_ignore_ascii_case(class)
    }
}

/// Hyprland backend driving `hyprctl`.
pub struct Hyprland {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl Hyprland {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Result<Self, HelperError> {
        let program = "hyprctl".to_string();
        require_binary(&program)?;
        Ok(Self::from_parts(runner, program))
    }

    pub(crate) fn from_parts(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    async fn clients(&self) -> Result<Vec<HyprClient>, HelperError> {
        let output = self
            .runner
            .run(self.program.clone(), vec!["clients".to_string(), "-j".to_string()])
            .await?;
        if !output.success {
            return Err(HelperError::Backend(format!(
                "{} clients failed - {}",
                self.program,
                output.stderr.trim()
            )));
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }
}

#[async_trait]
impl WindowManager for Hyprland {
    fn name(&self) -> &'static str {
        "Hyprland"
    }

    async fn find_window(&self, class_names: &[String]) -> Result<Option<Window>, HelperError> {
        let clients = self.clients().await?;
        for class in class_names {
            if let Some(client) = clients.iter().find(|client| client.has_class(class)) {
                debug!(%class, address = %client.address, "Found window");
                return Ok(Some(Window {
                    id: client.address.clone(),
                    class: class.clone(),
                    title: Some(client.title.clone()).filter(|title| !title.is_empty()),
                }));
            }
        }
        Ok(None)
    }

    async fn focus_window(&self, window: &Window) -> Result<(), HelperError> {
        ensure_focusable(window)?;

        let args = vec![
            "dispatch".to_string(),
            "focuswindow".to_string(),
            format!("address:{}", window.id),
        ];
        let output = self.runner.run(self.program.clone(), args).await?;
        // hyprctl exits 0 even when the dispatcher rejects the request
        if !output.success || output.stdout.trim() != "ok" {
            return Err(HelperError::Backend(format!(
                "failed to focus window {} - {}{}",
                window.id,
                output.stdout.trim(),
                output.stderr.trim()
            )));
        }

        tokio::time::sleep(FOCUS_SETTLE_DELAY).await;
        Ok(())
    }
}
