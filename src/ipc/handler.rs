use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{CommandCode, Request, Response, StatusReport};
use crate::{
    collab::{InputAutomation, TradeSelector},
    common::{error::HelperError, types::TradeId},
    trade::{TradeRegistry, TradeState},
    watcher::LogWatcherAccess,
    wm::WindowManager,
};

/// Dispatches decoded requests. Shared by every connection task.
pub struct CommandHandler {
    registry: TradeRegistry,
    window_manager: Arc<dyn WindowManager>,
    input: Arc<dyn InputAutomation>,
    selector: Arc<dyn TradeSelector>,
    game_window_classes: Vec<String>,
    selection_timeout: Duration,
    // At most one focus/input sequence in flight
    focus_lock: Mutex<()>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    watcher: Option<LogWatcherAccess>,
    started_at: Instant,
}

impl CommandHandler {
    pub async fn handle(&self, request: Request) -> Response {
        let code = request.code;
        info!(%code, "Handling command");

        let result = match code {
            CommandCode::ShowTrades => self.show_trades().await,
            CommandCode::Hideout => self.hideout().await,
            CommandCode::Status => self.status().await,
            CommandCode::Shutdown => Ok(self.shutdown()),
            CommandCode::Complete => {
                self.finish(request.payload.as_deref(), TradeState::Completed)
                    .await
            }
            CommandCode::Cancel => {
                self.finish(request.payload.as_deref(), TradeState::Cancelled)
                    .await
            }
        };

        match result {
            Ok(response) => response,
            Err(error) => {
                warn!(%code, "Command failed - {}", error);
                Response::error(error.to_string())
            }
        }
    }

    async fn show_trades(&self) -> Result<Response, HelperError> {
        let active = self.registry.list_active().await;
        if active.is_empty() {
            return Ok(Response::ok().message("No active trades"));
        }

        // Registry lock is not held while the menu is open
        let selection = tokio::time::timeout(
            self.selection_timeout,
            self.selector.select_from(&active),
        )
        .await
        .map_err(|_| HelperError::Simple("Trade selection timed out".to_string()))??;

        let Some(chosen) = selection else {
            return Ok(Response::ok().message("No trade selected"));
        };

        let entry = match chosen.state {
            TradeState::New => self.registry.transition(chosen.id, TradeState::Active).await?,
            _ => chosen,
        };
        debug!(trade_id = %entry.id, state = %entry.state, "Trade selected");
        Response::ok().message(entry.summary()).payload(&entry)
    }

    async fn hideout(&self) -> Result<Response, HelperError> {
        let _focus_guard = self.focus_lock.lock().await;

        let window = self
            .window_manager
            .find_window(&self.game_window_classes)
            .await?
            .ok_or_else(|| HelperError::WindowNotFound(self.game_window_classes.clone()))?;

        debug!(window_id = %window.id, class = %window.class, "Focusing game window");
        self.window_manager.focus_window(&window).await?;
        self.input.perform_hideout_warp().await?;

        Ok(Response::ok().message(format!("Hideout warp sent to {}", window.class)))
    }

    async fn status(&self) -> Result<Response, HelperError> {
        let log_degraded = match &self.watcher {
            Some(watcher) => match watcher.status().await {
                Ok(status) => status.degraded,
                Err(error) => {
                    warn!("Log watcher unreachable - {}", error);
                    true
                }
            },
            None => false,
        };

        let shutting_down = *self.shutdown_tx.borrow();
        let report = StatusReport {
            healthy: !shutting_down && !log_degraded,
            active_trades: self.registry.active_count().await,
            window_manager: self.window_manager.name().to_string(),
            log_degraded,
            uptime_secs: self.started_at.elapsed().as_secs(),
            pid: std::process::id(),
        };
        let message = format!("{} active trades", report.active_trades);
        Response::ok().message(message).payload(&report)
    }

    fn shutdown(&self) -> Response {
        info!("Shutdown requested by client");
        self.shutdown_tx.send_replace(true);
        Response::ok().message("Shutting down")
    }

    async fn finish(
        &self,
        payload: Option<&str>,
        target: TradeState,
    ) -> Result<Response, HelperError> {
        let id = parse_trade_id(payload)?;
        let entry = self.registry.transition(id, target).await?;
        Response::ok()
            .message(format!("Trade {} {}", entry.id, entry.state))
            .payload(&entry)
    }
}

fn parse_trade_id(payload: Option<&str>) -> Result<TradeId, HelperError> {
    let Some(payload) = payload else {
        return Err(HelperError::InvalidArgument(
            "A trade ID payload is required".to_string(),
        ));
    };
    Uuid::parse_str(payload.trim()).map_err(|error| {
        HelperError::InvalidArgument(format!("{} is not a trade ID - {}", payload, error))
    })
}

pub struct CommandHandlerBuilder {
    registry: Option<TradeRegistry>,
    window_manager: Option<Arc<dyn WindowManager>>,
    input: Option<Arc<dyn InputAutomation>>,
    selector: Option<Arc<dyn TradeSelector>>,
    game_window_classes: Vec<String>,
    selection_timeout: Duration,
    shutdown_tx: Option<Arc<watch::Sender<bool>>>,
    watcher: Option<LogWatcherAccess>,
}

impl CommandHandlerBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            window_manager: None,
            input: None,
            selector: None,
            game_window_classes: Vec::new(),
            selection_timeout: Duration::from_secs(5 * 60),
            shutdown_tx: None,
            watcher: None,
        }
    }

    pub fn registry(&mut self, registry: TradeRegistry) -> &mut Self {
        self.registry = Some(registry);
        self
    }

    pub fn window_manager(&mut self, window_manager: Arc<dyn WindowManager>) -> &mut Self {
        self.window_manager = Some(window_manager);
        self
    }

    pub fn input(&mut self, input: Arc<dyn InputAutomation>) -> &mut Self {
        self.input = Some(input);
        self
    }

    pub fn selector(&mut self, selector: Arc<dyn TradeSelector>) -> &mut Self {
        self.selector = Some(selector);
        self
    }

    pub fn game_window_classes(&mut self, classes: impl Into<Vec<String>>) -> &mut Self {
        self.game_window_classes = classes.into();
        self
    }

    pub fn selection_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.selection_timeout = timeout;
        self
    }

    pub fn shutdown_tx(&mut self, shutdown_tx: Arc<watch::Sender<bool>>) -> &mut Self {
        self.shutdown_tx = Some(shutdown_tx);
        self
    }

    pub fn watcher(&mut self, watcher: LogWatcherAccess) -> &mut Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn build(&self) -> Result<CommandHandler, HelperError> {
        let Some(registry) = self.registry.as_ref() else {
            return Err(HelperError::Simple("No Trade Registry defined".to_string()));
        };
        let Some(window_manager) = self.window_manager.as_ref() else {
            return Err(HelperError::Simple("No Window Manager defined".to_string()));
        };
        let Some(input) = self.input.as_ref() else {
            return Err(HelperError::Simple("No Input Automation defined".to_string()));
        };
        let Some(selector) = self.selector.as_ref() else {
            return Err(HelperError::Simple("No Trade Selector defined".to_string()));
        };
        let Some(shutdown_tx) = self.shutdown_tx.as_ref() else {
            return Err(HelperError::Simple("No shutdown channel defined".to_string()));
        };
        if self.game_window_classes.is_empty() {
            return Err(HelperError::Simple("No game window classes defined".to_string()));
        }

        Ok(CommandHandler {
            registry: registry.clone(),
            window_manager: window_manager.clone(),
            input: input.clone(),
            selector: selector.clone(),
            game_window_classes: self.game_window_classes.clone(),
            selection_timeout: self.selection_timeout,
            focus_lock: Mutex::new(()),
            shutdown_tx: shutdown_tx.clone(),
            watcher: self.watcher.clone(),
            started_at: Instant::now(),
        })
    }
}

impl Default for CommandHandlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
