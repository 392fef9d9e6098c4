use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};
use tokio::{
    select,
    sync::{
        mpsc::{self, error::SendTimeoutError},
        oneshot,
    },
    time::Instant,
};
use tracing::{debug, error, info, trace, warn};

use super::{tail::LogTail, TriggerSet};
use crate::{
    collab::Severity,
    common::error::HelperError,
    context::Context,
    trade::ParsedTrade,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStatus {
    pub path: PathBuf,
    pub degraded: bool,
    pub lines_read: u64,
    pub trades_emitted: u64,
    pub trades_dropped: u64,
}

#[derive(Clone)]
pub struct LogWatcherAccess {
    tx: mpsc::Sender<WatcherRequest>,
}

impl LogWatcherAccess {
    fn new(tx: mpsc::Sender<WatcherRequest>) -> Self {
        Self { tx }
    }

    pub async fn status(&self) -> Result<WatcherStatus, HelperError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<WatcherStatus>();
        let request = WatcherRequest::Status { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    /// Closes the file handle and ends the read loop.
    pub async fn shutdown(&self) -> Result<(), HelperError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<()>();
        let request = WatcherRequest::Shutdown { rsp_tx };
        self.tx.send(request).await?; // Shutdown is allowed to fail if already shutdown
        Ok(rsp_rx.await?)
    }
}

/// Tails the game log and hands every trade line to the registry queue.
pub struct LogWatcher {
    tx: mpsc::Sender<WatcherRequest>,
    pub task_handle: tokio::task::JoinHandle<()>,
}

impl LogWatcher {
    const WATCHER_REQUEST_CHANNEL_SIZE: usize = 10;

    pub fn new(
        context: &Context,
        triggers: Arc<TriggerSet>,
        trade_tx: mpsc::Sender<ParsedTrade>,
    ) -> Self {
        let settings = WatcherSettings::from_context(context);
        Self::with_settings(context, triggers, trade_tx, settings)
    }

    pub fn with_settings(
        context: &Context,
        triggers: Arc<TriggerSet>,
        trade_tx: mpsc::Sender<ParsedTrade>,
        settings: WatcherSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<WatcherRequest>(Self::WATCHER_REQUEST_CHANNEL_SIZE);
        let actor = LogWatcherActor::new(rx, context.clone(), triggers, trade_tx, settings);
        let task_handle = tokio::spawn(async move { actor.run().await });
        Self { tx, task_handle }
    }

    pub fn new_accessor(&self) -> LogWatcherAccess {
        LogWatcherAccess::new(self.tx.clone())
    }
}

#[derive(Clone, Debug)]
pub struct WatcherSettings {
    pub path: PathBuf,
    pub poll_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// How long a parsed trade may wait for room in the registry queue.
    pub handoff_timeout: Duration,
}

impl WatcherSettings {
    pub fn from_context(context: &Context) -> Self {
        Self {
            path: context.config.log_path.clone(),
            poll_interval: context.config.poll_interval(),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            handoff_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Display, IntoStaticStr)]
enum WatcherRequest {
    Status { rsp_tx: oneshot::Sender<WatcherStatus> },
    Shutdown { rsp_tx: oneshot::Sender<()> },
}

struct LogWatcherActor {
    rx: mpsc::Receiver<WatcherRequest>,
    context: Context,
    triggers: Arc<TriggerSet>,
    trade_tx: mpsc::Sender<ParsedTrade>,
    settings: WatcherSettings,
    tail: LogTail,
    backoff: Duration,
    degraded: bool,
    lines_read: u64,
    trades_emitted: u64,
    trades_dropped: u64,
}

impl LogWatcherActor {
    fn new(
        rx: mpsc::Receiver<WatcherRequest>,
        context: Context,
        triggers: Arc<TriggerSet>,
        trade_tx: mpsc::Sender<ParsedTrade>,
        settings: WatcherSettings,
    ) -> Self {
        let tail = LogTail::new(&settings.path);
        Self {
            rx,
            context,
            triggers,
            trade_tx,
            tail,
            backoff: settings.initial_backoff,
            settings,
            degraded: false,
            lines_read: 0,
            trades_emitted: 0,
            trades_dropped: 0,
        }
    }

    async fn run(mut self) {
        info!(
            path = %self.tail.path().display(),
            trigger_count = self.triggers.len(),
            "Log watcher starting"
        );

        // First poll is immediate so the starting offset is taken at startup.
        // Requests do not push the next poll back.
        let next_poll = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(next_poll);
        loop {
            select! {
                Some(request) = self.rx.recv() => {
                    if self.handle_request(request) {
                        break;
                    }
                },
                _ = &mut next_poll => {
                    let delay = match self.poll().await {
                        Ok(true) => self.settings.poll_interval,
                        Ok(false) => break,
                        Err(_) => self.next_backoff(),
                    };
                    let now = Instant::now();
                    next_poll.as_mut().reset(now.checked_add(delay).unwrap_or(now));
                },
                else => break,
            }
        }

        self.tail.close();
        info!(
            lines_read = self.lines_read,
            trades_emitted = self.trades_emitted,
            "Log watcher terminating"
        );
    }

    fn handle_request(&mut self, request: WatcherRequest) -> bool {
        let mut terminate = false;
        debug!("Log watcher handle_request() of type {}", request);

        match request {
            WatcherRequest::Status { rsp_tx } => {
                let status = WatcherStatus {
                    path: self.settings.path.clone(),
                    degraded: self.degraded,
                    lines_read: self.lines_read,
                    trades_emitted: self.trades_emitted,
                    trades_dropped: self.trades_dropped,
                };
                if rsp_tx.send(status).is_err() {
                    trace!("Status requester went away");
                }
            }
            WatcherRequest::Shutdown { rsp_tx } => {
                self.tail.close();
                if rsp_tx.send(()).is_err() {
                    trace!("Shutdown requester went away");
                }
                terminate = true;
            }
        }
        terminate
    }

    /// Reads whatever was appended and forwards trades. `Ok(false)` means the
    /// registry side is gone and the watcher should stop.
    async fn poll(&mut self) -> Result<bool, HelperError> {
        let lines = match self.tail.poll().await {
            Ok(lines) => {
                self.recovered();
                lines
            }
            Err(error) => {
                self.enter_degraded(&error).await;
                return Err(error);
            }
        };

        for line in lines {
            self.lines_read += 1;
            let Some(parsed) = self.triggers.parse_line(&line, Utc::now()) else {
                continue;
            };

            debug!(
                trigger = %parsed.trigger,
                player = %parsed.player_name,
                item = %parsed.item_name,
                "Trade line matched"
            );
            match self
                .trade_tx
                .send_timeout(parsed, self.settings.handoff_timeout)
                .await
            {
                Ok(()) => self.trades_emitted += 1,
                Err(SendTimeoutError::Timeout(parsed)) => {
                    self.trades_dropped += 1;
                    warn!(
                        player = %parsed.player_name,
                        item = %parsed.item_name,
                        "Trade queue full, dropping trade line"
                    );
                }
                Err(SendTimeoutError::Closed(_)) => {
                    error!("Trade queue closed, log watcher stopping");
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn enter_degraded(&mut self, error: &HelperError) {
        if self.degraded {
            trace!("Log source still unavailable - {}", error);
            return;
        }
        self.degraded = true;
        warn!("Log source unavailable, retrying with backoff - {}", error);
        self.context
            .notify(
                &format!(
                    "Waiting for the game log at {}",
                    self.settings.path.display()
                ),
                Severity::Warning,
            )
            .await;
    }

    fn recovered(&mut self) {
        if self.degraded {
            info!(path = %self.settings.path.display(), "Log source available again");
        }
        self.degraded = false;
        self.backoff = self.settings.initial_backoff;
    }

    fn next_backoff(&mut self) -> Duration {
        let delay = self.backoff;
        self.backoff = (self.backoff * 2).min(self.settings.max_backoff);
        delay
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::testing::{RecordingNotifier, SomeTestParams};
    use crate::watcher::default_triggers;

    fn settings(path: PathBuf) -> WatcherSettings {
        WatcherSettings {
            path,
            poll_interval: Duration::from_millis(20),
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(40),
            handoff_timeout: Duration::from_millis(50),
        }
    }

    fn append(path: &std::path::Path, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_missing_log_notifies_once_then_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");
        let notifier = Arc::new(RecordingNotifier::default());
        let context = SomeTestParams::context_with_notifier(&path, notifier.clone());
        let triggers = Arc::new(TriggerSet::compile(&default_triggers()).unwrap());
        let (trade_tx, mut trade_rx) = mpsc::channel(8);

        let watcher =
            LogWatcher::with_settings(&context, triggers, trade_tx, settings(path.clone()));
        let access = watcher.new_accessor();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(access.status().await.unwrap().degraded);
        assert_eq!(notifier.messages().len(), 1);

        append(&path, &format!("{}\n", SomeTestParams::incoming_line("Buyer", "Goldrim")));
        let parsed = tokio::time::timeout(Duration::from_secs(2), trade_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parsed.player_name, "Buyer");
        assert!(!access.status().await.unwrap().degraded);

        access.shutdown().await.unwrap();
        watcher.task_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_stalling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client.txt");
        append(&path, "");
        let context = SomeTestParams::context(&path);
        let triggers = Arc::new(TriggerSet::compile(&default_triggers()).unwrap());
        let (trade_tx, _trade_rx) = mpsc::channel(1);

        let watcher =
            LogWatcher::with_settings(&context, triggers, trade_tx, settings(path.clone()));
        let access = watcher.new_accessor();
        tokio::time::sleep(Duration::from_millis(50)).await;

        for i in 0..3 {
            append(
                &path,
                &format!("{}\n", SomeTestParams::incoming_line(&format!("Buyer{}", i), "Goldrim")),
            );
        }

        let status = loop {
            let status = access.status().await.unwrap();
            if status.trades_emitted + status.trades_dropped == 3 {
                break status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert_eq!(status.trades_emitted, 1);
        assert_eq!(status.trades_dropped, 2);

        access.shutdown().await.unwrap();
        watcher.task_handle.await.unwrap();
    }
}
