#![allow(dead_code)]

use std::{
    io::Write,
    sync::Arc,
    time::{Duration, Instant},
};

use tempfile::TempDir;
use tokio::{sync::watch, task::JoinHandle, time::sleep};

use poe_helper::{
    common::error::HelperError,
    config::Config,
    context::Context,
    helper::PoeHelper,
    ipc::{CommandClient, CommandCode, Request, Response, StatusReport},
    testing::*,
};

pub const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// A running service wired to fake collaborators inside a temp dir.
pub struct ServiceHarness {
    pub dir: TempDir,
    pub config: Config,
    pub selector: Arc<RecordingSelector>,
    pub window_manager: Arc<FakeWindowManager>,
    pub input: Arc<FakeInput>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: Arc<MemoryTradeStore>,
    pub shutdown_tx: Arc<watch::Sender<bool>>,
    pub task_handle: JoinHandle<Result<(), HelperError>>,
}

impl ServiceHarness {
    pub async fn start(
        selector: RecordingSelector,
        window_manager: FakeWindowManager,
        store: MemoryTradeStore,
    ) -> Self {
        let _trace_sub = tracing_subscriber::fmt::try_init();

        let dir = tempfile::tempdir().unwrap();
        let config = SomeTestParams::config(dir.path());
        let selector = Arc::new(selector);
        let window_manager = Arc::new(window_manager);
        let input = Arc::new(FakeInput::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(store);

        let context = Context::with_notifier(config.clone(), notifier.clone());
        let helper = PoeHelper::with_collaborators(
            context,
            window_manager.clone(),
            input.clone(),
            selector.clone(),
            store.clone(),
        )
        .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let task_handle = tokio::spawn(helper.run_until(shutdown_tx.clone(), shutdown_rx));

        let harness = Self {
            dir,
            config,
            selector,
            window_manager,
            input,
            notifier,
            store,
            shutdown_tx,
            task_handle,
        };
        harness.wait_until_tailing().await;
        harness
    }

    pub async fn start_default() -> Self {
        Self::start(
            RecordingSelector::choosing(0),
            FakeWindowManager::default(),
            MemoryTradeStore::default(),
        )
        .await
    }

    pub fn client(&self) -> CommandClient {
        CommandClient::from_config(&self.config)
    }

    pub async fn send(&self, code: CommandCode) -> Response {
        self.client().send(&Request::new(code)).await.unwrap()
    }

    pub async fn status(&self) -> StatusReport {
        self.send(CommandCode::Status)
            .await
            .decode_payload()
            .unwrap()
            .unwrap()
    }

    // The log file does not exist at startup, so the watcher reports
    // degraded once it has polled. From then on it reads new files from the
    // start, so nothing appended by a test is skipped.
    async fn wait_until_tailing(&self) {
        let started = Instant::now();
        loop {
            if let Ok(response) = self.client().send(&Request::new(CommandCode::Status)).await {
                let report: StatusReport = response.decode_payload().unwrap().unwrap();
                if report.log_degraded {
                    return;
                }
            }
            assert!(started.elapsed() < WAIT_LIMIT, "Service never came up");
            sleep(Duration::from_millis(20)).await;
        }
    }

    pub fn append_log(&self, lines: &[String]) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.log_path)
            .unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    pub async fn wait_for_active(&self, count: usize) -> StatusReport {
        let started = Instant::now();
        loop {
            let report = self.status().await;
            if report.active_trades == count {
                return report;
            }
            assert!(
                started.elapsed() < WAIT_LIMIT,
                "Expected {} active trades, have {}",
                count,
                report.active_trades
            );
            sleep(Duration::from_millis(20)).await;
        }
    }

    pub async fn stop(self) -> Result<(), HelperError> {
        let response = self.send(CommandCode::Shutdown).await;
        assert!(response.is_ok());
        tokio::time::timeout(WAIT_LIMIT, self.task_handle)
            .await
            .unwrap()
            .unwrap()
    }
}
