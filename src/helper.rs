use std::sync::Arc;

use tokio::{
    select,
    signal::unix::{signal, SignalKind},
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    collab::{
        InputAutomation, JsonLinesTradeStore, RofiSelector, Severity, TradeSelector, TradeStore,
        XdotoolInput,
    },
    common::{
        error::HelperError, persist::Persister, types::APP_DISPLAY_NAME,
        utils::check_dependencies,
    },
    context::Context,
    ipc::{CommandHandlerBuilder, CommandServer},
    trade::TradeRegistry,
    watcher::{LogWatcher, TriggerSet},
    wm::{self, CommandRunner, SystemRunner, WindowManager},
};

/// The long-running background service. Construction acquires every
/// expensive resource once; `run` serves commands until shutdown.
pub struct PoeHelper {
    context: Context,
    triggers: Arc<TriggerSet>,
    window_manager: Arc<dyn WindowManager>,
    input: Arc<dyn InputAutomation>,
    selector: Arc<dyn TradeSelector>,
    store: Arc<dyn TradeStore>,
}

impl PoeHelper {
    const TRADE_QUEUE_SIZE: usize = 256;

    /// Checks dependencies and builds the session's collaborators. Failures
    /// are shown through the notifier before being returned.
    pub async fn new(context: Context) -> Result<Self, HelperError> {
        match Self::build(&context) {
            Ok(helper) => Ok(helper),
            Err(error) => {
                error!("Startup failed - {}", error);
                context.notify(&error.to_string(), Severity::Error).await;
                Err(error)
            }
        }
    }

    fn build(context: &Context) -> Result<Self, HelperError> {
        let config = context.config.clone();
        check_dependencies(&config.dependencies)?;

        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let window_manager = wm::detect(runner.clone())?;
        let input = Arc::new(XdotoolInput::new(runner, config.hideout_command.clone())?);
        let selector = Arc::new(RofiSelector::new("rofi"));
        let store = Arc::new(JsonLinesTradeStore::new(&config.history_path));

        Self::with_collaborators(context.clone(), window_manager, input, selector, store)
    }

    pub fn with_collaborators(
        context: Context,
        window_manager: Arc<dyn WindowManager>,
        input: Arc<dyn InputAutomation>,
        selector: Arc<dyn TradeSelector>,
        store: Arc<dyn TradeStore>,
    ) -> Result<Self, HelperError> {
        let triggers = Arc::new(context.config.compile_triggers()?);
        Ok(Self {
            context,
            triggers,
            window_manager,
            input,
            selector,
            store,
        })
    }

    pub async fn run(self) -> Result<(), HelperError> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.run_until(Arc::new(shutdown_tx), shutdown_rx).await
    }

    /// Same as `run`, with the shutdown channel owned by the caller.
    pub async fn run_until(
        self,
        shutdown_tx: Arc<watch::Sender<bool>>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), HelperError> {
        let config = self.context.config.clone();

        // Bind before any background work so a second instance leaves nothing behind
        let server = CommandServer::bind(&config.socket_path).await?;

        let persister = Persister::new(self.store.clone());
        let registry =
            TradeRegistry::with_persistence(config.registry_settings(), persister.new_queue());
        self.restore_history(&registry).await;

        let (trade_tx, trade_rx) = mpsc::channel(Self::TRADE_QUEUE_SIZE);
        let ingest_handle = registry.spawn_ingest(trade_rx);
        let watcher = LogWatcher::new(&self.context, self.triggers.clone(), trade_tx);
        let watcher_access = watcher.new_accessor();

        let sweeper_handle = registry.spawn_sweeper(config.sweep_interval(), shutdown_rx.clone());
        let signal_handle = spawn_signal_listener(shutdown_tx.clone(), shutdown_rx.clone());
        let watcher_stop_handle = {
            let watcher_access = watcher_access.clone();
            let mut shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                wait_for_shutdown(&mut shutdown_rx).await;
                if let Some(error) = watcher_access.shutdown().await.err() {
                    debug!("Log watcher already stopped - {}", error);
                }
            })
        };

        let handler = CommandHandlerBuilder::new()
            .registry(registry.clone())
            .window_manager(self.window_manager.clone())
            .input(self.input.clone())
            .selector(self.selector.clone())
            .game_window_classes(config.game_window_classes.clone())
            .selection_timeout(config.selection_timeout())
            .shutdown_tx(shutdown_tx.clone())
            .watcher(watcher_access)
            .build()?;

        info!(
            window_manager = self.window_manager.name(),
            socket = %server.path().display(),
            "{} running",
            APP_DISPLAY_NAME
        );
        self.context
            .notify(&format!("{} started", APP_DISPLAY_NAME), Severity::Info)
            .await;

        let served = server
            .serve(Arc::new(handler), shutdown_rx, config.shutdown_grace())
            .await;

        // Serve can also end on error. Everything else still has to stop.
        shutdown_tx.send_replace(true);
        join("watcher stop", watcher_stop_handle).await;
        join("log watcher", watcher.task_handle).await;
        join("trade ingest", ingest_handle).await;
        join("expiry sweeper", sweeper_handle).await;
        join("signal listener", signal_handle).await;
        drop(registry);

        if let Some(error) = tokio::task::spawn_blocking(move || persister.terminate())
            .await
            .err()
        {
            error!("Error stopping the persister - {}", error);
        }
        info!("{} stopped", APP_DISPLAY_NAME);
        served
    }

    async fn restore_history(&self, registry: &TradeRegistry) {
        let store = self.store.clone();
        match tokio::task::spawn_blocking(move || store.load()).await {
            Ok(Ok(entries)) => {
                let restored = registry.restore(entries).await;
                info!(restored, "Trade history restored");
            }
            Ok(Err(error)) => warn!("Trade history not restored - {}", error),
            Err(error) => error!("Trade history load task failed - {}", error),
        }
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    if shutdown_rx.wait_for(|shutdown| *shutdown).await.is_err() {
        debug!("Shutdown sender dropped");
    }
}

async fn join(name: &str, handle: JoinHandle<()>) {
    if let Some(error) = handle.await.err() {
        error!(task = name, "Background task failed - {}", error);
    }
}

/// Turns SIGINT/SIGTERM into the shutdown broadcast.
fn spawn_signal_listener(
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => Some(sigterm),
            Err(error) => {
                warn!("SIGTERM handler not installed - {}", error);
                None
            }
        };
        let terminated = async {
            match sigterm.as_mut() {
                Some(sigterm) => {
                    sigterm.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        select! {
            interrupted = tokio::signal::ctrl_c() => {
                if let Some(error) = interrupted.err() {
                    warn!("Interrupt handler failed - {}", error);
                    return;
                }
                info!("Interrupt received, shutting down");
            },
            _ = terminated => info!("Terminate signal received, shutting down"),
            _ = wait_for_shutdown(&mut shutdown_rx) => return,
        }
        shutdown_tx.send_replace(true);
    })
}
