use std::sync::{
    mpsc::{self, TrySendError},
    Arc,
};

use tracing::{debug, error, trace, warn};

use crate::{collab::TradeStore, trade::TradeEntry};

enum PersisterMsg {
    Persist(Box<TradeEntry>),
    Close,
}

/// Cloneable sending side of the persister, held by the registry.
#[derive(Clone)]
pub(crate) struct PersistQueue {
    persist_tx: mpsc::SyncSender<PersisterMsg>,
}

impl PersistQueue {
    pub(crate) fn queue(&self, entry: TradeEntry) {
        match self
            .persist_tx
            .try_send(PersisterMsg::Persist(Box::new(entry)))
        {
            Ok(_) => {}
            Err(error) => match error {
                TrySendError::Full(msg) => {
                    if let PersisterMsg::Persist(entry) = msg {
                        warn!(
                            trade_id = %entry.id,
                            "Persistence channel full, history record dropped"
                        );
                    }
                }
                TrySendError::Disconnected(_) => {
                    trace!("Persistence channel disconnected")
                }
            },
        }
    }
}

/// Writes trade records on a dedicated thread so store I/O never runs on
/// the async workers or under the registry lock.
pub(crate) struct Persister {
    persist_tx: mpsc::SyncSender<PersisterMsg>,
    task_handle: std::thread::JoinHandle<()>,
}

impl Persister {
    const PERSIST_CHANNEL_SIZE: usize = 256;

    pub(crate) fn new(store: Arc<dyn TradeStore>) -> Self {
        let (persist_tx, persist_rx) = mpsc::sync_channel(Self::PERSIST_CHANNEL_SIZE);
        let task_handle = std::thread::spawn(move || {
            loop {
                match persist_rx.recv() {
                    Ok(PersisterMsg::Persist(entry)) => {
                        if let Some(error) = store.save(&entry).err() {
                            error!(trade_id = %entry.id, "Error persisting trade - {}", error);
                        }
                    }
                    Ok(PersisterMsg::Close) => break,
                    Err(err) => {
                        debug!("Persistence channel recv Error - {}", err);
                        break;
                    }
                }
            }
            debug!("Persistence thread exiting");
        });

        Self {
            persist_tx,
            task_handle,
        }
    }

    pub(crate) fn new_queue(&self) -> PersistQueue {
        PersistQueue {
            persist_tx: self.persist_tx.clone(),
        }
    }

    /// Flushes queued records and joins the thread.
    pub(crate) fn terminate(self) {
        if self.persist_tx.send(PersisterMsg::Close).is_err() {
            debug!("Persistence thread already gone");
        }
        if let Some(error) = self.task_handle.join().err() {
            error!("Error terminating persistence thread - {:?}", error);
        }
    }
}
