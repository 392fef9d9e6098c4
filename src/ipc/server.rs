use std::{
    ffi::OsString,
    fs::{File, OpenOptions},
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use fs2::FileExt;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    select,
    sync::watch,
    task::JoinSet,
};
use tracing::{debug, error, info, trace, warn};

use super::{
    handler::CommandHandler,
    protocol::{read_frame, write_frame, Request, Response},
};
use crate::common::error::HelperError;

/// Owner of the local command endpoint. At most one per socket path.
pub struct CommandServer {
    listener: UnixListener,
    path: PathBuf,
    // Exclusive lock on `<socket>.lock`, held until the server is dropped
    _instance_lock: File,
}

impl CommandServer {
    const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Binds the endpoint. Whoever holds the lock file next to the socket
    /// owns it, so a held lock or a live listener already on `path` is
    /// `AlreadyRunning`. A stale socket file left by a dead process is only
    /// removed under the lock, then the bind is retried once.
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self, HelperError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let lock_path = lock_path_for(&path);
        let instance_lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if let Some(error) = instance_lock.try_lock_exclusive().err() {
            debug!(lock = %lock_path.display(), "Instance lock held elsewhere - {}", error);
            return Err(HelperError::AlreadyRunning(path.display().to_string()));
        }

        let listener = match UnixListener::bind(&path) {
            Ok(listener) => listener,
            Err(error) if error.kind() == ErrorKind::AddrInUse => {
                if UnixStream::connect(&path).await.is_ok() {
                    return Err(HelperError::AlreadyRunning(path.display().to_string()));
                }
                warn!(path = %path.display(), "Removing stale command socket");
                tokio::fs::remove_file(&path).await?;
                UnixListener::bind(&path)?
            }
            Err(error) => return Err(error.into()),
        };

        info!(path = %path.display(), "Command endpoint bound");
        Ok(Self {
            listener,
            path,
            _instance_lock: instance_lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts connections until shutdown is signalled, then stops
    /// accepting, gives in-flight connections `grace` to finish and
    /// releases the endpoint.
    pub async fn serve(
        self,
        handler: Arc<CommandHandler>,
        mut shutdown_rx: watch::Receiver<bool>,
        grace: Duration,
    ) -> Result<(), HelperError> {
        let CommandServer {
            listener,
            path,
            _instance_lock,
        } = self;
        let mut connections = JoinSet::new();

        if !*shutdown_rx.borrow_and_update() {
            loop {
                select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let handler = handler.clone();
                                connections.spawn(async move {
                                    handle_connection(stream, handler).await
                                });
                            }
                            Err(error) => warn!("Error accepting command connection - {}", error),
                        }
                    },
                    Some(joined) = connections.join_next() => {
                        if let Some(error) = joined.err() {
                            error!("Command connection task failed - {}", error);
                        }
                    },
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    },
                }
            }
        }

        drop(listener);
        info!(in_flight = connections.len(), "Command endpoint closed, draining connections");
        if tokio::time::timeout(grace, drain(&mut connections))
            .await
            .is_err()
        {
            warn!(
                remaining = connections.len(),
                "Grace period over, aborting command connections"
            );
            connections.abort_all();
            drain(&mut connections).await;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "Command socket removed"),
            Err(error) if error.kind() == ErrorKind::NotFound => {}
            Err(error) => {
                warn!(path = %path.display(), "Could not remove command socket - {}", error)
            }
        }
        // Released only after the socket file is gone
        drop(_instance_lock);
        Ok(())
    }
}

fn lock_path_for(socket_path: &Path) -> PathBuf {
    let mut name = OsString::from(socket_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

async fn drain(connections: &mut JoinSet<()>) {
    while let Some(joined) = connections.join_next().await {
        if let Some(error) = joined.err() {
            if !error.is_cancelled() {
                error!("Command connection task failed - {}", error);
            }
        }
    }
}

async fn handle_connection(mut stream: UnixStream, handler: Arc<CommandHandler>) {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);

    let read = tokio::time::timeout(
        CommandServer::REQUEST_READ_TIMEOUT,
        read_frame::<Request, _>(&mut reader),
    )
    .await;

    let response = match read {
        Ok(Ok(Some(request))) => handler.handle(request).await,
        Ok(Ok(None)) => {
            trace!("Client closed without sending a request");
            return;
        }
        Ok(Err(HelperError::Protocol(message))) => {
            warn!("Rejecting malformed request - {}", message);
            Response::protocol_error(message)
        }
        Ok(Err(error)) => {
            warn!("Error reading request - {}", error);
            return;
        }
        Err(_) => {
            warn!("Client sent no request in time");
            Response::protocol_error("Timed out waiting for request")
        }
    };

    if let Some(error) = write_frame(&mut write_half, &response).await.err() {
        debug!("Client went away before the response - {}", error);
        return;
    }
    if let Some(error) = write_half.shutdown().await.err() {
        trace!("Error closing command connection - {}", error);
    }
}
