use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::UnixStream,
};
use tracing::debug;

use super::protocol::{read_frame, write_frame, Request, Response};
use crate::{common::error::HelperError, config::Config};

/// Sends one request per connection and waits a bounded time for the reply.
#[derive(Clone, Debug)]
pub struct CommandClient {
    socket_path: PathBuf,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl CommandClient {
    pub fn new(
        socket_path: impl AsRef<Path>,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            connect_timeout,
            response_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.socket_path,
            config.connect_timeout(),
            config.response_timeout(),
        )
    }

    pub fn response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// `ServerUnavailable` covers every way of not getting an answer: no
    /// endpoint, connect timeout, response timeout, or the server hanging
    /// up. An explicit error from the server comes back as a `Response`.
    pub async fn send(&self, request: &Request) -> Result<Response, HelperError> {
        debug!(code = %request.code, path = %self.socket_path.display(), "Sending command");

        let mut stream = match tokio::time::timeout(
            self.connect_timeout,
            UnixStream::connect(&self.socket_path),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => {
                return Err(HelperError::ServerUnavailable(format!(
                    "Cannot connect to {} - {}",
                    self.socket_path.display(),
                    error
                )))
            }
            Err(_) => {
                return Err(HelperError::ServerUnavailable(format!(
                    "Timed out connecting to {} after {:?}",
                    self.socket_path.display(),
                    self.connect_timeout
                )))
            }
        };

        let (read_half, mut write_half) = stream.split();
        write_frame(&mut write_half, request)
            .await
            .map_err(|error| match error {
                HelperError::Io(error) => {
                    HelperError::ServerUnavailable(format!("Sending request failed - {}", error))
                }
                error => error,
            })?;
        if let Some(error) = write_half.shutdown().await.err() {
            debug!("Error half-closing command connection - {}", error);
        }

        let mut reader = BufReader::new(read_half);
        match tokio::time::timeout(
            self.response_timeout,
            read_frame::<Response, _>(&mut reader),
        )
        .await
        {
            Ok(Ok(Some(response))) => Ok(response),
            Ok(Ok(None)) => Err(HelperError::ServerUnavailable(
                "Server closed the connection without a response".to_string(),
            )),
            Ok(Err(HelperError::Io(error))) => Err(HelperError::ServerUnavailable(format!(
                "Reading response failed - {}",
                error
            ))),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(HelperError::ServerUnavailable(format!(
                "No response within {:?}",
                self.response_timeout
            ))),
        }
    }
}
