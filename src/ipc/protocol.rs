use serde::{de::DeserializeOwned, Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::error::HelperError;

/// Upper bound for one frame, newline included.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

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
pub enum CommandCode {
    ShowTrades,
    Hideout,
    Status,
    Shutdown,
    /// Payload is the trade ID.
    Complete,
    /// Payload is the trade ID.
    Cancel,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Request {
    pub code: CommandCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Request {
    pub fn new(code: CommandCode) -> Self {
        Self {
            code,
            payload: None,
        }
    }

    pub fn with_payload(code: CommandCode, payload: impl Into<String>) -> Self {
        Self {
            code,
            payload: Some(payload.into()),
        }
    }
}

#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Clone,
    Copy,
    Debug,
    EnumString,
    Display,
    IntoStaticStr,
)]
pub enum Outcome {
    Ok,
    Error,
    ProtocolError,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
pub struct Response {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            outcome: Outcome::Ok,
            message: None,
            payload: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Error,
            message: Some(message.into()),
            payload: None,
        }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::ProtocolError,
            message: Some(message.into()),
            payload: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self, HelperError> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }

    /// Decodes the structured payload, `None` when the server sent none.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<Option<T>, HelperError> {
        match &self.payload {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }
}

/// Payload of a `Status` response.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct StatusReport {
    pub healthy: bool,
    pub active_trades: usize,
    pub window_manager: String,
    pub log_degraded: bool,
    pub uptime_secs: u64,
    pub pid: u32,
}

/// Reads one newline-terminated JSON frame. `Ok(None)` means the peer closed
/// the stream before sending anything.
pub async fn read_frame<T, R>(reader: &mut R) -> Result<Option<T>, HelperError>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = reader
        .take(MAX_FRAME_BYTES as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;

    if read == 0 {
        return Ok(None);
    }
    if buf.len() > MAX_FRAME_BYTES {
        return Err(HelperError::Protocol(format!(
            "Frame exceeds {} bytes",
            MAX_FRAME_BYTES
        )));
    }
    if buf.last() != Some(&b'\n') {
        return Err(HelperError::Protocol("Stream closed mid-frame".to_string()));
    }

    let frame = serde_json::from_slice(&buf)
        .map_err(|error| HelperError::Protocol(format!("Malformed frame - {}", error)))?;
    Ok(Some(frame))
}

pub async fn write_frame<T, W>(writer: &mut W, frame: &T) -> Result<(), HelperError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut buf = serde_json::to_vec(frame)?;
    buf.push(b'\n');
    if buf.len() > MAX_FRAME_BYTES {
        return Err(HelperError::Protocol(format!(
            "Frame exceeds {} bytes",
            MAX_FRAME_BYTES
        )));
    }
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
