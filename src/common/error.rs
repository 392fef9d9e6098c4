use std::{error::Error, fmt};

use tokio::sync::{mpsc, oneshot};

use super::types::TradeId;
use crate::trade::TradeState;

#[derive(Debug)]
pub enum HelperError {
    Simple(String),
    DependencyMissing(String),
    LogSourceUnavailable(String),
    WindowNotFound(Vec<String>),
    InvalidArgument(String),
    ServerUnavailable(String),
    AlreadyRunning(String),
    TradeNotFound(TradeId),
    InvalidTransition {
        id: TradeId,
        from: TradeState,
        to: TradeState,
    },
    Protocol(String),
    Config(String),
    Backend(String),
    Io(std::io::Error),
    SerdesJson(serde_json::Error),
    Regex(regex::Error),
    StrumParsing(strum::ParseError),
    MpscSend(String),
    OneshotRecv(String),
}

impl HelperError {
    /// True for the outcomes a client should treat as "nobody is listening".
    pub fn is_server_unavailable(&self) -> bool {
        matches!(self, HelperError::ServerUnavailable(_))
    }
}

impl Error for HelperError {}

impl fmt::Display for HelperError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_string = match self {
            HelperError::Simple(msg) => format!("poe-helper-Error | Other - {}", msg),
            HelperError::DependencyMissing(dep) => format!(
                "poe-helper-Error | DependencyMissing - {} is not installed. Please install it using your package manager",
                dep
            ),
            HelperError::LogSourceUnavailable(msg) => {
                format!("poe-helper-Error | LogSourceUnavailable - {}", msg)
            }
            HelperError::WindowNotFound(classes) => format!(
                "poe-helper-Error | WindowNotFound - No window matching classes [{}]",
                classes.join(", ")
            ),
            HelperError::InvalidArgument(msg) => {
                format!("poe-helper-Error | InvalidArgument - {}", msg)
            }
            HelperError::ServerUnavailable(msg) => {
                format!("poe-helper-Error | ServerUnavailable - {}", msg)
            }
            HelperError::AlreadyRunning(endpoint) => format!(
                "poe-helper-Error | AlreadyRunning - Another instance owns {}",
                endpoint
            ),
            HelperError::TradeNotFound(id) => {
                format!("poe-helper-Error | TradeNotFound - No trade with ID {}", id)
            }
            HelperError::InvalidTransition { id, from, to } => format!(
                "poe-helper-Error | InvalidTransition - Trade {} cannot move from {} to {}",
                id, from, to
            ),
            HelperError::Protocol(msg) => format!("poe-helper-Error | Protocol - {}", msg),
            HelperError::Config(msg) => format!("poe-helper-Error | Config - {}", msg),
            HelperError::Backend(msg) => format!("poe-helper-Error | Backend - {}", msg),
            HelperError::Io(err) => format!("poe-helper-Error | IoError - {}", err),
            HelperError::SerdesJson(err) => {
                format!("poe-helper-Error | SerdesJsonError - {}", err)
            }
            HelperError::Regex(err) => format!("poe-helper-Error | RegexError - {}", err),
            HelperError::StrumParsing(err) => {
                format!("poe-helper-Error | StrumParseError - {}", err)
            }
            HelperError::MpscSend(msg) => format!("poe-helper-Error | MpscSendError - {}", msg),
            HelperError::OneshotRecv(msg) => {
                format!("poe-helper-Error | OneshotRecvError - {}", msg)
            }
        };
        write!(f, "{}", error_string)
    }
}

impl From<std::io::Error> for HelperError {
    fn from(e: std::io::Error) -> HelperError {
        HelperError::Io(e)
    }
}

impl From<serde_json::Error> for HelperError {
    fn from(e: serde_json::Error) -> HelperError {
        HelperError::SerdesJson(e)
    }
}

impl From<regex::Error> for HelperError {
    fn from(e: regex::Error) -> HelperError {
        HelperError::Regex(e)
    }
}

impl From<strum::ParseError> for HelperError {
    fn from(e: strum::ParseError) -> HelperError {
        HelperError::StrumParsing(e)
    }
}

impl<T> From<mpsc::error::SendError<T>> for HelperError {
    fn from(e: mpsc::error::SendError<T>) -> HelperError {
        HelperError::MpscSend(e.to_string())
    }
}

impl From<oneshot::error::RecvError> for HelperError {
    fn from(e: oneshot::error::RecvError) -> HelperError {
        HelperError::OneshotRecv(e.to_string())
    }
}
