//! Local command endpoint: line-delimited JSON over a Unix socket, one
//! request and one response per connection.

mod client;
mod handler;
mod protocol;
mod server;

pub use client::CommandClient;
pub use handler::{CommandHandler, CommandHandlerBuilder};
pub use protocol::{
    read_frame, write_frame, CommandCode, Outcome, Request, Response, StatusReport,
    MAX_FRAME_BYTES,
};
pub use server::CommandServer;
