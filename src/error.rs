//! Error types for the chat service
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

use crate::types::ConnectionId;

/// Application-level errors
///
/// Covers fatal errors (transport/channel breakage) and recoverable
/// protocol conditions. Malformed commands and invalid state transitions
/// are *not* errors; they are reported as console diagnostics.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the affected connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (oversized or non-UTF-8 line)
    #[error("line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Channel send error (fatal - the control actor is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// A connection handle was registered twice
    #[error("connection {0} is already registered")]
    DuplicateRegistration(ConnectionId),

    /// Client-side send attempted with no open connection
    #[error("not connected to a server")]
    NotConnected,
}

/// Message send errors
///
/// Occurs when attempting to send messages through closed channels.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
