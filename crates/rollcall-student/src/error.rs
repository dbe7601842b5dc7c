//! Student client errors.

use rollcall_core::protocol::RejectReason;
use thiserror::Error;

/// Student client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Check-in refused: {0}")]
    Rejected(RejectReason),

    #[error("Student ID not found in the roster: {id}")]
    UnknownPeer { id: String },

    #[error("Cannot send a message to yourself")]
    SelfMessage,

    #[error("Server closed the connection")]
    Closed,

    #[error("Not checked in")]
    NotCheckedIn,

    #[error("Protocol error: {0}")]
    Protocol(#[from] rollcall_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
