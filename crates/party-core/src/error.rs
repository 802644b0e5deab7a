//! Error types for the relay protocol

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while handling a client frame.
///
/// None of these are fatal: each one is reported back to the offending
/// connection as an `error` frame and the connection stays open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("{0}")]
    InvalidMessage(String),

    #[error("Room already exists")]
    RoomExists,

    #[error("Room does not exist")]
    RoomNotFound,

    #[error("Room is full")]
    RoomFull,

    #[error("Target peer not found")]
    PeerNotFound,

    #[error("Not in a room")]
    NotInRoom,

    #[error("Too many messages")]
    RateLimited,

    #[error("Not registered")]
    NotRegistered,

    #[error("Invitation not found")]
    InvitationNotFound,
}

impl RelayError {
    /// Shorthand for a malformed or incomplete frame
    pub fn invalid(message: impl Into<String>) -> Self {
        RelayError::InvalidMessage(message.into())
    }

    /// Wire code for this error
    pub fn code(&self) -> ErrorCode {
        ErrorCode::from(self)
    }
}

/// Wire error codes (sent in `error` frames)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidMessage,
    RoomExists,
    RoomNotFound,
    RoomFull,
    NotInRoom,
    RateLimited,
    NotRegistered,
    InvitationNotFound,
}

impl From<&RelayError> for ErrorCode {
    fn from(e: &RelayError) -> Self {
        match e {
            RelayError::InvalidMessage(_) => ErrorCode::InvalidMessage,
            RelayError::RoomExists => ErrorCode::RoomExists,
            RelayError::RoomNotFound => ErrorCode::RoomNotFound,
            RelayError::RoomFull => ErrorCode::RoomFull,
            // Clients already match on not_in_room for a missing unicast target.
            RelayError::PeerNotFound => ErrorCode::NotInRoom,
            RelayError::NotInRoom => ErrorCode::NotInRoom,
            RelayError::RateLimited => ErrorCode::RateLimited,
            RelayError::NotRegistered => ErrorCode::NotRegistered,
            RelayError::InvitationNotFound => ErrorCode::InvitationNotFound,
        }
    }
}
