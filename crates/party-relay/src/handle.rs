//! Send endpoint for a live connection
//!
//! A [`ConnectionHandle`] is what rooms and the user registry hold. It does
//! not own the socket: frames are queued for the connection's writer task,
//! which is owned by the connection's own lifecycle task. Dropping or cloning
//! a handle never closes anything.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Message;

use crate::messages::ServerMessage;

/// Process-unique connection identifier
pub type ConnId = u64;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

/// Failed delivery to a single connection
#[derive(Debug, Error)]
pub enum SendError {
    #[error("outbound queue full")]
    Full,

    #[error("connection closed")]
    Closed,

    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl<T> From<TrySendError<T>> for SendError {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => SendError::Full,
            TrySendError::Closed(_) => SendError::Closed,
        }
    }
}

/// Cloneable, non-owning handle used to push frames to a connection
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: mpsc::Sender<Message>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end drained by the writer task
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Serialize and queue a message. Never blocks.
    pub fn send(&self, msg: &ServerMessage) -> Result<(), SendError> {
        let json = msg.to_json()?;
        self.send_text(json)
    }

    /// Queue an already serialized frame. Never blocks.
    pub fn send_text(&self, json: String) -> Result<(), SendError> {
        self.tx.try_send(Message::Text(json))?;
        Ok(())
    }

    /// Queue a liveness probe
    pub fn ping(&self) -> Result<(), SendError> {
        self.tx.try_send(Message::Ping(Vec::new()))?;
        Ok(())
    }

    /// Whether the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
