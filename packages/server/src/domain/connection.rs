//! A live connection as seen by the registry.
//!
//! The registry owns the only long-lived `Connection` of every admitted
//! socket. Two things end the writer loop:
//!
//! - eviction: [`Connection::close`] fires once and the receiver stops
//!   yielding frames immediately, dropping any backlog
//! - every `Connection` handle dropped: the receiver yields what is left in
//!   the queue, then reports the end

use std::sync::Arc;

use tokio::sync::{
    mpsc::{self, error::TryRecvError},
    watch,
};

use super::{
    error::PushError,
    value_object::{ConnectionId, ConnectionIdFactory, UserId},
};

/// Sending half of a connection's bounded outbound queue
pub type OutboundSender = mpsc::Sender<String>;

/// Receiving half, drained by the writer loop
#[derive(Debug)]
pub struct OutboundReceiver {
    frames: mpsc::Receiver<String>,
    evicted: watch::Receiver<bool>,
}

impl OutboundReceiver {
    /// Next queued frame.
    ///
    /// Returns `None` as soon as the connection is evicted, even if frames
    /// are still queued, or once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<String> {
        tokio::select! {
            biased;
            _ = wait_for_eviction(&mut self.evicted) => None,
            frame = self.frames.recv() => frame,
        }
    }

    pub fn try_recv(&mut self) -> Result<String, TryRecvError> {
        if self.is_evicted() {
            return Err(TryRecvError::Disconnected);
        }
        self.frames.try_recv()
    }

    pub fn is_evicted(&self) -> bool {
        *self.evicted.borrow()
    }
}

async fn wait_for_eviction(evicted: &mut watch::Receiver<bool>) {
    if evicted.wait_for(|evicted| *evicted).await.is_err() {
        // handles dropped without eviction; the frame queue reports the end
        std::future::pending::<()>().await;
    }
}

/// Identity of a connection, handed to the reader loop and the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub user_id: UserId,
}

/// One admitted connection and its outbound queue
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: UserId,
    sender: OutboundSender,
    eviction: Arc<watch::Sender<bool>>,
}

impl Connection {
    /// Create a connection with a fresh id and a queue of `capacity` frames
    pub fn open(user_id: UserId, capacity: usize) -> (Self, OutboundReceiver) {
        let (sender, frames) = mpsc::channel(capacity.max(1));
        let (eviction, evicted) = watch::channel(false);
        let connection = Self {
            id: ConnectionIdFactory::generate(),
            user_id,
            sender,
            eviction: Arc::new(eviction),
        };
        (connection, OutboundReceiver { frames, evicted })
    }

    pub fn context(&self) -> ConnectionContext {
        ConnectionContext {
            id: self.id,
            user_id: self.user_id,
        }
    }

    /// Enqueue without waiting
    pub fn try_push(&self, payload: String) -> Result<(), PushError> {
        if *self.eviction.borrow() {
            return Err(PushError::Closed);
        }
        self.sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
        })
    }

    /// Signal eviction to the writer loop.
    ///
    /// Returns `true` only for the call that actually closed the connection.
    pub fn close(&self) -> bool {
        !self.eviction.send_replace(true)
    }
}
