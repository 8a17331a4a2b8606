//! Live connection set.
//!
//! Each open socket registers here and gets a bounded outbound queue. The
//! broadcaster never touches sockets directly: it takes a [`snapshot`] of the
//! handles and queues text on each one. The socket's own task drains the
//! queue, so a send never blocks on a slow client.
//!
//! [`snapshot`]: ConnectionRegistry::snapshot

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::error::SendFailure;

/// Outbound messages a connection may have queued before sends to it fail.
pub const OUTBOUND_QUEUE: usize = 16;

/// Non-owning handle used to queue one message for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    outbound: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue `text` without waiting. The connection may already be gone.
    pub fn send(&self, text: String) -> Result<(), SendFailure> {
        self.outbound.try_send(text).map_err(|e| match e {
            TrySendError::Closed(_) => SendFailure::Closed(self.id),
            TrySendError::Full(_) => SendFailure::Backlogged(self.id),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    open: Arc<Mutex<Vec<ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection. It stays registered until the guard is dropped.
    pub fn register(&self) -> (ConnectionGuard, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            outbound,
        };
        self.lock().push(handle.clone());
        let guard = ConnectionGuard {
            handle,
            registry: self.clone(),
        };
        (guard, rx)
    }

    /// Point-in-time copy of the open connections, oldest first.
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: Uuid) {
        self.lock().retain(|handle| handle.id != id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ConnectionHandle>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Deregisters its connection on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    handle: ConnectionHandle,
    registry: ConnectionRegistry,
}

impl ConnectionGuard {
    pub fn id(&self) -> Uuid {
        self.handle.id
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.handle.id);
    }
}
