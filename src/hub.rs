// Per-client push channels

use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

use crate::models::{ClientId, PushMessage};

/// Addresses a push message to one client. Never blocks.
pub trait Publisher: Send + Sync {
    fn send(&self, client: &str, message: PushMessage);
}

/// Bounded channel per connected client. The socket task owns the receiver;
/// unregistering drops the sender, which ends that task's stream.
pub struct ClientHub {
    capacity: usize,
    clients: RwLock<HashMap<ClientId, mpsc::Sender<PushMessage>>>,
}

impl ClientHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces any earlier channel registered under the same id.
    pub fn register(&self, client: &str) -> mpsc::Receiver<PushMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(client.to_string(), tx);
        rx
    }

    pub fn unregister(&self, client: &str) -> bool {
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(client)
            .is_some()
    }

    pub fn count(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Publisher for ClientHub {
    fn send(&self, client: &str, message: PushMessage) {
        let clients = self.clients.read().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = clients.get(client) else {
            tracing::debug!(client_id = client, "push to unknown client dropped");
            return;
        };
        if let Err(e) = tx.try_send(message) {
            tracing::debug!(client_id = client, error = %e, "push dropped");
        }
    }
}
