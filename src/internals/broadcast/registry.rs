use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::mpsc;

/// Identifies one live subscriber connection for the registry's lifetime.
pub type SubscriberId = u64;

/// Everything a session's writer can be asked to put on the wire.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// One tick's serialized push line, shared across all subscribers.
    Telemetry(std::sync::Arc<String>),
    /// Shutdown: the session should drop the connection and exit.
    Close,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PushError {
    /// The subscriber's queue is full. Slow consumers are dropped, not
    /// buffered, so this is treated exactly like a dead connection.
    #[error("Subscriber queue full.")]
    Backpressure,

    /// The session has already gone away.
    #[error("Subscriber disconnected.")]
    Disconnected,
}

/// Opaque reference to one live connection plus its outbound-send
/// capability. All writes for the connection funnel through the session
/// task draining this queue, so sends are serialized per handle.
#[derive(Debug, Clone)]
pub struct SubscriberHandle {
    id: SubscriberId,
    tx: mpsc::Sender<OutboundMessage>,
}

impl SubscriberHandle {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Non-blocking push. A full queue or closed session is a push
    /// failure; the caller deregisters this handle and moves on.
    pub fn push(&self, message: OutboundMessage) -> Result<(), PushError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PushError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => PushError::Disconnected,
        })
    }
}

/// Thread-safe set of active subscriber handles. The only data structure
/// in the relay mutated by multiple concurrent tasks; everything goes
/// through the mutex so a broadcast snapshot never observes a
/// half-mutated set.
#[derive(Default)]
pub struct ClientRegistry {
    members: Mutex<HashMap<SubscriberId, SubscriberHandle>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new subscriber and hand back its id. Membership has no
    /// cardinality limit; identity is the only key.
    pub fn register(&self, tx: mpsc::Sender<OutboundMessage>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SubscriberHandle { id, tx };
        self.lock_members().insert(id, handle);
        id
    }

    /// Remove one subscriber. Removing an already-removed id is a no-op,
    /// so a session's own exit path and a failed push cannot trip over
    /// each other.
    pub fn deregister(&self, id: SubscriberId) {
        self.lock_members().remove(&id);
    }

    /// Stable snapshot of the current members for one fan-out pass.
    /// Handles cloned out here stay valid even if deregistered
    /// mid-iteration; their pushes simply start failing.
    pub fn snapshot_members(&self) -> Vec<SubscriberHandle> {
        self.lock_members().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock_members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_members().is_empty()
    }

    /// Shutdown: ask every still-registered session to close its
    /// connection, then clear the set.
    pub fn close_all(&self) {
        let mut members = self.lock_members();
        for handle in members.values() {
            // Best effort; a full queue means the session is exiting anyway.
            let _ = handle.push(OutboundMessage::Close);
        }
        members.clear();
    }

    fn lock_members(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, SubscriberHandle>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_snapshot_deregister() {
        let registry = ClientRegistry::new();
        let (tx_a, _rx_a) = mpsc::channel(4);
        let (tx_b, _rx_b) = mpsc::channel(4);

        let a = registry.register(tx_a);
        let b = registry.register(tx_b);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);

        let snapshot = registry.snapshot_members();
        assert_eq!(snapshot.len(), 2);

        registry.deregister(a);
        assert_eq!(registry.len(), 1);
        // Duplicate removal is a no-op.
        registry.deregister(a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_push_reports_backpressure_and_disconnect() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register(tx);

        let line = std::sync::Arc::new("{}".to_string());
        let handle = registry.snapshot_members().remove(0);
        handle
            .push(OutboundMessage::Telemetry(line.clone()))
            .unwrap();
        assert_eq!(
            handle.push(OutboundMessage::Telemetry(line.clone())),
            Err(PushError::Backpressure)
        );

        rx.close();
        while rx.try_recv().is_ok() {}
        assert_eq!(
            handle.push(OutboundMessage::Telemetry(line)),
            Err(PushError::Disconnected)
        );
    }

    #[test]
    fn test_close_all_notifies_and_clears() {
        let registry = ClientRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.register(tx);

        registry.close_all();
        assert!(registry.is_empty());
        assert!(matches!(rx.try_recv(), Ok(OutboundMessage::Close)));
    }

    #[test]
    fn test_concurrent_registration_keeps_ids_unique() {
        let registry = std::sync::Arc::new(ClientRegistry::new());
        let mut joins = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            joins.push(std::thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..50 {
                    let (tx, _rx) = mpsc::channel(1);
                    ids.push(registry.register(tx));
                }
                ids
            }));
        }

        let mut all: Vec<SubscriberId> = joins
            .into_iter()
            .flat_map(|j| j.join().expect("registration thread panicked"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 8 * 50);
        assert_eq!(registry.len(), 8 * 50);
    }
}
