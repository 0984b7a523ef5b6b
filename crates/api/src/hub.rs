use sighub_core::Broadcaster;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Fan-out of outbound text to every live session.
///
/// Clone-able; clones share the channel and the session counter.
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<String>,
    sessions: Arc<AtomicUsize>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Register a live session; it counts until the guard is dropped.
    pub fn open_session(&self) -> SessionGuard {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        SessionGuard {
            sessions: self.sessions.clone(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Broadcaster for BroadcastHub {
    fn multicast_text(&self, text: String) -> usize {
        // Zero receivers counts as zero deliveries.
        self.tx.send(text).unwrap_or(0)
    }
}

pub struct SessionGuard {
    sessions: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions.fetch_sub(1, Ordering::SeqCst);
    }
}
