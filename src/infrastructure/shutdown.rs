//! Cooperative cancellation: a broadcast channel raced against every
//! poll-loop sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::broadcast;
use tokio::time::sleep;

use crate::domain::errors::{AgentError, AgentResult};

/// Cloneable shutdown handle.
///
/// `trigger` flips all clones; sleeps in flight unwind with `Cancelled`.
/// The flag covers receivers that subscribe after the trigger fired.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, or return `Cancelled` if shutdown triggers
    /// first (or already has).
    pub async fn sleep(&self, duration: Duration) -> AgentResult<()> {
        if self.is_triggered() {
            return Err(AgentError::Cancelled);
        }
        let mut rx = self.tx.subscribe();
        select! {
            _ = sleep(duration) => Ok(()),
            _ = rx.recv() => Err(AgentError::Cancelled),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
