//! Concurrency gate
//!
//! Serializes dispatch for one session. The underlying tokio mutex is fair
//! (FIFO), so waiters are admitted in the order they started waiting, which is
//! the protocol stack's delivery order for that session.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::error::Elapsed;

/// Per-session admission gate
#[derive(Clone)]
pub struct ConcurrencyGate {
    label: Arc<str>,
    lock: Arc<Mutex<()>>,
}

/// Proof of being inside the gate; dropping it releases the gate
#[derive(Debug)]
pub struct GateGuard {
    label: Arc<str>,
    _guard: OwnedMutexGuard<()>,
}

impl ConcurrencyGate {
    pub fn new(label: impl Into<String>) -> Self {
        let label: String = label.into();
        Self {
            label: Arc::from(label),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Wait for the gate, optionally bounded by `timeout`
    pub async fn enter(&self, timeout: Option<Duration>) -> Result<GateGuard, Elapsed> {
        let acquire = self.lock.clone().lock_owned();
        let guard = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, acquire).await?,
            None => acquire.await,
        };
        Ok(GateGuard { label: self.label.clone(), _guard: guard })
    }

    /// Whether some task currently holds the gate
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

impl GateGuard {
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ConcurrencyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGate")
            .field("label", &self.label)
            .field("held", &self.is_held())
            .finish()
    }
}
