//! Per-URL payment serialization.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async lock per store key, created on first use and dropped once
/// nobody holds or waits on it.
#[derive(Debug, Default)]
pub(crate) struct PaymentGates {
    gates: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Holds the gate for one key until dropped.
pub(crate) struct GateGuard<'a> {
    gates: &'a PaymentGates,
    key: String,
    gate: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
    waited: bool,
}

impl PaymentGates {
    /// Takes the gate for `key`, waiting behind any payment already in
    /// flight for it.
    pub(crate) async fn acquire(&self, key: &str) -> GateGuard<'_> {
        let gate = self.gates.lock().entry(key.to_string()).or_default().clone();
        let (guard, waited) = match gate.clone().try_lock_owned() {
            Ok(guard) => (guard, false),
            Err(_) => (gate.clone().lock_owned().await, true),
        };
        GateGuard {
            gates: self,
            key: key.to_string(),
            gate,
            guard: Some(guard),
            waited,
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.gates.lock().len()
    }
}

impl GateGuard<'_> {
    /// `true` if another payment for the same key held the gate first.
    pub(crate) fn waited(&self) -> bool {
        self.waited
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut gates = self.gates.gates.lock();
        // Only the map and this guard still point at the gate.
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(&self.key);
        }
    }
}
