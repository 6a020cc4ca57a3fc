//! One-shot settlement gate.
//!
//! Several tasks may try to report the result of the same run; only the first
//! [`Settlement::settle`] call delivers its value; later ones are no-ops.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

pub struct Settlement<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Settlement<T> {
    /// Create a gate and the receiver that observes the winning value.
    pub fn new() -> (Arc<Self>, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        let gate = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
        });
        (gate, rx)
    }

    /// Try to settle with `value`. Returns `true` if this call won.
    ///
    /// Winning does not depend on the receiver still being alive.
    pub fn settle(&self, value: T) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                let _ = tx.send(value);
                true
            }
            None => false,
        }
    }
}
