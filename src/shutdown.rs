// =============================================================================
// Cooperative Shutdown
// =============================================================================
//
// One `ShutdownHandle` lives in main; every monitor task holds a
// `ShutdownSignal` subscribed from it. Triggering the handle flips a watch
// flag, and each task observes it at its next `select!` point and winds down
// on its own. Dropping the handle counts as shutdown too, so tasks can never
// outlive main.

use tokio::sync::watch;

/// Broadcast side of the shutdown flag. Lives in main.
#[derive(Debug)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// New signal for one task. Subscribe before spawning.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Flip the flag. Every subscribed signal resolves its pending
    /// `cancelled()` call.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receive side of the shutdown flag. Cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Resolves once shutdown has been triggered (or the handle dropped).
    /// Cancel-safe: intended for use inside `tokio::select!` loops.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                // Sender gone: treat as shutdown.
                return;
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}
