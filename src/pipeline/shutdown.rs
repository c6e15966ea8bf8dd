//! Pipeline-wide shutdown broadcast.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A one-shot signal observed by every stage at once.
///
/// Clones share state. The signal channel never carries a message: triggering
/// drops its only sender, which makes every receiver ready at the same time,
/// so stages can include [`Shutdown::signal`] in a `select!`.
#[derive(Debug, Clone)]
pub struct Shutdown {
    triggered: Arc<AtomicBool>,
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
        }
    }

    /// Request shutdown. Idempotent.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let mut sender = self.trigger.lock().unwrap_or_else(|e| e.into_inner());
        sender.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) once shutdown is triggered.
    pub fn signal(&self) -> &Receiver<()> {
        &self.signal
    }

    /// Block until shutdown is triggered.
    pub fn wait(&self) {
        let _ = self.signal.recv();
    }

    /// Block until shutdown is triggered or `timeout` elapses.
    /// Returns whether shutdown was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let _ = self.signal.recv_timeout(timeout);
        self.is_triggered()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
