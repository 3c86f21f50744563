//! One-shot, multi-reader completion signal.

use tokio::sync::watch;

/// Fires once all stream-copy tasks of an attach session have finished.
///
/// Cloned handles observe the same signal. Dropping the firing side without
/// calling [`Completer::complete`] also counts as completion, so a panicking
/// pump task doesn't leave waiters hanging.
#[derive(Clone, Debug)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

/// Firing side of a [`Completion`].
#[derive(Debug)]
pub struct Completer {
    tx: watch::Sender<bool>,
}

impl Completion {
    /// Create a signal together with the handle that fires it.
    pub fn new() -> (Completer, Completion) {
        let (tx, rx) = watch::channel(false);
        (Completer { tx }, Completion { rx })
    }

    /// A signal that has fired already.
    pub fn done() -> Completion {
        let (completer, completion) = Completion::new();
        completer.complete();
        completion
    }

    /// Check without blocking whether the signal has fired.
    pub fn is_done(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait for the signal to fire.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // An error means the sender is gone, which counts as done.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Completer {
    /// Fire the signal; waking up all current and future waiters.
    pub fn complete(self) {
        let _ = self.tx.send(true);
    }
}
