//! One-shot completion signals.
//!
//! A [`CompletionTrigger`] is the single writer, a [`CompletionSignal`] is a
//! cloneable reader. The signal carries no payload: it is closed either by
//! [`CompletionTrigger::close`] or by dropping the trigger, and every waiter
//! (current or future) observes the close. Because `close` consumes the
//! trigger, closing twice cannot be expressed.

use std::fmt;
use tokio::sync::watch;

/// Create a connected trigger/signal pair.
pub fn completion_pair() -> (CompletionTrigger, CompletionSignal) {
    let (tx, rx) = watch::channel(false);
    (CompletionTrigger { tx }, CompletionSignal { rx })
}

/// Writing half of a completion signal.
pub struct CompletionTrigger {
    tx: watch::Sender<bool>,
}

impl CompletionTrigger {
    /// Close the signal, waking every waiter.
    pub fn close(self) {
        // No receivers left is fine, there is nobody to notify.
        let _ = self.tx.send(true);
    }
}

impl fmt::Debug for CompletionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionTrigger")
            .field("closed", &*self.tx.borrow())
            .finish()
    }
}

/// Reading half of a completion signal. Safe for any number of waiters.
#[derive(Clone)]
pub struct CompletionSignal {
    rx: watch::Receiver<bool>,
}

impl CompletionSignal {
    /// Wait until the signal is closed. Returns immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The trigger was dropped without an explicit close: same thing.
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking check.
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("closed", &self.is_closed())
            .finish()
    }
}
