//! Cooperative cancellation of root evaluations.
//!
//! The fold checks the signal at the top of every iteration and before
//! every loader call.

use tokio::sync::watch;

use crate::errors::EvalError;

/// Receiving side, cloned into every nested evaluation of a root call.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

/// Sending side, kept by whoever may cancel.
#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

/// Create a connected handle/signal pair.
#[must_use]
pub fn cancellation_pair() -> (CancellationHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (CancellationHandle { tx }, CancellationSignal { rx })
}

impl CancellationSignal {
    /// A signal that is never raised.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// `Err(Cancelled)` once the signal has been raised.
    pub fn check(&self) -> Result<(), EvalError> {
        if self.is_cancelled() {
            Err(EvalError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::never()
    }
}

impl CancellationHandle {
    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Another signal connected to this handle.
    #[must_use]
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            rx: self.tx.subscribe(),
        }
    }
}
