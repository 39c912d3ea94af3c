//! Cooperative cancellation shared by pipeline steps, capability executions
//! and provider calls.
//!
//! A [`CancellationHandle`] fires once; every cloned [`CancellationSignal`]
//! observes it. In-flight futures race their work against
//! [`CancellationSignal::cancelled`] so that cancelling the outer request
//! aborts adapter calls and pending retry sleeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Owner side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side of a cancellation pair. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

/// Creates a connected handle/signal pair.
pub fn cancellation_pair() -> (CancellationHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancellationHandle { tx: Arc::new(tx) },
        CancellationSignal { rx },
    )
}

impl CancellationHandle {
    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Fires the signal once `after` has elapsed, unless the returned guard
    /// is dropped first.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "dropping the guard disarms the deadline"]
    pub fn cancel_after(&self, after: Duration) -> DeadlineGuard {
        let tx = Arc::clone(&self.tx);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            tx.send_replace(true);
        });
        DeadlineGuard { timer }
    }

    /// Returns a new signal bound to this handle.
    pub fn signal(&self) -> CancellationSignal {
        CancellationSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Armed deadline from [`CancellationHandle::cancel_after`]. Aborts the
/// timer task on drop.
#[derive(Debug)]
pub struct DeadlineGuard {
    timer: JoinHandle<()>,
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

impl CancellationSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// True once the paired handle has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the paired handle fires; pends forever if the handle is
    /// dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::never()
    }
}
