use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::observer::StateObserver;
use super::types::StateEvent;

enum DispatchMsg {
    Event(Arc<StateEvent>),
    Flush(oneshot::Sender<()>),
}

/// Bounded queue drained by a single worker that hands each event to every
/// active observer in registration order. The writer only ever `try_send`s.
pub struct ObserverDispatcher {
    tx: Option<mpsc::Sender<DispatchMsg>>,
    dropped: Arc<AtomicU64>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ObserverDispatcher {
    /// Must be called from within a tokio runtime when `observers` is non-empty.
    pub fn start(observers: Vec<Arc<dyn StateObserver>>, capacity: usize) -> Self {
        let dropped = Arc::new(AtomicU64::new(0));
        let cancel = CancellationToken::new();

        if observers.is_empty() {
            return Self {
                tx: None,
                dropped,
                cancel,
                handle: Mutex::new(None),
            };
        }

        let (tx, mut rx) = mpsc::channel::<DispatchMsg>(capacity.max(1));
        let worker_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    biased;
                    _ = worker_cancel.cancelled() => break,
                    msg = rx.recv() => msg,
                };
                match msg {
                    Some(DispatchMsg::Event(event)) => deliver(&observers, &event).await,
                    Some(DispatchMsg::Flush(done)) => {
                        let _ = done.send(());
                    }
                    None => break,
                }
            }
            tracing::debug!(observers = observers.len(), "observer dispatcher stopped");
        });

        Self {
            tx: Some(tx),
            dropped,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn notify(&self, event: Arc<StateEvent>) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.try_send(DispatchMsg::Event(event)).is_err() {
            let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(dropped = n, "observer queue full or closed; event dropped");
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolves once every event queued before this call has been delivered.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(DispatchMsg::Flush(done_tx)).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }

    pub async fn stop(&self, timeout: Duration) {
        self.cancel.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!(?timeout, "observer dispatcher did not stop in time");
            }
        }
    }
}

async fn deliver(observers: &[Arc<dyn StateObserver>], event: &StateEvent) {
    for observer in observers {
        if !observer.is_active() {
            continue;
        }
        let outcome = AssertUnwindSafe(observer.on_state_change(event))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(
                observer = observer.id(),
                event_id = %event.id,
                error = %e,
                "observer failed"
            ),
            Err(_) => tracing::warn!(
                observer = observer.id(),
                event_id = %event.id,
                "observer panicked"
            ),
        }
    }
}
