//! Manually settled futures.
//!
//! [`deferred`] splits a pending result into a [`Completion`] that any number
//! of consumers may await and a [`Resolver`] that a producer settles later.
//! Only the first settlement takes effect; later calls are ignored.

use std::sync::Arc;

use tokio::sync::watch;

type Slot<T, E> = Option<Result<T, E>>;

/// Create a pending result and the capability to settle it.
pub fn deferred<T, E>() -> (Completion<T, E>, Resolver<T, E>) {
    let (tx, _rx) = watch::channel(None);
    let tx = Arc::new(tx);
    (Completion { tx: tx.clone() }, Resolver { tx })
}

/// Read side of a deferred result.
pub struct Completion<T, E> {
    // Holding the sender keeps the channel open, so waiters never observe a
    // closed channel; an unsettled completion simply stays pending.
    tx: Arc<watch::Sender<Slot<T, E>>>,
}

impl<T, E> Clone for Completion<T, E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for Completion<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T: Clone, E: Clone> Completion<T, E> {
    /// A completion that is already settled with `result`.
    pub fn settled(result: Result<T, E>) -> Self {
        let (completion, resolver) = deferred();
        resolver.settle(result);
        completion
    }

    /// A completion that never settles.
    pub fn never() -> Self {
        deferred().0
    }

    /// Wait until the result is settled and return a copy of it.
    pub async fn wait(&self) -> Result<T, E> {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let slot = rx.borrow_and_update();
                if let Some(result) = slot.as_ref() {
                    return result.clone();
                }
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// The settled result, if any, without waiting.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.tx.borrow().clone()
    }
}

impl<T, E> Completion<T, E> {
    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

/// Write side of a deferred result.
pub struct Resolver<T, E> {
    tx: Arc<watch::Sender<Slot<T, E>>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T, E> Resolver<T, E> {
    /// Settle with a value. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns `false` if already settled.
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    pub fn settle(&self, result: Result<T, E>) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }
}
