//! Binary cooperative barrier.
//!
//! A [`Gate`] is either open or closed. Callers check in with [`Gate::pass`]
//! at their call boundary; while the gate is closed they suspend there, and
//! reopening releases every suspended caller at once. Work that already got
//! past the gate is not affected by closing it.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::deferred::{Completion, Resolver, deferred};

enum GateState {
    Open,
    /// Waiters hold clones of `reopened`; settling `reopen` releases them all.
    Closed {
        reopened: Completion<(), Infallible>,
        reopen: Resolver<(), Infallible>,
    },
}

pub struct Gate {
    state: Mutex<GateState>,
    waiting: AtomicUsize,
}

impl Gate {
    /// Create an open gate.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Open),
            waiting: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Close the gate. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state();
        if matches!(*state, GateState::Closed { .. }) {
            return false;
        }
        let (reopened, reopen) = deferred();
        *state = GateState::Closed { reopened, reopen };
        true
    }

    /// Open the gate, releasing every waiter. Returns `false` if it was already open.
    pub fn open(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state(), GateState::Open);
        match previous {
            GateState::Open => false,
            GateState::Closed { reopen, .. } => {
                reopen.resolve(());
                true
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state(), GateState::Open)
    }

    /// Number of callers currently suspended at the gate.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Return immediately if open, otherwise suspend until the gate reopens.
    pub async fn pass(&self) {
        let reopened = match &*self.state() {
            GateState::Open => return,
            GateState::Closed { reopened, .. } => reopened.clone(),
        };
        let _waiting = WaitingGuard::enter(&self.waiting);
        let _ = reopened.wait().await;
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("open", &self.is_open())
            .field("waiting", &self.waiting())
            .finish()
    }
}

struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn open_gate_passes_immediately() {
        let gate = Gate::new();
        gate.pass().await;
        assert!(gate.is_open());
        assert!(!gate.open());
    }

    #[tokio::test]
    async fn closed_gate_holds_until_reopened() {
        let gate = Arc::new(Gate::new());
        assert!(gate.close());
        assert!(!gate.close());

        let passers: Vec<_> = (0..3)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.pass().await })
            })
            .collect();

        while gate.waiting() < 3 {
            tokio::task::yield_now().await;
        }
        assert!(passers.iter().all(|p| !p.is_finished()));

        assert!(gate.open());
        for passer in passers {
            passer.await.unwrap();
        }
        assert_eq!(gate.waiting(), 0);
    }

    #[tokio::test]
    async fn reclosing_does_not_trap_released_waiters() {
        let gate = Arc::new(Gate::new());
        gate.close();
        let passer = tokio::spawn({
            let gate = gate.clone();
            async move { gate.pass().await }
        });
        while gate.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        gate.open();
        gate.close();
        passer.await.unwrap();
        assert!(!gate.is_open());
    }
}
