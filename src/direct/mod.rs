//! Direct mode: one live peer channel per share.
//!
//! The sender announces the batch with `BATCH_START`, then sends `META` and
//! `FILE` for every file in index order. The receiver rebuilds the batch
//! with a [`crate::batch::BatchSession`], tolerating any interleaving.
//!
//! Both controllers run their session in a spawned task and publish their
//! state through a `watch` channel. Each reset bumps a generation counter;
//! anything a superseded task tries to publish afterwards is dropped.

pub mod receiver;
pub mod sender;

use std::{
    fmt::Debug,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::watch;

pub use receiver::{
    DirectArrivedEvent, DirectReceiveSubscriber, DirectReceiver, ReceiveState,
};
pub use sender::{
    DirectSendSubscriber, DirectSender, DirectSentEvent, SendState,
};

/// A controller's published state, guarded by a generation counter.
pub(crate) struct StateCell<S> {
    tx: Arc<watch::Sender<S>>,
    generation: Arc<AtomicU64>,
}

impl<S> Clone for StateCell<S> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            generation: self.generation.clone(),
        }
    }
}

impl<S: Clone + Debug> StateCell<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (tx, _) = watch::channel(initial);
        Self {
            tx: Arc::new(tx),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn current(&self) -> S {
        self.tx.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores `state` unless the session that owns `generation` has been
    /// superseded. Returns whether the state was stored.
    pub(crate) fn publish(&self, generation: u64, state: S) -> bool {
        let current = &self.generation;
        let stored = self.tx.send_if_modified(|slot| {
            if current.load(Ordering::Acquire) != generation {
                return false;
            }
            *slot = state;
            true
        });
        if !stored {
            log::debug!(
                "dropping state from superseded session #{}",
                generation
            );
        }
        stored
    }

    /// Starts a new generation and forces `state`.
    pub(crate) fn reset(&self, state: S) -> u64 {
        let next = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.tx.send_replace(state);
        next
    }
}
