//! Mutation listeners.
//!
//! # Responsibility
//! - Define the listener capability notified after tree mutations.
//! - Deliver one rendered snapshot to a batch of listeners.
//!
//! # Invariants
//! - A failing or panicking listener never affects other listeners or the
//!   mutation that triggered delivery.

use super::node::NodeId;
use log::warn;
use std::error::Error;
use std::fmt::{Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Error type listeners may return from `update`.
pub type ObserverError = Box<dyn Error + Send + Sync>;

/// Listener notified with the full rendered root after a mutation.
pub trait DocumentObserver: Send + Sync {
    /// `origin` is the id of the node that was mutated.
    fn update(&self, snapshot: &str, origin: &NodeId) -> Result<(), ObserverError>;
}

impl<F> DocumentObserver for F
where
    F: Fn(&str, &NodeId) -> Result<(), ObserverError> + Send + Sync,
{
    fn update(&self, snapshot: &str, origin: &NodeId) -> Result<(), ObserverError> {
        self(snapshot, origin)
    }
}

/// Handle returned by `watch`, used to unregister a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(u64);

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Listeners registered on one node.
#[derive(Clone, Default)]
pub struct ObserverSet {
    entries: Vec<(WatchId, Arc<dyn DocumentObserver>)>,
}

impl ObserverSet {
    pub fn add(&mut self, observer: Arc<dyn DocumentObserver>) -> WatchId {
        let watch_id = WatchId(NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed));
        self.entries.push((watch_id, observer));
        watch_id
    }

    /// Returns whether the handle was registered here.
    pub fn remove(&mut self, watch_id: WatchId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(id, _)| *id != watch_id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn collect_into(&self, out: &mut Vec<Arc<dyn DocumentObserver>>) {
        out.extend(self.entries.iter().map(|(_, observer)| Arc::clone(observer)));
    }
}

impl Debug for ObserverSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Delivers `snapshot` to every listener and returns how many succeeded.
pub(crate) fn broadcast(
    observers: &[Arc<dyn DocumentObserver>],
    snapshot: &str,
    origin: &NodeId,
) -> usize {
    let mut delivered = 0;
    for observer in observers {
        match catch_unwind(AssertUnwindSafe(|| observer.update(snapshot, origin))) {
            Ok(Ok(())) => delivered += 1,
            Ok(Err(err)) => warn!(
                "event=observer_update module=model status=error origin={} error={}",
                origin, err
            ),
            Err(_) => warn!(
                "event=observer_update module=model status=error origin={} error=observer_panicked",
                origin
            ),
        }
    }
    delivered
}
