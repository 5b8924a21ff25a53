//! Background prioritisation thread.
//!
//! Reads inbound `PRIORITISE_STATES` messages, filters out dead states,
//! builds a fresh [`DepthFirstSearcher`], and publishes it through a
//! lock-free hand-off cell for the engine thread to install on its next
//! well-defined hook.

use std::collections::HashSet;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::collaborators::{DepthFirstSearcher, Executor, Searcher};
use crate::identity::HostStateId;
use crate::transport::{IpcReader, Message};

/// Host ids the engine has reported as killed. Producers: the engine
/// thread on state-kill. Consumer: the prioritisation thread.
pub type DeadStates = Arc<Mutex<HashSet<HostStateId>>>;

pub fn new_dead_states() -> DeadStates {
    Arc::new(Mutex::new(HashSet::default()))
}

/// Single-cell lock-free hand-off for the next [`Searcher`] to install.
///
/// The prioritisation thread is the sole publisher, so a plain atomic
/// `swap` already gives the needed compare-and-swap guarantee: a slower
/// producer can never overwrite a value the
/// engine thread has just taken, because `take` itself is an
/// exchange-with-null that nothing but the engine thread performs.
pub struct SearcherHandoff {
    slot: AtomicPtr<Box<dyn Searcher>>,
}

impl SearcherHandoff {
    pub fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Publish a new searcher, freeing whichever prior value the engine
    /// thread had not yet consumed.
    pub fn publish(&self, searcher: Box<dyn Searcher>) {
        let new_ptr = Box::into_raw(Box::new(searcher));
        let prior = self.slot.swap(new_ptr, Ordering::AcqRel);
        if !prior.is_null() {
            // SAFETY: `prior` was produced by a prior `Box::into_raw` call
            // on this same slot and has not been freed since.
            unsafe {
                drop(Box::from_raw(prior));
            }
        }
    }

    /// Take the pending searcher, if any, leaving the slot empty.
    pub fn take(&self) -> Option<Box<dyn Searcher>> {
        let ptr = self.slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: see `publish`.
            Some(*unsafe { Box::from_raw(ptr) })
        }
    }
}

impl Default for SearcherHandoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SearcherHandoff {
    fn drop(&mut self) {
        let _ = self.take();
    }
}

// AtomicPtr<T> is already Send+Sync for T: Send; Box<dyn Searcher> is Send
// by the Searcher: Send bound, so the derived Send/Sync hold without an
// explicit unsafe impl.

/// Background task that polls the transport, filters dead states, and
/// publishes a fresh searcher.
pub struct PrioritisationReceiver {
    alive: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PrioritisationReceiver {
    pub fn spawn(
        mut reader: IpcReader,
        dead_states: DeadStates,
        executor: Arc<dyn Executor>,
        handoff: Arc<SearcherHandoff>,
        poll_interval: Duration,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));
        let alive_for_thread = Arc::clone(&alive);

        let handle = thread::Builder::new()
            .name("flowtrace-prioritisation".to_string())
            .spawn(move || {
                while alive_for_thread.load(Ordering::Acquire) {
                    Self::poll_once(&mut reader, &dead_states, &*executor, &handoff);
                    thread::sleep(poll_interval);
                }
            })
            .expect("failed to spawn flowtrace prioritisation thread");

        Self {
            alive,
            handle: Some(handle),
        }
    }

    fn poll_once(
        reader: &mut IpcReader,
        dead_states: &DeadStates,
        executor: &dyn Executor,
        handoff: &SearcherHandoff,
    ) {
        match reader.try_receive() {
            Ok(Some(Message::PrioritiseStates(requested))) => {
                let selected = Self::select_live(requested, dead_states, executor);
                tracing::debug!(count = selected.len(), "publishing prioritised searcher");
                handoff.publish(Box::new(DepthFirstSearcher::seeded_with(&selected)));
            }
            Ok(Some(Message::EdgeBatch(_))) => {
                // The inbound direction never carries EDGE_BATCH; ignore defensively.
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "prioritisation receiver transport error");
            }
        }
    }

    /// Filter dead ids out of `requested`, then keep only ids the executor
    /// actually reports as live.
    fn select_live(
        requested: Vec<HostStateId>,
        dead_states: &DeadStates,
        executor: &dyn Executor,
    ) -> Vec<HostStateId> {
        let dead = dead_states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let filtered: Vec<HostStateId> = requested.into_iter().filter(|id| !dead.contains(id)).collect();
        drop(dead);

        let live = executor.live_states();
        filtered.into_iter().filter(|id| live.contains(id)).collect()
    }

    /// Clear `alive`; the background thread observes this between polls and
    /// exits, and this call joins it.
    pub fn shutdown(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PrioritisationReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Searcher;
    use std::sync::atomic::AtomicUsize;

    struct FakeExecutor {
        live: Vec<HostStateId>,
    }

    impl Executor for FakeExecutor {
        fn live_states(&self) -> Vec<HostStateId> {
            self.live.clone()
        }
        fn set_searcher(&self, _searcher: Box<dyn Searcher>) {}
    }

    #[test]
    fn select_live_filters_dead_and_unknown_ids() {
        let dead_states = new_dead_states();
        dead_states.lock().unwrap().insert(8);
        let executor = FakeExecutor { live: vec![7, 42] };

        let selected =
            PrioritisationReceiver::select_live(vec![7, 8, 99], &dead_states, &executor);
        // 8 is dead, 99 is not live per the executor: only 7 survives.
        assert_eq!(selected, vec![7]);
    }

    #[test]
    fn select_live_with_no_survivors_yields_empty_vec() {
        let dead_states = new_dead_states();
        let executor = FakeExecutor { live: vec![] };
        let selected = PrioritisationReceiver::select_live(vec![1, 2], &dead_states, &executor);
        assert!(selected.is_empty());
    }

    #[test]
    fn handoff_publish_then_take_round_trips() {
        let handoff = SearcherHandoff::new();
        assert!(handoff.take().is_none());

        handoff.publish(Box::new(DepthFirstSearcher::seeded_with(&[1, 2])));
        let mut searcher = handoff.take().expect("should have a pending searcher");
        // Drive the taken searcher to confirm it is the live object, not a
        // stale or empty placeholder: removing its two seeded ids should
        // leave it accepting further updates normally.
        searcher.update(&[], &[1, 2]);
        searcher.update(&[3], &[]);
        assert!(handoff.take().is_none(), "slot is empty after take");
    }

    #[test]
    fn publishing_over_an_unconsumed_value_frees_the_old_one() {
        let counter = Arc::new(AtomicUsize::new(0));

        struct DroppingSearcher(Arc<AtomicUsize>);
        impl Searcher for DroppingSearcher {
            fn update(&mut self, _added: &[HostStateId], _removed: &[HostStateId]) {}
        }
        impl Drop for DroppingSearcher {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let handoff = SearcherHandoff::new();
        handoff.publish(Box::new(DroppingSearcher(Arc::clone(&counter))));
        // Publish again before anyone took the first value: the prior
        // boxed searcher must be dropped right here, not leaked.
        handoff.publish(Box::new(DroppingSearcher(Arc::clone(&counter))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let taken = handoff.take();
        drop(taken);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
