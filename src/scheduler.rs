//! The cooperative scheduler interface and an in-crate virtual-time loop.
//!
//! The harness never executes work directly: it posts callbacks to a
//! [`Scheduler`] and suspends between turns. The contract is:
//!
//! - all callbacks execute on one logical thread, never concurrently
//! - posted work runs strictly after the turn that posted it
//! - `cancel` is a no-op for handles that already fired or were canceled
//!
//! [`LoopScheduler`] is the bundled single-threaded implementation. It keeps
//! a virtual clock: draining the queue jumps time forward to each entry's
//! due instant, so timeout behavior is deterministic and instant in tests.

use std::time::Duration;

use parking_lot::Mutex;

// ============================================================================
// Scheduler Trait
// ============================================================================

/// A deferred unit of work.
pub type Callback = Box<dyn FnOnce() + Send>;

/// Opaque handle to a posted callback, usable for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle(u64);

/// A single-threaded cooperative event loop accepting deferred, cancelable
/// callbacks.
pub trait Scheduler: Send + Sync {
    /// Post a callback for the next available turn.
    fn post(&self, callback: Callback) -> CallbackHandle;

    /// Post a callback to run once `delay` has elapsed.
    fn post_after(&self, callback: Callback, delay: Duration) -> CallbackHandle;

    /// Cancel a posted callback. No-op if it already fired or was canceled.
    fn cancel(&self, handle: CallbackHandle);
}

// ============================================================================
// Loop Scheduler
// ============================================================================

struct Entry {
    id: u64,
    due: Duration,
    callback: Callback,
}

#[derive(Default)]
struct LoopInner {
    /// Virtual time elapsed since the scheduler was created.
    now: Duration,
    next_id: u64,
    queue: Vec<Entry>,
}

impl LoopInner {
    fn insert(&mut self, due: Duration, callback: Callback) -> CallbackHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Entry { id, due, callback });
        CallbackHandle(id)
    }

    /// Remove the earliest entry; ties break by posting order.
    fn pop_earliest(&mut self) -> Option<Entry> {
        let earliest = self
            .queue
            .iter()
            .enumerate()
            .min_by_key(|(_, entry)| (entry.due, entry.id))
            .map(|(position, _)| position)?;
        Some(self.queue.swap_remove(earliest))
    }
}

/// A single-threaded cooperative scheduler with a virtual clock.
///
/// Callbacks run only from [`step`](LoopScheduler::step) or
/// [`run_until_idle`](LoopScheduler::run_until_idle), one per turn, with the
/// internal lock released so callbacks may post and cancel re-entrantly.
#[derive(Default)]
pub struct LoopScheduler {
    inner: Mutex<LoopInner>,
}

impl LoopScheduler {
    /// Create an empty scheduler at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed so far.
    pub fn now(&self) -> Duration {
        self.inner.lock().now
    }

    /// Number of callbacks waiting to run.
    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Run the earliest pending callback, advancing virtual time to its due
    /// instant. Returns `false` if the queue was empty.
    pub fn step(&self) -> bool {
        let entry = {
            let mut inner = self.inner.lock();
            match inner.pop_earliest() {
                Some(entry) => {
                    inner.now = inner.now.max(entry.due);
                    Some(entry)
                }
                None => None,
            }
        };
        match entry {
            Some(entry) => {
                (entry.callback)();
                true
            }
            None => false,
        }
    }

    /// Run callbacks until the queue is empty.
    ///
    /// Diverges if the queue never drains (e.g. a case repeating forever);
    /// callers wanting a bound should drive [`step`](LoopScheduler::step).
    pub fn run_until_idle(&self) {
        while self.step() {}
    }
}

impl Scheduler for LoopScheduler {
    fn post(&self, callback: Callback) -> CallbackHandle {
        let mut inner = self.inner.lock();
        let due = inner.now;
        inner.insert(due, callback)
    }

    fn post_after(&self, callback: Callback, delay: Duration) -> CallbackHandle {
        let mut inner = self.inner.lock();
        let due = inner.now + delay;
        inner.insert(due, callback)
    }

    fn cancel(&self, handle: CallbackHandle) {
        let mut inner = self.inner.lock();
        inner.queue.retain(|entry| entry.id != handle.0);
    }
}

impl std::fmt::Debug for LoopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LoopScheduler")
            .field("now", &inner.now)
            .field("pending", &inner.queue.len())
            .finish()
    }
}
