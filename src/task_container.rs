//! Ownership of fire-and-forget computations.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as ThreadMutex;

use crate::coroutine_impl::Builder;
use crate::join::JoinHandle;
use crate::scheduler::{ShutdownError, ThreadPool};
use crate::yield_now::yield_now;

/// Sizing knobs for a [`TaskContainer`].
///
/// [`TaskContainer`]: struct.TaskContainer.html
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// slots allocated up front
    pub reserve: usize,
    /// multiplier applied to the slot vector when the free list runs out
    pub growth_factor: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            reserve: 8,
            growth_factor: 2,
        }
    }
}

struct Slots {
    // a started computation parks its handle here until it is reclaimed
    tasks: Vec<Option<JoinHandle<()>>>,
    // indices ready for reuse
    free: VecDeque<usize>,
    // slots of finished computations awaiting reclamation
    retired: Vec<usize>,
}

struct Shared {
    slots: ThreadMutex<Slots>,
    // started minus reclaim-recorded computations
    size: AtomicUsize,
    growth_factor: usize,
    pool: ThreadPool,
}

/// Owns detached computations and recycles their slots.
///
/// `start` wraps the computation so that it runs on the container's
/// scheduler, swallows (and logs) a panic instead of propagating it, and
/// records its slot for reclamation when it finishes. Reclamation is
/// deferred: it happens on the next `start`, an explicit
/// `garbage_collect`, or `drain`.
///
/// The container must outlive its computations; dropping it blocks until
/// every started computation has finished. The caller is responsible for
/// not starting new computations while the container is being dropped.
pub struct TaskContainer {
    shared: Arc<Shared>,
}

impl TaskContainer {
    /// create a container whose computations run on the given scheduler
    pub fn new(pool: ThreadPool) -> Self {
        Self::with_options(pool, Options::default())
    }

    pub fn with_options(pool: ThreadPool, opts: Options) -> Self {
        let reserve = opts.reserve.max(1);
        let mut tasks = Vec::with_capacity(reserve);
        tasks.resize_with(reserve, || None);

        TaskContainer {
            shared: Arc::new(Shared {
                slots: ThreadMutex::new(Slots {
                    tasks,
                    free: (0..reserve).collect(),
                    retired: Vec::new(),
                }),
                size: AtomicUsize::new(0),
                growth_factor: opts.growth_factor.max(2),
                pool,
            }),
        }
    }

    /// Start a detached computation.
    ///
    /// Reclaims previously finished slots first. A panic inside the
    /// computation is caught and logged, it does not affect its peers.
    ///
    /// # Errors
    ///
    /// Fails with [`ShutdownError`] when the container's scheduler has
    /// begun shutting down.
    ///
    /// [`ShutdownError`]: struct.ShutdownError.html
    pub fn start<F>(&self, f: F) -> Result<(), ShutdownError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;
        shared.size.fetch_add(1, Ordering::Relaxed);

        let mut slots = shared.slots.lock().expect("task container start");
        Self::reclaim(&mut slots);

        let index = match slots.free.pop_front() {
            Some(index) => index,
            None => Self::grow(&mut slots, shared.growth_factor),
        };

        let their_shared = shared.clone();
        let handle = unsafe {
            Builder::new().pool(&shared.pool).spawn(move || {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
                    error!("detached computation panicked: {panic:?}");
                }

                let mut slots = their_shared.slots.lock().expect("task container retire");
                slots.retired.push(index);
                their_shared.size.fetch_sub(1, Ordering::Relaxed);
            })
        };

        match handle {
            Ok(handle) => {
                slots.tasks[index] = Some(handle);
                Ok(())
            }
            Err(e) => {
                slots.free.push_front(index);
                shared.size.fetch_sub(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// splice every retired slot back onto the free list
    ///
    /// returns the number of slots reclaimed
    pub fn garbage_collect(&self) -> usize {
        let mut slots = self.shared.slots.lock().expect("task container gc");
        Self::reclaim(&mut slots)
    }

    /// the number of computations started but not yet finished
    pub fn size(&self) -> usize {
        self.shared.size.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// the number of slots currently allocated
    pub fn capacity(&self) -> usize {
        self.shared.slots.lock().expect("task container capacity").tasks.len()
    }

    /// the number of finished computations awaiting reclamation
    pub fn pending_reclaim(&self) -> usize {
        self.shared.slots.lock().expect("task container pending").retired.len()
    }

    /// alternate collecting and yielding until every computation finished
    ///
    /// cooperative: called from a coroutine it yields its worker between
    /// rounds, so the owned computations can make progress
    pub fn drain(&self) {
        while !self.is_empty() {
            self.garbage_collect();
            yield_now();
        }
        self.garbage_collect();
    }

    fn reclaim(slots: &mut Slots) -> usize {
        let reclaimed = slots.retired.len();
        for index in ::std::mem::take(&mut slots.retired) {
            slots.tasks[index] = None;
            slots.free.push_back(index);
        }
        reclaimed
    }

    // the free list is exhausted, extend the slot vector
    fn grow(slots: &mut Slots, factor: usize) -> usize {
        let old = slots.tasks.len();
        let new = old * factor;
        slots.tasks.resize_with(new, || None);
        for index in old + 1..new {
            slots.free.push_back(index);
        }
        old
    }
}

impl Drop for TaskContainer {
    fn drop(&mut self) {
        self.drain();
    }
}

impl fmt::Debug for TaskContainer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TaskContainer")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::channel;

    fn container() -> TaskContainer {
        TaskContainer::new(crate::scheduler::global_pool().clone())
    }

    #[test]
    fn runs_detached_computations() {
        let done = Arc::new(AtomicUsize::new(0));
        let tc = container();

        for _ in 0..32 {
            let done = done.clone();
            tc.start(move || {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        tc.drain();
        assert_eq!(done.load(Ordering::SeqCst), 32);
        assert_eq!(tc.size(), 0);
    }

    #[test]
    fn panics_are_contained() {
        let tc = container();
        let (tx, rx) = channel();

        tc.start(|| panic!("detached boom")).unwrap();
        tc.start(move || tx.send(7).unwrap()).unwrap();

        // the panicking peer does not take the healthy one down
        assert_eq!(rx.recv().unwrap(), 7);
        tc.drain();
        assert!(tc.is_empty());
    }

    #[test]
    fn slots_are_reused_after_gc() {
        let tc = TaskContainer::with_options(
            crate::scheduler::global_pool().clone(),
            Options {
                reserve: 2,
                growth_factor: 2,
            },
        );

        for _ in 0..8 {
            let (tx, rx) = channel();
            tc.start(move || tx.send(()).unwrap()).unwrap();
            rx.recv().unwrap();
            tc.drain();
        }

        // sequential bursts never outgrow the initial reservation
        assert_eq!(tc.capacity(), 2);
    }

    #[test]
    fn grows_when_slots_are_exhausted() {
        let tc = TaskContainer::with_options(
            crate::scheduler::global_pool().clone(),
            Options {
                reserve: 2,
                growth_factor: 2,
            },
        );

        let gate = Arc::new(crate::sync::Event::new(false));
        for _ in 0..4 {
            let gate = gate.clone();
            tc.start(move || gate.wait()).unwrap();
        }

        assert!(tc.capacity() >= 4);
        gate.set();
        tc.drain();
    }
}
