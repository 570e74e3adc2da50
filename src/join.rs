use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::coroutine_impl::Coroutine;
use crate::sync::atomic_option::AtomicOption;
use crate::sync::Blocker;
use crossbeam::atomic::AtomicCell;

// the state of the Join resource
const INIT: usize = 0;
const WAIT: usize = 1;
const DONE: usize = 2;

/// Completion record shared between a computation and its joiner.
///
/// Holds the finished flag, the parked continuation and the panic captured
/// from the computation. The result value itself travels through a separate
/// packet so that this type stays unparameterized.
pub struct Join {
    // who is waiting for the computation to finish
    to_wake: AtomicOption<Arc<Blocker>>,
    state: AtomicUsize,
    // the panic captured from the computation, if any
    panic: AtomicCell<Option<Box<dyn Any + Send>>>,
}

impl Join {
    pub fn new() -> Self {
        Join {
            to_wake: AtomicOption::none(),
            state: AtomicUsize::new(INIT),
            panic: AtomicCell::new(None),
        }
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    // record the panic payload of the computation
    pub(crate) fn set_panic_data(&self, panic: Box<dyn Any + Send>) {
        self.panic.swap(Some(panic));
    }

    pub(crate) fn take_panic(&self) -> Option<Box<dyn Any + Send>> {
        self.panic.take()
    }

    // mark the computation finished and release the continuation
    pub(crate) fn trigger(&self) {
        // racing on the one state word against the waiter's registration
        if self.state.swap(DONE, Ordering::AcqRel) == WAIT {
            if let Some(w) = self.to_wake.take(Ordering::Acquire) {
                w.unpark();
            }
        }
    }

    /// block the current coroutine or thread until the computation finishes
    ///
    /// at most one waiter may block at a time
    pub fn wait(&self) {
        match self.state.load(Ordering::Acquire) {
            DONE => return,
            WAIT => unreachable!("concurrent waiters on a join"),
            _ => {}
        }

        let cur = Blocker::current();
        // register the continuation before committing the state
        self.to_wake.swap(cur.clone(), Ordering::Release);
        match self
            .state
            .compare_exchange(INIT, WAIT, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => cur.park(),
            Err(_) => {
                // the computation finished in between, no need to block
                self.to_wake.take(Ordering::Acquire);
            }
        }
    }
}

/// An owned permission to join on a computation.
///
/// Dropping the handle detaches the computation. `join` consumes the handle
/// and yields the result, or the panic payload if the computation panicked.
/// Both `join` and `wait` work from coroutine and from plain thread context;
/// the latter is the blocking bridge out of the coroutine world.
pub struct JoinHandle<T> {
    co: Coroutine,
    join: Arc<Join>,
    packet: Arc<AtomicCell<Option<T>>>,
}

pub(crate) fn make_join_handle<T>(
    co: Coroutine,
    join: Arc<Join>,
    packet: Arc<AtomicCell<Option<T>>>,
) -> JoinHandle<T> {
    JoinHandle { co, join, packet }
}

impl<T> JoinHandle<T> {
    /// get the coroutine handle of the underlying computation
    pub fn coroutine(&self) -> &Coroutine {
        &self.co
    }

    /// return true if the computation has run to completion
    pub fn is_done(&self) -> bool {
        self.join.is_done()
    }

    /// block until the computation finishes without consuming the result
    pub fn wait(&self) {
        self.join.wait();
    }

    /// wait for the computation to finish and extract its result
    ///
    /// If the computation panicked, the panic payload is returned in the
    /// `Err` variant, the same way `std::thread::JoinHandle::join` reports
    /// a panicked thread.
    pub fn join(self) -> Result<T, Box<dyn Any + Send>> {
        self.join.wait();
        if let Some(panic) = self.join.take_panic() {
            return Err(panic);
        }
        Ok(self
            .packet
            .take()
            .expect("result of the computation already consumed"))
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("coroutine", &self.co)
            .field("done", &self.is_done())
            .finish()
    }
}
