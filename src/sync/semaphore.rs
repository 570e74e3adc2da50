use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicIsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as ThreadMutex;

use super::blocking::Blocker;
use super::StopSignal;
use smallvec::SmallVec;

/// A counting semaphore for coroutines and threads.
///
/// The permit counter starts at `starting_value`, clamped to at most
/// `least_max_value`; `acquire` parks the caller once the counter is
/// exhausted. A release hands its permit directly to the last parked
/// waiter without going through the counter, so a permit can never be
/// snatched by a concurrent acquirer while a waiter is parked.
///
/// `stop` broadcasts a permanent [`StopSignal`] to every parked waiter
/// and makes all future acquires fail fast.
///
/// [`StopSignal`]: struct.StopSignal.html
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use syncoro::coroutine;
/// use syncoro::sync::Semaphore;
///
/// let sem = Arc::new(Semaphore::new(1, 0));
/// let sem2 = sem.clone();
///
/// unsafe {
///     coroutine::spawn(move || {
///         sem2.release();
///     });
/// }
///
/// sem.acquire().unwrap();
/// ```
pub struct Semaphore {
    // how many permits are available, decremented optimistically
    counter: AtomicIsize,
    // advisory upper bound
    least_max_value: isize,
    // the parked acquirers, last waiter first
    waiters: ThreadMutex<Vec<Arc<Blocker>>>,
    stopped: AtomicBool,
}

impl Semaphore {
    /// create a semaphore with `least_max_value` permits at most and
    /// `starting_value` permits available
    pub fn new(least_max_value: usize, starting_value: usize) -> Self {
        let least_max_value = least_max_value as isize;
        let starting_value = (starting_value as isize).min(least_max_value);
        Semaphore {
            counter: AtomicIsize::new(starting_value),
            least_max_value,
            waiters: ThreadMutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// try to take a permit without blocking
    pub fn try_acquire(&self) -> bool {
        let previous = self.counter.fetch_sub(1, Ordering::AcqRel);
        if previous <= 0 {
            // roll back the optimistic decrement
            self.counter.fetch_add(1, Ordering::Release);
            return false;
        }
        true
    }

    /// take a permit, parking the caller until one is released
    ///
    /// fails with [`StopSignal`] once the semaphore is stopped
    ///
    /// [`StopSignal`]: struct.StopSignal.html
    pub fn acquire(&self) -> Result<(), StopSignal> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(StopSignal);
        }

        if self.try_acquire() {
            return Ok(());
        }

        let cur = Blocker::current();
        {
            let mut waiters = self.waiters.lock().expect("semaphore acquire");
            if self.stopped.load(Ordering::Acquire) {
                return Err(StopSignal);
            }
            // retry once under the lock to close the race with a release
            // that saw no waiter
            if self.try_acquire() {
                return Ok(());
            }
            waiters.push(cur.clone());
        }

        cur.park();

        // either a releaser handed its permit over or the stop broadcast
        // woke us
        if self.stopped.load(Ordering::Acquire) {
            return Err(StopSignal);
        }
        Ok(())
    }

    /// put a permit back, waking the last parked waiter if any
    pub fn release(&self) {
        let waiter = {
            let mut waiters = self.waiters.lock().expect("semaphore release");
            waiters.pop()
        };
        match waiter {
            // hand the permit directly to the waiter, the counter is
            // not touched
            Some(w) => w.unpark(),
            None => {
                self.counter.fetch_add(1, Ordering::Release);
            }
        }
    }

    /// wake every parked waiter with a [`StopSignal`], permanently
    ///
    /// idempotent; acquires after the stop fail without parking
    ///
    /// [`StopSignal`]: struct.StopSignal.html
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        let drained: SmallVec<[Arc<Blocker>; 8]> = {
            let mut waiters = self.waiters.lock().expect("semaphore stop");
            waiters.drain(..).collect()
        };
        for w in drained {
            w.unpark();
        }
    }

    /// the advisory maximum number of permits
    pub fn max(&self) -> usize {
        self.least_max_value as usize
    }

    /// the current counter value; transiently negative under contention
    pub fn value(&self) -> isize {
        self.counter.load(Ordering::Acquire)
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Semaphore")
            .field("counter", &self.value())
            .field("max", &self.least_max_value)
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish()
    }
}
