use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::coroutine_impl::{co_get_pool, CoroutineImpl, EventSource};
use crate::sync::atomic_option::AtomicOption;
use crate::yield_now::{yield_now, yield_with};

// clears the in-registration mark even if the registration unwinds
struct SubscribeGuard<'a>(&'a AtomicBool);

impl Drop for SubscribeGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One-shot parker for the coroutine side of a [`crate::sync::Blocker`].
pub struct Park {
    // the coroutine that is waiting on this park
    wait_co: AtomicOption<CoroutineImpl>,
    // low bit is the wakeup token, higher bits tag each
    // transition to prevent the ABA problem
    state: AtomicUsize,
    // the registration half runs on the old worker thread after the yield;
    // the park must not go away under it even when the coroutine is
    // already resumed somewhere else
    in_subscribe: AtomicBool,
}

impl Park {
    pub fn new() -> Self {
        Park {
            wait_co: AtomicOption::none(),
            state: AtomicUsize::new(0),
            in_subscribe: AtomicBool::new(false),
        }
    }

    // return true if the coroutine needs to really block
    // when the token is set, consume it and indicate not to block
    #[inline]
    fn check_park(&self) -> bool {
        let mut state = self.state.load(Ordering::Acquire);
        if state & 1 == 0 {
            return true;
        }

        loop {
            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return false, // successfully consumed the token
                Err(x) if x & 1 == 0 => return true,
                Err(y) => state = y,
            }
        }
    }

    /// block the current coroutine until the token is made available
    pub fn park(&self) {
        if !self.check_park() {
            return;
        }
        // the registration runs on the worker thread after the yield
        yield_with(self);
    }

    /// atomically make the token available, waking the parked coroutine
    pub fn unpark(&self) {
        let mut state = self.state.load(Ordering::Acquire);
        if state & 1 == 1 {
            // the token is already set, do nothing here
            return;
        }

        loop {
            // SeqCst pairs with the registration in subscribe, either the
            // registration sees the token or we see the registered coroutine
            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return self.wake_up(),
                Err(x) if x & 1 == 1 => return, // already set
                Err(y) => state = y,
            }
        }
    }

    #[inline]
    fn wake_up(&self) {
        if let Some(co) = self.wait_co.take(Ordering::SeqCst) {
            co_get_pool(&co).schedule(co);
        }
    }
}

impl EventSource for Park {
    // register the yielded coroutine to the park
    fn subscribe(&mut self, co: CoroutineImpl) {
        self.in_subscribe.store(true, Ordering::Release);
        let _done = SubscribeGuard(&self.in_subscribe);

        self.wait_co.swap(co, Ordering::SeqCst);

        // re-check the token, the unpark may have come in before registration
        if self.state.load(Ordering::SeqCst) & 1 == 1 {
            self.wake_up();
        }
    }
}

impl Drop for Park {
    fn drop(&mut self) {
        // wait out a registration that is still running on the old worker
        while self.in_subscribe.load(Ordering::Acquire) {
            yield_now();
        }
    }
}
