use std::sync::{Arc, Condvar, Mutex};

use crate::coroutine_impl::is_coroutine;
use crate::park::Park;

/// Condvar based parker for plain OS threads.
#[derive(Debug)]
pub struct ThreadPark {
    lock: Mutex<bool>,
    cvar: Condvar,
}

impl ThreadPark {
    fn new() -> Self {
        ThreadPark {
            lock: Mutex::new(false),
            cvar: Condvar::new(),
        }
    }

    fn park(&self) {
        let mut guard = self.lock.lock().unwrap();
        while !*guard {
            guard = self.cvar.wait(guard).unwrap();
        }
        // must clear the token for the next round
        *guard = false;
    }

    fn unpark(&self) {
        let mut guard = self.lock.lock().unwrap();
        if !*guard {
            *guard = true;
            self.cvar.notify_one();
        }
    }
}

enum Parker {
    Coroutine(Park),
    Thread(ThreadPark),
}

/// A waiter that can block either a coroutine or an OS thread.
///
/// This is the waiter node every primitive in this crate links into its
/// internal list. Parking an OS thread on it is what bridges a running
/// computation back to the blocking world.
pub struct Blocker {
    parker: Parker,
}

impl Blocker {
    /// create a blocker for the current execution context
    pub fn new() -> Self {
        let parker = if is_coroutine() {
            Parker::Coroutine(Park::new())
        } else {
            Parker::Thread(ThreadPark::new())
        };

        Blocker { parker }
    }

    /// get a shared blocker for the current execution context
    pub fn current() -> Arc<Self> {
        Arc::new(Self::new())
    }

    #[inline]
    pub fn park(&self) {
        match &self.parker {
            Parker::Coroutine(co) => co.park(),
            Parker::Thread(t) => t.park(),
        }
    }

    #[inline]
    pub fn unpark(&self) {
        match &self.parker {
            Parker::Coroutine(co) => co.unpark(),
            Parker::Thread(t) => t.unpark(),
        }
    }
}

impl Default for Blocker {
    fn default() -> Self {
        Self::new()
    }
}
