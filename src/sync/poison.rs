//! Lock poisoning for guards that may travel between worker threads.
//!
//! A panic that starts while a guard is held marks the lock poisoned, with
//! the `std::sync` reporting types. Unlike the std locks, a guard here can
//! be acquired on one worker thread and dropped on another when the owning
//! coroutine migrates; that is still sound because an unwinding coroutine
//! runs its guard drops on the worker that resumed it, which is exactly
//! where the panic state is sampled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{LockResult, PoisonError};
use std::thread;

/// The sticky poisoned bit of one lock.
pub struct PoisonFlag {
    poisoned: AtomicBool,
}

/// Records whether the holder was already unwinding when it acquired the
/// lock, so that a pre-existing panic does not poison it. Lives inside the
/// guard for the duration of the held scope.
pub struct HoldToken {
    unwinding_at_entry: bool,
}

impl PoisonFlag {
    pub fn new() -> PoisonFlag {
        PoisonFlag {
            poisoned: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn get(&self) -> bool {
        self.poisoned.load(Ordering::Relaxed)
    }

    /// start a held scope
    #[inline]
    pub fn enter(&self) -> HoldToken {
        HoldToken {
            unwinding_at_entry: thread::panicking(),
        }
    }

    /// end a held scope; a panic that started inside it poisons the lock
    #[inline]
    pub fn leave(&self, token: &HoldToken) {
        if thread::panicking() && !token.unwinding_at_entry {
            self.poisoned.store(true, Ordering::Relaxed);
        }
    }

    /// wrap a freshly acquired value in the std reporting convention
    #[inline]
    pub fn check<T>(&self, value: T) -> LockResult<T> {
        if self.get() {
            Err(PoisonError::new(value))
        } else {
            Ok(value)
        }
    }
}
