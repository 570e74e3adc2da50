use std::error::Error;
use std::fmt;

pub(crate) mod atomic_option;
mod blocking;
mod event;
mod latch;
mod mutex;
mod poison;
mod ring_buffer;
mod rwlock;
mod semaphore;
mod when_all;

pub use self::blocking::Blocker;
pub use self::event::{Event, ResumeOrder};
pub use self::latch::Latch;
pub use self::mutex::{Mutex, MutexGuard};
pub use self::ring_buffer::{CapacityError, ProduceError, RingBuffer};
pub use self::rwlock::{RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use self::semaphore::Semaphore;
pub use self::when_all::{when_all, when_all_in, WhenAll};

/// Failure raised to waiters woken by a stop broadcast.
///
/// A primitive that was stopped wakes every parked waiter; each returns
/// this failure instead of the resource it was waiting for. The stop is
/// permanent, there is no un-stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopSignal;

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "woken by a stop signal")
    }
}

impl Error for StopSignal {}
