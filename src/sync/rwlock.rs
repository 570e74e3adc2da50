//! compatible with std::sync::RwLock except for both thread and coroutine
//! please ref the doc from std::sync::RwLock
use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::sync::Mutex as ThreadMutex;
use std::sync::MutexGuard as ThreadMutexGuard;
use std::sync::{Arc, LockResult, TryLockError, TryLockResult};

use super::blocking::Blocker;
use super::poison;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Unlocked,
    Shared,
    Exclusive,
}

struct Waiter {
    blocker: Arc<Blocker>,
    exclusive: bool,
}

struct Inner {
    state: LockState,
    shared_users: usize,
    // once a writer is queued, no further readers may overtake it
    exclusive_waiters: usize,
    // strict arrival order
    waiters: VecDeque<Waiter>,
}

/// A reader-writer lock for coroutines and threads, with writer preference.
///
/// Any number of readers may hold the lock at once, or a single writer.
/// Waiters queue in strict arrival order; as soon as a writer is queued, no
/// reader that arrives after it gets the lock before it. A release wakes
/// either the single writer at the head of the queue, or the whole run of
/// readers up to the next queued writer as one batch.
///
/// The fast paths take a short internal blocking mutex that is never held
/// across a suspension.
pub struct RwLock<T: ?Sized> {
    inner: ThreadMutex<Inner>,
    poison: poison::PoisonFlag,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Send for RwLock<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwLock<T> {}
impl<T: ?Sized> UnwindSafe for RwLock<T> {}
impl<T: ?Sized> RefUnwindSafe for RwLock<T> {}

#[must_use]
pub struct RwLockReadGuard<'a, T: ?Sized + 'a> {
    __lock: &'a RwLock<T>,
}

#[must_use]
pub struct RwLockWriteGuard<'a, T: ?Sized + 'a> {
    __lock: &'a RwLock<T>,
    __poison: poison::HoldToken,
}

impl<T> RwLock<T> {
    pub fn new(t: T) -> RwLock<T> {
        RwLock {
            inner: ThreadMutex::new(Inner {
                state: LockState::Unlocked,
                shared_users: 0,
                exclusive_waiters: 0,
                waiters: VecDeque::new(),
            }),
            poison: poison::PoisonFlag::new(),
            data: UnsafeCell::new(t),
        }
    }
}

impl<T: ?Sized> RwLock<T> {
    pub fn read(&self) -> LockResult<RwLockReadGuard<T>> {
        let mut inner = self.inner.lock().expect("rwlock read");
        match inner.state {
            LockState::Unlocked => {
                inner.state = LockState::Shared;
                inner.shared_users += 1;
            }
            LockState::Shared if inner.exclusive_waiters == 0 => {
                inner.shared_users += 1;
            }
            _ => {
                // a writer holds the lock or is queued ahead of us
                let cur = Blocker::current();
                inner.waiters.push_back(Waiter {
                    blocker: cur.clone(),
                    exclusive: false,
                });
                drop(inner);
                cur.park();
                // the releaser already counted us as a shared user
            }
        }
        RwLockReadGuard::new(self)
    }

    pub fn try_read(&self) -> TryLockResult<RwLockReadGuard<T>> {
        let mut inner = self.inner.lock().expect("rwlock try_read");
        match inner.state {
            LockState::Unlocked => {
                inner.state = LockState::Shared;
                inner.shared_users += 1;
            }
            LockState::Shared if inner.exclusive_waiters == 0 => {
                inner.shared_users += 1;
            }
            _ => return Err(TryLockError::WouldBlock),
        }
        drop(inner);
        Ok(RwLockReadGuard::new(self)?)
    }

    pub fn write(&self) -> LockResult<RwLockWriteGuard<T>> {
        let mut inner = self.inner.lock().expect("rwlock write");
        match inner.state {
            LockState::Unlocked => {
                inner.state = LockState::Exclusive;
            }
            _ => {
                let cur = Blocker::current();
                inner.waiters.push_back(Waiter {
                    blocker: cur.clone(),
                    exclusive: true,
                });
                inner.exclusive_waiters += 1;
                drop(inner);
                cur.park();
                // the releaser set the state to exclusive on our behalf
            }
        }
        RwLockWriteGuard::new(self)
    }

    pub fn try_write(&self) -> TryLockResult<RwLockWriteGuard<T>> {
        let mut inner = self.inner.lock().expect("rwlock try_write");
        match inner.state {
            LockState::Unlocked => inner.state = LockState::Exclusive,
            _ => return Err(TryLockError::WouldBlock),
        }
        drop(inner);
        Ok(RwLockWriteGuard::new(self)?)
    }

    fn read_unlock(&self) {
        let mut inner = self.inner.lock().expect("rwlock read_unlock");
        inner.shared_users -= 1;
        if inner.shared_users == 0 {
            if inner.waiters.is_empty() {
                inner.state = LockState::Unlocked;
            } else {
                Self::wake_waiters(inner);
            }
        }
    }

    fn write_unlock(&self) {
        let mut inner = self.inner.lock().expect("rwlock write_unlock");
        if inner.waiters.is_empty() {
            inner.state = LockState::Unlocked;
        } else {
            Self::wake_waiters(inner);
        }
    }

    // pass the lock on, the internal mutex is released before any wakeup
    fn wake_waiters(mut inner: ThreadMutexGuard<'_, Inner>) {
        let head_exclusive = inner.waiters.front().map_or(false, |w| w.exclusive);
        if head_exclusive {
            inner.state = LockState::Exclusive;
            inner.exclusive_waiters -= 1;
            let w = inner.waiters.pop_front().expect("got null waiter!");
            drop(inner);
            w.blocker.unpark();
        } else {
            // wake the whole run of readers up to the next queued writer
            inner.state = LockState::Shared;
            let mut batch: SmallVec<[Arc<Blocker>; 8]> = SmallVec::new();
            while let Some(w) = inner.waiters.front() {
                if w.exclusive {
                    break;
                }
                let w = inner.waiters.pop_front().expect("got null waiter!");
                inner.shared_users += 1;
                batch.push(w.blocker);
            }
            drop(inner);
            for blocker in batch {
                blocker.unpark();
            }
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poison.get()
    }

    pub fn into_inner(self) -> LockResult<T>
    where
        T: Sized,
    {
        // We know statically that there are no outstanding references to
        // `self` so there's no need to lock the inner lock.
        let data = self.data.into_inner();
        self.poison.check(data)
    }

    pub fn get_mut(&mut self) -> LockResult<&mut T> {
        // We know statically that there are no other references to `self`, so
        // there's no need to lock the inner lock.
        let data = unsafe { &mut *self.data.get() };
        self.poison.check(data)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_read() {
            Ok(guard) => write!(f, "RwLock {{ data: {:?} }}", &*guard),
            Err(TryLockError::Poisoned(err)) => {
                write!(f, "RwLock {{ data: Poisoned({:?}) }}", &**err.get_ref())
            }
            Err(TryLockError::WouldBlock) => write!(f, "RwLock {{ <locked> }}"),
        }
    }
}

impl<T: Default> Default for RwLock<T> {
    /// Creates a new `RwLock<T>`, with the `Default` value for T.
    fn default() -> RwLock<T> {
        RwLock::new(Default::default())
    }
}

impl<'rwlock, T: ?Sized> RwLockReadGuard<'rwlock, T> {
    fn new(lock: &'rwlock RwLock<T>) -> LockResult<RwLockReadGuard<'rwlock, T>> {
        // readers never poison, so no token is kept
        lock.poison.check(RwLockReadGuard { __lock: lock })
    }
}

impl<'rwlock, T: ?Sized> RwLockWriteGuard<'rwlock, T> {
    fn new(lock: &'rwlock RwLock<T>) -> LockResult<RwLockWriteGuard<'rwlock, T>> {
        let token = lock.poison.enter();
        lock.poison.check(RwLockWriteGuard {
            __lock: lock,
            __poison: token,
        })
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for RwLockReadGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RwLockReadGuard")
            .field("lock", &self.__lock)
            .finish()
    }
}

impl<'a, T: fmt::Debug> fmt::Debug for RwLockWriteGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RwLockWriteGuard")
            .field("lock", &self.__lock)
            .finish()
    }
}

impl<'rwlock, T: ?Sized> Deref for RwLockReadGuard<'rwlock, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.__lock.data.get() }
    }
}

impl<'rwlock, T: ?Sized> Deref for RwLockWriteGuard<'rwlock, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.__lock.data.get() }
    }
}

impl<'rwlock, T: ?Sized> DerefMut for RwLockWriteGuard<'rwlock, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.__lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for RwLockReadGuard<'a, T> {
    fn drop(&mut self) {
        self.__lock.read_unlock();
    }
}

impl<'a, T: ?Sized> Drop for RwLockWriteGuard<'a, T> {
    fn drop(&mut self) {
        self.__lock.poison.leave(&self.__poison);
        self.__lock.write_unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::sync::{Arc, TryLockError};
    use std::thread;

    #[derive(Eq, PartialEq, Debug)]
    struct NonCopy(i32);

    #[test]
    fn smoke() {
        let l = RwLock::new(());
        drop(l.read().unwrap());
        drop(l.write().unwrap());
        drop((l.read().unwrap(), l.read().unwrap()));
        drop(l.write().unwrap());
    }

    #[test]
    fn frob() {
        const N: usize = 10;
        const M: usize = 1000;

        let r = Arc::new(RwLock::new(()));

        let (tx, rx) = channel::<()>();
        for i in 0..N {
            let tx = tx.clone();
            let r = r.clone();
            let f = move || {
                for i in 0..M {
                    if i % 5 == 0 {
                        drop(r.write().unwrap());
                    } else {
                        drop(r.read().unwrap());
                    }
                }
                drop(tx);
            };
            if i % 2 == 0 {
                go!(f);
            } else {
                thread::spawn(f);
            }
        }
        drop(tx);
        let _ = rx.recv();
    }

    #[test]
    fn queued_writer_blocks_new_readers() {
        let lock = Arc::new(RwLock::new(0));
        let r1 = lock.read().unwrap();

        // the writer parks behind the active reader
        let lock2 = lock.clone();
        let (wtx, wrx) = channel();
        let writer = go!(move || {
            let mut g = lock2.write().unwrap();
            *g += 1;
            wtx.send(()).unwrap();
        });

        // spin until the writer is queued
        loop {
            let inner = lock.inner.lock().unwrap();
            if inner.exclusive_waiters == 1 {
                break;
            }
            drop(inner);
            thread::yield_now();
        }

        // a late reader must not overtake the queued writer
        assert!(matches!(lock.try_read(), Err(TryLockError::WouldBlock)));

        drop(r1);
        wrx.recv().unwrap();
        writer.join().unwrap();
        assert_eq!(*lock.read().unwrap(), 1);
    }

    #[test]
    fn test_rw_arc_poison_ww() {
        let arc = Arc::new(RwLock::new(1));
        assert!(!arc.is_poisoned());
        let arc2 = arc.clone();
        let _: Result<(), _> = thread::spawn(move || {
            let _lock = arc2.write().unwrap();
            panic!();
        })
        .join();
        assert!(arc.write().is_err());
        assert!(arc.is_poisoned());
    }

    #[test]
    fn test_rw_arc_no_poison_rr() {
        let arc = Arc::new(RwLock::new(1));
        let arc2 = arc.clone();
        let _: Result<(), _> = thread::spawn(move || {
            let _lock = arc2.read().unwrap();
            panic!();
        })
        .join();
        let lock = arc.read().unwrap();
        assert_eq!(*lock, 1);
    }

    #[test]
    fn test_rwlock_try_write() {
        let lock = RwLock::new(0isize);
        let read_guard = lock.read().unwrap();

        let write_result = lock.try_write();
        match write_result {
            Err(TryLockError::WouldBlock) => (),
            Ok(_) => panic!("try_write should not succeed while read_guard is in scope"),
            Err(_) => panic!("unexpected error"),
        }

        drop(read_guard);
    }

    #[test]
    fn test_into_inner() {
        let m = RwLock::new(NonCopy(10));
        assert_eq!(m.into_inner().unwrap(), NonCopy(10));
    }

    #[test]
    fn test_get_mut() {
        let mut m = RwLock::new(NonCopy(10));
        *m.get_mut().unwrap() = NonCopy(20);
        assert_eq!(m.into_inner().unwrap(), NonCopy(20));
    }
}
