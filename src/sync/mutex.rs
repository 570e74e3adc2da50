//! compatible with std::sync::Mutex except for both thread and coroutine
//! please ref the doc from std::sync::Mutex
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{RefUnwindSafe, UnwindSafe};
use std::ptr;
use std::sync::atomic::{fence, AtomicPtr, Ordering};
use std::sync::Arc;
use std::sync::{LockResult, TryLockError, TryLockResult};

use super::blocking::Blocker;
use super::poison;

struct Waiter {
    blocker: Arc<Blocker>,
    next: *mut Waiter,
}

// the address of this static is the "unlocked" sentinel, it can collide
// with neither null nor a heap allocated waiter node
static UNLOCKED: u8 = 0;

#[inline]
fn unlocked_sentinel() -> *mut Waiter {
    &UNLOCKED as *const u8 as *mut Waiter
}

fn reverse(head: *mut Waiter) -> *mut Waiter {
    let mut prev = ptr::null_mut();
    let mut head = head;
    while !head.is_null() {
        unsafe {
            let next = (*head).next;
            (*head).next = prev;
            prev = head;
            head = next;
        }
    }
    prev
}

/// A mutual exclusion primitive for coroutines and threads.
///
/// Lock and unlock are lock-free on the uncontended path: the whole lock
/// state is a single word holding either the unlocked sentinel, null
/// (locked, nobody waiting), or the head of a LIFO stack of waiters.
/// An unlock hands the lock directly to the oldest waiter; the stack is
/// reversed into a FIFO drain list once per batch, so waiters acquire in
/// arrival order.
///
/// The lock is not recursive. Ownership is tied to the guard, not to the
/// locking thread: a coroutine may be resumed on a different worker while
/// it holds the guard.
pub struct Mutex<T: ?Sized> {
    state: AtomicPtr<Waiter>,
    // waiters drained from the stack in FIFO order,
    // only ever touched by the current lock holder
    to_wake: UnsafeCell<*mut Waiter>,
    poison: poison::PoisonFlag,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}
impl<T: ?Sized> UnwindSafe for Mutex<T> {}
impl<T: ?Sized> RefUnwindSafe for Mutex<T> {}

pub struct MutexGuard<'a, T: ?Sized + 'a> {
    // funny underscores due to how Deref/DerefMut currently work (they
    // disregard field privacy).
    __lock: &'a Mutex<T>,
    __poison: poison::HoldToken,
}

impl<T> Mutex<T> {
    /// Creates a new mutex in an unlocked state ready for use.
    pub fn new(t: T) -> Mutex<T> {
        Mutex {
            state: AtomicPtr::new(unlocked_sentinel()),
            to_wake: UnsafeCell::new(ptr::null_mut()),
            poison: poison::PoisonFlag::new(),
            data: UnsafeCell::new(t),
        }
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn lock(&self) -> LockResult<MutexGuard<T>> {
        // try lock first
        match self.try_lock() {
            Ok(g) => return Ok(g),
            Err(TryLockError::WouldBlock) => {}
            Err(TryLockError::Poisoned(e)) => return Err(e),
        }

        let cur = Blocker::current();
        let node = Box::into_raw(Box::new(Waiter {
            blocker: cur.clone(),
            next: ptr::null_mut(),
        }));

        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state == unlocked_sentinel() {
                // the lock got released while we were linking,
                // try to grab it directly
                match self.state.compare_exchange_weak(
                    state,
                    ptr::null_mut(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        drop(unsafe { Box::from_raw(node) });
                        return MutexGuard::new(self);
                    }
                    Err(s) => state = s,
                }
            } else {
                unsafe { (*node).next = state };
                match self.state.compare_exchange_weak(
                    state,
                    node,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(s) => state = s,
                }
            }
        }

        cur.park();

        // the unlocker handed the lock over to us
        MutexGuard::new(self)
    }

    pub fn try_lock(&self) -> TryLockResult<MutexGuard<T>> {
        if self
            .state
            .compare_exchange(
                unlocked_sentinel(),
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            Ok(MutexGuard::new(self)?)
        } else {
            Err(TryLockError::WouldBlock)
        }
    }

    fn unlock(&self) {
        unsafe {
            let to_wake = self.to_wake.get();
            if (*to_wake).is_null() {
                let cur = self.state.load(Ordering::Relaxed);
                if cur.is_null()
                    && self
                        .state
                        .compare_exchange(
                            cur,
                            unlocked_sentinel(),
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                {
                    // nobody was waiting
                    return;
                }

                // waiters arrived, take the whole stack and reverse it
                // once so the drain below is FIFO
                let head = self.state.swap(ptr::null_mut(), Ordering::AcqRel);
                *to_wake = reverse(head);
            }

            // hand the lock to the oldest waiter
            let node = Box::from_raw(*to_wake);
            *to_wake = node.next;
            node.blocker.unpark();
        }
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poison.get()
    }

    pub fn into_inner(self) -> LockResult<T>
    where
        T: Sized,
    {
        // a parked waiter would be borrowing `self`, so by-value access
        // means the waiter lists are empty and only the data remains
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

impl<T: ?Sized + Default> Default for Mutex<T> {
    fn default() -> Mutex<T> {
        Mutex::new(Default::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.try_lock() {
            Ok(guard) => write!(f, "Mutex {{ data: {:?} }}", &*guard),
            Err(TryLockError::Poisoned(err)) => {
                write!(f, "Mutex {{ data: Poisoned({:?}) }}", &**err.get_ref())
            }
            Err(TryLockError::WouldBlock) => write!(f, "Mutex {{ <locked> }}"),
        }
    }
}

impl<'mutex, T: ?Sized> MutexGuard<'mutex, T> {
    fn new(lock: &'mutex Mutex<T>) -> LockResult<MutexGuard<'mutex, T>> {
        // after getting the lock we should sync the mem
        fence(Ordering::SeqCst);

        let token = lock.poison.enter();
        lock.poison.check(MutexGuard {
            __lock: lock,
            __poison: token,
        })
    }
}

impl<'mutex, T: ?Sized> Deref for MutexGuard<'mutex, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.__lock.data.get() }
    }
}

impl<'mutex, T: ?Sized> DerefMut for MutexGuard<'mutex, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.__lock.data.get() }
    }
}

impl<'a, T: ?Sized> Drop for MutexGuard<'a, T> {
    #[inline]
    fn drop(&mut self) {
        self.__lock.poison.leave(&self.__poison);
        // before releasing the lock we should sync the mem
        fence(Ordering::SeqCst);
        self.__lock.unlock();
    }
}

impl<'a, T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MutexGuard")
            .field("lock", &self.__lock)
            .finish()
    }
}
