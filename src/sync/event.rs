use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use super::blocking::Blocker;

/// The order parked waiters are woken in when an [`Event`] is set.
///
/// `Lifo` is the natural order of the internal waiter stack and is the
/// cheapest; `Fifo` reverses the stack once before waking.
///
/// [`Event`]: struct.Event.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOrder {
    Lifo,
    Fifo,
}

struct Waiter {
    blocker: Arc<Blocker>,
    next: *mut Waiter,
}

// the address of this static is the "set" sentinel, it can collide with
// neither null nor a heap allocated waiter node
static SET: u8 = 0;

#[inline]
fn set_sentinel() -> *mut Waiter {
    &SET as *const u8 as *mut Waiter
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

/// A manual-reset, one-shot broadcast signal.
///
/// While unset, `wait` parks the caller on an internal lock-free waiter
/// stack; `set` wakes every parked waiter and makes all future waits
/// complete immediately, until `reset` puts the event back to unset.
///
/// The whole state lives in a single word: unset, the head of the waiter
/// stack, or the set sentinel.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use syncoro::coroutine;
/// use syncoro::sync::Event;
///
/// let event = Arc::new(Event::new(false));
/// let event2 = event.clone();
///
/// unsafe {
///     coroutine::spawn(move || {
///         event2.set();
///     });
/// }
///
/// event.wait();
/// ```
pub struct Event {
    state: AtomicPtr<Waiter>,
}

unsafe impl Send for Event {}
unsafe impl Sync for Event {}

impl Event {
    pub fn new(initially_set: bool) -> Event {
        let init = if initially_set {
            set_sentinel()
        } else {
            ptr::null_mut()
        };
        Event {
            state: AtomicPtr::new(init),
        }
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) == set_sentinel()
    }

    /// set the event, waking all currently parked waiters in LIFO order
    pub fn set(&self) {
        self.set_with(ResumeOrder::Lifo);
    }

    /// set the event, waking all currently parked waiters in the given order
    pub fn set_with(&self, order: ResumeOrder) {
        let mut head = self.state.swap(set_sentinel(), Ordering::AcqRel);
        if head == set_sentinel() {
            return;
        }

        if order == ResumeOrder::Fifo {
            head = reverse(head);
        }

        while !head.is_null() {
            let node = unsafe { Box::from_raw(head) };
            head = node.next;
            node.blocker.unpark();
        }
    }

    /// put a set event back to unset so future waiters block again
    ///
    /// a no-op unless the event is currently set; must not race with
    /// parked waiters
    pub fn reset(&self) {
        self.state
            .compare_exchange(
                set_sentinel(),
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .ok();
    }

    /// block the current coroutine or thread until the event is set
    pub fn wait(&self) {
        if self.is_set() {
            return;
        }

        let cur = Blocker::current();
        let node = Box::into_raw(Box::new(Waiter {
            blocker: cur.clone(),
            next: ptr::null_mut(),
        }));

        let mut state = self.state.load(Ordering::Acquire);
        loop {
            if state == set_sentinel() {
                // lost the race against a concurrent set, no need to block
                drop(unsafe { Box::from_raw(node) });
                return;
            }

            unsafe { (*node).next = state };
            match self
                .state
                .compare_exchange_weak(state, node, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(s) => state = s,
            }
        }

        cur.park();
    }
}

impl Default for Event {
    fn default() -> Self {
        Event::new(false)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Event {{ is_set: {} }}", self.is_set())
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        // reclaim nodes that never got woken
        let mut head = self.state.swap(set_sentinel(), Ordering::AcqRel);
        if head == set_sentinel() {
            return;
        }
        while !head.is_null() {
            let node = unsafe { Box::from_raw(head) };
            head = node.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn set_before_wait() {
        let event = Event::new(false);
        event.set();
        // must not block
        event.wait();
        assert!(event.is_set());
    }

    #[test]
    fn initially_set() {
        let event = Event::new(true);
        assert!(event.is_set());
        event.wait();
    }

    #[test]
    fn wake_thread_and_coroutine() {
        let event = Arc::new(Event::new(false));
        let e1 = event.clone();
        let e2 = event.clone();

        let h1 = thread::spawn(move || e1.wait());
        let h2 = go!(move || e2.wait());

        event.set();
        h1.join().unwrap();
        h2.join().unwrap();
    }

    #[test]
    fn reset_blocks_future_waiters() {
        let event = Arc::new(Event::new(true));
        event.reset();
        assert!(!event.is_set());

        let e2 = event.clone();
        let h = go!(move || e2.wait());
        assert!(!h.is_done());

        event.set();
        h.join().unwrap();
    }

    #[test]
    fn reset_when_unset_is_noop() {
        let event = Event::new(false);
        event.reset();
        assert!(!event.is_set());
    }
}
