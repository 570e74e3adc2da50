use std::cell::UnsafeCell;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as ThreadMutex;

use super::blocking::Blocker;
use super::StopSignal;
use smallvec::SmallVec;

/// Failure constructing a [`RingBuffer`] with zero capacity.
///
/// [`RingBuffer`]: struct.RingBuffer.html
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityError;

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ring buffer capacity cannot be zero")
    }
}

impl Error for CapacityError {}

/// Failure producing into a stopped [`RingBuffer`]; gives the element back.
///
/// [`RingBuffer`]: struct.RingBuffer.html
pub struct ProduceError<T>(pub T);

impl<T> ProduceError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for ProduceError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ProduceError(..)")
    }
}

impl<T> fmt::Display for ProduceError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "producing into a stopped ring buffer")
    }
}

impl<T> Error for ProduceError<T> {}

// a parked producer carries its element in, a parked consumer carries
// the handed-off element out; the slot is only ever touched while the
// waiter is linked under the ring mutex, or by its owner after the unpark
struct Waiter<T> {
    blocker: Arc<Blocker>,
    slot: UnsafeCell<Option<T>>,
    stopped: AtomicBool,
}

unsafe impl<T: Send> Send for Waiter<T> {}
unsafe impl<T: Send> Sync for Waiter<T> {}

impl<T> Waiter<T> {
    fn new(element: Option<T>) -> Arc<Self> {
        Arc::new(Waiter {
            blocker: Blocker::current(),
            slot: UnsafeCell::new(element),
            stopped: AtomicBool::new(false),
        })
    }

    // take the slot back after the wakeup
    fn take(&self) -> Option<T> {
        unsafe { (*self.slot.get()).take() }
    }
}

struct Inner<T> {
    slots: Box<[Option<T>]>,
    front: usize,
    back: usize,
    used: usize,
    // last waiter first
    produce_waiters: Vec<Arc<Waiter<T>>>,
    consume_waiters: Vec<Arc<Waiter<T>>>,
    stopped: bool,
}

/// A bounded MPMC channel for coroutines and threads.
///
/// `produce` parks the caller while the buffer is full, `consume` parks
/// while it is empty. When a parked peer exists, the element is handed
/// through the buffer in one step on the releasing side, preserving FIFO
/// order of the stored elements.
///
/// `stop` wakes all parked waiters with a [`StopSignal`]; afterwards any
/// operation that would have to park fails instead, while operations that
/// can complete immediately continue to serve.
///
/// [`StopSignal`]: struct.StopSignal.html
pub struct RingBuffer<T> {
    inner: ThreadMutex<Inner<T>>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// create a buffer holding at most `capacity` elements
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError);
        }

        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(RingBuffer {
            inner: ThreadMutex::new(Inner {
                slots: slots.into_boxed_slice(),
                front: 0,
                back: 0,
                used: 0,
                produce_waiters: Vec::new(),
                consume_waiters: Vec::new(),
                stopped: false,
            }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// the number of elements currently stored
    pub fn len(&self) -> usize {
        self.inner.lock().expect("ring buffer len").used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// store an element, parking the caller while the buffer is full
    ///
    /// once stopped, a produce that would have to park fails instead and
    /// hands the element back
    pub fn produce(&self, element: T) -> Result<(), ProduceError<T>> {
        let mut inner = self.inner.lock().expect("ring buffer produce");
        if inner.used < self.capacity {
            let front = inner.front;
            inner.slots[front] = Some(element);
            inner.front = (front + 1) % self.capacity;
            inner.used += 1;

            // a parked consumer takes the oldest element in the same step
            if let Some(waiter) = inner.consume_waiters.pop() {
                let back = inner.back;
                let handed = inner.slots[back].take();
                inner.back = (back + 1) % self.capacity;
                inner.used -= 1;

                unsafe { *waiter.slot.get() = handed };
                drop(inner);
                waiter.blocker.unpark();
            }

            return Ok(());
        }

        if inner.stopped {
            return Err(ProduceError(element));
        }

        // full, park carrying the element
        let waiter = Waiter::new(Some(element));
        inner.produce_waiters.push(waiter.clone());
        drop(inner);

        waiter.blocker.park();

        if waiter.stopped.load(Ordering::Acquire) {
            let element = waiter.take().expect("lost element of a stopped producer");
            return Err(ProduceError(element));
        }
        // a consumer moved the element into the buffer on our behalf
        Ok(())
    }

    /// take the oldest element, parking the caller while the buffer is empty
    ///
    /// elements stored before a stop remain consumable; only a consume
    /// that would have to park fails
    pub fn consume(&self) -> Result<T, StopSignal> {
        let mut inner = self.inner.lock().expect("ring buffer consume");
        if inner.used > 0 {
            let back = inner.back;
            let element = inner.slots[back]
                .take()
                .expect("empty slot inside the used range");
            inner.back = (back + 1) % self.capacity;
            inner.used -= 1;

            // pull a parked producer's element into the freed space
            if let Some(waiter) = inner.produce_waiters.pop() {
                let pending = unsafe { (*waiter.slot.get()).take() };
                let front = inner.front;
                inner.slots[front] = pending;
                inner.front = (front + 1) % self.capacity;
                inner.used += 1;

                drop(inner);
                waiter.blocker.unpark();
            }

            return Ok(element);
        }

        if inner.stopped {
            return Err(StopSignal);
        }

        // empty, park until a producer hands an element over
        let waiter = Waiter::new(None);
        inner.consume_waiters.push(waiter.clone());
        drop(inner);

        waiter.blocker.park();

        if waiter.stopped.load(Ordering::Acquire) {
            return Err(StopSignal);
        }
        Ok(waiter.take().expect("woken consumer without an element"))
    }

    /// wake every parked waiter with a [`StopSignal`], permanently
    ///
    /// idempotent; elements already stored stay consumable, only waits
    /// that would park fail from now on
    ///
    /// [`StopSignal`]: struct.StopSignal.html
    pub fn stop(&self) {
        let drained: SmallVec<[Arc<Waiter<T>>; 8]> = {
            let mut inner = self.inner.lock().expect("ring buffer stop");
            if inner.stopped {
                return;
            }
            inner.stopped = true;

            let mut drained: SmallVec<[Arc<Waiter<T>>; 8]> = SmallVec::new();
            drained.extend(inner.produce_waiters.drain(..));
            drained.extend(inner.consume_waiters.drain(..));
            for w in &drained {
                w.stopped.store(true, Ordering::Release);
            }
            drained
        };

        for w in drained {
            w.blocker.unpark();
        }
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.lock().expect("ring buffer debug");
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("len", &inner.used)
            .field("stopped", &inner.stopped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::thread;

    #[test]
    fn zero_capacity_fails() {
        assert_eq!(RingBuffer::<i32>::with_capacity(0).unwrap_err(), CapacityError);
    }

    #[test]
    fn produce_consume_without_blocking() {
        let rb = RingBuffer::with_capacity(4).unwrap();
        rb.produce(1).unwrap();
        rb.produce(2).unwrap();
        assert_eq!(rb.len(), 2);
        assert_eq!(rb.consume().unwrap(), 1);
        assert_eq!(rb.consume().unwrap(), 2);
        assert!(rb.is_empty());
    }

    #[test]
    fn wraps_around() {
        let rb = RingBuffer::with_capacity(2).unwrap();
        for round in 0..10 {
            rb.produce(round).unwrap();
            rb.produce(round + 100).unwrap();
            assert_eq!(rb.consume().unwrap(), round);
            assert_eq!(rb.consume().unwrap(), round + 100);
        }
    }

    #[test]
    fn parked_consumer_gets_the_element() {
        let rb = Arc::new(RingBuffer::with_capacity(1).unwrap());
        let rb2 = rb.clone();

        let h = go!(move || rb2.consume().unwrap());

        // wait until the consumer is parked
        while rb.inner.lock().unwrap().consume_waiters.is_empty() {
            thread::yield_now();
        }

        rb.produce(7).unwrap();
        assert_eq!(h.join().unwrap(), 7);
        assert!(rb.is_empty());
    }

    #[test]
    fn parked_producer_refills_the_buffer() {
        let rb = Arc::new(RingBuffer::with_capacity(1).unwrap());
        rb.produce(1).unwrap();

        let rb2 = rb.clone();
        let h = go!(move || rb2.produce(2).unwrap());

        while rb.inner.lock().unwrap().produce_waiters.is_empty() {
            thread::yield_now();
        }

        assert_eq!(rb.consume().unwrap(), 1);
        h.join().unwrap();
        assert_eq!(rb.consume().unwrap(), 2);
    }

    #[test]
    fn stop_wakes_parked_producer_and_returns_element() {
        let rb = Arc::new(RingBuffer::with_capacity(1).unwrap());
        rb.produce(1).unwrap();

        let rb2 = rb.clone();
        let (tx, rx) = channel();
        go!(move || {
            let r = rb2.produce(2);
            tx.send(r.map_err(|e| e.into_inner())).unwrap();
        });

        while rb.inner.lock().unwrap().produce_waiters.is_empty() {
            thread::yield_now();
        }

        rb.stop();
        // the parked producer gets its element back
        assert_eq!(rx.recv().unwrap(), Err(2));
        // the stored element survives the stop
        assert_eq!(rb.consume().unwrap(), 1);
        // an empty buffer no longer parks the consumer
        assert_eq!(rb.consume(), Err(StopSignal));
    }

    #[test]
    fn stop_wakes_parked_consumer() {
        let rb = Arc::new(RingBuffer::<i32>::with_capacity(1).unwrap());
        let rb2 = rb.clone();
        let (tx, rx) = channel();
        go!(move || {
            tx.send(rb2.consume()).unwrap();
        });

        while rb.inner.lock().unwrap().consume_waiters.is_empty() {
            thread::yield_now();
        }

        rb.stop();
        assert_eq!(rx.recv().unwrap(), Err(StopSignal));
    }
}
