use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};

use super::event::Event;

/// A single-use count-down barrier.
///
/// The latch starts at `count`; `count_down` subtracts from it and the
/// subtraction that reaches zero (or drives the counter below it) sets the
/// internal [`Event`], releasing every current and future waiter. The
/// counter never rearms.
///
/// [`Event`]: struct.Event.html
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use syncoro::coroutine;
/// use syncoro::sync::Latch;
///
/// let latch = Arc::new(Latch::new(2));
/// for _ in 0..2 {
///     let latch2 = latch.clone();
///     unsafe {
///         coroutine::spawn(move || {
///             latch2.count_down(1);
///         });
///     }
/// }
///
/// latch.wait();
/// ```
pub struct Latch {
    count: AtomicIsize,
    event: Event,
}

impl Latch {
    pub fn new(count: usize) -> Self {
        Latch {
            count: AtomicIsize::new(count as isize),
            event: Event::new(count == 0),
        }
    }

    /// subtract `n` from the counter, releasing all waiters when it
    /// reaches zero
    pub fn count_down(&self, n: usize) {
        let n = n as isize;
        if self.count.fetch_sub(n, Ordering::AcqRel) <= n {
            self.event.set();
        }
    }

    /// whether the counter has reached zero
    pub fn is_ready(&self) -> bool {
        self.event.is_set()
    }

    /// how many counts are still outstanding
    pub fn remaining(&self) -> usize {
        self.count.load(Ordering::Acquire).max(0) as usize
    }

    /// block the current coroutine or thread until the counter reaches zero
    pub fn wait(&self) {
        self.event.wait();
    }
}

impl fmt::Debug for Latch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Latch")
            .field("remaining", &self.remaining())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::sync::Arc;

    #[test]
    fn zero_count_is_ready() {
        let latch = Latch::new(0);
        assert!(latch.is_ready());
        latch.wait();
    }

    #[test]
    fn releases_after_exact_count() {
        let latch = Arc::new(Latch::new(3));
        let (tx, rx) = channel();

        for _ in 0..3 {
            let latch2 = latch.clone();
            let tx2 = tx.clone();
            go!(move || {
                latch2.count_down(1);
                tx2.send(()).unwrap();
            });
        }

        latch.wait();
        assert!(latch.is_ready());
        assert_eq!(latch.remaining(), 0);
        for _ in 0..3 {
            rx.recv().unwrap();
        }
    }

    #[test]
    fn partial_count_keeps_waiters_parked() {
        let latch = Arc::new(Latch::new(2));
        latch.count_down(1);
        assert!(!latch.is_ready());
        assert_eq!(latch.remaining(), 1);

        let latch2 = latch.clone();
        let h = go!(move || latch2.wait());
        assert!(!latch.is_ready());

        latch.count_down(1);
        h.join().unwrap();
        assert!(latch.is_ready());
    }

    #[test]
    fn count_down_many_at_once() {
        let latch = Latch::new(5);
        latch.count_down(5);
        assert!(latch.is_ready());
    }
}
