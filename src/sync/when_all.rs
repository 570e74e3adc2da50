use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use super::latch::Latch;
use crate::coroutine_impl::Builder;
use crate::scheduler::ThreadPool;
use crossbeam::atomic::AtomicCell;

/// The join of a batch of computations started by [`when_all`].
///
/// Awaiting the join parks the caller exactly once, on a latch the last
/// finishing child sets; it does not wake per child. The results come back
/// in the order the computations were passed in, each in its own slot: a
/// panicking child fills its slot with the panic payload and does not
/// affect its siblings.
///
/// [`when_all`]: fn.when_all.html
#[must_use]
pub struct WhenAll<T> {
    latch: Arc<Latch>,
    slots: Vec<Arc<AtomicCell<Option<thread::Result<T>>>>>,
}

impl<T> WhenAll<T> {
    /// whether every child has finished
    pub fn is_ready(&self) -> bool {
        self.latch.is_ready()
    }

    /// block the current coroutine or thread until every child finishes,
    /// then collect the results in input order
    pub fn wait(self) -> Vec<thread::Result<T>> {
        self.latch.wait();
        self.slots
            .into_iter()
            .map(|slot| slot.take().expect("child finished without a result"))
            .collect()
    }
}

/// Start every computation on the given scheduler and join them as one.
///
/// See [`WhenAll`] for the result semantics.
///
/// [`WhenAll`]: struct.WhenAll.html
pub fn when_all_in<F, T, I>(pool: &ThreadPool, fns: I) -> WhenAll<T>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let fns: Vec<F> = fns.into_iter().collect();
    let latch = Arc::new(Latch::new(fns.len()));
    let mut slots = Vec::with_capacity(fns.len());

    for f in fns {
        let slot = Arc::new(AtomicCell::new(None));
        slots.push(slot.clone());
        let child_latch = latch.clone();

        let child = move || {
            let result = catch_unwind(AssertUnwindSafe(f));
            slot.swap(Some(result));
            // the slot is filled before the last count releases the parent
            child_latch.count_down(1);
        };
        // the only spawn failure is a shut-down pool; account the child
        // as finished so the join does not hang forever
        if unsafe { Builder::new().pool(pool).spawn(child) }.is_err() {
            latch.count_down(1);
        }
    }

    WhenAll { latch, slots }
}

/// Start every computation on the global scheduler and join them as one.
///
/// # Examples
///
/// ```rust
/// use syncoro::sync::when_all;
///
/// let results = when_all((0..4).map(|i| move || i * 10)).wait();
/// let values: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
/// assert_eq!(values, [0, 10, 20, 30]);
/// ```
pub fn when_all<F, T, I>(fns: I) -> WhenAll<T>
where
    I: IntoIterator<Item = F>,
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    when_all_in(crate::scheduler::global_pool(), fns)
}
