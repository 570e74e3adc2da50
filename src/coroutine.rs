//! Coroutine creation and control.

use crate::scheduler::global_pool;

pub use crate::coroutine_impl::{
    current, is_coroutine, spawn, Builder, Coroutine, CoroutineImpl, EventSource, EventSubscriber,
};
pub use crate::join::JoinHandle;
pub use crate::yield_now::yield_now;

/// Run a computation on the global scheduler, fire-and-forget.
///
/// The join handle is dropped, detaching the computation. A panic inside
/// the computation is contained by the coroutine frame and does not affect
/// its peers; use [`spawn`] and keep the handle when the outcome matters.
///
/// [`spawn`]: fn.spawn.html
pub fn run_async<F>(f: F)
where
    F: FnOnce() + Send + 'static,
{
    let _ = unsafe { Builder::new().pool(global_pool()).spawn(f) };
}
