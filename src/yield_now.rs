use generator::co_yield_with;

use crate::coroutine_impl::{co_get_pool, is_coroutine, CoroutineImpl, EventSource, EventSubscriber};

struct Yield;

impl EventSource for Yield {
    fn subscribe(&mut self, co: CoroutineImpl) {
        // just repush the coroutine to the back of the ready list
        co_get_pool(&co).schedule(co);
    }
}

/// yield with the internal `EventSource` ref
/// it's ok to yield a ref of an object on the coroutine's stack
/// just like returning the ref of a struct member
#[inline]
pub fn yield_with<T: EventSource + 'static>(resource: &T) {
    let r = resource as &dyn EventSource as *const _ as *mut dyn EventSource;
    let es = EventSubscriber::new(r);
    co_yield_with(es);
}

/// cooperatively give up the worker thread, re-enqueueing the current
/// coroutine at the back of its scheduler's run queue
///
/// in thread context this is just `std::thread::yield_now`
#[inline]
pub fn yield_now() {
    if !is_coroutine() {
        return ::std::thread::yield_now();
    }
    let y = Yield;
    // it's safe to use the stack value here
    yield_with(&y);
}
