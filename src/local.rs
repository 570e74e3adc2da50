use std::ptr::NonNull;
use std::sync::Arc;

use crate::coroutine_impl::Coroutine;
use crate::join::Join;
use crate::scheduler::ThreadPool;

/// Per-coroutine bookkeeping attached to the raw coroutine frame.
pub struct CoroutineLocal {
    // current coroutine handle
    co: Coroutine,
    // when the computation finishes or panics, we trigger the join here
    join: Arc<Join>,
    // the scheduler that drives this coroutine
    pool: ThreadPool,
}

impl CoroutineLocal {
    /// create coroutine local data
    pub fn new(co: Coroutine, join: Arc<Join>, pool: ThreadPool) -> Box<Self> {
        Box::new(CoroutineLocal { co, join, pool })
    }

    // get the coroutine handle
    pub fn get_co(&self) -> &Coroutine {
        &self.co
    }

    // get the join resource
    pub fn get_join(&self) -> Arc<Join> {
        self.join.clone()
    }

    // get the scheduler that owns this coroutine
    pub fn get_pool(&self) -> &ThreadPool {
        &self.pool
    }
}

#[inline]
pub fn get_co_local_data() -> Option<NonNull<CoroutineLocal>> {
    NonNull::new(generator::get_local_data() as *mut CoroutineLocal)
}
