use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::config;
use crate::coroutine_impl::CoroutineImpl;
use crossbeam::queue::SegQueue;
use generator::Gn;

/// the raw coroutine frame pool, with stack and registers prepared
/// you need to take care of the local storage
pub struct CoroutinePool {
    // the pool must support mpmc operation!
    pool: SegQueue<CoroutineImpl>,
    size: AtomicUsize,
}

impl CoroutinePool {
    fn create_dummy_coroutine() -> CoroutineImpl {
        Gn::new_opt(config().get_stack_size(), move || {
            unreachable!("dummy coroutine should never be called");
        })
    }

    pub fn new() -> Self {
        CoroutinePool {
            pool: SegQueue::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// get a raw coroutine frame from the pool
    #[inline]
    pub fn get(&self) -> CoroutineImpl {
        match self.pool.pop() {
            Some(co) => {
                self.size.fetch_sub(1, Ordering::AcqRel);
                co
            }
            None => Self::create_dummy_coroutine(),
        }
    }

    /// put a raw coroutine frame back into the pool
    #[inline]
    pub fn put(&self, co: CoroutineImpl) {
        // discard the co if we already cached enough frames
        let m = self.size.fetch_add(1, Ordering::AcqRel);
        if m >= config().get_frame_cache() {
            self.size.fetch_sub(1, Ordering::AcqRel);
            return;
        }
        self.pool.push(co);
    }
}
