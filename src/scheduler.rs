use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Once};
use std::thread;

use crate::config::config;
use crate::coroutine_impl::{run_coroutine, Builder, CoroutineImpl};
use crate::join::JoinHandle;
use crate::pool::CoroutinePool;

/// Failure returned when scheduling on a pool that is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownError;

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "the thread pool is shutting down, unable to schedule")
    }
}

impl Error for ShutdownError {}

type WorkerHook = Arc<dyn Fn(usize) + Send + Sync>;

/// Thread pool factory.
///
/// Configures the worker count (the global `Config` default when not set)
/// and optional per-worker start/stop hooks, which are invoked with the
/// worker index on its own thread.
#[derive(Default)]
pub struct PoolBuilder {
    workers: Option<usize>,
    on_start: Option<WorkerHook>,
    on_stop: Option<WorkerHook>,
}

impl PoolBuilder {
    pub fn new() -> PoolBuilder {
        PoolBuilder::default()
    }

    /// set the worker thread count, at least 1
    pub fn workers(mut self, workers: usize) -> PoolBuilder {
        self.workers = Some(workers);
        self
    }

    /// run the hook on each worker thread before it starts processing
    pub fn on_worker_start<F: Fn(usize) + Send + Sync + 'static>(mut self, f: F) -> PoolBuilder {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// run the hook on each worker thread right before it exits
    pub fn on_worker_stop<F: Fn(usize) + Send + Sync + 'static>(mut self, f: F) -> PoolBuilder {
        self.on_stop = Some(Arc::new(f));
        self
    }

    /// start the workers and return the pool handle
    pub fn build(self) -> ThreadPool {
        let workers = self.workers.unwrap_or_else(|| config().get_workers()).max(1);

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            cvar: Condvar::new(),
            pending: AtomicUsize::new(0),
            stop: AtomicBool::new(false),
            threads: Mutex::new(Vec::with_capacity(workers)),
            frame_pool: CoroutinePool::new(),
            on_start: self.on_start,
            on_stop: self.on_stop,
            workers,
        });

        let mut threads = shared.threads.lock().unwrap();
        for id in 0..workers {
            let shared = shared.clone();
            let t = thread::Builder::new()
                .name(format!("syncoro-worker-{id}"))
                .spawn(move || Shared::worker_main(&shared, id))
                .expect("failed to spawn worker thread");
            threads.push(t);
        }
        drop(threads);

        info!("thread pool started, workers={workers}");
        ThreadPool { shared }
    }
}

struct Shared {
    // the multi-consumer run queue
    queue: Mutex<VecDeque<CoroutineImpl>>,
    cvar: Condvar,
    // scheduled but not yet finished running
    pending: AtomicUsize,
    stop: AtomicBool,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
    // recycled coroutine frames
    frame_pool: CoroutinePool,
    on_start: Option<WorkerHook>,
    on_stop: Option<WorkerHook>,
    workers: usize,
}

impl Shared {
    fn worker_main(shared: &Arc<Shared>, id: usize) {
        if let Some(f) = &shared.on_start {
            f(id);
        }

        loop {
            let mut queue = shared.queue.lock().unwrap();
            while queue.is_empty() && !shared.stop.load(Ordering::Acquire) {
                queue = shared.cvar.wait(queue).unwrap();
            }

            match queue.pop_front() {
                Some(co) => {
                    drop(queue);
                    run_coroutine(co);
                    shared.pending.fetch_sub(1, Ordering::Release);
                }
                // stop requested and the queue is drained
                None => break,
            }
        }

        if let Some(f) = &shared.on_stop {
            f(id);
        }
    }
}

/// A worker-thread scheduler driving suspended coroutines.
///
/// Workers race to pop the front of a single shared FIFO run queue and
/// resume what they pop; there is no work stealing and no priority. The
/// type is a cheap handle; clones drive the same pool.
#[derive(Clone)]
pub struct ThreadPool {
    shared: Arc<Shared>,
}

impl ThreadPool {
    /// create a pool with the default configuration
    pub fn new() -> ThreadPool {
        PoolBuilder::new().build()
    }

    /// the number of worker threads
    pub fn worker_count(&self) -> usize {
        self.shared.workers
    }

    /// the number of computations scheduled but not yet finished running
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// the number of suspended computations sitting in the run queue
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Spawns a new coroutine driven by this pool.
    ///
    /// This is sugar for `Builder::new().pool(self).spawn(f)`; see
    /// [`Builder::spawn`] for the failure and safety notes.
    ///
    /// [`Builder::spawn`]: struct.Builder.html#method.spawn
    pub unsafe fn spawn<F, T>(&self, f: F) -> Result<JoinHandle<T>, ShutdownError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Builder::new().pool(self).spawn(f)
    }

    /// resume a suspended coroutine on one of the workers
    ///
    /// the handle is pushed to the back of the run queue unconditionally,
    /// the pending resumes are still drained when a shutdown is in progress
    #[inline]
    pub fn resume(&self, co: CoroutineImpl) {
        self.schedule(co);
    }

    /// put the coroutine to the back of the run queue for the next round
    #[inline]
    pub(crate) fn schedule(&self, co: CoroutineImpl) {
        self.shared.pending.fetch_add(1, Ordering::Release);
        let mut queue = self.shared.queue.lock().unwrap();
        queue.push_back(co);
        drop(queue);
        self.shared.cvar.notify_one();
    }

    /// resume a batch of suspended coroutines, enqueued under a single
    /// queue lock in input order
    pub fn resume_batch<I>(&self, cos: I)
    where
        I: IntoIterator<Item = CoroutineImpl>,
    {
        let mut n = 0;
        let mut queue = self.shared.queue.lock().unwrap();
        for co in cos {
            queue.push_back(co);
            n += 1;
        }
        if n == 0 {
            return;
        }
        // account the batch before any worker can pop and finish it
        self.shared.pending.fetch_add(n, Ordering::Release);
        drop(queue);

        if n == 1 {
            self.shared.cvar.notify_one();
        } else {
            self.shared.cvar.notify_all();
        }
    }

    /// Signal all workers to stop and join them.
    ///
    /// Idempotent. Workers drain the run queue before exiting; further
    /// spawns fail with [`ShutdownError`]. Must not be called from a
    /// coroutine driven by this pool.
    ///
    /// [`ShutdownError`]: struct.ShutdownError.html
    pub fn shutdown(&self) {
        if self.shared.stop.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("thread pool shutting down");
        self.shared.cvar.notify_all();

        let threads = ::std::mem::take(&mut *self.shared.threads.lock().unwrap());
        for t in threads {
            t.join().ok();
        }
    }

    // frame recycling for the spawn machinery
    #[inline]
    pub(crate) fn get_co(&self) -> CoroutineImpl {
        self.shared.frame_pool.get()
    }

    #[inline]
    pub(crate) fn put_co(&self, co: CoroutineImpl) {
        self.shared.frame_pool.put(co);
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("workers", &self.shared.workers)
            .field("pending", &self.pending())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

static mut GLOBAL: *const ThreadPool = ::std::ptr::null();

#[cold]
#[inline(never)]
fn init_global() {
    let pool = PoolBuilder::new().build();
    unsafe {
        GLOBAL = Box::into_raw(Box::new(pool));
    }
}

/// get the global scheduler that backs the free `spawn` and the `go!` macro
///
/// it is created lazily with the worker count from the global `Config`
/// and lives for the rest of the process
#[inline]
pub fn global_pool() -> &'static ThreadPool {
    unsafe {
        let global = GLOBAL;
        if !global.is_null() {
            return &*global;
        }
    }
    static ONCE: Once = Once::new();
    ONCE.call_once(init_global);
    unsafe { &*GLOBAL }
}
