use std::fmt;
use std::sync::Arc;

use crate::config::config;
use crate::join::{make_join_handle, Join, JoinHandle};
use crate::local::{get_co_local_data, CoroutineLocal};
use crate::scheduler::{global_pool, ShutdownError, ThreadPool};
use crossbeam::atomic::AtomicCell;
use generator::{Generator, Gn};

/// /////////////////////////////////////////////////////////////////////////////
/// Coroutine framework types
/// /////////////////////////////////////////////////////////////////////////////

pub struct EventSubscriber {
    resource: *mut dyn EventSource,
}

// the EventSource is usually an object that resides within the
// suspended frame, it should be safe to send between threads
unsafe impl Send for EventSubscriber {}

impl EventSubscriber {
    pub fn new(r: *mut dyn EventSource) -> Self {
        EventSubscriber { resource: r }
    }

    pub fn subscribe(self, c: CoroutineImpl) {
        let resource = unsafe { &mut *self.resource };
        resource.subscribe(c);
    }
}

/// The primitive a coroutine suspends on.
///
/// When a coroutine yields, the worker thread hands the suspended frame to
/// the event source named by the yielded subscriber; the source either
/// parks the frame in its waiter list or re-enqueues it.
pub trait EventSource {
    fn subscribe(&mut self, _c: CoroutineImpl);
}

/// /////////////////////////////////////////////////////////////////////////////
/// Coroutine destruction
/// /////////////////////////////////////////////////////////////////////////////

pub struct Done;

impl Done {
    pub(crate) fn drop_coroutine(co: CoroutineImpl) {
        // destroy the local storage
        let local = unsafe { Box::from_raw(get_co_local(&co)) };

        let (size, used) = co.stack_usage();
        if used == size {
            eprintln!("stack overflow detected, size={size}");
            ::std::process::exit(1);
        }

        // recycle default sized frames through the scheduler's frame pool
        if size == config().get_stack_size() {
            local.get_pool().put_co(co);
        }
    }
}

impl EventSource for Done {
    fn subscribe(&mut self, co: CoroutineImpl) {
        Self::drop_coroutine(co);
    }
}

/// coroutines are static generators, the yielded type is EventSubscriber
pub type CoroutineImpl = Generator<'static, (), EventSubscriber>;

#[inline]
#[allow(clippy::cast_ptr_alignment)]
fn get_co_local(co: &CoroutineImpl) -> *mut CoroutineLocal {
    co.get_local_data() as *mut CoroutineLocal
}

// get the scheduler that owns the suspended coroutine
#[inline]
pub(crate) fn co_get_pool(co: &CoroutineImpl) -> ThreadPool {
    let local = unsafe { &*get_co_local(co) };
    local.get_pool().clone()
}

/// /////////////////////////////////////////////////////////////////////////////
/// Coroutine
/// /////////////////////////////////////////////////////////////////////////////

/// The internal representation of a `Coroutine` handle
struct Inner {
    name: Option<String>,
    stack_size: usize,
}

#[derive(Clone)]
/// A handle to a coroutine.
pub struct Coroutine {
    inner: Arc<Inner>,
}

impl Coroutine {
    // Used only internally to construct a coroutine object without spawning
    fn new(name: Option<String>, stack_size: usize) -> Coroutine {
        Coroutine {
            inner: Arc::new(Inner { name, stack_size }),
        }
    }

    /// Gets the coroutine stack size.
    pub fn stack_size(&self) -> usize {
        self.inner.stack_size
    }

    /// Gets the coroutine name.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(&self.name(), f)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Builder
////////////////////////////////////////////////////////////////////////////////

/// Coroutine factory, which can be used in order to configure the properties
/// of a new coroutine.
///
/// The available configurations are:
///
/// - `name`: an associated name, for diagnostics
/// - `stack_size`: the stack size for the new coroutine
/// - `pool`: the scheduler the coroutine is driven by (the global scheduler
///   when not set)
///
/// The [`spawn`] method takes ownership of the builder and returns a
/// `Result` with the join handle; scheduling on a pool that has begun
/// shutting down is the only failure.
///
/// [`spawn`]: struct.Builder.html#method.spawn
#[derive(Default)]
pub struct Builder {
    // A name for the coroutine-to-be, for identification in panic messages
    name: Option<String>,
    // The size of the stack for the spawned coroutine
    stack_size: Option<usize>,
    // The scheduler to drive the coroutine
    pool: Option<ThreadPool>,
}

impl Builder {
    /// Generates the base configuration for spawning a coroutine, from which
    /// configuration methods can be chained.
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Names the coroutine-to-be. Currently the name is used for
    /// identification only in panic messages.
    pub fn name(mut self, name: String) -> Builder {
        self.name = Some(name);
        self
    }

    /// Sets the size of the stack for the new coroutine.
    pub fn stack_size(mut self, size: usize) -> Builder {
        self.stack_size = Some(size);
        self
    }

    /// Sets the scheduler that drives the new coroutine.
    pub fn pool(mut self, pool: &ThreadPool) -> Builder {
        self.pool = Some(pool.clone());
        self
    }

    fn spawn_impl<F, T>(self, pool: &ThreadPool, f: F) -> (CoroutineImpl, JoinHandle<T>)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        static DONE: Done = Done;

        let Builder {
            name, stack_size, ..
        } = self;
        let stack_size = stack_size.unwrap_or_else(|| config().get_stack_size());
        let _co = if stack_size == config().get_stack_size() {
            let co = pool.get_co();
            co.prefetch();
            Some(co)
        } else {
            None
        };

        // create a join resource, shared by the waiting and *this* coroutine
        let join = Arc::new(Join::new());
        let packet = Arc::new(AtomicCell::new(None));
        let their_join = join.clone();
        let their_packet = packet.clone();

        let subscriber = EventSubscriber {
            resource: &DONE as &dyn EventSource as *const _ as *mut dyn EventSource,
        };

        let closure = move || {
            // set the return packet before releasing the joiner
            their_packet.swap(Some(f()));
            their_join.trigger();
            subscriber
        };

        let mut co = if let Some(mut c) = _co {
            // re-init the recycled frame with the new closure
            c.init_code(closure);
            c
        } else {
            Gn::new_opt(stack_size, closure)
        };

        let handle = Coroutine::new(name, stack_size);
        // create and attach the local storage
        let local = CoroutineLocal::new(handle.clone(), join.clone(), pool.clone());
        co.set_local_data(Box::into_raw(local) as *mut u8);

        (co, make_join_handle(handle, join, packet))
    }

    /// Spawns a new coroutine on its configured scheduler, and returns a
    /// join handle for it.
    ///
    /// # Errors
    ///
    /// Fails with [`ShutdownError`] when the target scheduler has begun
    /// shutting down.
    ///
    /// # Safety
    ///
    ///  - Accessing TLS in a coroutine may trigger undefined behavior.
    ///  - If the coroutine exceeds its stack during execution, this would
    ///    trigger a memory segment fault.
    ///
    /// If you find it annoying to wrap everything in an unsafe block, you
    /// can use the [`go!`] macro instead.
    ///
    /// [`ShutdownError`]: struct.ShutdownError.html
    /// [`go!`]: ../macro.go.html
    pub unsafe fn spawn<F, T>(self, f: F) -> Result<JoinHandle<T>, ShutdownError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let pool = match &self.pool {
            Some(p) => p.clone(),
            None => global_pool().clone(),
        };

        if pool.is_shutdown() {
            return Err(ShutdownError);
        }

        let (co, handle) = self.spawn_impl(&pool, f);

        // put the coroutine to the ready list
        pool.schedule(co);

        Ok(handle)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Free functions
////////////////////////////////////////////////////////////////////////////////

/// Spawns a new coroutine on the global scheduler, returning a
/// [`JoinHandle`] for it.
///
/// The join handle will implicitly *detach* the child coroutine upon being
/// dropped. The `join` method can be used to wait for the child and recover
/// its panics, with the same semantics as `std::thread::spawn`.
///
/// # Safety
///
///  - Accessing TLS in a coroutine may trigger undefined behavior.
///  - If the coroutine exceeds its stack during execution, this would
///    trigger a memory segment fault.
///
/// If you find it annoying to wrap everything in an unsafe block, you can
/// use the [`go!`] macro instead.
///
/// [`JoinHandle`]: struct.JoinHandle.html
/// [`go!`]: ../macro.go.html
pub unsafe fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Builder::new().spawn(f).unwrap()
}

/// Gets a handle to the coroutine that invokes it.
/// it will panic if you call it in a thread context
#[inline]
pub fn current() -> Coroutine {
    match get_co_local_data() {
        Some(local) => unsafe { local.as_ref() }.get_co().clone(),
        None => panic!("no current coroutine, did you call `current()` in thread context?"),
    }
}

/// if the current context is a coroutine
#[inline]
pub fn is_coroutine() -> bool {
    // we never call this function in a pure generator context
    // so we can be sure that this function is called
    // either in a thread context or in a coroutine context
    get_co_local_data().is_some()
}

/// run the coroutine until it suspends or finishes
#[inline]
pub(crate) fn run_coroutine(mut co: CoroutineImpl) {
    match co.resume() {
        Some(ev) => ev.subscribe(co),
        None => {
            // panic happened inside the coroutine
            let local = unsafe { &mut *get_co_local(&co) };
            let join = local.get_join();
            // record the panic data
            if let Some(panic) = co.get_panic_data() {
                join.set_panic_data(panic);
            }
            // trigger the join here
            join.trigger();
            Done::drop_coroutine(co);
        }
    }
}
