//! # A library of coroutine synchronization primitives in Rust.
//!
//! Syncoro is a collection of composable synchronization primitives for
//! cooperative computations, driven by a worker-thread scheduler. Work is
//! expressed as stackful coroutines (built on [generator][generator]) that
//! suspend at well-defined points: acquiring a lock, waiting on an event,
//! producing into a full channel, joining another computation, or yielding.
//! A suspended computation does not hold an OS thread; it is parked inside
//! the primitive it waits on and re-enqueued on its scheduler's run queue
//! when the resource becomes available.
//!
//! ## Features
//! * A thread-pool scheduler with a shared FIFO run queue, cooperative
//!   yield, per-worker start/stop hooks and orderly shutdown;
//! * A manual-reset event with LIFO/FIFO wake policies;
//! * A lock-free mutex and a writer-preferring fair reader-writer lock;
//! * A counting semaphore and a bounded ring-buffer channel, both with a
//!   stop-signal broadcast that wakes every parked waiter;
//! * A count-down latch and a `when_all` join combinator;
//! * A task container owning fire-and-forget computations;
//! * Every primitive can also be waited on from a plain OS thread, which
//!   doubles as the blocking bridge out of the coroutine world.
//!
//! [generator]: https://docs.rs/generator

#[macro_use]
extern crate log;

mod config;
mod join;
mod local;
mod park;
mod pool;
#[macro_use]
mod macros;
mod coroutine_impl;
mod scheduler;
mod yield_now;

pub mod coroutine;
pub mod sync;
pub mod task_container;

pub use crate::config::{config, Config};
pub use crate::scheduler::{global_pool, PoolBuilder, ShutdownError, ThreadPool};
