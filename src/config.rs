//! Process-wide tuning knobs for the runtime.

use std::sync::atomic::{AtomicUsize, Ordering};

// stack size is counted in usize words; windows needs
// at least 0x4a8 of them for a workable frame
const DEFAULT_STACK_SIZE: usize = 0x1000;
const DEFAULT_FRAME_CACHE: usize = 100;

/// Tuning knobs shared by every scheduler in the process.
///
/// A knob holding zero counts as unset and resolves to its built-in
/// default at read time. Set knobs at program start: schedulers and
/// coroutines read them when they are created, and the global scheduler
/// reads the worker count only once, on first use.
pub struct Config {
    workers: AtomicUsize,
    stack_size: AtomicUsize,
    frame_cache: AtomicUsize,
}

static CONFIG: Config = Config {
    workers: AtomicUsize::new(0),
    stack_size: AtomicUsize::new(0),
    frame_cache: AtomicUsize::new(0),
};

/// get the global configuration
pub fn config() -> &'static Config {
    &CONFIG
}

impl Config {
    /// set the default worker count for new schedulers
    ///
    /// passing 0 restores the built-in default of one worker per cpu
    pub fn set_workers(&self, workers: usize) -> &Self {
        assert!(workers <= 64);
        info!("set workers={workers}");
        self.workers.store(workers, Ordering::Relaxed);
        self
    }

    /// the default worker count for new schedulers
    pub fn get_workers(&self) -> usize {
        match self.workers.load(Ordering::Relaxed) {
            0 => num_cpus::get(),
            n => n,
        }
    }

    /// set the default coroutine stack size, in usize words
    ///
    /// passing 0 restores the built-in default
    pub fn set_stack_size(&self, size: usize) -> &Self {
        info!("set stack size={size}");
        self.stack_size.store(size, Ordering::Relaxed);
        self
    }

    /// the default coroutine stack size, in usize words
    pub fn get_stack_size(&self) -> usize {
        match self.stack_size.load(Ordering::Relaxed) {
            0 => DEFAULT_STACK_SIZE,
            n => n,
        }
    }

    /// set how many finished coroutine frames a scheduler may cache
    /// for reuse
    ///
    /// passing 0 restores the built-in default
    pub fn set_frame_cache(&self, frames: usize) -> &Self {
        info!("set frame cache={frames}");
        self.frame_cache.store(frames, Ordering::Relaxed);
        self
    }

    /// how many finished coroutine frames a scheduler may cache for reuse
    pub fn get_frame_cache(&self) -> usize {
        match self.frame_cache.load(Ordering::Relaxed) {
            0 => DEFAULT_FRAME_CACHE,
            n => n,
        }
    }
}
