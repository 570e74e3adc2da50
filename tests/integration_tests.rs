#[macro_use]
extern crate syncoro;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::thread;
use std::time::Duration;

use syncoro::coroutine;
use syncoro::sync::{when_all, when_all_in, Event, Latch, Mutex, ResumeOrder, RingBuffer, RwLock, Semaphore, StopSignal};
use syncoro::task_container::TaskContainer;
use syncoro::{PoolBuilder, ThreadPool};

#[test]
fn mutex_mutual_exclusion() {
    let counter = Arc::new(Mutex::new(0));

    let join = when_all((0..100).map(|_| {
        let counter = counter.clone();
        move || {
            let mut guard = counter.lock().unwrap();
            *guard += 1;
        }
    }));

    // blocking join from the test thread
    join.wait();
    assert_eq!(*counter.lock().unwrap(), 100);
}

#[test]
fn ring_buffer_keeps_fifo_under_backpressure() {
    let rb = Arc::new(RingBuffer::with_capacity(2).unwrap());
    let sent = Arc::new(AtomicUsize::new(0));

    let rb2 = rb.clone();
    let sent2 = sent.clone();
    let producer = go!(move || {
        for i in 1..=5 {
            rb2.produce(i).unwrap();
            sent2.fetch_add(1, Ordering::SeqCst);
        }
    });

    // two elements fit, the third produce must park
    while sent.load(Ordering::SeqCst) < 2 {
        thread::yield_now();
    }
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sent.load(Ordering::SeqCst), 2);
    assert!(!producer.is_done());

    let mut received = Vec::new();
    for _ in 0..5 {
        assert!(rb.len() <= 2);
        received.push(rb.consume().unwrap());
    }

    assert_eq!(received, [1, 2, 3, 4, 5]);
    producer.join().unwrap();
}

#[test]
fn when_all_reports_each_child_separately() {
    let fns: Vec<Box<dyn FnOnce() -> i32 + Send>> = vec![
        Box::new(|| 10),
        Box::new(|| panic!("boom")),
        Box::new(|| 30),
    ];

    let mut results = when_all(fns).wait();
    assert_eq!(results.len(), 3);

    let third = results.pop().unwrap();
    let second = results.pop().unwrap();
    let first = results.pop().unwrap();

    assert_eq!(first.unwrap(), 10);
    let payload = second.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    assert_eq!(third.unwrap(), 30);
}

#[test]
fn rwlock_writer_runs_before_late_readers() {
    const FIRST_READERS: usize = 10;
    const LATE_READERS: usize = 5;

    let lock = Arc::new(RwLock::new(()));
    let order = Arc::new(StdMutex::new(Vec::new()));
    let started = Arc::new(Latch::new(FIRST_READERS));
    let gate = Arc::new(Event::new(false));

    let mut handles = Vec::new();

    // a wave of readers that hold the lock until the gate opens
    for _ in 0..FIRST_READERS {
        let lock = lock.clone();
        let order = order.clone();
        let started = started.clone();
        let gate = gate.clone();
        handles.push(go!(move || {
            let guard = lock.read().unwrap();
            started.count_down(1);
            gate.wait();
            order.lock().unwrap().push(1u32);
            drop(guard);
        }));
    }
    started.wait();

    // a writer queues up behind the active readers
    {
        let lock = lock.clone();
        let order = order.clone();
        handles.push(go!(move || {
            let guard = lock.write().unwrap();
            order.lock().unwrap().push(2);
            drop(guard);
        }));
    }

    // once the writer is queued, new read attempts are refused
    while lock.try_read().is_ok() {
        thread::yield_now();
    }

    // late readers must wait their turn behind the writer
    for _ in 0..LATE_READERS {
        let lock = lock.clone();
        let order = order.clone();
        handles.push(go!(move || {
            let guard = lock.read().unwrap();
            order.lock().unwrap().push(3);
            drop(guard);
        }));
    }

    gate.set();
    for h in handles {
        h.join().unwrap();
    }

    let order = order.lock().unwrap();
    assert_eq!(order.len(), FIRST_READERS + 1 + LATE_READERS);
    assert!(order[..FIRST_READERS].iter().all(|&x| x == 1));
    assert_eq!(order[FIRST_READERS], 2);
    assert!(order[FIRST_READERS + 1..].iter().all(|&x| x == 3));
}

#[test]
fn semaphore_stop_wakes_both_acquirers() {
    let sem = Arc::new(Semaphore::new(1, 0));
    let (tx, rx) = channel();

    for _ in 0..2 {
        let sem = sem.clone();
        let tx = tx.clone();
        go!(move || {
            tx.send(sem.acquire()).unwrap();
        });
    }

    // let both acquirers park, then broadcast the stop
    thread::sleep(Duration::from_millis(50));
    sem.stop();

    assert_eq!(rx.recv().unwrap(), Err(StopSignal));
    assert_eq!(rx.recv().unwrap(), Err(StopSignal));
}

fn event_resume_order(order: ResumeOrder) -> Vec<usize> {
    const WAITERS: usize = 5;

    // one worker makes the park and resume order deterministic
    let pool = PoolBuilder::new().workers(1).build();
    let event = Arc::new(Event::new(false));
    let resumed = Arc::new(StdMutex::new(Vec::new()));
    let arrived = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..WAITERS {
        let event = event.clone();
        let resumed = resumed.clone();
        let arrived = arrived.clone();
        let builder = coroutine::Builder::new().pool(&pool);
        handles.push(go!(builder, move || {
            arrived.fetch_add(1, Ordering::SeqCst);
            event.wait();
            resumed.lock().unwrap().push(i);
        }).unwrap());
    }

    // all five are parked once the worker has nothing left to run
    while arrived.load(Ordering::SeqCst) < WAITERS || pool.pending() != 0 {
        thread::yield_now();
    }

    event.set_with(order);
    for h in handles {
        h.join().unwrap();
    }
    pool.shutdown();

    Arc::try_unwrap(resumed).unwrap().into_inner().unwrap()
}

#[test]
fn event_wakes_lifo_by_default_order() {
    assert_eq!(event_resume_order(ResumeOrder::Lifo), [4, 3, 2, 1, 0]);
}

#[test]
fn event_wakes_fifo_on_request() {
    assert_eq!(event_resume_order(ResumeOrder::Fifo), [0, 1, 2, 3, 4]);
}

#[test]
fn thread_pool_hooks_and_shutdown() {
    let started = Arc::new(StdMutex::new(Vec::new()));
    let stopped = Arc::new(StdMutex::new(Vec::new()));

    let s1 = started.clone();
    let s2 = stopped.clone();
    let pool = PoolBuilder::new()
        .workers(2)
        .on_worker_start(move |id| s1.lock().unwrap().push(id))
        .on_worker_stop(move |id| s2.lock().unwrap().push(id))
        .build();

    let counter = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let counter = counter.clone();
        handles.push(unsafe {
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }
        .unwrap());
    }
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::SeqCst), 16);

    pool.shutdown();
    // shutting down twice is fine
    pool.shutdown();

    assert!(unsafe { pool.spawn(|| ()) }.is_err());

    let mut started = started.lock().unwrap().clone();
    let mut stopped = stopped.lock().unwrap().clone();
    started.sort_unstable();
    stopped.sort_unstable();
    assert_eq!(started, [0, 1]);
    assert_eq!(stopped, [0, 1]);
}

#[test]
fn join_bridges_to_a_blocking_thread() {
    let h = go!(|| 21 * 2);
    // the test thread parks until the coroutine finishes
    assert_eq!(h.join().unwrap(), 42);

    let h = go!(|| -> () { panic!("bridge boom") });
    let payload = h.join().unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"bridge boom"));
}

#[test]
fn yield_interleaves_on_one_worker() {
    let pool = PoolBuilder::new().workers(1).build();
    let log = Arc::new(StdMutex::new(Vec::new()));
    // neither coroutine starts logging before both are on the worker
    let gate = Arc::new(Latch::new(2));

    let mut handles = Vec::new();
    for id in 0..2u32 {
        let log = log.clone();
        let gate = gate.clone();
        let builder = coroutine::Builder::new().pool(&pool);
        handles.push(go!(builder, move || {
            gate.count_down(1);
            gate.wait();
            for round in 0..3u32 {
                log.lock().unwrap().push((id, round));
                coroutine::yield_now();
            }
        }).unwrap());
    }

    for h in handles {
        h.join().unwrap();
    }
    pool.shutdown();

    // the first coroutine parks on the gate, the second opens it and keeps
    // the worker; from there the single FIFO queue makes them alternate
    let log = Arc::try_unwrap(log).unwrap().into_inner().unwrap();
    assert_eq!(log, [(1, 0), (0, 0), (1, 1), (0, 1), (1, 2), (0, 2)]);
}

#[test]
fn task_container_drains_to_empty() {
    let pool = ThreadPool::new();
    let done = Arc::new(AtomicUsize::new(0));
    let tc = TaskContainer::new(pool.clone());

    for _ in 0..64 {
        let done = done.clone();
        tc.start(move || {
            coroutine::yield_now();
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    tc.drain();
    assert_eq!(tc.size(), 0);
    assert_eq!(done.load(Ordering::SeqCst), 64);
    drop(tc);
    pool.shutdown();
}

#[test]
fn when_all_runs_on_a_dedicated_pool() {
    let pool = PoolBuilder::new().workers(2).build();
    let results = when_all_in(&pool, (0..8).map(|i| move || i * i)).wait();
    let values: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(values, [0, 1, 4, 9, 16, 25, 36, 49]);
    pool.shutdown();
}

#[test]
fn latch_gates_waiters_until_exact_count() {
    let latch = Arc::new(Latch::new(3));
    let woken = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let latch = latch.clone();
        let woken = woken.clone();
        handles.push(go!(move || {
            latch.wait();
            woken.fetch_add(1, Ordering::SeqCst);
        }));
    }

    latch.count_down(1);
    latch.count_down(1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(woken.load(Ordering::SeqCst), 0);

    latch.count_down(1);
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), 4);
}
