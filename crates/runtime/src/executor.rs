//! Work-unit execution
//!
//! Every recursive parse step and every fiber body is one work unit: a
//! boxed closure submitted to a shared pool of May coroutines. Work units
//! never block; anything that would block schedules a completion callback
//! and returns.
//!
//! The completion barrier is the subtle part. Two monotone counters track
//! units queued and units completed. `queued` is incremented before
//! submission (so the write happens-before the worker can observe the
//! job); `completed` is incremented after the unit's user code finishes.
//! Readers load the counters in the order (completed, queued): reading
//! `completed` first means any equality observed is a true quiescence, not
//! a transient where a fresh submission has bumped `queued` between the
//! two loads in the wrong order. The registered hook fires exactly once,
//! at the unique moment both counters are equal and positive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-width pool of May coroutines draining one MPMC channel.
pub struct Executor {
    sender: may::sync::mpmc::Sender<Job>,
    workers: usize,
}

impl Executor {
    /// Spin up `workers` coroutines. A width around the CPU core count is
    /// adequate; parse fan-out is bursty but shallow.
    pub fn new(workers: usize) -> Arc<Executor> {
        let workers = workers.max(1);
        let (sender, receiver) = may::sync::mpmc::channel::<Job>();
        for _ in 0..workers {
            let receiver = receiver.clone();
            // Safety: the closure owns everything it touches; May requires
            // the caller to promise no thread-local leakage across yields,
            // which a self-contained drain loop satisfies.
            unsafe {
                may::coroutine::spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        job();
                    }
                });
            }
        }
        Arc::new(Executor { sender, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Submit a bare job, outside any barrier's accounting.
    pub fn submit(&self, job: Job) {
        self.sender
            .send(job)
            .expect("executor workers exited while submissions were outstanding");
    }
}

/// The (queued, completed) pair for one top-level drain, plus the one-shot
/// `no_more_work_units` hook and the cooperative abort oracle.
pub struct WorkUnitBarrier {
    queued: AtomicU64,
    completed: AtomicU64,
    fired: AtomicBool,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    abort_oracle: Mutex<Option<Arc<dyn Fn() -> bool + Send + Sync>>>,
    aborted: AtomicBool,
    drain_lock: Mutex<bool>,
    drain_signal: Condvar,
}

impl WorkUnitBarrier {
    pub fn new() -> Arc<WorkUnitBarrier> {
        Arc::new(WorkUnitBarrier {
            queued: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            fired: AtomicBool::new(false),
            hook: Mutex::new(None),
            abort_oracle: Mutex::new(None),
            aborted: AtomicBool::new(false),
            drain_lock: Mutex::new(false),
            drain_signal: Condvar::new(),
        })
    }

    /// Register the callback run once when the barrier drains. Must be set
    /// before the first unit is scheduled.
    pub fn on_no_more_work_units(&self, hook: impl FnOnce() + Send + 'static) {
        let mut slot = self.hook.lock().expect("barrier hook lock poisoned");
        debug_assert!(slot.is_none(), "barrier hook registered twice");
        *slot = Some(Box::new(hook));
    }

    /// Install the client's cancellation oracle, polled at work-unit start.
    pub fn set_abort_oracle(&self, oracle: Arc<dyn Fn() -> bool + Send + Sync>) {
        *self
            .abort_oracle
            .lock()
            .expect("barrier abort lock poisoned") = Some(oracle);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Counted submission: increment `queued`, then hand the wrapped job
    /// to the executor. The wrapper polls the abort oracle, runs the user
    /// code, bumps `completed`, and fires the hook on the drain edge.
    pub fn schedule(
        self: &Arc<Self>,
        executor: &Arc<Executor>,
        unit: impl FnOnce() + Send + 'static,
    ) {
        self.queued.fetch_add(1, Ordering::SeqCst);
        let barrier = Arc::clone(self);
        executor.submit(Box::new(move || {
            if barrier.poll_abort() {
                // Skip the user code; completion still counts so the
                // barrier drains into the failure path.
            } else {
                unit();
            }
            barrier.completed.fetch_add(1, Ordering::SeqCst);
            barrier.maybe_fire();
        }));
    }

    fn poll_abort(&self) -> bool {
        if self.aborted.load(Ordering::Acquire) {
            return true;
        }
        let oracle = self
            .abort_oracle
            .lock()
            .expect("barrier abort lock poisoned")
            .clone();
        if let Some(oracle) = oracle {
            if oracle() {
                self.aborted.store(true, Ordering::Release);
                return true;
            }
        }
        false
    }

    fn maybe_fire(&self) {
        // Read completed before queued: if they agree, nothing was in
        // flight at the instant of the first load.
        let completed = self.completed.load(Ordering::SeqCst);
        let queued = self.queued.load(Ordering::SeqCst);
        if completed == queued
            && completed > 0
            && !self.fired.swap(true, Ordering::SeqCst)
        {
            let hook = self.hook.lock().expect("barrier hook lock poisoned").take();
            if let Some(hook) = hook {
                hook();
            }
            let mut drained = self.drain_lock.lock().expect("barrier drain lock poisoned");
            *drained = true;
            self.drain_signal.notify_all();
        }
    }

    /// Block the calling thread until the barrier has fired. Event-driven:
    /// no polling, the firing unit signals the condvar.
    pub fn wait_until_drained(&self) {
        let mut drained = self.drain_lock.lock().expect("barrier drain lock poisoned");
        while !*drained {
            drained = self
                .drain_signal
                .wait(drained)
                .expect("barrier drain wait failed");
        }
    }

    pub fn counters(&self) -> (u64, u64) {
        let completed = self.completed.load(Ordering::SeqCst);
        let queued = self.queued.load(Ordering::SeqCst);
        (queued, completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::AtomicUsize;

    #[test]
    #[serial]
    fn test_barrier_fires_exactly_once() {
        let executor = Executor::new(4);
        let barrier = WorkUnitBarrier::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let total = Arc::new(AtomicUsize::new(0));
        {
            let fired = Arc::clone(&fired);
            barrier.on_no_more_work_units(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }

        // Each unit may schedule further units up to a depth; the barrier
        // must fire only after the whole cascade completes.
        fn cascade(
            barrier: &Arc<WorkUnitBarrier>,
            executor: &Arc<Executor>,
            total: &Arc<AtomicUsize>,
            depth: usize,
        ) {
            let barrier2 = Arc::clone(barrier);
            let executor2 = Arc::clone(executor);
            let total2 = Arc::clone(total);
            barrier.schedule(executor, move || {
                total2.fetch_add(1, Ordering::SeqCst);
                if depth > 0 {
                    for _ in 0..2 {
                        cascade(&barrier2, &executor2, &total2, depth - 1);
                    }
                }
            });
        }

        for _ in 0..3 {
            cascade(&barrier, &executor, &total, 3);
        }
        barrier.wait_until_drained();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // 3 roots, each spawning 2^1+2^2+2^3 descendants: 3 * 15 units.
        assert_eq!(total.load(Ordering::SeqCst), 45);
        let (queued, completed) = barrier.counters();
        assert_eq!(queued, completed);
        assert_eq!(queued, 45);
    }

    #[test]
    #[serial]
    fn test_abort_short_circuits() {
        let executor = Executor::new(2);
        let barrier = WorkUnitBarrier::new();
        let ran = Arc::new(AtomicUsize::new(0));
        barrier.on_no_more_work_units(|| {});
        barrier.set_abort_oracle(Arc::new(|| true));
        {
            let ran = Arc::clone(&ran);
            barrier.schedule(&executor, move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        barrier.wait_until_drained();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(barrier.is_aborted());
    }
}
