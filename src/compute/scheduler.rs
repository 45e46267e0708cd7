//! User-level task scheduler with a wave barrier.
//!
//! A fixed pool of worker threads executes one wave of independent tasks at a
//! time. Tasks carry an optional placement hint: hinted tasks go to that
//! worker's local queue, the rest to a shared queue. An idle worker looks at
//! its own queue, then the shared queue, then steals from the back of the
//! other workers' queues, so hints are best-effort and no worker idles while
//! work remains.
//!
//! ```text
//!   Ready --create_task--> Dispatching --task_wait--> Waiting --drained--> Ready
//!     \__________________________ finalize ___________________________/--> Finalized
//! ```

use std::any::Any;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use super::EngineError;
use crate::schema::{Parallelism, TraceFlags};

/// A unit of work. Receives the id of the worker executing it.
pub type Task = Box<dyn FnOnce(usize) + Send + 'static>;

/// Placement hint for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// Let the scheduler pick a worker.
    Any,
    /// Prefer this worker (taken modulo the pool size).
    Worker(usize),
}

/// Lifecycle state of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No wave in flight.
    Ready,
    /// Tasks of the current wave are being submitted.
    Dispatching,
    /// The driver is blocked on the wave barrier.
    Waiting,
    /// Workers are stopped.
    Finalized,
}

/// Per-worker count of executed tasks since initialization.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerStats {
    pub per_worker: Vec<u64>,
}

impl SchedulerStats {
    /// Total tasks executed by all workers.
    pub fn total(&self) -> u64 {
        self.per_worker.iter().sum()
    }
}

struct Queues {
    shared: VecDeque<Task>,
    local: Vec<VecDeque<Task>>,
    /// Tasks submitted in the current wave and not yet finished.
    pending: usize,
    /// First panic raised by a task of the current wave.
    panic: Option<Box<dyn Any + Send>>,
    shutdown: bool,
}

impl Queues {
    fn take(&mut self, worker: usize) -> Option<Task> {
        if let Some(task) = self.local[worker].pop_front() {
            return Some(task);
        }
        if let Some(task) = self.shared.pop_front() {
            return Some(task);
        }
        let workers = self.local.len();
        (1..workers)
            .map(|offset| (worker + offset) % workers)
            .find_map(|victim| self.local[victim].pop_back())
    }
}

struct Shared {
    queues: Mutex<Queues>,
    work_available: Condvar,
    wave_done: Condvar,
    executed: Vec<AtomicU64>,
    trace: TraceFlags,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queues> {
        // Tasks never run under the lock, so a poisoned lock still guards
        // consistent queues.
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fixed-size worker pool executing one wave of tasks at a time.
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    state: SchedulerState,
    /// Tasks submitted since the last `task_wait`.
    submitted: usize,
}

impl Scheduler {
    /// Start the worker pool.
    ///
    /// `Parallelism::Auto` starts one worker per available hardware context.
    pub fn init(parallelism: Parallelism, trace: TraceFlags) -> Result<Self, EngineError> {
        let workers = match parallelism {
            Parallelism::Auto => thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            Parallelism::Fixed(0) => {
                return Err(EngineError::SchedulerInit(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "worker count must be non-zero",
                )));
            }
            Parallelism::Fixed(n) => n,
        };

        let shared = Arc::new(Shared {
            queues: Mutex::new(Queues {
                shared: VecDeque::new(),
                local: (0..workers).map(|_| VecDeque::new()).collect(),
                pending: 0,
                panic: None,
                shutdown: false,
            }),
            work_available: Condvar::new(),
            wave_done: Condvar::new(),
            executed: (0..workers).map(|_| AtomicU64::new(0)).collect(),
            trace,
        });

        let mut scheduler = Self {
            shared,
            workers: Vec::with_capacity(workers),
            state: SchedulerState::Ready,
            submitted: 0,
        };

        for id in 0..workers {
            let shared = Arc::clone(&scheduler.shared);
            let handle = thread::Builder::new()
                .name(format!("wave-worker-{id}"))
                .spawn(move || worker_loop(id, &shared))
                .map_err(EngineError::SchedulerInit)?;
            scheduler.workers.push(handle);
        }

        log::debug!("Scheduler started with {} workers", workers);
        Ok(scheduler)
    }

    /// Number of workers in the pool.
    #[inline]
    pub fn workers(&self) -> usize {
        self.shared.executed.len()
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Submit one task to the current wave.
    pub fn create_task<F>(&mut self, affinity: Affinity, task: F)
    where
        F: FnOnce(usize) + Send + 'static,
    {
        debug_assert_ne!(self.state, SchedulerState::Finalized);
        self.state = SchedulerState::Dispatching;
        self.submitted += 1;

        let mut queues = self.shared.lock();
        match affinity {
            Affinity::Any => queues.shared.push_back(Box::new(task)),
            Affinity::Worker(n) => {
                let worker = n % queues.local.len();
                queues.local[worker].push_back(Box::new(task));
            }
        }
        queues.pending += 1;
        drop(queues);

        self.shared.work_available.notify_one();
    }

    /// Block until every task submitted since the previous wait has finished.
    ///
    /// If a task panicked, the wave is still drained and the first panic is
    /// resumed on the calling thread.
    pub fn task_wait(&mut self) {
        self.state = SchedulerState::Waiting;

        let mut queues = self.shared.lock();
        while queues.pending > 0 {
            queues = self
                .shared
                .wave_done
                .wait(queues)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let panic = queues.panic.take();
        drop(queues);

        if self.shared.trace.is_enabled('s') {
            log::debug!(
                "Wave of {} tasks done, per-worker totals {:?}",
                self.submitted,
                self.stats().per_worker
            );
        }
        self.submitted = 0;
        self.state = SchedulerState::Ready;

        if let Some(payload) = panic {
            panic::resume_unwind(payload);
        }
    }

    /// Executed task counts per worker.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            per_worker: self
                .shared
                .executed
                .iter()
                .map(|count| count.load(Ordering::Relaxed))
                .collect(),
        }
    }

    /// Stop the workers and release the pool.
    pub fn finalize(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.state == SchedulerState::Finalized {
            return;
        }

        self.shared.lock().shutdown = true;
        self.shared.work_available.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Scheduler worker exited abnormally");
            }
        }
        self.state = SchedulerState::Finalized;
        log::debug!("Scheduler finalized");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, shared: &Shared) {
    loop {
        let task = {
            let mut queues = shared.lock();
            loop {
                if let Some(task) = queues.take(id) {
                    break task;
                }
                if queues.shutdown {
                    return;
                }
                queues = shared
                    .work_available
                    .wait(queues)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        if shared.trace.is_enabled('s') {
            log::trace!("Task running on worker #{}", id);
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(id)));
        shared.executed[id].fetch_add(1, Ordering::Relaxed);

        let mut queues = shared.lock();
        if let Err(payload) = outcome {
            queues.panic.get_or_insert(payload);
        }
        queues.pending -= 1;
        if queues.pending == 0 {
            shared.wave_done.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn fixed(n: usize) -> Scheduler {
        Scheduler::init(Parallelism::Fixed(n), TraceFlags::NONE).unwrap()
    }

    #[test]
    fn test_init_reports_worker_count() {
        let scheduler = fixed(3);
        assert_eq!(scheduler.workers(), 3);
        assert_eq!(scheduler.state(), SchedulerState::Ready);

        let auto = Scheduler::init(Parallelism::Auto, TraceFlags::NONE).unwrap();
        assert!(auto.workers() >= 1);
    }

    #[test]
    fn test_zero_workers_is_init_error() {
        let result = Scheduler::init(Parallelism::Fixed(0), TraceFlags::NONE);
        assert!(matches!(result, Err(EngineError::SchedulerInit(_))));
    }

    #[test]
    fn test_barrier_waits_for_every_task() {
        for workers in [1, 2, 8] {
            let mut scheduler = fixed(workers);
            let done = Arc::new(AtomicUsize::new(0));

            for wave in 0..3 {
                for i in 0..40 {
                    let done = Arc::clone(&done);
                    scheduler.create_task(Affinity::Any, move |_| {
                        thread::sleep(Duration::from_micros(((i * 37) % 5) as u64 * 200));
                        done.fetch_add(1, Ordering::SeqCst);
                    });
                }
                scheduler.task_wait();
                assert_eq!(
                    done.load(Ordering::SeqCst),
                    (wave + 1) * 40,
                    "wave {wave} returned early with {workers} workers"
                );
            }
        }
    }

    #[test]
    fn test_every_task_runs_exactly_once() {
        let mut scheduler = fixed(4);
        let runs: Arc<Vec<AtomicUsize>> = Arc::new((0..200).map(|_| AtomicUsize::new(0)).collect());

        for i in 0..200 {
            let runs = Arc::clone(&runs);
            let affinity = if i % 2 == 0 {
                Affinity::Any
            } else {
                Affinity::Worker(i)
            };
            scheduler.create_task(affinity, move |_| {
                runs[i].fetch_add(1, Ordering::SeqCst);
            });
        }
        scheduler.task_wait();

        assert!(runs.iter().all(|r| r.load(Ordering::SeqCst) == 1));
        assert_eq!(scheduler.stats().total(), 200);
    }

    #[test]
    fn test_hint_wraps_with_single_worker() {
        let mut scheduler = fixed(1);
        let seen = Arc::new(AtomicUsize::new(usize::MAX));
        let seen_task = Arc::clone(&seen);
        scheduler.create_task(Affinity::Worker(5), move |worker| {
            seen_task.store(worker, Ordering::SeqCst);
        });
        scheduler.task_wait();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_worker_ids_are_in_range() {
        let mut scheduler = fixed(3);
        let max_seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let max_seen = Arc::clone(&max_seen);
            scheduler.create_task(Affinity::Any, move |worker| {
                max_seen.fetch_max(worker, Ordering::SeqCst);
            });
        }
        scheduler.task_wait();
        assert!(max_seen.load(Ordering::SeqCst) < 3);
    }

    #[test]
    fn test_state_transitions() {
        let mut scheduler = fixed(2);
        scheduler.create_task(Affinity::Any, |_| {});
        assert_eq!(scheduler.state(), SchedulerState::Dispatching);
        scheduler.task_wait();
        assert_eq!(scheduler.state(), SchedulerState::Ready);
        scheduler.finalize();
    }

    #[test]
    fn test_empty_wave_returns_immediately() {
        let mut scheduler = fixed(2);
        scheduler.task_wait();
        assert_eq!(scheduler.stats().total(), 0);
    }

    #[test]
    fn test_task_panic_resumes_on_waiter() {
        let mut scheduler = fixed(2);
        let survivors = Arc::new(AtomicUsize::new(0));
        for i in 0..8 {
            let survivors = Arc::clone(&survivors);
            scheduler.create_task(Affinity::Any, move |_| {
                if i == 3 {
                    panic!("tile out of range");
                }
                survivors.fetch_add(1, Ordering::SeqCst);
            });
        }

        let result = panic::catch_unwind(AssertUnwindSafe(|| scheduler.task_wait()));
        assert!(result.is_err());
        assert_eq!(survivors.load(Ordering::SeqCst), 7);

        // The pool is drained and still usable.
        scheduler.create_task(Affinity::Any, |_| {});
        scheduler.task_wait();
        assert_eq!(scheduler.stats().total(), 9);
    }
}
