//! Blocking pool for site calls that must not run on the engine thread.
//!
//! A site that sleeps, performs I/O or computes for a long time hands its work
//! to this pool through [`CallHandle::spawn_blocking`] and returns at once;
//! the engine keeps stepping other tokens while a pool thread runs the work
//! and delivers the response through the resumed queue.
//!
//! Threads are spawned lazily up to `max_threads` and threads above
//! `min_threads` retire after an idle timeout.
//!
//! Cancellation is soft: a cancelled job that is still queued is skipped, a
//! running one completes and its response is discarded by the engine because
//! the token it addresses is already dead.
//!
//! [`CallHandle::spawn_blocking`]: crate::site::CallHandle::spawn_blocking

use crate::tracing_compat::{error, trace};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long dropping a pool waits for its threads.
const DROP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for the blocking pool.
#[derive(Debug, Clone)]
pub struct BlockingPoolOptions {
    /// Idle timeout before retiring threads above the minimum.
    pub idle_timeout: Duration,
    /// Thread name prefix; threads are named `<prefix>-site-<n>`.
    pub thread_name_prefix: String,
}

impl Default for BlockingPoolOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            thread_name_prefix: "orc".to_string(),
        }
    }
}

/// Completion state shared between a queued job and its handle.
#[derive(Default)]
struct Ticket {
    cancelled: AtomicBool,
    done: Mutex<bool>,
    finished: Condvar,
}

impl Ticket {
    fn finish(&self) {
        *self.done.lock() = true;
        self.finished.notify_all();
    }
}

struct Job {
    work: Box<dyn FnOnce() + Send + 'static>,
    ticket: Arc<Ticket>,
}

struct PoolInner {
    min_threads: usize,
    max_threads: usize,
    idle_timeout: Duration,
    thread_name_prefix: String,
    jobs: SegQueue<Job>,
    queued: AtomicUsize,
    threads: AtomicUsize,
    busy: AtomicUsize,
    spawned: AtomicUsize,
    closed: AtomicBool,
    sleep: Mutex<()>,
    wakeup: Condvar,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl PoolInner {
    fn submit(self: &Arc<Self>, work: Box<dyn FnOnce() + Send + 'static>) -> BlockingTaskHandle {
        let ticket = Arc::new(Ticket::default());
        self.jobs.push(Job {
            work,
            ticket: Arc::clone(&ticket),
        });
        self.queued.fetch_add(1, Ordering::Relaxed);

        let threads = self.threads.load(Ordering::Relaxed);
        if threads < self.max_threads && self.busy.load(Ordering::Relaxed) >= threads {
            self.spawn_thread();
        }
        self.wake(false);
        BlockingTaskHandle { ticket }
    }

    fn wake(&self, everyone: bool) {
        let _guard = self.sleep.lock();
        if everyone {
            self.wakeup.notify_all();
        } else {
            self.wakeup.notify_one();
        }
    }

    fn spawn_thread(self: &Arc<Self>) {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-site-{n}", self.thread_name_prefix);
        self.threads.fetch_add(1, Ordering::Relaxed);

        let inner = Arc::clone(self);
        match thread::Builder::new().name(name).spawn(move || {
            inner.work_loop();
            inner.threads.fetch_sub(1, Ordering::Release);
        }) {
            Ok(join) => self.joins.lock().push(join),
            Err(err) => {
                self.threads.fetch_sub(1, Ordering::Relaxed);
                error!(error = %err, "failed to spawn blocking pool thread");
            }
        }
    }

    fn work_loop(&self) {
        while let Some(job) = self.next_job() {
            if job.ticket.cancelled.load(Ordering::Acquire) {
                trace!("skipping cancelled blocking job");
                job.ticket.finish();
                continue;
            }
            self.busy.fetch_add(1, Ordering::Relaxed);
            if catch_unwind(AssertUnwindSafe(job.work)).is_err() {
                error!("blocking site job panicked");
            }
            self.busy.fetch_sub(1, Ordering::Relaxed);
            job.ticket.finish();
        }
    }

    /// Waits for the next job. `None` tells the thread to exit: the pool
    /// closed, or this thread sat idle above the minimum for too long.
    fn next_job(&self) -> Option<Job> {
        loop {
            if let Some(job) = self.jobs.pop() {
                self.queued.fetch_sub(1, Ordering::Relaxed);
                return Some(job);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            let mut guard = self.sleep.lock();
            if !self.jobs.is_empty() || self.closed.load(Ordering::Acquire) {
                continue;
            }
            if self.threads.load(Ordering::Relaxed) <= self.min_threads {
                self.wakeup.wait(&mut guard);
                continue;
            }
            let idle = self.wakeup.wait_for(&mut guard, self.idle_timeout).timed_out();
            if idle
                && self.jobs.is_empty()
                && self.threads.load(Ordering::Relaxed) > self.min_threads
            {
                return None;
            }
        }
    }
}

/// The pool of threads serving blocking site calls.
pub struct BlockingPool {
    inner: Arc<PoolInner>,
}

impl BlockingPool {
    /// Creates a pool with the given thread limits and default options.
    ///
    /// A `max_threads` of zero is raised to one.
    #[must_use]
    pub fn new(min_threads: usize, max_threads: usize) -> Self {
        Self::with_options(min_threads, max_threads, BlockingPoolOptions::default())
    }

    /// Creates a pool with custom options. `min_threads` threads start
    /// immediately.
    #[must_use]
    pub fn with_options(
        min_threads: usize,
        max_threads: usize,
        options: BlockingPoolOptions,
    ) -> Self {
        let max_threads = max_threads.max(min_threads).max(1);
        let inner = Arc::new(PoolInner {
            min_threads,
            max_threads,
            idle_timeout: options.idle_timeout,
            thread_name_prefix: options.thread_name_prefix,
            jobs: SegQueue::new(),
            queued: AtomicUsize::new(0),
            threads: AtomicUsize::new(0),
            busy: AtomicUsize::new(0),
            spawned: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            sleep: Mutex::new(()),
            wakeup: Condvar::new(),
            joins: Mutex::new(Vec::with_capacity(max_threads)),
        });
        for _ in 0..min_threads {
            inner.spawn_thread();
        }
        Self { inner }
    }

    /// Returns a cloneable handle for submitting work.
    #[must_use]
    pub fn handle(&self) -> BlockingPoolHandle {
        BlockingPoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Submits work to the pool.
    pub fn spawn<F>(&self, f: F) -> BlockingTaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.submit(Box::new(f))
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.queued.load(Ordering::Relaxed)
    }

    /// Number of live threads.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.threads.load(Ordering::Acquire)
    }

    /// Returns true once the pool has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Tells idle threads to exit. Queued jobs still run.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.wake(true);
    }

    /// Shuts down and waits up to `timeout` for every thread to exit.
    ///
    /// Returns true if all threads exited.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();
        let deadline = Instant::now() + timeout;
        while self.active_threads() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.inner.wake(true);
            thread::sleep(Duration::from_millis(10).min(remaining));
        }
        for join in self.inner.joins.lock().drain(..) {
            let _ = join.join();
        }
        true
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        let _ = self.shutdown_and_wait(DROP_DRAIN_TIMEOUT);
    }
}

impl fmt::Debug for BlockingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingPool")
            .field("min_threads", &self.inner.min_threads)
            .field("max_threads", &self.inner.max_threads)
            .field("threads", &self.active_threads())
            .field("queued", &self.pending_count())
            .finish()
    }
}

/// A cloneable handle for submitting work to a [`BlockingPool`].
#[derive(Clone)]
pub struct BlockingPoolHandle {
    inner: Arc<PoolInner>,
}

impl BlockingPoolHandle {
    /// Submits work to the pool.
    pub fn spawn<F>(&self, f: F) -> BlockingTaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.submit(Box::new(f))
    }
}

impl fmt::Debug for BlockingPoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingPoolHandle")
            .field("threads", &self.inner.threads.load(Ordering::Relaxed))
            .field("queued", &self.inner.queued.load(Ordering::Relaxed))
            .finish()
    }
}

/// Handle for one submitted job.
pub struct BlockingTaskHandle {
    ticket: Arc<Ticket>,
}

impl BlockingTaskHandle {
    /// Cancels the job. A queued job is skipped; a running job runs to
    /// completion.
    pub fn cancel(&self) {
        self.ticket.cancelled.store(true, Ordering::Release);
    }

    /// Returns true if the job was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.ticket.cancelled.load(Ordering::Acquire)
    }

    /// Returns true once the job has run or been skipped.
    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.ticket.done.lock()
    }

    /// Blocks the calling thread until the job is done.
    pub fn wait(&self) {
        let mut done = self.ticket.done.lock();
        while !*done {
            self.ticket.finished.wait(&mut done);
        }
    }

    /// Waits up to `timeout`; returns true if the job is done.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.ticket.done.lock();
        while !*done {
            if self.ticket.finished.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }
        *done
    }
}

impl fmt::Debug for BlockingTaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTaskHandle")
            .field("cancelled", &self.is_cancelled())
            .field("done", &self.is_done())
            .finish()
    }
}
