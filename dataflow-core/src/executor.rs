//! Work scheduling and synchronization primitives used by captured functions

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// A unit of work handed to a [`Runner`]
pub type Closure = Box<dyn FnOnce() + Send + 'static>;

/// Schedules closures, either inline on the calling thread or on a worker pool
#[derive(Clone)]
pub struct Runner {
    schedule: Arc<dyn Fn(Closure) + Send + Sync>,
    description: &'static str,
}

impl Runner {
    /// Run every closure immediately on the calling thread
    pub fn inline() -> Self {
        Self {
            schedule: Arc::new(|f: Closure| f()),
            description: "inline",
        }
    }

    /// Spawn every closure onto `pool`
    pub fn thread_pool(pool: Arc<rayon::ThreadPool>) -> Self {
        Self {
            schedule: Arc::new(move |f: Closure| pool.spawn(f)),
            description: "thread-pool",
        }
    }

    /// Schedule `f` for execution
    pub fn schedule(&self, f: Closure) {
        (self.schedule)(f);
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::inline()
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runner({})", self.description)
    }
}

/// One-shot wait/notify latch
#[derive(Default)]
pub struct Notification {
    notified: Mutex<bool>,
    cv: Condvar,
}

impl Notification {
    /// Create an un-notified latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every current and future waiter
    pub fn notify(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.cv.notify_all();
    }

    /// Check without blocking
    pub fn has_been_notified(&self) -> bool {
        *self.notified.lock()
    }

    /// Block until [`Notification::notify`] has been called
    pub fn wait(&self) {
        let mut notified = self.notified.lock();
        while !*notified {
            self.cv.wait(&mut notified);
        }
    }
}

/// Cancellation flag scoped to a single function invocation
///
/// Each invocation gets a fresh manager; cancelling the enclosing pipeline is
/// not propagated into it.
#[derive(Debug, Default)]
pub struct CancellationManager {
    cancelled: AtomicBool,
}

impl CancellationManager {
    /// Create a manager that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn start_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notification_across_threads() {
        let n = Arc::new(Notification::new());
        let n2 = n.clone();
        let handle = std::thread::spawn(move || n2.notify());
        n.wait();
        assert!(n.has_been_notified());
        handle.join().unwrap();
    }

    #[test]
    fn test_inline_runner_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        Runner::inline().schedule(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_thread_pool_runner() {
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        let runner = Runner::thread_pool(pool);
        let done = Arc::new(Notification::new());
        let d = done.clone();
        runner.schedule(Box::new(move || d.notify()));
        done.wait();
    }

    #[test]
    fn test_cancellation_is_local() {
        let a = CancellationManager::new();
        let b = CancellationManager::new();
        a.start_cancel();
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }
}
