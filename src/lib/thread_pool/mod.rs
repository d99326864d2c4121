//! Fixed-size worker pool pulling typed work packages from one priority queue.
//!
//! Workers block in [`PoolHandle::get_package`] until a package is queued, look up
//! the package's [`Dispatcher`] in an immutable [`DispatcherRegistry`] and run it with
//! their own per-thread state. There is no cooperative or single-threaded mode.
//!
//! Cancellation is pool-wide: [`PoolHandle::panic`] records the first fatal error in
//! the [`PanicFlag`], after which every worker finishes its current package, queued
//! packages are dropped and `get_package` returns `None`. [`PoolHandle::shutdown`] ends
//! the pool normally in the same way.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use blockpipe_lib::errors::Result;
//! use blockpipe_lib::thread_pool::{Dispatcher, DispatcherRegistry, PoolHandle, ThreadPool, WorkPackage};
//!
//! struct Sum(Arc<AtomicU64>);
//!
//! impl Dispatcher<u64, ()> for Sum {
//!     fn dispatch(&self, package: WorkPackage<u64>, pool: &PoolHandle<u64>, _: &mut ()) -> Result<()> {
//!         if self.0.fetch_add(package.payload, Ordering::SeqCst) + package.payload == 10 {
//!             pool.shutdown();
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let total = Arc::new(AtomicU64::new(0));
//! let mut registry = DispatcherRegistry::new();
//! registry.register(0, Box::new(Sum(Arc::clone(&total)))).unwrap();
//!
//! let pool = ThreadPool::start(2, registry, |_| ());
//! for n in 1..=4 {
//!     pool.handle().submit(WorkPackage::new(0, 0, n, n));
//! }
//! pool.join().unwrap();
//! assert_eq!(total.load(Ordering::SeqCst), 10);
//! ```

mod package;
mod panic_flag;

pub use package::{Dispatcher, DispatcherRegistry, WorkPackage};
pub use panic_flag::{PanicFlag, PanicState};

use std::collections::BinaryHeap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;
use parking_lot::{Condvar, Mutex};

use crate::errors::{PipelineError, Result};
use package::Queued;

type HaltHook = Box<dyn Fn() + Send + Sync>;

struct QueueState<P> {
    heap: BinaryHeap<Queued<P>>,
    next_order: u64,
    shutdown: bool,
}

struct Shared<P> {
    queue: Mutex<QueueState<P>>,
    available: Condvar,
    panic: PanicFlag,
    halt_hooks: Mutex<Vec<HaltHook>>,
}

/// Cloneable handle used to submit packages and control the pool.
pub struct PoolHandle<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for PoolHandle<P> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<P> PoolHandle<P> {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(QueueState { heap: BinaryHeap::new(), next_order: 0, shutdown: false }),
                available: Condvar::new(),
                panic: PanicFlag::new(),
                halt_hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queue a package. Returns `false`, dropping the package, once the pool has halted.
    pub fn submit(&self, package: WorkPackage<P>) -> bool {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown || self.shared.panic.is_fatal() {
            return false;
        }
        let order = queue.next_order;
        queue.next_order += 1;
        queue.heap.push(Queued { package, order });
        drop(queue);
        self.shared.available.notify_one();
        true
    }

    /// Block until a package is available; `None` once the pool is shut down or panicked.
    pub fn get_package(&self) -> Option<WorkPackage<P>> {
        let mut queue = self.shared.queue.lock();
        loop {
            if queue.shutdown || self.shared.panic.is_fatal() {
                return None;
            }
            if let Some(queued) = queue.heap.pop() {
                return Some(queued.package);
            }
            self.shared.available.wait(&mut queue);
        }
    }

    /// Record a fatal error and halt the pool. Only the first error is kept.
    pub fn panic(&self, error: PipelineError) {
        if self.shared.panic.raise_fatal(error) {
            debug!("Worker pool halting after fatal error");
            self.halt();
        }
    }

    /// Stop the pool after the current packages finish.
    pub fn shutdown(&self) {
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            return;
        }
        queue.shutdown = true;
        drop(queue);
        self.halt();
    }

    /// Run `hook` when the pool halts, e.g. to wake threads blocked on other resources.
    pub fn on_halt(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shared.halt_hooks.lock().push(Box::new(hook));
    }

    /// Whether the pool has stopped accepting work.
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.shared.panic.is_fatal() || self.shared.queue.lock().shutdown
    }

    /// The pool's error latch.
    #[must_use]
    pub fn panic_flag(&self) -> &PanicFlag {
        &self.shared.panic
    }

    fn halt(&self) {
        // Dropping queued packages returns their buffers to their pools.
        let dropped = std::mem::take(&mut self.shared.queue.lock().heap);
        drop(dropped);
        self.shared.available.notify_all();
        for hook in self.shared.halt_hooks.lock().iter() {
            hook();
        }
    }
}

// ============================================================================
// Worker threads
// ============================================================================

/// Extract a human-readable message from a panic payload.
#[must_use]
pub fn extract_panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Convert a worker thread panic into a pool panic.
pub fn handle_worker_panic<P>(pool: &PoolHandle<P>, thread_id: usize, panic_info: Box<dyn std::any::Any + Send>) {
    let msg = extract_panic_message(panic_info);
    pool.panic(PipelineError::PoolPanic(format!("Worker thread {thread_id} panicked: {msg}")));
}

/// A running set of worker threads.
pub struct ThreadPool<P> {
    handle: PoolHandle<P>,
    workers: Vec<JoinHandle<()>>,
}

impl<P: Send + 'static> ThreadPool<P> {
    /// Spawn `threads` workers dispatching through `registry`.
    ///
    /// `worker_state` builds each worker's private state on its own thread.
    pub fn start<W, F>(threads: usize, registry: DispatcherRegistry<P, W>, worker_state: F) -> Self
    where
        W: 'static,
        F: Fn(usize) -> W + Send + Sync + 'static,
    {
        let handle = PoolHandle::new();
        let registry = Arc::new(registry);
        let worker_state = Arc::new(worker_state);

        let workers = (0..threads.max(1))
            .map(|thread_id| {
                let pool = handle.clone();
                let registry = Arc::clone(&registry);
                let worker_state = Arc::clone(&worker_state);
                thread::spawn(move || {
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        let mut state = worker_state(thread_id);
                        run_worker(&pool, &registry, &mut state);
                    }));
                    if let Err(panic_info) = result {
                        handle_worker_panic(&pool, thread_id, panic_info);
                    }
                })
            })
            .collect();

        Self { handle, workers }
    }

    /// Handle for submitting packages.
    #[must_use]
    pub fn handle(&self) -> &PoolHandle<P> {
        &self.handle
    }

    /// Number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit.
    ///
    /// Workers exit only after [`PoolHandle::shutdown`] or [`PoolHandle::panic`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PoolPanic`] if a thread could not be joined.
    pub fn join(self) -> Result<()> {
        for handle in self.workers {
            handle.join().map_err(|_| PipelineError::PoolPanic("Worker thread panicked".to_string()))?;
        }
        Ok(())
    }
}

fn run_worker<P, W>(pool: &PoolHandle<P>, registry: &DispatcherRegistry<P, W>, state: &mut W) {
    while let Some(package) = pool.get_package() {
        let id = package.dispatcher_id;
        let Some(dispatcher) = registry.get(id) else {
            pool.panic(PipelineError::UnknownDispatcher(id));
            break;
        };
        if let Err(error) = dispatcher.dispatch(package, pool, state) {
            pool.panic(error);
        }
    }
}
