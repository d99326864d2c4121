//! Work packages and the dispatcher registry.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::errors::{PipelineError, Result};

use super::PoolHandle;

/// A unit of schedulable work.
///
/// Packages are moved, never shared: the queue owns a package until exactly one
/// worker takes it, and that worker owns it until its dispatcher consumes it.
#[derive(Debug)]
pub struct WorkPackage<P> {
    /// Higher values are dispatched first.
    pub priority: u64,
    /// Selects the registered [`Dispatcher`].
    pub dispatcher_id: u64,
    /// Tie-break within a priority; lower values are dispatched first.
    pub sequence_id: u64,
    /// Task-specific data.
    pub payload: P,
}

impl<P> WorkPackage<P> {
    /// Build a package.
    pub fn new(priority: u64, dispatcher_id: u64, sequence_id: u64, payload: P) -> Self {
        Self { priority, dispatcher_id, sequence_id, payload }
    }
}

/// Queue entry: the package plus a submission counter so equal keys stay FIFO.
pub(super) struct Queued<P> {
    pub(super) package: WorkPackage<P>,
    pub(super) order: u64,
}

impl<P> PartialEq for Queued<P> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<P> Eq for Queued<P> {}

impl<P> PartialOrd for Queued<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Queued<P> {
    // Max-heap order: highest priority, then lowest sequence id, then oldest submission.
    fn cmp(&self, other: &Self) -> Ordering {
        self.package
            .priority
            .cmp(&other.package.priority)
            .then_with(|| other.package.sequence_id.cmp(&self.package.sequence_id))
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// Handler for one kind of work package.
///
/// `W` is the per-worker state (for example a codec instance) owned by the thread
/// running the handler. Follow-up work is submitted through `pool`; an `Err` return
/// halts the whole pool.
pub trait Dispatcher<P, W>: Send + Sync {
    /// Execute `package`, consuming it.
    fn dispatch(&self, package: WorkPackage<P>, pool: &PoolHandle<P>, worker: &mut W) -> Result<()>;
}

/// Immutable-after-build map from dispatcher id to handler.
pub struct DispatcherRegistry<P, W> {
    handlers: HashMap<u64, Box<dyn Dispatcher<P, W>>>,
}

impl<P, W> Default for DispatcherRegistry<P, W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, W> DispatcherRegistry<P, W> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register `handler` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DuplicateDispatcher`] if `id` is taken.
    pub fn register(&mut self, id: u64, handler: Box<dyn Dispatcher<P, W>>) -> Result<()> {
        if self.handlers.contains_key(&id) {
            return Err(PipelineError::DuplicateDispatcher(id));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    /// Look up the handler for `id`.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&dyn Dispatcher<P, W>> {
        self.handlers.get(&id).map(Box::as_ref)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
