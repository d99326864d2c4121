//! Bounded pools of reusable byte buffers.
//!
//! Every buffer moving between pipeline stages comes from a [`BufferPool`] and is
//! handed around as an owned, move-only [`Buffer`]. Dropping the handle returns its
//! storage to the free list, so a buffer has exactly one owner at any time and can
//! only be released once.
//!
//! Two modes are supported:
//!
//! - [`PoolMode::Fixed`] pre-allocates `capacity` buffers and only ever recycles them.
//!   `acquire` blocks (or fails with [`PipelineError::PoolExhausted`]) when all are out.
//! - [`PoolMode::Growable`] allocates on demand until `ceiling` buffers exist, then blocks.
//!
//! Released storage is cleared but not zeroed.

use std::fmt;
use std::ops::{Deref, DerefMut, Range};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex, RwLock};

use crate::errors::{PipelineError, Result};

#[cfg(debug_assertions)]
use std::collections::HashSet;

// ============================================================================
// Configuration
// ============================================================================

/// Allocation policy of a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMode {
    /// Pre-allocate `capacity` buffers; `blocking` selects wait vs. fail when empty.
    Fixed {
        /// Number of buffers
        capacity: usize,
        /// Whether `acquire` waits for a release instead of failing
        blocking: bool,
    },
    /// Allocate lazily up to `ceiling` buffers, then wait for a release.
    Growable {
        /// Maximum number of buffers ever allocated
        ceiling: usize,
    },
}

/// Configuration for a [`BufferPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Initial capacity reserved for each buffer's storage.
    pub buffer_capacity: usize,
    /// Allocation policy.
    pub mode: PoolMode,
}

impl BufferPoolConfig {
    /// Fixed pool of `capacity` blocking buffers.
    #[must_use]
    pub fn fixed(buffer_capacity: usize, capacity: usize) -> Self {
        Self { buffer_capacity, mode: PoolMode::Fixed { capacity, blocking: true } }
    }

    /// Growable pool bounded by `ceiling` buffers.
    #[must_use]
    pub fn growable(buffer_capacity: usize, ceiling: usize) -> Self {
        Self { buffer_capacity, mode: PoolMode::Growable { ceiling } }
    }

    /// Make a fixed pool fail fast instead of blocking when empty.
    #[must_use]
    pub fn non_blocking(mut self) -> Self {
        if let PoolMode::Fixed { capacity, .. } = self.mode {
            self.mode = PoolMode::Fixed { capacity, blocking: false };
        }
        self
    }
}

// ============================================================================
// Pool
// ============================================================================

struct FreeList {
    free: Vec<(u64, Vec<u8>)>,
    allocated: usize,
    next_id: u64,
    closed: bool,
    #[cfg(debug_assertions)]
    outstanding: HashSet<u64>,
}

struct PoolInner {
    name: &'static str,
    config: BufferPoolConfig,
    state: Mutex<FreeList>,
    available: Condvar,
}

impl PoolInner {
    #[cfg_attr(not(debug_assertions), allow(unused_variables))]
    fn release(&self, id: u64, mut data: Vec<u8>) {
        data.clear();
        let mut state = self.state.lock();
        #[cfg(debug_assertions)]
        assert!(state.outstanding.remove(&id), "buffer {id} released to '{}' but not checked out", self.name);
        state.free.push((id, data));
        drop(state);
        self.available.notify_one();
    }
}

/// A thread-safe pool of reusable buffers. Cloning shares the same pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("name", &self.inner.name)
            .field("capacity", &self.capacity())
            .field("free", &self.free_count())
            .field("allocated", &self.allocated())
            .finish()
    }
}

impl BufferPool {
    /// Create a pool; fixed pools allocate all their buffers here.
    #[must_use]
    pub fn new(name: &'static str, config: BufferPoolConfig) -> Self {
        let mut free = Vec::new();
        if let PoolMode::Fixed { capacity, .. } = config.mode {
            free.extend((0..capacity as u64).map(|id| (id, Vec::with_capacity(config.buffer_capacity))));
        }
        let allocated = free.len();
        let state = FreeList {
            free,
            allocated,
            next_id: allocated as u64,
            closed: false,
            #[cfg(debug_assertions)]
            outstanding: HashSet::new(),
        };
        Self {
            inner: Arc::new(PoolInner {
                name,
                config,
                state: Mutex::new(state),
                available: Condvar::new(),
            }),
        }
    }

    /// Take a buffer, waiting if the pool is at its limit and configured to block.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::PoolExhausted`] for an empty non-blocking fixed pool
    /// - [`PipelineError::PoolClosed`] once [`close`](Self::close) has been called
    pub fn acquire(&self) -> Result<Buffer> {
        let mut state = self.inner.state.lock();
        loop {
            if state.closed {
                return Err(PipelineError::PoolClosed(self.inner.name));
            }
            if let Some(buffer) = self.take(&mut state) {
                return Ok(buffer);
            }
            if let PoolMode::Fixed { blocking: false, .. } = self.inner.config.mode {
                return Err(PipelineError::PoolExhausted(self.inner.name));
            }
            self.inner.available.wait(&mut state);
        }
    }

    /// Take a buffer only if one is available without waiting.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Buffer> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return None;
        }
        self.take(&mut state)
    }

    /// Return a buffer to its pool. Equivalent to dropping it.
    pub fn release(&self, buffer: Buffer) {
        debug_assert!(
            Arc::ptr_eq(&self.inner, &buffer.pool),
            "buffer released to '{}' but belongs to '{}'",
            self.inner.name,
            buffer.pool.name
        );
        drop(buffer);
    }

    /// Wake every waiter with [`PipelineError::PoolClosed`] and refuse further acquires.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.available.notify_all();
    }

    fn take(&self, state: &mut FreeList) -> Option<Buffer> {
        let (id, data) = if let Some(entry) = state.free.pop() {
            entry
        } else {
            match self.inner.config.mode {
                PoolMode::Growable { ceiling } if state.allocated < ceiling => {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.allocated += 1;
                    (id, Vec::with_capacity(self.inner.config.buffer_capacity))
                }
                _ => return None,
            }
        };
        #[cfg(debug_assertions)]
        state.outstanding.insert(id);
        Some(Buffer { data, id, pool: Arc::clone(&self.inner) })
    }

    /// Pool name used in errors and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Maximum number of buffers the pool will hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        match self.inner.config.mode {
            PoolMode::Fixed { capacity, .. } => capacity,
            PoolMode::Growable { ceiling } => ceiling,
        }
    }

    /// Buffers currently on the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.inner.state.lock().free.len()
    }

    /// Buffers allocated so far.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.inner.state.lock().allocated
    }

    /// Buffers currently owned by callers.
    #[must_use]
    pub fn checked_out(&self) -> usize {
        let state = self.inner.state.lock();
        state.allocated - state.free.len()
    }
}

// ============================================================================
// Buffer
// ============================================================================

/// Owned handle to one pool buffer; returns its storage to the pool on drop.
pub struct Buffer {
    data: Vec<u8>,
    id: u64,
    pool: Arc<PoolInner>,
}

impl Buffer {
    /// Identity of the underlying storage, stable across reuse.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the owning pool.
    #[must_use]
    pub fn pool_name(&self) -> &'static str {
        self.pool.name
    }

    /// Mutable access to the backing vector for codec output.
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("pool", &self.pool.name)
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.pool.release(self.id, std::mem::take(&mut self.data));
    }
}

// ============================================================================
// SubBlockGroup
// ============================================================================

/// One buffer shared read-only by a fixed number of sub-units.
///
/// Each sub-unit reads its own range through [`with_unit`](Self::with_unit) and then
/// calls [`return_unit`](Self::return_unit). The buffer goes back to its pool only
/// when every registered sub-unit has been returned.
pub struct SubBlockGroup {
    buffer: RwLock<Option<Buffer>>,
    registered: usize,
    returned: AtomicUsize,
}

impl SubBlockGroup {
    /// Share `buffer` among `units` sub-units.
    ///
    /// # Panics
    ///
    /// Panics if `units` is zero.
    #[must_use]
    pub fn new(buffer: Buffer, units: usize) -> Arc<Self> {
        assert!(units > 0, "a sub-block group needs at least one unit");
        Arc::new(Self { buffer: RwLock::new(Some(buffer)), registered: units, returned: AtomicUsize::new(0) })
    }

    /// Split `len` bytes into consecutive ranges of at most `unit_size` bytes.
    #[must_use]
    pub fn split(len: usize, unit_size: usize) -> Vec<Range<usize>> {
        let unit_size = unit_size.max(1);
        (0..len.div_ceil(unit_size))
            .map(|i| i * unit_size..((i + 1) * unit_size).min(len))
            .collect()
    }

    /// Run `f` on `range` of the shared buffer, or return `None` if it was already released.
    pub fn with_unit<R>(&self, range: Range<usize>, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let guard = self.buffer.read();
        guard.as_ref().map(|buffer| f(&buffer[range]))
    }

    /// Mark one sub-unit as done; returns `true` for the last one, which releases the buffer.
    pub fn return_unit(&self) -> bool {
        let returned = self.returned.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(returned <= self.registered, "sub-unit returned more often than registered");
        if returned == self.registered {
            self.buffer.write().take();
            true
        } else {
            false
        }
    }

    /// Number of sub-units sharing the buffer.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered
    }

    /// Number of sub-units returned so far.
    #[must_use]
    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::Acquire)
    }
}

// ============================================================================
// Tests
// ============================================================================
