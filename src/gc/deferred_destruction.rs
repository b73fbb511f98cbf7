//! Deferred destruction queue for persistent handles.
//!
//! ## Problem
//!
//! Persistent handles may only be reset on the engine's thread. A host entity
//! can be released from any thread, and its last release must still reset
//! the handle it owns.
//!
//! ## Solution
//!
//! Queue the reset (and any memory delta the engine still has to hear about),
//! then process the queue whenever the bridge is entered on the engine thread.
//!
//! ```ignore
//! // From any thread
//! queue.defer(DeferredDestruction { entity, handle: Some(handle) });
//! queue.defer_memory(-4096);
//!
//! // On the engine thread, at every bridge entry
//! let delta = queue.take_memory_delta();
//! queue.process_all(|item| { /* reset item.handle */ });
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::engine::{EntityId, PersistentId};

/// Cleanup owed by a destroyed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredDestruction {
    pub entity: EntityId,
    pub handle: Option<PersistentId>,
}

/// Per-bridge queue of handle resets and external memory deltas.
///
/// Thread-safe; receives work from any thread. Pending work is applied when
/// the bridge is entered on the engine thread.
pub struct DeferredDestructionQueue {
    queue: Mutex<VecDeque<DeferredDestruction>>,

    /// Fast check for pending items (avoids lock acquisition on hot path)
    pending_count: AtomicU64,

    /// Net external memory delta not yet reported to the engine
    pending_memory: AtomicI64,
}

impl Default for DeferredDestructionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredDestructionQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(8)),
            pending_count: AtomicU64::new(0),
            pending_memory: AtomicI64::new(0),
        }
    }

    /// Queue cleanup for a destroyed entity. Callable from any thread.
    pub fn defer(&self, item: DeferredDestruction) {
        let pending = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            queue.push_back(item);
            // Count follows the queue under its lock
            let pending = queue.len() as u64;
            self.pending_count.store(pending, Ordering::Release);
            pending
        };

        tracing::trace!("Deferred handle destruction for {} (pending: {})", item.entity, pending);
    }

    /// Accumulate an external memory delta for the engine. Callable from any thread.
    pub fn defer_memory(&self, delta: i64) {
        if delta != 0 {
            self.pending_memory.fetch_add(delta, Ordering::SeqCst);
        }
    }

    /// Take the accumulated memory delta, leaving zero behind.
    pub fn take_memory_delta(&self) -> i64 {
        self.pending_memory.swap(0, Ordering::SeqCst)
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending_count.load(Ordering::Acquire) > 0
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.pending_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Hand every pending item to `destroy`. Must run on the engine thread.
    ///
    /// Items queued while `destroy` runs (an entity released from inside it)
    /// are left for the next call.
    pub fn process_all(&self, mut destroy: impl FnMut(DeferredDestruction)) -> usize {
        // Fast path: no pending destructions
        if !self.has_pending() {
            return 0;
        }

        let items: VecDeque<DeferredDestruction> = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            self.pending_count.store(0, Ordering::Release);
            std::mem::take(&mut *queue)
        };

        let count = items.len();
        if count == 0 {
            return 0;
        }

        for item in items {
            destroy(item);
        }

        tracing::trace!("Processed {} deferred handle destructions", count);
        count
    }
}

impl std::fmt::Debug for DeferredDestructionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredDestructionQueue")
            .field("pending_count", &self.len())
            .field("pending_memory", &self.pending_memory.load(Ordering::Relaxed))
            .finish()
    }
}
