//! Host side of the entity pair.
//!
//! A [`HostEntity`] is reference counted: cloning is a retain, dropping is a
//! release, and both may happen on any thread. The script side is tracked as
//! an explicit three-state machine:
//!
//! ```text
//!   Unlinked ──link──▶ Strong ──promote──▶ Weak { retain }
//!                        ▲                    │
//!                        └────finalizer───────┘
//! ```
//!
//! While `Weak`, the entity holds `retain`, a clone of itself. That clone is
//! the bridge's extra strong host reference; the finalizer releases it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::engine::{EntityId, PersistentId};
use crate::gc::{DeferredDestruction, DeferredDestructionQueue};
use crate::registry::{ClassName, ObjectKind};

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) enum HandleState {
    Unlinked,
    Strong(PersistentId),
    Weak {
        handle: PersistentId,
        retain: HostEntity,
    },
}

impl HandleState {
    pub(crate) fn handle(&self) -> Option<PersistentId> {
        match self {
            HandleState::Unlinked => None,
            HandleState::Strong(handle) | HandleState::Weak { handle, .. } => Some(*handle),
        }
    }

    pub(crate) fn mode(&self) -> HandleMode {
        match self {
            HandleState::Unlinked => HandleMode::Unset,
            HandleState::Strong(_) => HandleMode::Strong,
            HandleState::Weak { .. } => HandleMode::Weak,
        }
    }
}

/// Observable mode of an entity's persistent handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleMode {
    Unset,
    Strong,
    Weak,
}

pub(crate) struct EntityState {
    pub(crate) handle: HandleState,
    /// Bytes attributed to the entity, reported or not
    pub(crate) external_memory: i64,
    /// Share of `external_memory` the engine has been told about (or will be,
    /// once the deferred delta is applied)
    pub(crate) accounted: i64,
}

pub(crate) struct EntityInner {
    id: EntityId,
    class: ClassName,
    kind: ObjectKind,
    state: Mutex<EntityState>,
    deferred: Arc<DeferredDestructionQueue>,
}

impl Drop for EntityInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = state.handle.handle() {
            self.deferred.defer(DeferredDestruction {
                entity: self.id,
                handle: Some(handle),
            });
        }

        if state.accounted != 0 {
            self.deferred.defer_memory(-state.accounted);
        }

        log::debug!("Destroyed entity {} ({})", self.id, self.class);
    }
}

/// Reference-counted host object paired with at most one script object.
#[derive(Clone)]
pub struct HostEntity {
    inner: Arc<EntityInner>,
}

impl HostEntity {
    pub(crate) fn new(class: ClassName, kind: ObjectKind, deferred: Arc<DeferredDestructionQueue>) -> Self {
        let id = EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!("Created entity {} ({})", id, class);

        Self {
            inner: Arc::new(EntityInner {
                id,
                class,
                kind,
                state: Mutex::new(EntityState {
                    handle: HandleState::Unlinked,
                    external_memory: 0,
                    accounted: 0,
                }),
                deferred,
            }),
        }
    }

    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    pub fn class(&self) -> &ClassName {
        &self.inner.class
    }

    pub fn kind(&self) -> ObjectKind {
        self.inner.kind
    }

    pub fn is_wrapper(&self) -> bool {
        self.inner.kind == ObjectKind::Wrapper
    }

    /// Number of host references, including the one held while the handle is weak.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn handle_mode(&self) -> HandleMode {
        self.state().handle.mode()
    }

    pub fn external_memory(&self) -> i64 {
        self.state().external_memory
    }

    /// Attribute `delta` bytes of host memory to this entity.
    ///
    /// Safe from any thread. While the handle is weak the delta is queued and
    /// reported to the engine on the bridge's next entry; otherwise it only
    /// accumulates.
    pub fn adjust_external_memory(&self, delta: i64) {
        if delta == 0 {
            return;
        }

        let mut state = self.state();
        state.external_memory += delta;

        if matches!(state.handle, HandleState::Weak { .. }) {
            state.accounted += delta;
            self.inner.deferred.defer_memory(delta);
        }
    }

    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &HostEntity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EntityState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PartialEq for HostEntity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for HostEntity {}

impl fmt::Debug for HostEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEntity")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

/// Non-owning reference to a [`HostEntity`].
#[derive(Clone, Default)]
pub struct WeakEntity {
    inner: Weak<EntityInner>,
}

impl WeakEntity {
    pub fn upgrade(&self) -> Option<HostEntity> {
        self.inner.upgrade().map(|inner| HostEntity { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakEntity")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(queue: &Arc<DeferredDestructionQueue>) -> HostEntity {
        HostEntity::new(ClassName::new("test.Entity"), ObjectKind::Ordinary, queue.clone())
    }

    #[test]
    fn test_ids_are_unique() {
        let queue = Arc::new(DeferredDestructionQueue::new());
        let a = entity(&queue);
        let b = entity(&queue);

        assert_ne!(a.id(), b.id());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_adjust_while_unlinked_only_accumulates() {
        let queue = Arc::new(DeferredDestructionQueue::new());
        let entity = entity(&queue);

        entity.adjust_external_memory(1024);
        entity.adjust_external_memory(-24);

        assert_eq!(entity.external_memory(), 1000);
        assert_eq!(queue.take_memory_delta(), 0);
        assert_eq!(entity.handle_mode(), HandleMode::Unset);
    }

    #[test]
    fn test_drop_unlinked_defers_nothing() {
        let queue = Arc::new(DeferredDestructionQueue::new());
        drop(entity(&queue));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drop_linked_defers_handle_reset() {
        let queue = Arc::new(DeferredDestructionQueue::new());
        let entity = entity(&queue);
        let id = entity.id();
        entity.state().handle = HandleState::Strong(PersistentId(9));

        let weak = entity.downgrade();
        drop(entity);
        assert!(!weak.is_alive());

        let mut seen = Vec::new();
        queue.process_all(|item| seen.push((item.entity, item.handle)));
        assert_eq!(seen, vec![(id, Some(PersistentId(9)))]);
    }

    #[test]
    fn test_adjust_from_other_thread() {
        let queue = Arc::new(DeferredDestructionQueue::new());
        let entity = entity(&queue);

        let remote = entity.clone();
        std::thread::spawn(move || remote.adjust_external_memory(64))
            .join()
            .unwrap();

        assert_eq!(entity.external_memory(), 64);
        assert_eq!(entity.strong_count(), 1);
    }
}
