//! Lifecycle controller and external memory accountant.
//!
//! The bridge owns the engine and mediates every transition of an entity's
//! persistent handle:
//!
//! - `link_script_object` installs the back-reference and a strong handle
//! - `promote_to_weak` hands the liveness decision to the collector and
//!   retains the host entity on its behalf
//! - the finalizer releases that retain and resurrects the handle as strong
//!
//! External memory reaches the engine only while a handle is weak.
//!
//! Every entry point starts by draining the deferred queue, the same way an
//! isolate lock applies pending work before anything else runs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::engine::{EntityId, GcStats, ObjectRef, PersistentId, ScriptEngine, Value};
use crate::entity::{HandleMode, HandleState, HostEntity, WeakEntity};
use crate::error::{BridgeError, BridgeResult, ScriptException};
use crate::gc::DeferredDestructionQueue;
use crate::registry::{ClassName, ClassRegistry};

pub struct Bridge<E: ScriptEngine + 'static> {
    pub(crate) engine: E,
    registry: Arc<dyn ClassRegistry<E>>,
    config: BridgeConfig,
    deferred: Arc<DeferredDestructionQueue>,
    /// Internal slot lookups. Never owning.
    entities: HashMap<EntityId, WeakEntity>,
}

impl<E: ScriptEngine + 'static> Bridge<E> {
    pub fn new(engine: E, registry: Arc<dyn ClassRegistry<E>>) -> Self {
        Self::with_config(engine, registry, BridgeConfig::default())
    }

    pub fn with_config(engine: E, registry: Arc<dyn ClassRegistry<E>>, config: BridgeConfig) -> Self {
        Self {
            engine,
            registry,
            config,
            deferred: Arc::new(DeferredDestructionQueue::new()),
            entities: HashMap::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Direct engine access, after pending deferred work has been applied.
    pub fn engine_mut(&mut self) -> &mut E {
        self.enter();
        &mut self.engine
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<dyn ClassRegistry<E>> {
        &self.registry
    }

    /// Entities currently reachable through an internal slot lookup.
    pub fn tracked_entities(&self) -> usize {
        self.entities.len()
    }

    /// Apply the pending memory delta and reset handles of destroyed entities.
    pub(crate) fn enter(&mut self) {
        let delta = self.deferred.take_memory_delta();
        if delta != 0 {
            let total = self.engine.adjust_external_memory(delta);
            log::trace!(
                "Applied deferred external memory adjustment: {} bytes (total {})",
                delta,
                total
            );
        }

        let engine = &mut self.engine;
        let entities = &mut self.entities;
        self.deferred.process_all(|item| {
            if let Some(handle) = item.handle {
                engine.reset_persistent(handle);
            }
            entities.remove(&item.entity);
        });
    }

    pub(crate) fn exception(&mut self, thrown: Value) -> BridgeError {
        let exception = ScriptException::capture(&mut self.engine, &thrown);
        log::debug!("Forwarding script exception: {}", exception);
        BridgeError::Engine(exception)
    }

    /// Allocate a host entity of a registered class. No script object yet.
    pub fn create_entity(&mut self, class: &ClassName) -> BridgeResult<HostEntity> {
        self.enter();
        let info = self.registry.require(class)?;
        Ok(HostEntity::new(info.name.clone(), info.kind, self.deferred.clone()))
    }

    /// The entity's script object, constructed and linked on first use.
    ///
    /// Every access promotes ordinary entities to weak: the caller is now
    /// holding the object, so the collector decides from here on. After a
    /// finalizer resurrected the handle this re-arms the weak protocol.
    pub fn get_script_object(&mut self, entity: &HostEntity) -> BridgeResult<ObjectRef> {
        self.enter();

        let object = match self.current_object(entity) {
            Some(object) => object,
            None => {
                let constructor = self.registry.require(entity.class())?.constructor.clone();
                let object = constructor(&mut self.engine).map_err(|thrown| self.exception(thrown))?;
                self.link_script_object(entity, object);
                object
            }
        };

        self.promote_to_weak(entity);
        Ok(object)
    }

    /// Pair an existing script object with `entity` and promote it.
    ///
    /// Wrapper entities are rebound: the new object replaces the previous one.
    pub fn attach_script_object(&mut self, entity: &HostEntity, object: ObjectRef) {
        self.enter();

        if self.current_object(entity) != Some(object) {
            self.link_script_object(entity, object);
        }
        self.promote_to_weak(entity);
    }

    /// Install the back-reference and a fresh strong handle.
    ///
    /// # Panics
    ///
    /// For ordinary entities, if the entity already has a script object or the
    /// object's internal slot is occupied. Either means the pairing
    /// bookkeeping is broken.
    pub fn link_script_object(&mut self, entity: &HostEntity, object: ObjectRef) {
        self.enter();

        let mut state = entity.state();

        if !entity.is_wrapper() {
            assert!(
                matches!(state.handle, HandleState::Unlinked),
                "entity {} is already linked to a script object",
                entity.id()
            );
            if let Some(owner) = self.engine.internal_slot(object) {
                panic!("script object is already linked to entity {}", owner);
            }

            self.engine.set_internal_slot(object, entity.id());
            self.entities.insert(entity.id(), entity.downgrade());
        }

        let handle = self.engine.new_persistent(object);
        let previous = std::mem::replace(&mut state.handle, HandleState::Strong(handle));
        drop(state);

        if let Some(stale) = previous.handle() {
            self.engine.reset_persistent(stale);
        }

        log::trace!("Linked entity {} to persistent handle {:?}", entity.id(), handle);
    }

    /// Make the handle weak and retain the entity on the collector's behalf.
    ///
    /// No-op for wrappers, unlinked entities and handles that are already weak.
    pub fn promote_to_weak(&mut self, entity: &HostEntity) {
        self.enter();

        if entity.is_wrapper() {
            return;
        }

        let mut state = entity.state();
        let HandleState::Strong(handle) = state.handle else {
            return;
        };

        let weak = entity.downgrade();
        self.engine.set_weak(
            handle,
            Box::new(move |engine: &mut E, handle: PersistentId| on_finalize(engine, handle, &weak)),
        );

        state.handle = HandleState::Weak {
            handle,
            retain: entity.clone(),
        };
        let report = state.external_memory;
        state.accounted = report;
        drop(state);

        if report != 0 {
            let total = self.engine.adjust_external_memory(report);
            log::trace!("Reported {} bytes for entity {} (total {})", report, entity.id(), total);
        }

        log::trace!("Promoted entity {} to weak", entity.id());
    }

    /// Attribute `delta` bytes to `entity`, reporting them now if the handle is weak.
    pub fn adjust_external_memory(&mut self, entity: &HostEntity, delta: i64) {
        self.enter();

        let report = {
            let mut state = entity.state();
            state.external_memory += delta;

            if matches!(state.handle, HandleState::Weak { .. }) {
                state.accounted += delta;
                true
            } else {
                false
            }
        };

        if report && delta != 0 {
            let total = self.engine.adjust_external_memory(delta);
            log::trace!(
                "Adjusted external memory of entity {}: {} bytes (total {})",
                entity.id(),
                delta,
                total
            );
        }
    }

    /// Host entity linked to `object` through its internal slot.
    pub fn entity_for(&self, object: ObjectRef) -> Option<HostEntity> {
        let id = self.engine.internal_slot(object)?;
        self.entity_by_id(id)
    }

    pub(crate) fn entity_by_id(&self, id: EntityId) -> Option<HostEntity> {
        self.entities.get(&id).and_then(WeakEntity::upgrade)
    }

    pub fn handle_mode(&self, entity: &HostEntity) -> HandleMode {
        entity.handle_mode()
    }

    pub fn collect_garbage(&mut self) -> GcStats {
        self.enter();
        let stats = self.engine.collect_garbage();
        // Entities released by finalizers queued their cleanup
        self.enter();

        log::debug!(
            "Collection reclaimed {} objects, ran {} finalizers",
            stats.collected,
            stats.finalized
        );
        stats
    }

    /// Collect when the engine's memory pressure reaches the configured threshold.
    pub fn collect_if_needed(&mut self) -> Option<GcStats> {
        self.enter();

        let pressure = self.engine.memory_pressure();
        if pressure < self.config.collect_threshold_bytes {
            return None;
        }

        log::debug!(
            "Memory pressure {} bytes exceeds threshold {}, collecting",
            pressure,
            self.config.collect_threshold_bytes
        );
        Some(self.collect_garbage())
    }

    /// Live script object behind the entity's handle, if any.
    ///
    /// A handle whose target is gone is dropped back to `Unlinked`.
    fn current_object(&mut self, entity: &HostEntity) -> Option<ObjectRef> {
        let mut state = entity.state();
        let handle = state.handle.handle()?;

        if let Some(object) = self.engine.persistent_target(handle) {
            return Some(object);
        }

        log::warn!("Entity {} lost its script object, relinking", entity.id());
        let previous = std::mem::replace(&mut state.handle, HandleState::Unlinked);
        let accounted = std::mem::take(&mut state.accounted);
        drop(state);
        drop(previous);

        self.engine.reset_persistent(handle);
        if accounted != 0 {
            self.engine.adjust_external_memory(-accounted);
        }
        None
    }
}

/// Runs inside the collection pass when an entity's script object becomes
/// unreachable from script.
///
/// Order: release the retain, then resurrect, then withdraw the reported
/// memory. If the retain was the last host reference the entity is destroyed
/// and the handle is reset instead of resurrected.
fn on_finalize<E: ScriptEngine>(engine: &mut E, handle: PersistentId, weak: &WeakEntity) {
    let Some(entity) = weak.upgrade() else {
        engine.reset_persistent(handle);
        return;
    };

    let (retain, accounted) = {
        let mut state = entity.state();
        match std::mem::replace(&mut state.handle, HandleState::Strong(handle)) {
            HandleState::Weak { retain, .. } => (retain, std::mem::take(&mut state.accounted)),
            other => {
                state.handle = other;
                return;
            }
        }
    };

    let id = entity.id();
    drop(retain);
    drop(entity);

    if weak.is_alive() {
        engine.clear_weak(handle);
        log::trace!("Finalized entity {}, handle is strong again", id);
    } else {
        engine.reset_persistent(handle);
        log::trace!("Finalized entity {}, host side released", id);
    }

    if accounted != 0 {
        engine.adjust_external_memory(-accounted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Heap;
    use crate::registry::{ObjectKind, StaticRegistry, plain_object};

    fn bridge() -> Bridge<Heap> {
        let registry = StaticRegistry::<Heap>::builder()
            .register("test.Thing", ObjectKind::Ordinary, plain_object)
            .register("test.Handle", ObjectKind::Wrapper, plain_object)
            .build()
            .unwrap();
        Bridge::new(Heap::new(), Arc::new(registry))
    }

    #[test]
    fn test_create_unknown_class() {
        let mut bridge = bridge();
        let err = bridge.create_entity(&"test.Missing".into()).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownClass(name) if name == "test.Missing"));
    }

    #[test]
    fn test_link_is_strong_until_promoted() {
        let mut bridge = bridge();
        let entity = bridge.create_entity(&"test.Thing".into()).unwrap();
        let object = bridge.engine_mut().new_object();

        bridge.link_script_object(&entity, object);
        assert_eq!(bridge.handle_mode(&entity), HandleMode::Strong);
        assert_eq!(entity.strong_count(), 1);
        assert_eq!(bridge.entity_for(object), Some(entity.clone()));

        bridge.promote_to_weak(&entity);
        assert_eq!(bridge.handle_mode(&entity), HandleMode::Weak);
        assert_eq!(entity.strong_count(), 2);

        // Already weak: no second retain
        bridge.promote_to_weak(&entity);
        assert_eq!(entity.strong_count(), 2);
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn test_double_link_panics() {
        let mut bridge = bridge();
        let first = bridge.create_entity(&"test.Thing".into()).unwrap();
        let second = bridge.create_entity(&"test.Thing".into()).unwrap();
        let object = bridge.engine_mut().new_object();

        bridge.link_script_object(&first, object);
        bridge.link_script_object(&second, object);
    }

    #[test]
    fn test_finalizer_releases_and_resurrects() {
        let mut bridge = bridge();
        let entity = bridge.create_entity(&"test.Thing".into()).unwrap();
        let object = bridge.get_script_object(&entity).unwrap();
        assert_eq!(entity.strong_count(), 2);

        let stats = bridge.collect_garbage();
        assert_eq!(stats.finalized, 1);
        assert_eq!(entity.strong_count(), 1);
        assert_eq!(bridge.handle_mode(&entity), HandleMode::Strong);
        assert!(bridge.engine().is_alive(object));

        // Strong now: a second pass neither finalizes nor releases again
        let stats = bridge.collect_garbage();
        assert_eq!(stats.finalized, 0);
        assert_eq!(entity.strong_count(), 1);
    }

    #[test]
    fn test_unreferenced_entity_is_destroyed_on_collection() {
        let mut bridge = bridge();
        let entity = bridge.create_entity(&"test.Thing".into()).unwrap();
        let object = bridge.get_script_object(&entity).unwrap();
        let weak = entity.downgrade();
        drop(entity);

        // The retain keeps it alive while the script side may still use it
        assert!(weak.is_alive());

        bridge.collect_garbage();
        assert!(!weak.is_alive());
        assert!(!bridge.engine().is_alive(object));
        assert_eq!(bridge.engine().persistent_count(), 0);
        assert_eq!(bridge.tracked_entities(), 0);
    }

    #[test]
    fn test_wrapper_never_weak() {
        let mut bridge = bridge();
        let entity = bridge.create_entity(&"test.Handle".into()).unwrap();
        let object = bridge.get_script_object(&entity).unwrap();

        assert_eq!(bridge.handle_mode(&entity), HandleMode::Strong);
        assert_eq!(entity.strong_count(), 1);
        assert_eq!(bridge.engine().internal_slot(object), None);
        assert_eq!(bridge.entity_for(object), None);
    }

    #[test]
    fn test_promoting_wrapper_applies_pending_work() {
        let mut bridge = bridge();
        let wrapper = bridge.create_entity(&"test.Handle".into()).unwrap();
        bridge.get_script_object(&wrapper).unwrap();

        let entity = bridge.create_entity(&"test.Thing".into()).unwrap();
        bridge.get_script_object(&entity).unwrap();
        entity.adjust_external_memory(128);
        assert_eq!(bridge.engine().external_memory(), 0);

        bridge.promote_to_weak(&wrapper);
        assert_eq!(bridge.engine().external_memory(), 128);
        assert_eq!(bridge.handle_mode(&wrapper), HandleMode::Strong);
    }

    #[test]
    fn test_pre_link_memory_reported_on_promotion() {
        let mut bridge = bridge();
        let entity = bridge.create_entity(&"test.Thing".into()).unwrap();

        bridge.adjust_external_memory(&entity, 4096);
        assert_eq!(bridge.engine().external_memory(), 0);

        bridge.get_script_object(&entity).unwrap();
        assert_eq!(bridge.engine().external_memory(), 4096);

        bridge.collect_garbage();
        assert_eq!(bridge.engine().external_memory(), 0);
        assert_eq!(entity.external_memory(), 4096);
    }

    #[test]
    fn test_collect_if_needed_respects_threshold() {
        let registry = StaticRegistry::<Heap>::builder().build().unwrap();
        let config = BridgeConfig::default().with_collect_threshold(1 << 20);
        let mut bridge = Bridge::with_config(Heap::new(), Arc::new(registry), config);

        assert!(bridge.collect_if_needed().is_none());

        bridge.engine_mut().adjust_external_memory(2 << 20);
        assert!(bridge.collect_if_needed().is_some());
    }
}
