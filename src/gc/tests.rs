//! Tests for memory tracking against a live bridge.

use std::sync::Arc;

use super::*;
use crate::DeriveGcTraceable;
use crate::bridge::Bridge;
use crate::engine::{Heap, ScriptEngine};
use crate::entity::HostEntity;
use crate::registry::{ObjectKind, StaticRegistry, plain_object};

#[derive(DeriveGcTraceable)]
#[gc(crate_path = "crate")]
struct TestBuffer {
    #[gc(track)]
    data: Vec<u8>,
    #[gc(track)]
    name: String,
    #[allow(dead_code)]
    id: u64,
}

#[derive(DeriveGcTraceable)]
#[gc(crate_path = "crate")]
struct Chunks(#[gc(track)] Vec<Vec<u8>>, #[allow(dead_code)] u32);

#[derive(DeriveGcTraceable)]
#[gc(crate_path = "crate")]
enum Payload {
    Inline(#[gc(track)] Vec<u8>),
    Named {
        #[gc(track)]
        label: String,
        #[allow(dead_code)]
        flags: u8,
    },
    #[allow(dead_code)]
    Empty,
}

fn bridge() -> Bridge<Heap> {
    let registry = StaticRegistry::<Heap>::builder()
        .register("test.Buffer", ObjectKind::Ordinary, plain_object)
        .build()
        .unwrap();
    Bridge::new(Heap::new(), Arc::new(registry))
}

fn buffer_entity(bridge: &mut Bridge<Heap>) -> HostEntity {
    bridge.create_entity(&"test.Buffer".into()).unwrap()
}

#[test]
fn test_derive_gc_traceable() {
    let buffer = TestBuffer {
        data: Vec::with_capacity(1000),
        name: String::with_capacity(100),
        id: 42,
    };

    // Only data (1000) + name (100), not id
    assert_eq!(buffer.external_memory_size(), 1100);
}

#[test]
fn test_derive_tuple_struct() {
    let chunks = Chunks(vec![Vec::with_capacity(10)], 7);
    let base = chunks.0.capacity() * std::mem::size_of::<Vec<u8>>();
    assert_eq!(chunks.external_memory_size(), base + 10);
}

#[test]
fn test_derive_enum() {
    assert_eq!(Payload::Inline(Vec::with_capacity(64)).external_memory_size(), 64);
    let named = Payload::Named {
        label: String::with_capacity(16),
        flags: 0,
    };
    assert_eq!(named.external_memory_size(), 16);
    assert_eq!(Payload::Empty.external_memory_size(), 0);
}

#[test]
fn test_gc_traceable_option_and_bytes() {
    let some: Option<Vec<u8>> = Some(Vec::with_capacity(100));
    let none: Option<Vec<u8>> = None;
    assert_eq!(some.external_memory_size(), 100);
    assert_eq!(none.external_memory_size(), 0);

    let bytes = bytes::Bytes::from_static(b"hello");
    assert_eq!(bytes.external_memory_size(), 5);
}

#[test]
fn test_gc_traceable_shared_arc() {
    let shared = Arc::new(Vec::<u8>::with_capacity(100));
    let alone = shared.external_memory_size();
    assert_eq!(alone, std::mem::size_of::<Vec<u8>>() + 100);

    let _other = shared.clone();
    assert_eq!(shared.external_memory_size(), 0);
}

#[test]
fn test_guard_while_strong_is_invisible_to_engine() {
    let mut bridge = bridge();
    let entity = buffer_entity(&mut bridge);

    let guard = ExternalMemoryGuard::new(&entity, 1000);
    assert_eq!(entity.external_memory(), 1000);
    drop(guard);
    assert_eq!(entity.external_memory(), 0);

    bridge.collect_garbage();
    assert_eq!(bridge.engine().external_memory(), 0);
}

#[test]
fn test_guard_while_weak_reaches_engine_on_entry() {
    let mut bridge = bridge();
    let entity = buffer_entity(&mut bridge);
    let object = bridge.get_script_object(&entity).unwrap();
    let global = bridge.engine().global();
    bridge.engine_mut().set(global, "keep", object.into()).unwrap();

    let mut guard = ExternalMemoryGuard::new(&entity, 512);
    // Deferred until the bridge is entered
    assert_eq!(bridge.engine().external_memory(), 0);
    assert_eq!(bridge.engine_mut().external_memory(), 512);

    guard.set(128);
    assert_eq!(guard.amount(), 128);
    assert_eq!(bridge.engine_mut().external_memory(), 128);

    drop(guard);
    assert_eq!(bridge.engine_mut().external_memory(), 0);
}

#[test]
fn test_guard_outliving_entity_is_inert() {
    let mut bridge = bridge();
    let entity = buffer_entity(&mut bridge);
    let guard = ExternalMemoryGuard::new(&entity, 64);

    drop(entity);
    drop(guard);
    bridge.collect_garbage();
    assert_eq!(bridge.engine().external_memory(), 0);
}

#[test]
fn test_tracked_update_size() {
    let mut bridge = bridge();
    let entity = buffer_entity(&mut bridge);

    let mut tracked = Tracked::new(&entity, Vec::<u8>::with_capacity(100));
    assert_eq!(entity.external_memory(), 100);

    tracked.get_mut().reserve_exact(1000);
    tracked.update_size();
    assert_eq!(tracked.tracked_bytes(), tracked.capacity() as i64);
    assert_eq!(entity.external_memory(), tracked.capacity() as i64);

    let inner = tracked.into_inner();
    assert!(inner.capacity() >= 1000);
    assert_eq!(entity.external_memory(), 0);
}

#[test]
fn test_weak_memory_withdrawn_when_entity_dies() {
    let mut bridge = bridge();
    let entity = buffer_entity(&mut bridge);
    bridge.get_script_object(&entity).unwrap();

    let _guard = tracked_guard(&entity, &vec![0u8; 256]);
    assert_eq!(bridge.engine_mut().external_memory(), 256);

    drop(entity);
    // Retain released by the finalizer; the entity dies and its memory goes with it
    bridge.collect_garbage();
    assert_eq!(bridge.engine().external_memory(), 0);
}
