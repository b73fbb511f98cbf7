//! Script engine contract consumed by the bridge.
//!
//! The bridge never talks to a concrete engine directly. It only needs what a
//! tracing collector with persistent handles offers:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Persistent handles                                          │
//! │  ├── strong: the collector may not reclaim the target        │
//! │  └── weak: reclaimable, finalizer runs first (may resurrect) │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Internal slot: one pointer-sized back-reference per object  │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Heap heuristic: signed external-memory adjustments          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Object protocol: get / set / has / keys / call / stringify  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every fallible call returns [`EngineResult`]; the error side carries the
//! thrown script value, which is what an exception trap would have caught.

mod heap;

pub use heap::{Heap, NativeFn};

use std::fmt;

/// Result of a call into the engine. `Err` holds the thrown value.
pub type EngineResult<T> = Result<T, Value>;

/// Callback invoked by the collector when a weakly held target is about to be
/// reclaimed. Runs synchronously inside the collection pass.
pub type Finalizer<E> = Box<dyn FnOnce(&mut E, PersistentId)>;

/// Reference to an object on the script heap.
///
/// The generation makes a reference to a reclaimed slot distinguishable from a
/// reference to whatever object reuses that slot later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    index: u32,
    generation: u32,
}

impl ObjectRef {
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// Identifier of a persistent handle owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PersistentId(pub u64);

/// Identifier of a host entity, stored in a script object's internal slot.
///
/// This is a lookup key, never an owning reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value in the script domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
}

impl Value {
    pub fn as_object(&self) -> Option<ObjectRef> {
        match self {
            Value::Object(object) => Some(*object),
            _ => None,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Object(value)
    }
}

/// Outcome of one collection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Objects reclaimed by the sweep.
    pub collected: usize,
    /// Finalizers invoked for weakly held targets.
    pub finalized: usize,
}

/// Operations the bridge requires from a script engine.
///
/// All methods must be called on the engine's thread of control.
pub trait ScriptEngine: Sized {
    // Persistent handles

    /// Create a strong persistent handle to `object`.
    fn new_persistent(&mut self, object: ObjectRef) -> PersistentId;

    /// Current target of a handle, `None` once reset or cleared by the collector.
    fn persistent_target(&self, handle: PersistentId) -> Option<ObjectRef>;

    fn is_weak(&self, handle: PersistentId) -> bool;

    /// Make the handle weak. `finalizer` runs once when the target becomes
    /// unreachable from script.
    fn set_weak(&mut self, handle: PersistentId, finalizer: Finalizer<Self>);

    /// Make the handle strong again, dropping any pending finalizer.
    fn clear_weak(&mut self, handle: PersistentId);

    fn reset_persistent(&mut self, handle: PersistentId);

    // Internal slot

    fn internal_slot(&self, object: ObjectRef) -> Option<EntityId>;

    fn set_internal_slot(&mut self, object: ObjectRef, entity: EntityId);

    // Heap heuristic

    /// Report `delta` bytes of memory the engine cannot see. Returns the new total.
    fn adjust_external_memory(&mut self, delta: i64) -> i64;

    fn external_memory(&self) -> i64;

    /// Estimated bytes the collector would consider when scheduling a pass.
    fn memory_pressure(&self) -> usize;

    fn collect_garbage(&mut self) -> GcStats;

    // Object protocol

    fn new_object(&mut self) -> ObjectRef;

    fn new_array(&mut self, elements: Vec<Value>) -> ObjectRef;

    fn get(&mut self, object: ObjectRef, key: &str) -> EngineResult<Value>;

    fn set(&mut self, object: ObjectRef, key: &str, value: Value) -> EngineResult<()>;

    fn has(&mut self, object: ObjectRef, key: &str) -> EngineResult<bool>;

    fn has_own(&mut self, object: ObjectRef, key: &str) -> EngineResult<bool>;

    /// Enumerable string keys as a script array: own keys only, or the
    /// `for-in` walk over the prototype chain.
    fn property_names(&mut self, object: ObjectRef, own_only: bool) -> EngineResult<ObjectRef>;

    fn is_callable(&self, value: &Value) -> bool;

    fn is_array(&self, value: &Value) -> bool;

    fn call(&mut self, function: &Value, receiver: Value, args: &[Value]) -> EngineResult<Value>;

    fn to_display_string(&mut self, value: &Value) -> EngineResult<String>;

    /// `JSON.stringify`. `Ok(None)` when the value has no JSON representation.
    fn json_stringify(&mut self, value: &Value) -> EngineResult<Option<String>>;

    fn array_length(&mut self, array: ObjectRef) -> EngineResult<usize> {
        match self.get(array, "length")? {
            Value::Number(n) if n.is_finite() && n > 0.0 => Ok(n as usize),
            _ => Ok(0),
        }
    }
}
