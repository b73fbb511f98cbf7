//! In-process object heap implementing [`ScriptEngine`].
//!
//! The heap models what the bridge needs from a tracing collector and nothing
//! more: objects with prototype chains, arrays, native functions, accessor
//! properties, one internal slot per object, persistent handles and a
//! mark/sweep pass with resurrecting finalizers. There is no parser and no
//! interpreter; behaviour is supplied by native functions.
//!
//! Natives must not capture [`ObjectRef`]s they expect to stay alive. The
//! collector cannot see through closures, so such objects need a root
//! (a property of the global object or a strong persistent handle).

mod gc;
mod json;

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use super::{EngineResult, EntityId, Finalizer, GcStats, ObjectRef, PersistentId, ScriptEngine, Value};
use crate::config::{BridgeConfig, DEFAULT_MAX_JSON_DEPTH};

/// Native function callable from the object protocol: `(heap, receiver, args)`.
pub type NativeFn = Rc<dyn Fn(&mut Heap, Value, &[Value]) -> EngineResult<Value>>;

/// Rough per-object footprint used for the memory pressure estimate.
const OBJECT_SIZE_ESTIMATE: usize = 64;

/// Writes further than this past the end of an array become plain properties.
const MAX_DENSE_GAP: usize = 1 << 16;

#[derive(Clone)]
enum Property {
    Data {
        value: Value,
        enumerable: bool,
    },
    Accessor {
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
        enumerable: bool,
    },
}

impl Property {
    fn enumerable(&self) -> bool {
        match self {
            Property::Data { enumerable, .. } | Property::Accessor { enumerable, .. } => *enumerable,
        }
    }
}

enum ObjectData {
    Ordinary,
    Array(Vec<Value>),
    Function(NativeFn),
}

struct HeapObject {
    prototype: Option<ObjectRef>,
    properties: Vec<(String, Property)>,
    data: ObjectData,
    slot: Option<EntityId>,
    marked: bool,
}

impl HeapObject {
    fn new(prototype: Option<ObjectRef>, data: ObjectData) -> Self {
        Self {
            prototype,
            properties: Vec::new(),
            data,
            slot: None,
            marked: false,
        }
    }

    fn own(&self, key: &str) -> Option<&Property> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    fn own_index(&self, key: &str) -> Option<usize> {
        self.properties.iter().position(|(k, _)| k == key)
    }

    /// Own string keys in property order: array elements, integer keys
    /// ascending, then the rest in insertion order.
    fn ordered_keys(&self) -> Vec<(String, bool)> {
        let mut keys = Vec::with_capacity(self.properties.len());

        if let ObjectData::Array(elements) = &self.data {
            keys.extend((0..elements.len()).map(|i| (i.to_string(), true)));
        }

        let mut integers: Vec<(u32, String, bool)> = Vec::new();
        let mut named: Vec<(String, bool)> = Vec::new();

        for (key, property) in &self.properties {
            match array_index(key) {
                Some(index) => integers.push((index as u32, key.clone(), property.enumerable())),
                None => named.push((key.clone(), property.enumerable())),
            }
        }

        integers.sort_by_key(|(index, _, _)| *index);
        keys.extend(integers.into_iter().map(|(_, key, enumerable)| (key, enumerable)));
        keys.extend(named);
        keys
    }
}

struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

struct Persistent {
    target: Option<ObjectRef>,
    weak: bool,
    finalizer: Option<Finalizer<Heap>>,
}

#[derive(Clone, Copy)]
struct Intrinsics {
    object_prototype: ObjectRef,
    function_prototype: ObjectRef,
    array_prototype: ObjectRef,
    error_prototype: ObjectRef,
}

enum Lookup {
    Found(Value),
    Getter(Option<NativeFn>),
    Next(Option<ObjectRef>),
}

/// Object heap with a tracing collector.
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    persistents: BTreeMap<PersistentId, Persistent>,
    next_persistent: u64,
    external_memory: i64,
    global: ObjectRef,
    intrinsics: Intrinsics,
    max_json_depth: usize,
    join_stack: Vec<ObjectRef>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self::with_max_json_depth(DEFAULT_MAX_JSON_DEPTH)
    }

    pub fn with_config(config: &BridgeConfig) -> Self {
        Self::with_max_json_depth(config.max_json_depth)
    }

    fn with_max_json_depth(max_json_depth: usize) -> Self {
        let placeholder = ObjectRef::from_raw(0, 0);

        let mut heap = Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            persistents: BTreeMap::new(),
            next_persistent: 1,
            external_memory: 0,
            global: placeholder,
            intrinsics: Intrinsics {
                object_prototype: placeholder,
                function_prototype: placeholder,
                array_prototype: placeholder,
                error_prototype: placeholder,
            },
            max_json_depth,
            join_stack: Vec::new(),
        };

        let object_prototype = heap.alloc(None, ObjectData::Ordinary);
        let function_prototype = heap.alloc(Some(object_prototype), ObjectData::Ordinary);
        let array_prototype = heap.alloc(Some(object_prototype), ObjectData::Ordinary);
        let error_prototype = heap.alloc(Some(object_prototype), ObjectData::Ordinary);

        heap.intrinsics = Intrinsics {
            object_prototype,
            function_prototype,
            array_prototype,
            error_prototype,
        };
        heap.global = heap.alloc(Some(object_prototype), ObjectData::Ordinary);
        heap.install_builtins();
        heap
    }

    fn install_builtins(&mut self) {
        let Intrinsics {
            object_prototype,
            function_prototype,
            array_prototype,
            error_prototype,
        } = self.intrinsics;

        let to_string = self.new_function(builtin_object_to_string);
        self.define_hidden(object_prototype, "toString", to_string.into());

        let to_string = self.new_function(builtin_function_to_string);
        self.define_hidden(function_prototype, "toString", to_string.into());

        let to_string = self.new_function(builtin_array_join);
        self.define_hidden(array_prototype, "toString", to_string.into());
        let join = self.new_function(builtin_array_join);
        self.define_hidden(array_prototype, "join", join.into());

        let to_string = self.new_function(builtin_error_to_string);
        self.define_hidden(error_prototype, "toString", to_string.into());
        self.define_hidden(error_prototype, "name", "Error".into());
        self.define_hidden(error_prototype, "message", "".into());
    }

    // ------------------------------------------------------------------
    // Allocation and lookup
    // ------------------------------------------------------------------

    fn alloc(&mut self, prototype: Option<ObjectRef>, data: ObjectData) -> ObjectRef {
        let object = HeapObject::new(prototype, data);
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return ObjectRef::from_raw(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjectRef::from_raw(index, 0)
    }

    fn object(&self, object: ObjectRef) -> Option<&HeapObject> {
        self.slots
            .get(object.index() as usize)
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.object.as_ref())
    }

    fn object_mut(&mut self, object: ObjectRef) -> Option<&mut HeapObject> {
        self.slots
            .get_mut(object.index() as usize)
            .filter(|slot| slot.generation == object.generation())
            .and_then(|slot| slot.object.as_mut())
    }

    fn live_object(&self, object: ObjectRef) -> EngineResult<&HeapObject> {
        self.object(object).ok_or_else(stale_reference)
    }

    fn live_object_mut(&mut self, object: ObjectRef) -> EngineResult<&mut HeapObject> {
        self.object_mut(object).ok_or_else(stale_reference)
    }

    // ------------------------------------------------------------------
    // Public helpers for embedders and natives
    // ------------------------------------------------------------------

    /// The global object. Anything reachable from it is reachable from script.
    pub fn global(&self) -> ObjectRef {
        self.global
    }

    pub fn object_prototype(&self) -> ObjectRef {
        self.intrinsics.object_prototype
    }

    pub fn error_prototype(&self) -> ObjectRef {
        self.intrinsics.error_prototype
    }

    pub fn is_alive(&self, object: ObjectRef) -> bool {
        self.object(object).is_some()
    }

    pub fn live_objects(&self) -> usize {
        self.live
    }

    pub fn persistent_count(&self) -> usize {
        self.persistents.len()
    }

    pub fn new_object_with_prototype(&mut self, prototype: Option<ObjectRef>) -> ObjectRef {
        self.alloc(prototype, ObjectData::Ordinary)
    }

    pub fn new_function<F>(&mut self, function: F) -> ObjectRef
    where
        F: Fn(&mut Heap, Value, &[Value]) -> EngineResult<Value> + 'static,
    {
        let prototype = self.intrinsics.function_prototype;
        self.alloc(Some(prototype), ObjectData::Function(Rc::new(function)))
    }

    /// Define a non-enumerable data property (methods, bookkeeping fields).
    pub fn define_hidden(&mut self, object: ObjectRef, key: &str, value: Value) {
        self.define(
            object,
            key,
            Property::Data {
                value,
                enumerable: false,
            },
        );
    }

    /// Define an enumerable accessor property backed by natives.
    pub fn define_accessor(
        &mut self,
        object: ObjectRef,
        key: &str,
        getter: Option<NativeFn>,
        setter: Option<NativeFn>,
    ) {
        self.define(
            object,
            key,
            Property::Accessor {
                getter,
                setter,
                enumerable: true,
            },
        );
    }

    fn define(&mut self, object: ObjectRef, key: &str, property: Property) {
        let Some(target) = self.object_mut(object) else {
            return;
        };

        match target.own_index(key) {
            Some(index) => target.properties[index].1 = property,
            None => target.properties.push((key.to_string(), property)),
        }
    }

    /// Remove an own property. Returns whether it existed.
    pub fn delete(&mut self, object: ObjectRef, key: &str) -> bool {
        let Some(target) = self.object_mut(object) else {
            return false;
        };

        match target.own_index(key) {
            Some(index) => {
                target.properties.remove(index);
                true
            }
            None => false,
        }
    }

    /// Create an error object (`name`, `message`) inheriting `Error.prototype`.
    pub fn new_error(&mut self, name: &str, message: &str) -> Value {
        let prototype = self.intrinsics.error_prototype;
        let error = self.alloc(Some(prototype), ObjectData::Ordinary);
        self.define_hidden(error, "name", name.into());
        self.define_hidden(error, "message", message.into());
        Value::Object(error)
    }

    pub fn type_error(&mut self, message: &str) -> Value {
        self.new_error("TypeError", message)
    }

    // ------------------------------------------------------------------
    // Property protocol
    // ------------------------------------------------------------------

    fn lookup_step(&self, target: ObjectRef, key: &str) -> EngineResult<Lookup> {
        let object = self.live_object(target)?;

        if let ObjectData::Array(elements) = &object.data {
            if key == "length" {
                return Ok(Lookup::Found(Value::Number(elements.len() as f64)));
            }
            if let Some(value) = array_index(key).and_then(|index| elements.get(index)) {
                return Ok(Lookup::Found(value.clone()));
            }
        }

        Ok(match object.own(key) {
            Some(Property::Data { value, .. }) => Lookup::Found(value.clone()),
            Some(Property::Accessor { getter, .. }) => Lookup::Getter(getter.clone()),
            None => Lookup::Next(object.prototype),
        })
    }

    fn get_property(&mut self, object: ObjectRef, key: &str) -> EngineResult<Value> {
        let mut current = Some(object);

        while let Some(target) = current {
            match self.lookup_step(target, key)? {
                Lookup::Found(value) => return Ok(value),
                Lookup::Getter(Some(getter)) => return getter(self, Value::Object(object), &[]),
                Lookup::Getter(None) => return Ok(Value::Undefined),
                Lookup::Next(next) => current = next,
            }
        }

        Ok(Value::Undefined)
    }

    /// Find the nearest accessor for `key` on the prototype chain.
    fn find_accessor(&self, object: ObjectRef, key: &str) -> EngineResult<Option<Option<NativeFn>>> {
        let mut current = Some(object);

        while let Some(target) = current {
            let object = self.live_object(target)?;
            match object.own(key) {
                Some(Property::Accessor { setter, .. }) => return Ok(Some(setter.clone())),
                Some(Property::Data { .. }) => return Ok(None),
                None => current = object.prototype,
            }
        }

        Ok(None)
    }

    fn set_property(&mut self, object: ObjectRef, key: &str, value: Value) -> EngineResult<()> {
        let mut invalid_length = false;
        {
            let target = self.live_object_mut(object)?;
            if let ObjectData::Array(elements) = &mut target.data {
                let limit = elements.len() + MAX_DENSE_GAP;

                if key == "length" {
                    match value {
                        Value::Number(n) if is_valid_length(n, limit) => {
                            elements.resize(n as usize, Value::Undefined);
                            return Ok(());
                        }
                        Value::Number(_) => invalid_length = true,
                        _ => return Ok(()),
                    }
                } else if let Some(index) = array_index(key).filter(|index| *index <= limit) {
                    if index >= elements.len() {
                        elements.resize(index + 1, Value::Undefined);
                    }
                    elements[index] = value;
                    return Ok(());
                }
            }
        }

        if invalid_length {
            return Err(self.new_error("RangeError", "Invalid array length"));
        }

        if let Some(setter) = self.find_accessor(object, key)? {
            if let Some(setter) = setter {
                setter(self, Value::Object(object), &[value])?;
            }
            return Ok(());
        }

        let target = self.live_object_mut(object)?;
        match target.own_index(key) {
            Some(index) => {
                if let Property::Data { value: slot, .. } = &mut target.properties[index].1 {
                    *slot = value;
                }
            }
            None => target.properties.push((
                key.to_string(),
                Property::Data {
                    value,
                    enumerable: true,
                },
            )),
        }

        Ok(())
    }

    fn has_own_property(&self, object: ObjectRef, key: &str) -> EngineResult<bool> {
        let target = self.live_object(object)?;

        if let ObjectData::Array(elements) = &target.data
            && (key == "length" || array_index(key).is_some_and(|index| index < elements.len()))
        {
            return Ok(true);
        }

        Ok(target.own(key).is_some())
    }

    fn has_property(&self, object: ObjectRef, key: &str) -> EngineResult<bool> {
        let mut current = Some(object);

        while let Some(target) = current {
            if self.has_own_property(target, key)? {
                return Ok(true);
            }
            current = self.live_object(target)?.prototype;
        }

        Ok(false)
    }

    /// Enumerable keys, own only or walking the prototype chain. A key seen
    /// closer to the receiver shadows the same key further up, enumerable or not.
    fn enumerable_keys(&self, object: ObjectRef, own_only: bool) -> EngineResult<Vec<String>> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(object);

        while let Some(target) = current {
            let object = self.live_object(target)?;

            for (key, enumerable) in object.ordered_keys() {
                if seen.insert(key.clone()) && enumerable {
                    names.push(key);
                }
            }

            if own_only {
                break;
            }
            current = object.prototype;
        }

        Ok(names)
    }

    fn call_function(&mut self, function: &Value, receiver: Value, args: &[Value]) -> EngineResult<Value> {
        let native = match function {
            Value::Object(object) => match &self.live_object(*object)?.data {
                ObjectData::Function(native) => Some(native.clone()),
                _ => None,
            },
            _ => None,
        };

        match native {
            Some(native) => native(self, receiver, args),
            None => {
                let message = format!("{} is not a function", type_name(self, function));
                Err(self.type_error(&message))
            }
        }
    }

    fn display_string(&mut self, value: &Value) -> EngineResult<String> {
        let object = match value {
            Value::Undefined => return Ok("undefined".to_string()),
            Value::Null => return Ok("null".to_string()),
            Value::Bool(b) => return Ok(b.to_string()),
            Value::Number(n) => return Ok(number_to_string(*n)),
            Value::String(s) => return Ok(s.clone()),
            Value::Object(object) => *object,
        };

        let to_string = self.get_property(object, "toString")?;
        if !self.is_callable(&to_string) {
            return Err(self.type_error("Cannot convert object to primitive value"));
        }

        match self.call_function(&to_string, value.clone(), &[])? {
            Value::Object(_) => Err(self.type_error("Cannot convert object to primitive value")),
            primitive => self.display_string(&primitive),
        }
    }
}

impl ScriptEngine for Heap {
    fn new_persistent(&mut self, object: ObjectRef) -> PersistentId {
        let id = PersistentId(self.next_persistent);
        self.next_persistent += 1;
        self.persistents.insert(
            id,
            Persistent {
                target: Some(object),
                weak: false,
                finalizer: None,
            },
        );
        id
    }

    fn persistent_target(&self, handle: PersistentId) -> Option<ObjectRef> {
        self.persistents
            .get(&handle)
            .and_then(|p| p.target)
            .filter(|target| self.is_alive(*target))
    }

    fn is_weak(&self, handle: PersistentId) -> bool {
        self.persistents
            .get(&handle)
            .is_some_and(|p| p.weak && p.target.is_some())
    }

    fn set_weak(&mut self, handle: PersistentId, finalizer: Finalizer<Self>) {
        if let Some(persistent) = self.persistents.get_mut(&handle) {
            persistent.weak = true;
            persistent.finalizer = Some(finalizer);
        }
    }

    fn clear_weak(&mut self, handle: PersistentId) {
        if let Some(persistent) = self.persistents.get_mut(&handle) {
            persistent.weak = false;
            persistent.finalizer = None;
        }
    }

    fn reset_persistent(&mut self, handle: PersistentId) {
        self.persistents.remove(&handle);
    }

    fn internal_slot(&self, object: ObjectRef) -> Option<EntityId> {
        self.object(object).and_then(|o| o.slot)
    }

    fn set_internal_slot(&mut self, object: ObjectRef, entity: EntityId) {
        if let Some(target) = self.object_mut(object) {
            target.slot = Some(entity);
        }
    }

    fn adjust_external_memory(&mut self, delta: i64) -> i64 {
        self.external_memory += delta;
        self.external_memory
    }

    fn external_memory(&self) -> i64 {
        self.external_memory
    }

    fn memory_pressure(&self) -> usize {
        self.live * OBJECT_SIZE_ESTIMATE + self.external_memory.max(0) as usize
    }

    fn collect_garbage(&mut self) -> GcStats {
        self.collect()
    }

    fn new_object(&mut self) -> ObjectRef {
        let prototype = self.intrinsics.object_prototype;
        self.alloc(Some(prototype), ObjectData::Ordinary)
    }

    fn new_array(&mut self, elements: Vec<Value>) -> ObjectRef {
        let prototype = self.intrinsics.array_prototype;
        self.alloc(Some(prototype), ObjectData::Array(elements))
    }

    fn get(&mut self, object: ObjectRef, key: &str) -> EngineResult<Value> {
        self.get_property(object, key)
    }

    fn set(&mut self, object: ObjectRef, key: &str, value: Value) -> EngineResult<()> {
        self.set_property(object, key, value)
    }

    fn has(&mut self, object: ObjectRef, key: &str) -> EngineResult<bool> {
        self.has_property(object, key)
    }

    fn has_own(&mut self, object: ObjectRef, key: &str) -> EngineResult<bool> {
        self.has_own_property(object, key)
    }

    fn property_names(&mut self, object: ObjectRef, own_only: bool) -> EngineResult<ObjectRef> {
        let names = self.enumerable_keys(object, own_only)?;
        Ok(self.new_array(names.into_iter().map(Value::String).collect()))
    }

    fn is_callable(&self, value: &Value) -> bool {
        value
            .as_object()
            .and_then(|object| self.object(object))
            .is_some_and(|object| matches!(object.data, ObjectData::Function(_)))
    }

    fn is_array(&self, value: &Value) -> bool {
        value
            .as_object()
            .and_then(|object| self.object(object))
            .is_some_and(|object| matches!(object.data, ObjectData::Array(_)))
    }

    fn call(&mut self, function: &Value, receiver: Value, args: &[Value]) -> EngineResult<Value> {
        self.call_function(function, receiver, args)
    }

    fn to_display_string(&mut self, value: &Value) -> EngineResult<String> {
        self.display_string(value)
    }

    fn json_stringify(&mut self, value: &Value) -> EngineResult<Option<String>> {
        self.stringify(value)
    }
}

impl Drop for Heap {
    /// Teardown runs every outstanding finalizer once, so host references
    /// retained on behalf of weak handles are released.
    fn drop(&mut self) {
        let pending: Vec<(PersistentId, Finalizer<Heap>)> = self
            .persistents
            .iter_mut()
            .filter_map(|(id, p)| p.finalizer.take().map(|f| (*id, f)))
            .collect();

        for (id, finalizer) in pending {
            finalizer(self, id);
        }
    }
}

// ----------------------------------------------------------------------
// Builtins
// ----------------------------------------------------------------------

fn builtin_object_to_string(heap: &mut Heap, this: Value, _: &[Value]) -> EngineResult<Value> {
    let tag = match &this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        value if heap.is_array(value) => "Array",
        value if heap.is_callable(value) => "Function",
        _ => "Object",
    };
    Ok(format!("[object {}]", tag).into())
}

fn builtin_function_to_string(_: &mut Heap, _: Value, _: &[Value]) -> EngineResult<Value> {
    Ok("function () { [native code] }".into())
}

fn builtin_array_join(heap: &mut Heap, this: Value, args: &[Value]) -> EngineResult<Value> {
    let Some(array) = this.as_object() else {
        return builtin_object_to_string(heap, this, args);
    };

    // A cyclic array joins as an empty string where it recurses into itself.
    if heap.join_stack.contains(&array) {
        return Ok("".into());
    }

    let separator = match args.first() {
        Some(Value::Undefined) | None => ",".to_string(),
        Some(separator) => heap.display_string(separator)?,
    };

    heap.join_stack.push(array);
    let joined = join_elements(heap, array, &separator);
    heap.join_stack.pop();

    joined.map(Value::String)
}

fn join_elements(heap: &mut Heap, array: ObjectRef, separator: &str) -> EngineResult<String> {
    let length = heap.array_length(array)?;
    let mut parts = Vec::with_capacity(length);

    for index in 0..length {
        let element = heap.get_property(array, &index.to_string())?;
        if element.is_nullish() {
            parts.push(String::new());
        } else {
            parts.push(heap.display_string(&element)?);
        }
    }

    Ok(parts.join(separator))
}

fn builtin_error_to_string(heap: &mut Heap, this: Value, _: &[Value]) -> EngineResult<Value> {
    let Some(error) = this.as_object() else {
        return Err(heap.type_error("Error.prototype.toString called on non-object"));
    };

    let name = match heap.get_property(error, "name")? {
        Value::Undefined => "Error".to_string(),
        other => heap.display_string(&other)?,
    };
    let message = match heap.get_property(error, "message")? {
        Value::Undefined => String::new(),
        other => heap.display_string(&other)?,
    };

    Ok(match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{}: {}", name, message),
    }
    .into())
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn stale_reference() -> Value {
    Value::String("ReferenceError: object has been collected".to_string())
}

fn type_name(heap: &Heap, value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        value if heap.is_array(value) => "array",
        Value::Object(_) => "object",
    }
}

/// Canonical array index (`"0"`, `"17"`, not `"01"` or `"-1"`).
fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }

    key.parse::<u32>()
        .ok()
        .filter(|index| *index != u32::MAX)
        .map(|index| index as usize)
}

/// Array lengths are whole numbers up to `u32::MAX`, grown at most
/// `MAX_DENSE_GAP` past the current end.
fn is_valid_length(n: f64, limit: usize) -> bool {
    n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 && n as usize <= limit
}

/// ECMAScript `Number::toString` for the values the bridge moves around.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}
