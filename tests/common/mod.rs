#![allow(dead_code)]

use std::rc::Rc;
use std::sync::Arc;

use object_bridge::engine::NativeFn;
use object_bridge::{
    Bridge, BridgeConfig, ClassRegistry, Heap, ObjectKind, ObjectRef, ScriptEngine, StaticRegistry, Value,
};

pub const POINT: &str = "app.Point";
pub const POINT_3D: &str = "app.geometry.Point3D";
pub const HANDLE: &str = "app.Handle";
pub const GENERIC: &str = "app.Object";

/// Shared prototype for points, created once and kept on the global object.
///
/// Methods: `sum()`, `scale(factor)`, `fail()` (throws). `kind` is an
/// enumerable inherited property and `broken` an accessor whose getter throws.
fn point_prototype(heap: &mut Heap) -> Result<ObjectRef, Value> {
    let global = heap.global();
    if let Value::Object(prototype) = heap.get(global, "PointPrototype")? {
        return Ok(prototype);
    }

    let prototype = heap.new_object();
    heap.set(prototype, "kind", "point".into())?;

    let sum = heap.new_function(|heap, this, _| {
        let this = this.as_object().ok_or_else(|| heap.type_error("sum called on non-object"))?;
        Ok(Value::Number(number(heap.get(this, "x")?) + number(heap.get(this, "y")?)))
    });
    heap.define_hidden(prototype, "sum", sum.into());

    let scale = heap.new_function(|heap, this, args| {
        let this = this.as_object().ok_or_else(|| heap.type_error("scale called on non-object"))?;
        let factor = args.first().cloned().map(number).unwrap_or(1.0);
        let x = number(heap.get(this, "x")?) * factor;
        let y = number(heap.get(this, "y")?) * factor;
        Ok(heap.new_array(vec![x.into(), y.into()]).into())
    });
    heap.define_hidden(prototype, "scale", scale.into());

    let fail = heap.new_function(|heap, _, _| Err(heap.new_error("Error", "point failure")));
    heap.define_hidden(prototype, "fail", fail.into());

    let broken: NativeFn = Rc::new(|heap: &mut Heap, _: Value, _: &[Value]| {
        Err(heap.new_error("RangeError", "broken getter"))
    });
    heap.define_accessor(prototype, "broken", Some(broken), None);

    heap.set(global, "PointPrototype", prototype.into())?;
    Ok(prototype)
}

fn number(value: Value) -> f64 {
    match value {
        Value::Number(n) => n,
        _ => f64::NAN,
    }
}

fn new_point(heap: &mut Heap) -> Result<ObjectRef, Value> {
    let prototype = point_prototype(heap)?;
    let point = heap.new_object_with_prototype(Some(prototype));
    heap.set(point, "x", 3.0.into())?;
    heap.set(point, "y", 4.0.into())?;
    Ok(point)
}

pub fn registry() -> Arc<dyn ClassRegistry<Heap>> {
    let registry = StaticRegistry::<Heap>::builder()
        .register(POINT, ObjectKind::Ordinary, new_point)
        .register_subclass(POINT_3D, "app/Point")
        .expect("base class registered")
        .register(HANDLE, ObjectKind::Wrapper, |heap: &mut Heap| Ok(heap.new_object()))
        .register(GENERIC, ObjectKind::Ordinary, |heap: &mut Heap| Ok(heap.new_object()))
        .generic(GENERIC)
        .build()
        .expect("registry builds");

    Arc::new(registry)
}

pub fn bridge() -> Bridge<Heap> {
    bridge_with(BridgeConfig::default())
}

pub fn bridge_with(config: BridgeConfig) -> Bridge<Heap> {
    Bridge::with_config(Heap::with_config(&config), registry(), config)
}

/// Make `object` reachable from script under `name`.
pub fn root(bridge: &mut Bridge<Heap>, name: &str, object: ObjectRef) {
    let global = bridge.engine().global();
    bridge.engine_mut().set(global, name, object.into()).unwrap();
}

/// Drop the script-side reference installed by [`root`].
pub fn unroot(bridge: &mut Bridge<Heap>, name: &str) {
    let global = bridge.engine().global();
    bridge.engine_mut().delete(global, name);
}
