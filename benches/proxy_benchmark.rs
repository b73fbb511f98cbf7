//! Benchmarks for host-side proxy access
//!
//! Measures:
//! - Field reads and method calls through the proxy
//! - JSON serialization of a linked object
//! - Collection with many weak entities
//! - Round trip through the engine thread

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use object_bridge::{
    Bridge, BridgeConfig, EngineThread, Heap, HostEntity, HostValue, ObjectKind, ScriptEngine, StaticRegistry, Value,
};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

const POINT: &str = "bench.Point";

fn new_bridge() -> Bridge<Heap> {
    let registry = StaticRegistry::<Heap>::builder()
        .register(POINT, ObjectKind::Ordinary, |heap: &mut Heap| {
            let point = heap.new_object();
            heap.set(point, "x", 3.0.into())?;
            heap.set(point, "y", 4.0.into())?;

            let sum = heap.new_function(|heap, this, _| {
                let Some(this) = this.as_object() else {
                    return Ok(Value::Undefined);
                };
                match (heap.get(this, "x")?, heap.get(this, "y")?) {
                    (Value::Number(x), Value::Number(y)) => Ok(Value::Number(x + y)),
                    _ => Ok(Value::Undefined),
                }
            });
            heap.define_hidden(point, "sum", sum.into());
            Ok(point)
        })
        .build()
        .unwrap();

    Bridge::new(Heap::new(), Arc::new(registry))
}

fn linked_entity(bridge: &mut Bridge<Heap>) -> HostEntity {
    let entity = bridge.create_entity(&POINT.into()).unwrap();
    bridge.get_script_object(&entity).unwrap();
    entity
}

fn bench_proxy_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("Proxy");
    let mut bridge = new_bridge();
    let entity = linked_entity(&mut bridge);

    group.bench_function("get_field", |b| {
        b.iter(|| black_box(bridge.proxy(&entity).get_field("x").unwrap()));
    });

    group.bench_function("set_field", |b| {
        b.iter(|| bridge.proxy(&entity).set_field("x", black_box(5.0)).unwrap());
    });

    group.bench_function("call_method", |b| {
        b.iter(|| black_box(bridge.proxy(&entity).call_method("sum", &[]).unwrap()));
    });

    group.bench_function("to_json_string", |b| {
        b.iter(|| black_box(bridge.proxy(&entity).to_json_string().unwrap()));
    });

    group.finish();
}

fn bench_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("Collection");

    for count in [100usize, 1000] {
        group.bench_with_input(BenchmarkId::new("finalize_and_resurrect", count), &count, |b, &count| {
            let mut bridge = new_bridge();
            let entities: Vec<_> = (0..count).map(|_| linked_entity(&mut bridge)).collect();

            b.iter(|| {
                // Re-arm every weak handle, then let the collector finalize them
                for entity in &entities {
                    bridge.promote_to_weak(entity);
                }
                black_box(bridge.collect_garbage())
            });
        });
    }

    group.finish();
}

fn bench_engine_thread(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let thread = EngineThread::spawn(BridgeConfig::default(), |_| Ok(new_bridge())).unwrap();
    let entity = thread.run_blocking(linked_entity).unwrap();

    c.bench_function("engine_thread_round_trip", |b| {
        b.to_async(&rt).iter(|| {
            let entity = entity.clone();
            let thread = &thread;
            async move {
                let value = thread
                    .run(move |bridge| bridge.proxy(&entity).get_field("y"))
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(value, HostValue::Number(4.0));
            }
        });
    });
}

criterion_group!(benches, bench_proxy_access, bench_collection, bench_engine_thread);
criterion_main!(benches);
