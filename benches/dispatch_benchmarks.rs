//! Benchmarks for the script → host call path.
//!
//! - `push_object`: handle lookup and userdata reuse
//! - `method_call`: member lookup, overload resolution and invocation
//! - `overload_fallthrough`: a call that matches the last of several overloads
//! - `field_access`: property getter through `__index`
//!
//! ```bash
//! cargo bench --bench dispatch_benchmarks
//! ```

use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};
use hostbridge::{Bridge, HostValue, MULTRET, MemoryState, ScriptStack, TypeRegistry};

struct Vec2 {
    x: f64,
    y: f64,
}

fn setup() -> (Rc<Bridge>, MemoryState) {
    let mut registry = TypeRegistry::new();
    registry
        .class::<Vec2>("Bench.Vec2")
        .constructor("(f64 x, f64 y)", |ctx| Ok(Vec2 { x: ctx.arg(0)?, y: ctx.arg(1)? }))
        .expect("constructor")
        .field("f64 X", |v: &Vec2| v.x, |v: &mut Vec2, x: f64| v.x = x)
        .expect("field")
        .method("f64 dot(f64 x, f64 y)", |ctx| {
            let (x, y): (f64, f64) = (ctx.arg(0)?, ctx.arg(1)?);
            let v = ctx.this_ref::<Vec2>()?;
            Ok(v.x * x + v.y * y)
        })
        .expect("method")
        .method("string scale(string s)", |_| Ok("string"))
        .expect("method")
        .method("string scale(bool b)", |_| Ok("bool"))
        .expect("method")
        .method("f64 scale(f64 k)", |ctx| ctx.arg::<f64>(0))
        .expect("method")
        .build()
        .expect("build");
    let bridge = Bridge::new(registry).expect("bridge");
    let mut state = MemoryState::new();
    let v = bridge.registry().wrap(Vec2 { x: 1.0, y: 2.0 }).expect("wrap");
    bridge
        .set_global(&mut state, "v", &HostValue::Object(v))
        .expect("global");
    (bridge, state)
}

fn call(state: &mut MemoryState, method: &str, args: &[f64]) {
    state.get_global("v").expect("global");
    state.get_field(-1, method).expect("member");
    state.insert(-2);
    for &arg in args {
        state.push_number(arg);
    }
    state.pcall(args.len() as i32 + 1, MULTRET).expect("call");
    state.set_top(0);
}

fn bench_push_object(c: &mut Criterion) {
    let (bridge, mut state) = setup();
    let v = bridge.registry().wrap(Vec2 { x: 0.0, y: 0.0 }).expect("wrap");
    let value = HostValue::Object(v);
    c.bench_function("push_object", |b| {
        b.iter(|| {
            bridge.push(&mut state, black_box(&value)).expect("push");
            state.set_top(0);
        })
    });
}

fn bench_method_call(c: &mut Criterion) {
    let (_bridge, mut state) = setup();
    c.bench_function("method_call", |b| b.iter(|| call(&mut state, "dot", black_box(&[3.0, 4.0]))));
}

fn bench_overload_fallthrough(c: &mut Criterion) {
    let (_bridge, mut state) = setup();
    c.bench_function("overload_fallthrough", |b| b.iter(|| call(&mut state, "scale", black_box(&[2.0]))));
}

fn bench_field_access(c: &mut Criterion) {
    let (_bridge, mut state) = setup();
    c.bench_function("field_access", |b| {
        b.iter(|| {
            state.get_global("v").expect("global");
            state.get_field(-1, black_box("X")).expect("field");
            state.set_top(0);
        })
    });
}

criterion_group!(
    benches,
    bench_push_object,
    bench_method_call,
    bench_overload_fallthrough,
    bench_field_access
);
criterion_main!(benches);
