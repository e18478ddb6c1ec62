//! Shared fixtures for the integration tests.
//!
//! `Demo.Calc` exercises overloads, out parameters and variadics;
//! `Demo.Adder` is a script-implementable interface consumed by the static
//! host method `Demo.Calc.run`.

#![allow(dead_code)]

use std::rc::Rc;

use hostbridge::{Bridge, BridgeError, HostArray, HostFault, HostRef, HostValue, MULTRET, MemoryState, ScriptStack, TypeRegistry};

#[derive(Debug, Default)]
pub struct Calc {
    pub total: i32,
}

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .interface("Demo.Adder")
        .abstract_method("i32 test1(i32 x, i32 y)")
        .unwrap()
        .build()
        .unwrap();
    registry
        .class::<Calc>("Demo.Calc")
        .constructor("()", |_| Ok(Calc::default()))
        .unwrap()
        .constructor("(i32 total)", |ctx| Ok(Calc { total: ctx.arg(0)? }))
        .unwrap()
        .field("i32 Total", |c: &Calc| c.total, |c: &mut Calc, v: i32| c.total = v)
        .unwrap()
        .method("i32 add(i32 a, i32 b)", |ctx| Ok(ctx.arg::<i32>(0)? + ctx.arg::<i32>(1)?))
        .unwrap()
        .method("string add(string a, string b)", |ctx| {
            Ok(ctx.arg::<String>(0)? + &ctx.arg::<String>(1)?)
        })
        .unwrap()
        .method("string f(i32 a)", |_| Ok("f(i32)"))
        .unwrap()
        .method("string f(i32 a, i32 b)", |_| Ok("f(i32, i32)"))
        .unwrap()
        .method("string f(string s)", |_| Ok("f(string)"))
        .unwrap()
        .method("string g(f64 x)", |_| Ok("g(f64)"))
        .unwrap()
        .method("string g(i32 x)", |_| Ok("g(i32)"))
        .unwrap()
        .method("i32 half(i32 a, out i32 rest)", |ctx| {
            let a: i32 = ctx.arg(0)?;
            ctx.set_arg(1, a % 2)?;
            Ok(a / 2)
        })
        .unwrap()
        .method("i32 sum(params i32 values)", |ctx| {
            let values: HostRef = ctx.arg(0)?;
            let array = values
                .borrow::<HostArray>()
                .ok_or_else(|| HostFault::msg("expected an array"))?;
            Ok(array.items().iter().filter_map(HostValue::as_integer).sum::<i128>() as i32)
        })
        .unwrap()
        .method("void accumulate(i32 n)", |ctx| {
            let n: i32 = ctx.arg(0)?;
            ctx.this_mut::<Calc>()?.total += n;
            Ok(())
        })
        .unwrap()
        .method("static i32 run(Demo.Adder adder, i32 x, i32 y)", |ctx| {
            let adder: HostRef = ctx.arg(0)?;
            let mut args = [HostValue::I32(ctx.arg(1)?), HostValue::I32(ctx.arg(2)?)];
            let result = ctx.invoke(&adder, Some("test1"), &mut args)?;
            result
                .as_integer()
                .map(|n| n as i32)
                .ok_or_else(|| HostFault::msg("test1 returned a non-integer"))
        })
        .unwrap()
        .build()
        .unwrap();
    registry
}

pub fn setup() -> (Rc<Bridge>, MemoryState) {
    let bridge = Bridge::new(registry()).unwrap();
    let mut s = MemoryState::new();
    bridge.import_type(&mut s, "Demo.Calc").unwrap();
    s.set_global("Calc").unwrap();
    (bridge, s)
}

/// Collect the values above `base`, then truncate to it.
fn results(bridge: &Bridge, s: &mut MemoryState, base: i32) -> Vec<HostValue> {
    let values = (base + 1..=s.get_top()).map(|i| bridge.get_object(s, i)).collect();
    s.set_top(base);
    values
}

/// Push `global.member`, the receiver when `with_self`, and `args`, then call.
fn push_and_call(
    bridge: &Bridge,
    s: &mut MemoryState,
    global: &str,
    member: &str,
    with_self: bool,
    args: &[HostValue],
) -> Result<(), BridgeError> {
    s.get_global(global)?;
    s.get_field(-1, member)?;
    if with_self {
        s.insert(-2);
    } else {
        s.remove(-2);
    }
    for arg in args {
        bridge.push(s, arg)?;
    }
    s.pcall(args.len() as i32 + i32::from(with_self), MULTRET)
}

/// `global:method(args...)`
pub fn call_method(
    bridge: &Bridge,
    s: &mut MemoryState,
    global: &str,
    method: &str,
    args: &[HostValue],
) -> Result<Vec<HostValue>, BridgeError> {
    let base = s.get_top();
    match push_and_call(bridge, s, global, method, true, args) {
        Ok(()) => Ok(results(bridge, s, base)),
        Err(err) => {
            s.set_top(base);
            Err(err)
        }
    }
}

/// `global.member(args...)`
pub fn call_field(
    bridge: &Bridge,
    s: &mut MemoryState,
    global: &str,
    member: &str,
    args: &[HostValue],
) -> Result<Vec<HostValue>, BridgeError> {
    let base = s.get_top();
    match push_and_call(bridge, s, global, member, false, args) {
        Ok(()) => Ok(results(bridge, s, base)),
        Err(err) => {
            s.set_top(base);
            Err(err)
        }
    }
}

/// `global = Calc.new(args...)`, returning the host object.
pub fn construct(bridge: &Bridge, s: &mut MemoryState, global: &str, args: &[HostValue]) -> HostRef {
    let mut values = call_field(bridge, s, "Calc", "new", args).unwrap();
    let Some(HostValue::Object(calc)) = values.pop() else {
        panic!("expected a host object");
    };
    bridge.set_global(s, global, &HostValue::Object(calc.clone())).unwrap();
    calc
}

/// Read `global.member`.
pub fn get_member(bridge: &Bridge, s: &mut MemoryState, global: &str, member: &str) -> Result<HostValue, BridgeError> {
    let base = s.get_top();
    let result = s.get_global(global).and_then(|()| s.get_field(-1, member));
    let value = result.map(|()| bridge.get_object(s, -1));
    s.set_top(base);
    value
}
