//! Script driving host objects end to end, and object lifetime across the
//! boundary.

mod common;

use std::rc::Rc;

use common::{Calc, call_field, call_method, construct, get_member, registry, setup};
use hostbridge::{Bridge, BridgeConfig, BridgeError, HostValue, MemoryState, ScriptStack};

#[test]
fn construct_and_call() {
    let (bridge, mut s) = setup();
    let calc = construct(&bridge, &mut s, "calc", &[]);
    assert!(calc.is::<Calc>());

    let sum = call_method(&bridge, &mut s, "calc", "add", &[HostValue::I32(2), HostValue::I32(3)]).unwrap();
    assert_eq!(sum, vec![HostValue::F64(5.0)]);

    let joined = call_method(&bridge, &mut s, "calc", "add", &["a".into(), "b".into()]).unwrap();
    assert_eq!(joined, vec![HostValue::from("ab")]);

    let err = call_method(&bridge, &mut s, "calc", "add", &[HostValue::I32(2), "b".into()]).unwrap_err();
    let BridgeError::NoOverloadMatched { member, args } = err else {
        panic!("expected no overload match");
    };
    assert_eq!(member, "Demo.Calc.add");
    assert_eq!(args, "number, string");
    assert_eq!(s.get_top(), 0);
}

#[test]
fn constructor_overloads_and_fields() {
    let (bridge, mut s) = setup();
    let calc = construct(&bridge, &mut s, "calc", &[HostValue::I32(40)]);
    assert_eq!(get_member(&bridge, &mut s, "calc", "Total").unwrap(), HostValue::F64(40.0));

    call_method(&bridge, &mut s, "calc", "accumulate", &[HostValue::I32(2)]).unwrap();
    assert_eq!(calc.borrow::<Calc>().map(|c| c.total), Some(42));

    s.get_global("calc").unwrap();
    s.push_number(7.0);
    s.set_field(-2, "total").unwrap();
    s.set_top(0);
    assert_eq!(calc.borrow::<Calc>().map(|c| c.total), Some(7));

    s.get_global("calc").unwrap();
    s.push_string("seven");
    assert!(s.set_field(-2, "Total").is_err());
    assert_eq!(calc.borrow::<Calc>().map(|c| c.total), Some(7));
}

#[test]
fn case_sensitive_lookup_can_be_configured() {
    let bridge = Bridge::with_config(registry(), BridgeConfig::default().with_case_insensitive_members(false)).unwrap();
    let mut s = MemoryState::new();
    bridge.import_type(&mut s, "Demo.Calc").unwrap();
    s.set_global("Calc").unwrap();
    construct(&bridge, &mut s, "calc", &[]);

    assert!(get_member(&bridge, &mut s, "calc", "Total").is_ok());
    let err = get_member(&bridge, &mut s, "calc", "total").unwrap_err();
    assert!(err.is_member_not_found());
}

#[test]
fn script_tables_implement_host_interfaces() {
    let (bridge, mut s) = setup();
    s.new_table();
    s.push_function(Rc::new(|s: &mut dyn ScriptStack| {
        let x = s.to_number(2).unwrap_or_default();
        let y = s.to_number(3).unwrap_or_default();
        s.push_number(x + y);
        Ok::<i32, BridgeError>(1)
    }));
    s.raw_set_field(-2, "test1");
    s.set_global("adder").unwrap();

    let adder = bridge.get_global(&mut s, "adder").unwrap();
    let result = call_field(&bridge, &mut s, "Calc", "run", &[adder, HostValue::I32(2), HostValue::I32(3)]).unwrap();
    assert_eq!(result, vec![HostValue::F64(5.0)]);

    // a table without the method fails inside the host call
    s.new_table();
    s.set_global("empty").unwrap();
    let empty = bridge.get_global(&mut s, "empty").unwrap();
    let err = call_field(&bridge, &mut s, "Calc", "run", &[empty, HostValue::I32(2), HostValue::I32(3)]).unwrap_err();
    assert!(matches!(err, BridgeError::HostInvocation(_)), "{err}");
    assert_eq!(s.get_top(), 0);
}

#[test]
fn host_calls_script_functions() {
    let (bridge, mut s) = setup();
    s.push_function(Rc::new(|s: &mut dyn ScriptStack| {
        let n = s.to_number(1).unwrap_or_default();
        s.push_number(n * 2.0);
        s.push_string("done");
        Ok::<i32, BridgeError>(2)
    }));
    s.set_global("double").unwrap();
    let HostValue::Function(double) = bridge.get_global(&mut s, "double").unwrap() else {
        panic!("expected a function");
    };
    let results = bridge.call_function(&mut s, &double, &[HostValue::I32(21)]).unwrap();
    assert_eq!(results, vec![HostValue::F64(42.0), HostValue::from("done")]);
    assert_eq!(s.get_top(), 0);
}

// ----------------------------------------------------------------------
// Lifetime
// ----------------------------------------------------------------------

#[test]
fn collected_userdata_reclaims_its_handle() {
    let (bridge, mut s) = setup();
    let calc = bridge.registry().wrap(Calc::default()).unwrap();
    bridge.push(&mut s, &HostValue::Object(calc.clone())).unwrap();
    assert!(bridge.handle_of(&calc).is_some());
    let before = bridge.live_handles();

    s.set_top(0);
    s.collect_garbage();
    assert!(bridge.handle_of(&calc).is_none());
    assert_eq!(bridge.live_handles(), before - 1);
    // the host keeps its object
    assert_eq!(calc.strong_count(), 1);
}

#[test]
fn reachable_userdata_survives_collection() {
    let (bridge, mut s) = setup();
    let calc = construct(&bridge, &mut s, "calc", &[]);
    s.collect_garbage();
    assert!(bridge.handle_of(&calc).is_some());
    let sum = call_method(&bridge, &mut s, "calc", "add", &[HostValue::I32(1), HostValue::I32(1)]).unwrap();
    assert_eq!(sum, vec![HostValue::F64(2.0)]);
}

#[test]
fn detached_objects_go_stale() {
    let (bridge, mut s) = setup();
    let calc = construct(&bridge, &mut s, "calc", &[]);
    assert!(bridge.detach(&mut s, &calc).is_some());
    assert!(bridge.detach(&mut s, &calc).is_none());

    let err = call_method(&bridge, &mut s, "calc", "add", &[HostValue::I32(1), HostValue::I32(1)]).unwrap_err();
    assert!(matches!(err, BridgeError::StaleHandle { .. }), "{err}");
    assert!(err.is_member_not_found());
    assert_eq!(bridge.get_global(&mut s, "calc").unwrap(), HostValue::Null);

    // pushing again yields a fresh userdata
    bridge.push(&mut s, &HostValue::Object(calc.clone())).unwrap();
    s.get_global("calc").unwrap();
    assert!(!s.raw_equal(1, 2));
}

#[test]
fn teardown_invalidates_then_closes() {
    let (bridge, mut s) = setup();
    construct(&bridge, &mut s, "a", &[]);
    construct(&bridge, &mut s, "b", &[]);
    assert!(bridge.live_handles() >= 2);

    bridge.invalidate();
    assert_eq!(bridge.live_handles(), 0);
    let err = get_member(&bridge, &mut s, "a", "Total").unwrap_err();
    assert!(err.is_member_not_found());

    // finalizers run against an empty table
    s.close();
    assert_eq!(bridge.live_handles(), 0);
}

#[test]
fn bridges_do_not_share_handles() {
    let (first, mut s1) = setup();
    let (second, mut s2) = setup();
    let calc = first.registry().wrap(Calc::default()).unwrap();
    first.push(&mut s1, &HostValue::Object(calc.clone())).unwrap();
    assert!(first.handle_of(&calc).is_some());
    assert!(second.handle_of(&calc).is_none());

    second.push(&mut s2, &HostValue::Object(calc.clone())).unwrap();
    assert_eq!(first.live_handles(), second.live_handles());
}
