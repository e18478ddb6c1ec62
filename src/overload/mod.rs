//! First-match overload resolution.
//!
//! Candidates are tried in declaration order and the first one whose
//! parameters accept the arguments wins. There is no ranking by
//! specificity: `f(i32)` declared before `f(f64)` always takes a number.
//!
//! Per parameter:
//!
//! - `out` parameters consume no argument and start as `Null`
//! - past the last argument, a default is used, otherwise the candidate
//!   fails (a variadic without a default needs an argument too)
//! - an argument the parameter's extractor accepts is consumed
//! - a variadic that rejects the argument as a whole takes it element-wise
//!   if it is a table, or as a single element otherwise, consuming one slot
//! - a default is used without consuming the argument
//!
//! A candidate matches only if every argument was consumed.

use std::rc::Rc;

use hostbridge_core::{
    BridgeError, CallContext, HostArray, HostRef, HostValue, ParamDirection, ScriptStack, TypeRef, ValueTag,
};
use hostbridge_registry::MethodEntry;

use crate::bridge::Bridge;

/// A candidate with its arguments bound, ready to invoke.
#[derive(Debug, Clone)]
pub struct CandidateBinding {
    pub method: Rc<MethodEntry>,
    /// One value per declared parameter.
    pub args: Vec<HostValue>,
    /// Parameter positions written back to script after the call.
    pub out_slots: Vec<usize>,
}

impl Bridge {
    /// Bind the arguments at `first..first + count` to `method`.
    pub fn match_candidate(
        &self,
        stack: &mut dyn ScriptStack,
        method: &Rc<MethodEntry>,
        first: i32,
        count: i32,
    ) -> Option<CandidateBinding> {
        let end = first + count.max(0);
        let mut cursor = first;
        let params = &method.signature.params;
        let mut args = Vec::with_capacity(params.len());

        for param in params {
            if param.direction == ParamDirection::Out {
                args.push(HostValue::Null);
                continue;
            }
            if cursor >= end {
                args.push(param.default.clone()?);
                continue;
            }
            if let Some(extractor) = self.check_and_get_extractor(stack, cursor, &param.ty) {
                match extractor.extract(self, stack, cursor) {
                    Ok(value) => {
                        args.push(value);
                        cursor += 1;
                        continue;
                    }
                    Err(err) => {
                        log::trace!("{}: argument {cursor} rejected: {err}", method.name);
                        return None;
                    }
                }
            }
            if param.variadic {
                args.push(self.collect_variadic(stack, cursor, param.element_type())?);
                cursor += 1;
                continue;
            }
            args.push(param.default.clone()?);
        }

        if cursor != end {
            return None;
        }
        let out_slots = params
            .iter()
            .enumerate()
            .filter(|(_, param)| param.is_written_back())
            .map(|(slot, _)| slot)
            .collect();
        Some(CandidateBinding {
            method: method.clone(),
            args,
            out_slots,
        })
    }

    /// Variadic elements from the value at `index`: every entry of a table,
    /// or the value itself.
    fn collect_variadic(&self, stack: &mut dyn ScriptStack, index: i32, element: &TypeRef) -> Option<HostValue> {
        let index = stack.abs_index(index);
        let mut items = Vec::new();
        if stack.type_of(index) == ValueTag::Table {
            let base = stack.get_top();
            stack.push_nil();
            while stack.next(index) {
                let item = self
                    .check_and_get_extractor(stack, -1, element)
                    .and_then(|extractor| extractor.extract(self, stack, -1).ok());
                match item {
                    Some(item) => items.push(item),
                    None => {
                        stack.set_top(base);
                        return None;
                    }
                }
                stack.pop(1);
            }
        } else {
            let extractor = self.check_and_get_extractor(stack, index, element)?;
            items.push(extractor.extract(self, stack, index).ok()?);
        }
        Some(HostValue::Object(HostArray::new(element.clone(), items).into_host_ref()))
    }

    /// The first candidate accepting the arguments at `first..first + count`.
    pub fn first_match(
        &self,
        stack: &mut dyn ScriptStack,
        candidates: &[Rc<MethodEntry>],
        first: i32,
        count: i32,
    ) -> Option<CandidateBinding> {
        candidates
            .iter()
            .find_map(|method| self.match_candidate(stack, method, first, count))
    }

    /// The [`BridgeError::NoOverloadMatched`] for a failed resolution.
    pub(crate) fn no_overload(&self, stack: &dyn ScriptStack, member: &str, first: i32, count: i32) -> BridgeError {
        let args = (first..first + count.max(0))
            .map(|index| stack.type_of(index).name())
            .collect::<Vec<_>>()
            .join(", ");
        BridgeError::NoOverloadMatched {
            member: member.to_owned(),
            args,
        }
    }

    /// Pick the first matching candidate or fail with
    /// [`BridgeError::NoOverloadMatched`].
    pub fn resolve_overload(
        &self,
        stack: &mut dyn ScriptStack,
        member: &str,
        candidates: &[Rc<MethodEntry>],
        first: i32,
        count: i32,
    ) -> Result<CandidateBinding, BridgeError> {
        match self.first_match(stack, candidates, first, count) {
            Some(binding) => {
                log::trace!("{member} resolved to {}", binding.method.signature);
                Ok(binding)
            }
            None => {
                let err = self.no_overload(stack, member, first, count);
                log::debug!("{err}");
                Err(err)
            }
        }
    }

    /// Invoke a bound candidate and push its results: the return value, if
    /// any, then every `ref`/`out` slot in parameter order.
    ///
    /// Returns the number of values pushed. When the stack cannot hold them
    /// nothing is pushed and the call reports zero results.
    pub fn invoke_binding(
        &self,
        stack: &mut dyn ScriptStack,
        this: Option<HostRef>,
        binding: CandidateBinding,
    ) -> Result<i32, BridgeError> {
        let CandidateBinding {
            method,
            mut args,
            out_slots,
        } = binding;

        let result = match &method.implementation {
            Some(implementation) => {
                let mut ctx = CallContext::new(&mut *stack, self, this, &mut args);
                implementation(&mut ctx)?
            }
            None => {
                let target = this.ok_or_else(|| {
                    BridgeError::script(format!("'{}' has no implementation to call", method.name))
                })?;
                self.invoke_proxy(stack, &target, Some(&method.name), &mut args)?
            }
        };

        let returns = !method.signature.return_type.is_void();
        let count = usize::from(returns) + out_slots.len();
        if !stack.check_stack(count + self.config.stack_reserve) {
            log::warn!("no stack space for {count} results of '{}'; dropping them", method.name);
            return Ok(0);
        }
        if returns {
            self.push(stack, &result)?;
        }
        for slot in out_slots {
            self.push(stack, &args[slot])?;
        }
        Ok(count as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryState;
    use hostbridge_core::{HostFault, NativeFn, TypeHash};
    use hostbridge_registry::{TypeRegistry, parse_method};

    fn candidate(decl: &str) -> Rc<MethodEntry> {
        candidate_with(decl, None)
    }

    fn candidate_with(decl: &str, implementation: Option<NativeFn>) -> Rc<MethodEntry> {
        let parsed = parse_method(decl).unwrap();
        Rc::new(MethodEntry {
            name: parsed.name,
            signature: parsed.signature,
            is_static: true,
            declaring_type: TypeHash::EMPTY,
            implementation,
        })
    }

    fn bridge() -> Rc<Bridge> {
        Bridge::new(TypeRegistry::new()).unwrap()
    }

    fn matched(bridge: &Bridge, s: &mut MemoryState, candidates: &[Rc<MethodEntry>]) -> Option<usize> {
        let top = s.get_top();
        let binding = bridge.first_match(s, candidates, 1, top)?;
        candidates.iter().position(|c| Rc::ptr_eq(c, &binding.method))
    }

    #[test]
    fn declaration_order_decides() {
        let bridge = bridge();
        let candidates = [
            candidate("void f(i32 a)"),
            candidate("void f(i32 a, i32 b)"),
            candidate("void f(string s)"),
        ];
        let mut s = MemoryState::new();
        s.push_number(1.0);
        s.push_number(2.0);
        assert_eq!(matched(&bridge, &mut s, &candidates), Some(1));

        s.set_top(0);
        s.push_number(1.0);
        assert_eq!(matched(&bridge, &mut s, &candidates), Some(0));

        s.set_top(0);
        s.push_string("x");
        assert_eq!(matched(&bridge, &mut s, &candidates), Some(2));

        // f(f64) after f(i32) never wins
        let shadowed = [candidate("void g(i32 a)"), candidate("void g(f64 a)")];
        s.set_top(0);
        s.push_number(1.5);
        assert_eq!(matched(&bridge, &mut s, &shadowed), Some(0));
    }

    #[test]
    fn extra_and_missing_arguments_fail() {
        let bridge = bridge();
        let candidates = [candidate("void f(i32 a)")];
        let mut s = MemoryState::new();
        assert_eq!(matched(&bridge, &mut s, &candidates), None);
        s.push_number(1.0);
        s.push_number(2.0);
        assert_eq!(matched(&bridge, &mut s, &candidates), None);
    }

    #[test]
    fn defaults_fill_missing_and_rejected_arguments() {
        let bridge = bridge();
        let method = candidate("void f(i32 a, string label = \"none\")");
        let mut s = MemoryState::new();
        s.push_number(3.0);
        let binding = bridge.match_candidate(&mut s, &method, 1, 1).unwrap();
        assert_eq!(binding.args, vec![HostValue::I32(3), HostValue::from("none")]);

        // a default does not consume a rejected argument
        s.push_boolean(true);
        assert!(bridge.match_candidate(&mut s, &method, 1, 2).is_none());
    }

    #[test]
    fn out_parameters_consume_nothing() {
        let bridge = bridge();
        let method = candidate("void f(i32 a, out i32 b, ref string c)");
        let mut s = MemoryState::new();
        s.push_number(1.0);
        s.push_string("c");
        let binding = bridge.match_candidate(&mut s, &method, 1, 2).unwrap();
        assert_eq!(binding.args, vec![HostValue::I32(1), HostValue::Null, HostValue::from("c")]);
        assert_eq!(binding.out_slots, vec![1, 2]);
    }

    #[test]
    fn variadics_take_a_scalar_or_a_table() {
        let bridge = bridge();
        let method = candidate("i32 sum(string label, params i32 values)");
        let mut s = MemoryState::new();
        let items = |binding: &CandidateBinding| -> Vec<HostValue> {
            let array = binding.args[1].as_object().unwrap().borrow::<HostArray>().unwrap();
            array.items().to_vec()
        };

        s.push_string("one");
        s.push_number(7.0);
        let binding = bridge.match_candidate(&mut s, &method, 1, 2).unwrap();
        assert_eq!(items(&binding), vec![HostValue::I32(7)]);

        s.set_top(1);
        s.new_table();
        for (i, n) in [4.0, 5.0, 6.0].into_iter().enumerate() {
            s.push_number(i as f64 + 1.0);
            s.push_number(n);
            s.raw_set(2);
        }
        let binding = bridge.match_candidate(&mut s, &method, 1, 2).unwrap();
        assert_eq!(items(&binding), vec![HostValue::I32(4), HostValue::I32(5), HostValue::I32(6)]);
        assert_eq!(s.get_top(), 2);

        // no argument left for the variadic
        s.set_top(1);
        assert!(bridge.match_candidate(&mut s, &method, 1, 1).is_none());

        // a variadic takes exactly one slot
        s.push_number(1.0);
        s.push_number(2.0);
        assert!(bridge.match_candidate(&mut s, &method, 1, 3).is_none());
    }

    #[test]
    fn variadic_needs_an_argument() {
        let bridge = bridge();
        let candidates = [candidate("void f(params i32 values)"), candidate("void f()")];
        let mut s = MemoryState::new();
        assert_eq!(matched(&bridge, &mut s, &candidates), Some(1));

        s.push_number(1.0);
        assert_eq!(matched(&bridge, &mut s, &candidates), Some(0));
    }

    #[test]
    fn variadic_table_with_a_bad_element_fails() {
        let bridge = bridge();
        let method = candidate("void f(params i32 values)");
        let mut s = MemoryState::new();
        s.new_table();
        s.push_number(1.0);
        s.push_string("x");
        s.raw_set(1);
        assert!(bridge.match_candidate(&mut s, &method, 1, 1).is_none());
        assert_eq!(s.get_top(), 1);
    }

    #[test]
    fn no_overload_names_the_arguments() {
        let bridge = bridge();
        let mut s = MemoryState::new();
        s.push_number(2.0);
        s.push_string("b");
        let err = bridge
            .resolve_overload(&mut s, "T.add", &[candidate("i32 add(i32 a, i32 b)")], 1, 2)
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::NoOverloadMatched {
                member: "T.add".into(),
                args: "number, string".into()
            }
        );
    }

    #[test]
    fn invoke_pushes_return_then_out_slots() {
        let bridge = bridge();
        let implementation: NativeFn = Rc::new(|ctx: &mut CallContext<'_>| {
            let a: i32 = ctx.arg(0)?;
            ctx.set_arg(1, a * 10)?;
            Ok(HostValue::Bool(a > 0))
        });
        let method = candidate_with("bool f(i32 a, out i32 b)", Some(implementation));
        let mut s = MemoryState::new();
        s.push_number(4.0);
        let binding = bridge.match_candidate(&mut s, &method, 1, 1).unwrap();
        assert_eq!(bridge.invoke_binding(&mut s, None, binding).unwrap(), 2);
        assert_eq!(s.get_top(), 3);
        assert!(s.to_boolean(2));
        assert_eq!(s.to_number(3), Some(40.0));
    }

    #[test]
    fn host_faults_propagate() {
        let bridge = bridge();
        let implementation: NativeFn = Rc::new(|_: &mut CallContext<'_>| {
            Err(HostFault::invocation(HostFault::new("IoError", "disk full")))
        });
        let method = candidate_with("void f()", Some(implementation));
        let mut s = MemoryState::new();
        let binding = bridge.match_candidate(&mut s, &method, 1, 0).unwrap();
        let err = bridge.invoke_binding(&mut s, None, binding).unwrap_err();
        assert_eq!(err.host_fault().map(|f| f.type_name()), Some("IoError"));
    }

    #[test]
    fn results_are_dropped_without_stack_space() {
        let bridge = Bridge::with_config(
            TypeRegistry::new(),
            crate::BridgeConfig::default().with_stack_reserve(100),
        )
        .unwrap();
        let implementation: NativeFn = Rc::new(|_: &mut CallContext<'_>| Ok(HostValue::I32(1)));
        let method = candidate_with("i32 f()", Some(implementation));
        let mut s = MemoryState::with_config(crate::StateConfig::default().with_max_stack(50));
        let binding = bridge.match_candidate(&mut s, &method, 1, 0).unwrap();
        assert_eq!(bridge.invoke_binding(&mut s, None, binding).unwrap(), 0);
        assert_eq!(s.get_top(), 0);
    }
}
