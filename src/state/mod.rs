//! In-memory reference interpreter implementing [`ScriptStack`].
//!
//! `MemoryState` has no parser or bytecode: "script" is driven through the
//! stack API, and script functions are native closures. It implements the
//! parts of a Lua-style runtime the bridge depends on: frames, tables with
//! metatables (`__index`, `__newindex`, `__call`, `__gc`, `__mode`), full
//! userdata, a registry with integer references and named metatables,
//! protected calls and a mark-and-sweep collector that clears weak values
//! and runs finalizers before freeing.

mod table;

use std::rc::Rc;

use hostbridge_core::{BridgeError, NativeFunction, RegistryRef, ScriptStack, ValueTag};

use crate::config::StateConfig;
use table::{Key, ObjId, Table, Value};

/// Longest `__index`/`__newindex` chain followed before giving up.
const MAX_META_CHAIN: usize = 100;

#[derive(Debug)]
struct UserData {
    payload: u64,
    metatable: Option<ObjId>,
}

/// Arena with slot reuse.
struct Arena<T> {
    slots: Vec<Option<T>>,
    free: Vec<ObjId>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    fn alloc(&mut self, value: T) -> ObjId {
        if let Some(id) = self.free.pop() {
            self.slots[id] = Some(value);
            id
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    fn get(&self, id: ObjId) -> Option<&T> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: ObjId) -> Option<&mut T> {
        self.slots.get_mut(id).and_then(Option::as_mut)
    }

    fn free(&mut self, id: ObjId) {
        if let Some(slot) = self.slots.get_mut(id)
            && slot.take().is_some()
        {
            self.free.push(id);
        }
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

/// Reference interpreter state.
pub struct MemoryState {
    config: StateConfig,
    stack: Vec<Value>,
    /// Base slot of every active frame; the first is the host frame.
    frames: Vec<usize>,
    tables: Arena<Table>,
    functions: Arena<NativeFunction>,
    userdata: Arena<UserData>,
    globals: ObjId,
    registry: ObjId,
    free_refs: Vec<i32>,
    next_ref: i32,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    pub fn new() -> Self {
        Self::with_config(StateConfig::default())
    }

    pub fn with_config(config: StateConfig) -> Self {
        let mut tables = Arena::default();
        let globals = tables.alloc(Table::default());
        let registry = tables.alloc(Table::default());
        Self {
            config,
            stack: Vec::new(),
            frames: vec![0],
            tables,
            functions: Arena::default(),
            userdata: Arena::default(),
            globals,
            registry,
            free_refs: Vec::new(),
            next_ref: 1,
        }
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Push the global `name`.
    pub fn get_global(&mut self, name: &str) -> Result<(), BridgeError> {
        self.push_globals();
        self.get_field(-1, name)?;
        self.remove(-2);
        Ok(())
    }

    /// Pop a value and assign it to the global `name`.
    pub fn set_global(&mut self, name: &str) -> Result<(), BridgeError> {
        self.push_globals();
        self.insert(-2);
        self.set_field(-2, name)?;
        self.pop(1);
        Ok(())
    }

    /// Number of native frames currently executing.
    pub fn call_depth(&self) -> usize {
        self.frames.len() - 1
    }

    /// Number of live full userdata.
    pub fn live_userdata(&self) -> usize {
        self.userdata.live()
    }

    /// Number of live tables (globals and registry included).
    pub fn live_tables(&self) -> usize {
        self.tables.live()
    }

    // ------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------

    fn base(&self) -> usize {
        self.frames.last().copied().unwrap_or(0)
    }

    fn slot(&self, index: i32) -> Option<usize> {
        let base = self.base();
        let len = self.stack.len();
        if index > 0 {
            let position = base + index as usize - 1;
            (position < len).then_some(position)
        } else if index < 0 {
            let offset = index.unsigned_abs() as usize;
            (offset <= len - base).then(|| len - offset)
        } else {
            None
        }
    }

    fn value(&self, index: i32) -> Value {
        self.slot(index).map(|i| self.stack[i].clone()).unwrap_or_default()
    }

    fn pop_value(&mut self) -> Value {
        if self.stack.len() > self.base() {
            self.stack.pop().unwrap_or_default()
        } else {
            Value::Nil
        }
    }

    fn tag_of(value: &Value) -> ValueTag {
        match value {
            Value::Nil => ValueTag::Nil,
            Value::Bool(_) => ValueTag::Boolean,
            Value::Number(_) => ValueTag::Number,
            Value::Str(_) => ValueTag::String,
            Value::Table(_) => ValueTag::Table,
            Value::Function(_) => ValueTag::Function,
            Value::UserData(_) => ValueTag::UserData,
        }
    }

    fn table(&self, id: ObjId) -> Result<&Table, BridgeError> {
        self.tables
            .get(id)
            .ok_or_else(|| BridgeError::script("access to a collected table"))
    }

    fn table_mut(&mut self, id: ObjId) -> Result<&mut Table, BridgeError> {
        self.tables
            .get_mut(id)
            .ok_or_else(|| BridgeError::script("access to a collected table"))
    }

    fn metatable_of(&self, value: &Value) -> Option<ObjId> {
        match value {
            Value::Table(id) => self.tables.get(*id).and_then(|t| t.metatable),
            Value::UserData(id) => self.userdata.get(*id).and_then(|u| u.metatable),
            _ => None,
        }
    }

    fn metafield(&self, value: &Value, event: &str) -> Value {
        self.metatable_of(value)
            .and_then(|m| self.tables.get(m))
            .map(|m| m.get_str(event))
            .unwrap_or_default()
    }

    fn registry_table(&self) -> Result<&Table, BridgeError> {
        self.table(self.registry)
    }

    // ------------------------------------------------------------------
    // Metamethod-aware access
    // ------------------------------------------------------------------

    fn index_value(&mut self, object: Value, key: Value) -> Result<Value, BridgeError> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = if let Value::Table(id) = current {
                let raw = match Key::from_value(&key) {
                    Some(k) => self.table(id)?.get(&k),
                    None => Value::Nil,
                };
                if !raw.is_nil() {
                    return Ok(raw);
                }
                let handler = self.metafield(&current, "__index");
                if handler.is_nil() {
                    return Ok(Value::Nil);
                }
                handler
            } else {
                let handler = self.metafield(&current, "__index");
                if handler.is_nil() {
                    return Err(BridgeError::script(format!(
                        "attempt to index a {} value",
                        Self::tag_of(&current)
                    )));
                }
                handler
            };

            if let Value::Function(_) = handler {
                let mut results = self.call_value(handler, vec![current, key], 1)?;
                return Ok(results.pop().unwrap_or_default());
            }
            current = handler;
        }
        Err(BridgeError::script("'__index' chain too long; possible loop"))
    }

    fn newindex_value(&mut self, object: Value, key: Value, value: Value) -> Result<(), BridgeError> {
        let mut current = object;
        for _ in 0..MAX_META_CHAIN {
            let handler = if let Value::Table(id) = current {
                let k = Key::from_value(&key).ok_or_else(|| BridgeError::script("table index is nil or NaN"))?;
                let handler = if self.table(id)?.get(&k).is_nil() {
                    self.metafield(&current, "__newindex")
                } else {
                    Value::Nil
                };
                if handler.is_nil() {
                    self.table_mut(id)?.set(k, value);
                    return Ok(());
                }
                handler
            } else {
                let handler = self.metafield(&current, "__newindex");
                if handler.is_nil() {
                    return Err(BridgeError::script(format!(
                        "attempt to index a {} value",
                        Self::tag_of(&current)
                    )));
                }
                handler
            };

            if let Value::Function(_) = handler {
                self.call_value(handler, vec![current, key, value], 0)?;
                return Ok(());
            }
            current = handler;
        }
        Err(BridgeError::script("'__newindex' chain too long; possible loop"))
    }

    fn call_value(&mut self, function: Value, args: Vec<Value>, nresults: i32) -> Result<Vec<Value>, BridgeError> {
        let base = self.stack.len();
        let nargs = args.len() as i32;
        self.stack.push(function);
        self.stack.extend(args);
        self.call(nargs, nresults)?;
        Ok(self.stack.split_off(base))
    }

    fn call(&mut self, nargs: i32, nresults: i32) -> Result<(), BridgeError> {
        let nargs = nargs.max(0) as usize;
        let func_slot = self
            .stack
            .len()
            .checked_sub(nargs + 1)
            .filter(|&slot| slot >= self.base())
            .ok_or_else(|| BridgeError::script("call with too few stack values"))?;

        let callee = self.stack[func_slot].clone();
        let function = match callee {
            Value::Function(id) => self.functions.get(id).cloned(),
            other => match self.metafield(&other, "__call") {
                handler @ Value::Function(id) => {
                    self.stack.insert(func_slot, handler);
                    self.functions.get(id).cloned()
                }
                _ => {
                    self.stack.truncate(func_slot);
                    return Err(BridgeError::NotCallable(Self::tag_of(&other).name().to_owned()));
                }
            },
        };
        let Some(function) = function else {
            self.stack.truncate(func_slot);
            return Err(BridgeError::script("call of a collected function"));
        };

        if self.call_depth() >= self.config.max_call_depth {
            self.stack.truncate(func_slot);
            return Err(BridgeError::script("stack overflow (call depth limit reached)"));
        }

        let arg_base = func_slot + 1;
        self.frames.push(arg_base);
        let outcome = function(self);
        self.frames.pop();

        match outcome {
            Ok(count) => {
                let available = self.stack.len().saturating_sub(arg_base);
                let count = (count.max(0) as usize).min(available);
                let mut results = self.stack.split_off(self.stack.len() - count);
                self.stack.truncate(func_slot);
                if nresults >= 0 {
                    results.resize(nresults as usize, Value::Nil);
                }
                self.stack.extend(results);
                Ok(())
            }
            Err(err) => {
                self.stack.truncate(func_slot);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Garbage collection
    // ------------------------------------------------------------------

    fn has_weak_values(&self, table: &Table) -> bool {
        table
            .metatable
            .and_then(|m| self.tables.get(m))
            .is_some_and(|m| matches!(m.get_str("__mode"), Value::Str(mode) if mode.contains('v')))
    }

    fn mark(&self) -> (Vec<bool>, Vec<bool>, Vec<bool>) {
        let mut tables = vec![false; self.tables.slots.len()];
        let mut functions = vec![false; self.functions.slots.len()];
        let mut userdata = vec![false; self.userdata.slots.len()];

        let mut work: Vec<Value> = self.stack.clone();
        work.push(Value::Table(self.globals));
        work.push(Value::Table(self.registry));

        while let Some(value) = work.pop() {
            match value {
                Value::Table(id) if !tables[id] => {
                    tables[id] = true;
                    if let Some(table) = self.tables.get(id) {
                        if let Some(meta) = table.metatable {
                            work.push(Value::Table(meta));
                        }
                        let weak = self.has_weak_values(table);
                        table.for_each_reference(weak, |v| work.push(v.clone()));
                    }
                }
                Value::Function(id) => functions[id] = true,
                Value::UserData(id) if !userdata[id] => {
                    userdata[id] = true;
                    if let Some(meta) = self.userdata.get(id).and_then(|u| u.metatable) {
                        work.push(Value::Table(meta));
                    }
                }
                _ => {}
            }
        }
        (tables, functions, userdata)
    }

    fn finalize(&mut self, id: ObjId) {
        let handler = self.metafield(&Value::UserData(id), "__gc");
        if let Value::Function(_) = handler
            && let Err(err) = self.call_value(handler, vec![Value::UserData(id)], 0)
        {
            log::warn!("error in __gc finalizer of userdata {id}: {err}");
        }
    }

    /// Run a full collection cycle; returns the number of objects freed.
    ///
    /// Weak-valued tables lose entries pointing at unreachable objects
    /// before unreachable userdata are finalized.
    pub fn collect_garbage(&mut self) -> usize {
        let (tables, functions, userdata) = self.mark();
        let alive = |v: &Value| match v {
            Value::Table(id) => tables.get(*id).copied().unwrap_or(true),
            Value::Function(id) => functions.get(*id).copied().unwrap_or(true),
            Value::UserData(id) => userdata.get(*id).copied().unwrap_or(true),
            _ => true,
        };

        let weak_tables: Vec<ObjId> = (0..tables.len())
            .filter(|&id| tables[id] && self.tables.get(id).is_some_and(|t| self.has_weak_values(t)))
            .collect();
        for id in weak_tables {
            if let Some(table) = self.tables.get_mut(id) {
                table.clear_dead_values(alive);
            }
        }

        let doomed: Vec<ObjId> = (0..userdata.len())
            .filter(|&id| !userdata[id] && self.userdata.get(id).is_some())
            .collect();
        for &id in &doomed {
            self.finalize(id);
        }

        let mut freed = 0;
        for id in (0..tables.len()).filter(|&id| !tables[id]) {
            if self.tables.get(id).is_some() {
                self.tables.free(id);
                freed += 1;
            }
        }
        for id in (0..functions.len()).filter(|&id| !functions[id]) {
            if self.functions.get(id).is_some() {
                self.functions.free(id);
                freed += 1;
            }
        }
        for id in doomed {
            self.userdata.free(id);
            freed += 1;
        }
        log::debug!("collected {freed} objects");
        freed
    }

    /// Tear the state down, running every pending finalizer.
    pub fn close(mut self) {
        self.stack.clear();
        self.frames.truncate(1);
        let live: Vec<ObjId> = (0..self.userdata.slots.len())
            .filter(|&id| self.userdata.get(id).is_some())
            .collect();
        for id in live {
            self.finalize(id);
        }
        log::debug!("state closed");
    }
}

fn number_to_string(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl ScriptStack for MemoryState {
    fn get_top(&self) -> i32 {
        (self.stack.len() - self.base()) as i32
    }

    fn set_top(&mut self, top: i32) {
        let base = self.base();
        let new_len = if top >= 0 {
            base + top as usize
        } else {
            (self.stack.len() as i64 + top as i64 + 1).max(base as i64) as usize
        };
        self.stack.resize(new_len.max(base), Value::Nil);
    }

    fn check_stack(&mut self, extra: usize) -> bool {
        self.stack.len() + extra <= self.config.max_stack
    }

    fn push_value(&mut self, index: i32) {
        let value = self.value(index);
        self.stack.push(value);
    }

    fn remove(&mut self, index: i32) {
        if let Some(position) = self.slot(index) {
            self.stack.remove(position);
        }
    }

    fn insert(&mut self, index: i32) {
        if let Some(position) = self.slot(index) {
            let value = self.pop_value();
            self.stack.insert(position, value);
        }
    }

    fn type_of(&self, index: i32) -> ValueTag {
        match self.slot(index) {
            Some(i) => Self::tag_of(&self.stack[i]),
            None => ValueTag::None,
        }
    }

    fn to_boolean(&self, index: i32) -> bool {
        !matches!(self.value(index), Value::Nil | Value::Bool(false))
    }

    fn to_number(&self, index: i32) -> Option<f64> {
        match self.value(index) {
            Value::Number(n) => Some(n),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn to_str(&self, index: i32) -> Option<String> {
        match self.value(index) {
            Value::Str(s) => Some(s.to_string()),
            Value::Number(n) => Some(number_to_string(n)),
            _ => None,
        }
    }

    fn to_userdata(&self, index: i32) -> Option<u64> {
        match self.value(index) {
            Value::UserData(id) => self.userdata.get(id).map(|u| u.payload),
            _ => None,
        }
    }

    fn to_pointer(&self, index: i32) -> usize {
        match self.value(index) {
            Value::Table(id) => id * 4 + 1,
            Value::Function(id) => id * 4 + 2,
            Value::UserData(id) => id * 4 + 3,
            _ => 0,
        }
    }

    fn raw_equal(&self, a: i32, b: i32) -> bool {
        match (self.slot(a), self.slot(b)) {
            (Some(a), Some(b)) => self.stack[a].raw_eq(&self.stack[b]),
            _ => false,
        }
    }

    fn push_nil(&mut self) {
        self.stack.push(Value::Nil);
    }

    fn push_boolean(&mut self, value: bool) {
        self.stack.push(Value::Bool(value));
    }

    fn push_number(&mut self, value: f64) {
        self.stack.push(Value::Number(value));
    }

    fn push_string(&mut self, value: &str) {
        self.stack.push(Value::Str(Rc::from(value)));
    }

    fn push_function(&mut self, function: NativeFunction) {
        let id = self.functions.alloc(function);
        self.stack.push(Value::Function(id));
    }

    fn push_userdata(&mut self, payload: u64) {
        let id = self.userdata.alloc(UserData {
            payload,
            metatable: None,
        });
        self.stack.push(Value::UserData(id));
    }

    fn push_globals(&mut self) {
        self.stack.push(Value::Table(self.globals));
    }

    fn new_table(&mut self) {
        let id = self.tables.alloc(Table::default());
        self.stack.push(Value::Table(id));
    }

    fn get_table(&mut self, index: i32) -> Result<(), BridgeError> {
        let object = self.value(index);
        let key = self.pop_value();
        let value = self.index_value(object, key)?;
        self.stack.push(value);
        Ok(())
    }

    fn set_table(&mut self, index: i32) -> Result<(), BridgeError> {
        let object = self.value(index);
        let value = self.pop_value();
        let key = self.pop_value();
        self.newindex_value(object, key, value)
    }

    fn raw_get(&mut self, index: i32) {
        let object = self.value(index);
        let key = self.pop_value();
        let value = match (object, Key::from_value(&key)) {
            (Value::Table(id), Some(key)) => self.tables.get(id).map(|t| t.get(&key)).unwrap_or_default(),
            _ => Value::Nil,
        };
        self.stack.push(value);
    }

    fn raw_set(&mut self, index: i32) {
        let object = self.value(index);
        let value = self.pop_value();
        let key = self.pop_value();
        if let (Value::Table(id), Some(key)) = (object, Key::from_value(&key))
            && let Some(table) = self.tables.get_mut(id)
        {
            table.set(key, value);
        }
    }

    fn raw_len(&self, index: i32) -> usize {
        match self.value(index) {
            Value::Table(id) => self.tables.get(id).map_or(0, Table::len),
            Value::Str(s) => s.len(),
            _ => 0,
        }
    }

    fn next(&mut self, index: i32) -> bool {
        let object = self.value(index);
        let key = self.pop_value();
        let Value::Table(id) = object else {
            return false;
        };
        let key = Key::from_value(&key);
        let entry = self.tables.get(id).map(|t| t.next(key.as_ref()));
        match entry {
            Some(Ok(Some((k, v)))) => {
                self.stack.push(k);
                self.stack.push(v);
                true
            }
            _ => false,
        }
    }

    fn get_metatable(&mut self, index: i32) -> bool {
        match self.metatable_of(&self.value(index)) {
            Some(meta) => {
                self.stack.push(Value::Table(meta));
                true
            }
            None => false,
        }
    }

    fn set_metatable(&mut self, index: i32) {
        let object = self.value(index);
        let meta = match self.pop_value() {
            Value::Table(id) => Some(id),
            _ => None,
        };
        match object {
            Value::Table(id) => {
                if let Some(t) = self.tables.get_mut(id) {
                    t.metatable = meta;
                }
            }
            Value::UserData(id) => {
                if let Some(u) = self.userdata.get_mut(id) {
                    u.metatable = meta;
                }
            }
            _ => {}
        }
    }

    fn new_metatable(&mut self, name: &str) -> bool {
        let existing = self.registry_table().map(|r| r.get_str(name)).unwrap_or_default();
        if let Value::Table(_) = existing {
            self.stack.push(existing);
            return false;
        }
        let mut meta = Table::default();
        meta.set(Key::Str(Rc::from("__name")), Value::Str(Rc::from(name)));
        let id = self.tables.alloc(meta);
        if let Ok(registry) = self.table_mut(self.registry) {
            registry.set(Key::Str(Rc::from(name)), Value::Table(id));
        }
        self.stack.push(Value::Table(id));
        true
    }

    fn get_named_metatable(&mut self, name: &str) -> bool {
        let value = self.registry_table().map(|r| r.get_str(name)).unwrap_or_default();
        let found = !value.is_nil();
        self.stack.push(value);
        found
    }

    fn pcall(&mut self, nargs: i32, nresults: i32) -> Result<(), BridgeError> {
        let depth = self.frames.len();
        let result = self.call(nargs, nresults);
        self.frames.truncate(depth);
        result
    }

    fn reference(&mut self) -> RegistryRef {
        let value = self.pop_value();
        if value.is_nil() {
            return RegistryRef::NIL;
        }
        let id = self.free_refs.pop().unwrap_or_else(|| {
            let id = self.next_ref;
            self.next_ref += 1;
            id
        });
        if let Ok(registry) = self.table_mut(self.registry) {
            registry.set(Key::Number((id as f64).into()), value);
        }
        RegistryRef(id)
    }

    fn push_reference(&mut self, reference: RegistryRef) {
        let value = if reference.is_nil() {
            Value::Nil
        } else {
            self.registry_table()
                .map(|r| r.get(&Key::Number((reference.0 as f64).into())))
                .unwrap_or_default()
        };
        self.stack.push(value);
    }

    fn unreference(&mut self, reference: RegistryRef) {
        if reference.is_nil() {
            return;
        }
        if let Ok(registry) = self.table_mut(self.registry) {
            registry.set(Key::Number((reference.0 as f64).into()), Value::Nil);
        }
        self.free_refs.push(reference.0);
    }
}
