//! Values and tables of the in-memory interpreter.

use std::rc::Rc;

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;

/// Arena id of a table, function or userdata.
pub(crate) type ObjId = usize;

/// A script value.
#[derive(Debug, Clone, Default)]
pub(crate) enum Value {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Table(ObjId),
    Function(ObjId),
    UserData(ObjId),
}

impl Value {
    #[inline]
    pub(crate) fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub(crate) fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::UserData(a), Value::UserData(b)) => a == b,
            _ => false,
        }
    }
}

/// A value usable as a table key (anything but nil and NaN).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Key {
    Bool(bool),
    Number(OrderedFloat<f64>),
    Str(Rc<str>),
    Table(ObjId),
    Function(ObjId),
    UserData(ObjId),
}

impl Key {
    pub(crate) fn from_value(value: &Value) -> Option<Key> {
        Some(match value {
            Value::Nil => return None,
            Value::Number(n) if n.is_nan() => return None,
            // -0.0 and 0.0 are the same key
            Value::Number(n) => Key::Number(OrderedFloat(if *n == 0.0 { 0.0 } else { *n })),
            Value::Bool(b) => Key::Bool(*b),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Table(id) => Key::Table(*id),
            Value::Function(id) => Key::Function(*id),
            Value::UserData(id) => Key::UserData(*id),
        })
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Key::Bool(b) => Value::Bool(*b),
            Key::Number(n) => Value::Number(n.0),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Table(id) => Value::Table(*id),
            Key::Function(id) => Value::Function(*id),
            Key::UserData(id) => Value::UserData(*id),
        }
    }

    /// 1-based array position for integral positive number keys.
    fn array_index(&self) -> Option<usize> {
        match self {
            Key::Number(n) if n.0 >= 1.0 && n.0.fract() == 0.0 && n.0 <= usize::MAX as f64 => Some(n.0 as usize),
            _ => None,
        }
    }
}

/// Table with an array part for keys `1..=n` and an insertion-ordered hash part.
#[derive(Debug, Default)]
pub(crate) struct Table {
    array: Vec<Value>,
    entries: Vec<(Key, Value)>,
    index: FxHashMap<Key, usize>,
    pub(crate) metatable: Option<ObjId>,
}

impl Table {
    pub(crate) fn get(&self, key: &Key) -> Value {
        if let Some(i) = key.array_index()
            && i <= self.array.len()
        {
            return self.array[i - 1].clone();
        }
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].1.clone())
            .unwrap_or_default()
    }

    pub(crate) fn get_str(&self, key: &str) -> Value {
        self.get(&Key::Str(Rc::from(key)))
    }

    pub(crate) fn set(&mut self, key: Key, value: Value) {
        if let Some(i) = key.array_index() {
            if i <= self.array.len() {
                self.array[i - 1] = value;
                while self.array.last().is_some_and(Value::is_nil) {
                    self.array.pop();
                }
                return;
            }
            if i == self.array.len() + 1 && !value.is_nil() {
                self.remove_entry(&key);
                self.array.push(value);
                self.migrate_to_array();
                return;
            }
        }

        if value.is_nil() {
            self.remove_entry(&key);
        } else if let Some(&slot) = self.index.get(&key) {
            self.entries[slot].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    fn migrate_to_array(&mut self) {
        loop {
            let next = Key::Number(OrderedFloat((self.array.len() + 1) as f64));
            let Some(&slot) = self.index.get(&next) else {
                break;
            };
            let value = self.entries[slot].1.clone();
            self.remove_entry(&next);
            self.array.push(value);
        }
    }

    fn remove_entry(&mut self, key: &Key) {
        if let Some(slot) = self.index.remove(key) {
            self.entries.remove(slot);
            for position in self.index.values_mut() {
                if *position > slot {
                    *position -= 1;
                }
            }
        }
    }

    /// Length of the array part.
    pub(crate) fn len(&self) -> usize {
        self.array.len()
    }

    /// Key/value pair following `key` (`None` = start); `Err` for a key not in the table.
    pub(crate) fn next(&self, key: Option<&Key>) -> Result<Option<(Value, Value)>, ()> {
        let mut position = match key {
            None => 0,
            Some(k) => match k.array_index() {
                Some(i) if i <= self.array.len() => i,
                _ => self.array.len() + 1 + *self.index.get(k).ok_or(())?,
            },
        };

        while position < self.array.len() {
            if !self.array[position].is_nil() {
                return Ok(Some((Value::Number((position + 1) as f64), self.array[position].clone())));
            }
            position += 1;
        }

        let hash_position = position - self.array.len();
        Ok(self
            .entries
            .get(hash_position)
            .map(|(k, v)| (k.to_value(), v.clone())))
    }

    /// Every value reachable from this table, keys first.
    pub(crate) fn for_each_reference(&self, weak_values: bool, mut visit: impl FnMut(&Value)) {
        for (key, value) in &self.entries {
            visit(&key.to_value());
            if !weak_values {
                visit(value);
            }
        }
        if !weak_values {
            self.array.iter().for_each(&mut visit);
        }
    }

    /// Drop entries whose value is a collectable object failing `alive`.
    pub(crate) fn clear_dead_values(&mut self, alive: impl Fn(&Value) -> bool) {
        for value in self.array.iter_mut() {
            if !alive(value) {
                *value = Value::Nil;
            }
        }
        while self.array.last().is_some_and(Value::is_nil) {
            self.array.pop();
        }
        let dead: Vec<Key> = self
            .entries
            .iter()
            .filter(|(_, v)| !alive(v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in dead {
            self.remove_entry(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Key {
        Key::Number(OrderedFloat(n))
    }

    #[test]
    fn sequential_keys_use_array_part() {
        let mut t = Table::default();
        t.set(num(1.0), Value::Number(10.0));
        t.set(num(2.0), Value::Number(20.0));
        assert_eq!(t.len(), 2);
        assert!(t.entries.is_empty());
    }

    #[test]
    fn out_of_order_keys_migrate() {
        let mut t = Table::default();
        t.set(num(2.0), Value::Bool(true));
        assert_eq!(t.len(), 0);
        t.set(num(1.0), Value::Bool(true));
        assert_eq!(t.len(), 2);
        assert!(t.entries.is_empty());
    }

    #[test]
    fn setting_nil_removes() {
        let mut t = Table::default();
        t.set(Key::Str("a".into()), Value::Number(1.0));
        t.set(Key::Str("b".into()), Value::Number(2.0));
        t.set(Key::Str("a".into()), Value::Nil);
        assert!(t.get_str("a").is_nil());
        assert!(matches!(t.get_str("b"), Value::Number(n) if n == 2.0));
    }

    #[test]
    fn next_visits_array_then_hash_in_order() {
        let mut t = Table::default();
        t.set(num(1.0), Value::Number(1.0));
        t.set(Key::Str("x".into()), Value::Number(2.0));
        t.set(Key::Str("y".into()), Value::Number(3.0));

        let mut keys = Vec::new();
        let mut key: Option<Key> = None;
        while let Ok(Some((k, _))) = t.next(key.as_ref()) {
            key = Key::from_value(&k);
            keys.push(k);
        }
        assert_eq!(keys.len(), 3);
        assert!(matches!(&keys[0], Value::Number(n) if *n == 1.0));
        assert!(matches!(&keys[2], Value::Str(s) if &**s == "y"));
    }

    #[test]
    fn nan_and_nil_are_not_keys() {
        assert!(Key::from_value(&Value::Nil).is_none());
        assert!(Key::from_value(&Value::Number(f64::NAN)).is_none());
        assert_eq!(Key::from_value(&Value::Number(-0.0)), Some(num(0.0)));
    }

    #[test]
    fn weak_values_are_cleared() {
        let mut t = Table::default();
        t.set(num(1.0), Value::Table(7));
        t.set(Key::Str("keep".into()), Value::Number(1.0));
        t.set(Key::Str("drop".into()), Value::UserData(3));
        t.clear_dead_values(|v| !matches!(v, Value::Table(_) | Value::UserData(_)));
        assert_eq!(t.len(), 0);
        assert!(t.get_str("drop").is_nil());
        assert!(!t.get_str("keep").is_nil());
    }
}
