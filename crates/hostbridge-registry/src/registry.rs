//! The type registry: host type descriptions keyed by [`TypeHash`].

use std::any::{Any, TypeId};

use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};

use hostbridge_core::{HostRef, RegistrationError, TypeHash};

use crate::builder::ClassBuilder;
use crate::decl;
use crate::entries::{ClassEntry, ClassKind, Member, MethodGroup};

bitflags! {
    /// Which members a lookup may return.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFilter: u8 {
        const INSTANCE = 1 << 0;
        const STATIC = 1 << 1;
        /// Fall back to a case-insensitive match when no exact match exists.
        const IGNORE_CASE = 1 << 2;
    }
}

/// Registry of host types.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: FxHashMap<TypeHash, ClassEntry>,
    by_rust_type: FxHashMap<TypeId, TypeHash>,
    /// Registration order, for deterministic iteration.
    order: Vec<TypeHash>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start describing a class whose instances carry a `T`.
    pub fn class<T: Any>(&mut self, qualified_name: &str) -> ClassBuilder<'_, T> {
        let mut entry = ClassEntry::new(qualified_name, ClassKind::Class);
        entry.rust_type = Some(TypeId::of::<T>());
        ClassBuilder::new(self, entry)
    }

    /// Start describing an interface.
    pub fn interface(&mut self, qualified_name: &str) -> ClassBuilder<'_, ()> {
        ClassBuilder::new(self, ClassEntry::new(qualified_name, ClassKind::Interface))
    }

    /// Register a delegate type from its invoke declaration, e.g. `"i32 (i32 a, i32 b)"`.
    pub fn delegate(&mut self, qualified_name: &str, invoke: &str) -> Result<TypeHash, RegistrationError> {
        let mut entry = ClassEntry::new(qualified_name, ClassKind::Delegate);
        entry.invoke = Some(decl::parse_delegate(invoke)?);
        self.register(entry)
    }

    /// Add a fully built entry.
    pub fn register(&mut self, entry: ClassEntry) -> Result<TypeHash, RegistrationError> {
        let hash = entry.type_hash;
        if self.types.contains_key(&hash) {
            return Err(RegistrationError::DuplicateType(entry.qualified_name));
        }

        if let Some(outer) = entry.declaring_type {
            let outer_entry = self.types.get_mut(&outer).ok_or_else(|| {
                RegistrationError::TypeNotFound(format!("declaring type of {}", entry.qualified_name))
            })?;
            outer_entry.nested.push(entry.name.clone());
        }

        if let Some(type_id) = entry.rust_type {
            self.by_rust_type.entry(type_id).or_insert(hash);
        }

        log::debug!("registered {:?} {}", entry.kind, entry.qualified_name);
        self.order.push(hash);
        self.types.insert(hash, entry);
        Ok(hash)
    }

    pub fn get(&self, hash: TypeHash) -> Option<&ClassEntry> {
        self.types.get(&hash)
    }

    pub fn get_by_name(&self, qualified_name: &str) -> Option<&ClassEntry> {
        self.get(TypeHash::from_name(qualified_name))
    }

    pub fn contains(&self, hash: TypeHash) -> bool {
        self.types.contains_key(&hash)
    }

    /// Registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassEntry> {
        self.order.iter().filter_map(|h| self.types.get(h))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Display name of a type, or its hash when unregistered.
    pub fn type_name(&self, hash: TypeHash) -> String {
        self.get(hash)
            .map(|e| e.qualified_name.clone())
            .unwrap_or_else(|| hash.to_string())
    }

    pub fn kind_of(&self, hash: TypeHash) -> Option<ClassKind> {
        self.get(hash).map(|e| e.kind)
    }

    /// Type registered for the Rust payload `T`.
    pub fn hash_of<T: Any>(&self) -> Option<TypeHash> {
        self.by_rust_type.get(&TypeId::of::<T>()).copied()
    }

    /// Wrap a Rust value as an instance of the type registered for `T`.
    pub fn wrap<T: Any>(&self, value: T) -> Result<HostRef, RegistrationError> {
        let hash = self
            .hash_of::<T>()
            .ok_or_else(|| RegistrationError::TypeNotFound(std::any::type_name::<T>().to_owned()))?;
        Ok(HostRef::new(hash, value))
    }

    /// Whether a value of type `from` can be used where `to` is expected.
    pub fn is_assignable(&self, from: TypeHash, to: TypeHash) -> bool {
        if from == to {
            return true;
        }
        let mut visited = FxHashSet::default();
        let mut pending = vec![from];
        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(entry) = self.get(current) else {
                continue;
            };
            for &parent in entry.base.iter().chain(entry.interfaces.iter()) {
                if parent == to {
                    return true;
                }
                pending.push(parent);
            }
        }
        false
    }

    /// The type and its ancestors, most derived first.
    ///
    /// Interfaces contribute their base interfaces; classes only their base classes.
    pub fn hierarchy(&self, hash: TypeHash) -> Vec<&ClassEntry> {
        let mut out: Vec<&ClassEntry> = Vec::new();
        let mut visited = FxHashSet::default();
        let mut pending = vec![hash];
        while !pending.is_empty() {
            let current = pending.remove(0);
            if !visited.insert(current) {
                continue;
            }
            let Some(entry) = self.get(current) else {
                continue;
            };
            out.push(entry);
            pending.extend(entry.base);
            if entry.kind == ClassKind::Interface {
                pending.extend(entry.interfaces.iter().copied());
            }
        }
        out
    }

    /// Find a member by name on a type or its ancestors.
    ///
    /// An exact-case match anywhere in the hierarchy wins over a
    /// case-insensitive one. Within one name, a field/property shadows
    /// methods, then events, then nested types.
    pub fn find_member(&self, hash: TypeHash, name: &str, filter: MemberFilter) -> Option<Member> {
        self.find_member_by(hash, filter, |candidate| candidate == name).or_else(|| {
            if filter.contains(MemberFilter::IGNORE_CASE) {
                self.find_member_by(hash, filter, |candidate| candidate.eq_ignore_ascii_case(name))
            } else {
                None
            }
        })
    }

    fn find_member_by(&self, hash: TypeHash, filter: MemberFilter, matches: impl Fn(&str) -> bool) -> Option<Member> {
        let allowed = |is_static: bool| {
            if is_static {
                filter.contains(MemberFilter::STATIC)
            } else {
                filter.contains(MemberFilter::INSTANCE)
            }
        };

        let mut group_name: Option<String> = None;
        let mut methods = Vec::new();

        for entry in self.hierarchy(hash) {
            if methods.is_empty() {
                if let Some(prop) = entry.properties.iter().find(|p| allowed(p.is_static) && matches(&p.name)) {
                    return Some(Member::Property(prop.clone()));
                }
                if let Some(event) = entry.events.iter().find(|e| allowed(e.is_static) && matches(&e.name)) {
                    return Some(Member::Event(event.clone()));
                }
            }

            for method in entry.methods.iter().filter(|m| allowed(m.is_static) && matches(&m.name)) {
                group_name.get_or_insert_with(|| method.name.clone());
                methods.push(method.clone());
            }

            if methods.is_empty() && filter.contains(MemberFilter::STATIC) {
                if let Some(nested) = entry.nested.iter().find(|n| matches(n)) {
                    let qualified = format!("{}.{}", entry.qualified_name, nested);
                    return Some(Member::NestedType(TypeHash::from_name(&qualified)));
                }
            }
        }

        group_name.map(|name| Member::Methods(MethodGroup::new(name, methods)))
    }

    /// The overloads named `name` on a type, static and instance alike.
    pub fn method_group(&self, hash: TypeHash, name: &str) -> Option<MethodGroup> {
        match self.find_member(hash, name, MemberFilter::all()) {
            Some(Member::Methods(group)) => Some(group),
            _ => None,
        }
    }
}
