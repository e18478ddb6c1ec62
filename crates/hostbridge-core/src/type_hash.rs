//! Deterministic hash-based type identity.
//!
//! [`TypeHash`] is a 64-bit hash computed from a qualified host type name.
//! The registry, the extractor caches and the per-type metatables are all
//! keyed by it, so a type can be referenced (for example from a declaration
//! string) before it has been registered.
//!
//! # Examples
//!
//! ```
//! use hostbridge_core::TypeHash;
//!
//! let a = TypeHash::from_name("Demo.Calculator");
//! let b = TypeHash::from_name("Demo.Calculator");
//! assert_eq!(a, b);
//! assert_ne!(a, TypeHash::from_name("Demo.ICalc"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Domain mixing constants.
pub mod hash_constants {
    /// Domain marker for type hashes.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Separator mixed in when deriving a nested type hash from its parent.
    pub const NESTED: u64 = 0x4bc94d6bd06053ad;
}

/// A deterministic 64-bit hash identifying a host type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Empty/invalid hash constant.
    pub const EMPTY: TypeHash = TypeHash(0);

    /// Create a type hash from a qualified type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Check if this is an empty/invalid hash.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get the underlying u64 value.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Names of the builtin host types the bridge registers on its own.
///
/// Their hashes are obtained with [`TypeHash::from_name`].
pub mod builtin {
    use super::TypeHash;

    /// Host-side array wrapper ([`crate::HostArray`]).
    pub const ARRAY: &str = "hostbridge.Array";

    /// Handle returned when a script reads an event member.
    pub const EVENT_HANDLE: &str = "hostbridge.EventHandle";

    /// Callable proxy standing for a host type (static members and constructors).
    pub const TYPE_PROXY: &str = "hostbridge.Type";

    /// Hash of [`ARRAY`].
    pub fn array() -> TypeHash {
        TypeHash::from_name(ARRAY)
    }

    /// Hash of [`EVENT_HANDLE`].
    pub fn event_handle() -> TypeHash {
        TypeHash::from_name(EVENT_HANDLE)
    }

    /// Hash of [`TYPE_PROXY`].
    pub fn type_proxy() -> TypeHash {
        TypeHash::from_name(TYPE_PROXY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_determinism() {
        assert_eq!(TypeHash::from_name("Demo.Point"), TypeHash::from_name("Demo.Point"));
    }

    #[test]
    fn type_hash_uniqueness() {
        let names = ["Demo.Point", "Demo.point", "Demo.Point2", "Point", builtin::ARRAY];
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                assert_ne!(TypeHash::from_name(a), TypeHash::from_name(b), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn empty_hash() {
        assert!(TypeHash::EMPTY.is_empty());
        assert!(!TypeHash::from_name("x").is_empty());
    }

    #[test]
    fn hash_display() {
        assert_eq!(format!("{}", TypeHash(0x1234)), "0x0000000000001234");
        assert_eq!(format!("{:?}", TypeHash(0x1234)), "TypeHash(0x0000000000001234)");
    }

    #[test]
    fn builtin_hashes_match_names() {
        assert_eq!(builtin::array(), TypeHash::from_name("hostbridge.Array"));
        assert_ne!(builtin::event_handle(), builtin::type_proxy());
    }
}
