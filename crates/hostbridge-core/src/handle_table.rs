//! Handle table: the bidirectional map between host objects and the opaque
//! integers carried inside script userdata.
//!
//! Handles come from a counter that only moves forward. A reclaimed handle is
//! never handed out again, so a userdata that still carries it resolves to
//! nothing for the rest of the table's life. When the counter reaches
//! [`MAX_HANDLE`] the table refuses to intern rather than wrap.
//!
//! Handle values stay below 2^53 so they survive a round trip through a
//! script number (the bridge keys its userdata cache by handle).

use rustc_hash::FxHashMap;

use crate::host::{HostRef, ObjectIdentity};

/// One past the largest handle value the table allocates.
pub const MAX_HANDLE: u64 = 1 << 53;

/// Opaque handle stored in a script userdata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostHandle(pub u64);

impl HostHandle {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Bidirectional handle/object map.
///
/// Holding a handle keeps the host object alive until [`HandleTable::reclaim`].
pub struct HandleTable {
    next: u64,
    objects: FxHashMap<u64, HostRef>,
    by_identity: FxHashMap<ObjectIdentity, HostHandle>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self {
            next: 1,
            objects: FxHashMap::default(),
            by_identity: FxHashMap::default(),
        }
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing handle for `object`, or allocate the next one.
    ///
    /// `None` once the handle space is exhausted.
    pub fn intern(&mut self, object: &HostRef) -> Option<HostHandle> {
        if let Some(handle) = self.lookup(object) {
            return Some(handle);
        }
        if self.next >= MAX_HANDLE {
            log::warn!("handle space exhausted; cannot intern {object:?}");
            return None;
        }

        let handle = HostHandle(self.next);
        self.next += 1;
        self.objects.insert(handle.0, object.clone());
        self.by_identity.insert(object.identity(), handle);
        log::trace!("interned {:?} as handle {}", object, handle.0);
        Some(handle)
    }

    /// Handle currently assigned to `object`, if any.
    pub fn lookup(&self, object: &HostRef) -> Option<HostHandle> {
        self.by_identity.get(&object.identity()).copied()
    }

    /// Object a handle refers to; `None` when stale.
    pub fn resolve(&self, handle: HostHandle) -> Option<HostRef> {
        self.objects.get(&handle.0).cloned()
    }

    /// Drop the mapping for `handle`. Idempotent; returns true if it was live.
    pub fn reclaim(&mut self, handle: HostHandle) -> bool {
        let Some(object) = self.objects.remove(&handle.0) else {
            return false;
        };
        if self.by_identity.get(&object.identity()) == Some(&handle) {
            self.by_identity.remove(&object.identity());
        }
        log::trace!("reclaimed handle {}", handle.0);
        true
    }

    /// Drop the mapping for `object`, returning the handle it had.
    pub fn reclaim_by_object(&mut self, object: &HostRef) -> Option<HostHandle> {
        let handle = self.lookup(object)?;
        self.reclaim(handle);
        Some(handle)
    }

    /// Invalidate every outstanding handle (interpreter teardown).
    ///
    /// The counter is kept, so later handles never collide with these.
    pub fn invalidate_all(&mut self) {
        self.objects.clear();
        self.by_identity.clear();
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(n: i32) -> HostRef {
        HostRef::named("Demo.Item", n)
    }

    #[test]
    fn intern_is_deduplicated_by_identity() {
        let mut table = HandleTable::new();
        let a = object(1);
        let b = object(1);
        let ha = table.intern(&a).unwrap();
        assert_eq!(table.intern(&a.clone()), Some(ha));
        assert_ne!(table.intern(&b), Some(ha));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn resolve_returns_same_object() {
        let mut table = HandleTable::new();
        let a = object(1);
        let h = table.intern(&a).unwrap();
        assert!(table.resolve(h).is_some_and(|r| r.ptr_eq(&a)));
    }

    #[test]
    fn reclaim_is_idempotent() {
        let mut table = HandleTable::new();
        let h = table.intern(&object(1)).unwrap();
        assert!(table.reclaim(h));
        assert!(!table.reclaim(h));
        assert!(table.resolve(h).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn reclaimed_handle_is_never_reissued() {
        let mut table = HandleTable::new();
        let first = table.intern(&object(0)).unwrap();
        table.reclaim(first);
        for n in 1..10_000 {
            let h = table.intern(&object(n)).unwrap();
            assert_ne!(h, first);
            table.reclaim(h);
        }
        let victim = object(-1);
        let h = table.intern(&victim).unwrap();
        assert_ne!(h, first);
        assert!(table.resolve(first).is_none());
        assert!(table.resolve(h).is_some_and(|r| r.ptr_eq(&victim)));
    }

    #[test]
    fn handles_strictly_increase_across_reclaim() {
        let mut table = HandleTable::new();
        let a = table.intern(&object(1)).unwrap();
        let b = table.intern(&object(2)).unwrap();
        assert!(a < b);
        table.reclaim(a);
        table.reclaim(b);
        let c = table.intern(&object(3)).unwrap();
        let d = table.intern(&object(4)).unwrap();
        assert!(b < c);
        assert!(c < d);
    }

    #[test]
    fn reintern_after_reclaim_gets_fresh_handle() {
        let mut table = HandleTable::new();
        let a = object(1);
        let h1 = table.intern(&a).unwrap();
        assert_eq!(table.reclaim_by_object(&a), Some(h1));
        let h2 = table.intern(&a).unwrap();
        assert!(h1 < h2);
        assert_eq!(table.lookup(&a), Some(h2));
    }

    #[test]
    fn table_keeps_object_alive_until_reclaimed() {
        let mut table = HandleTable::new();
        let a = object(1);
        let weak = a.downgrade();
        let h = table.intern(&a).unwrap();
        drop(a);
        assert!(weak.upgrade().is_some());
        table.reclaim(h);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn invalidate_all_makes_every_handle_stale() {
        let mut table = HandleTable::new();
        let handles: Vec<_> = (0..4).map(|n| table.intern(&object(n)).unwrap()).collect();
        table.invalidate_all();
        assert!(table.is_empty());
        for &h in &handles {
            assert!(table.resolve(h).is_none());
            assert!(!table.reclaim(h));
        }
        let next = table.intern(&object(9)).unwrap();
        assert!(handles.iter().all(|&h| h < next));
    }

    #[test]
    fn exhausted_handle_space_refuses_to_wrap() {
        let mut table = HandleTable {
            next: MAX_HANDLE - 1,
            ..HandleTable::default()
        };
        let last = table.intern(&object(1)).unwrap();
        assert_eq!(last.as_u64(), MAX_HANDLE - 1);
        assert_eq!((last.as_u64() as f64) as u64, last.as_u64());
        table.reclaim(last);
        assert_eq!(table.intern(&object(2)), None);
        assert!(table.resolve(HostHandle(0)).is_none());
    }
}
