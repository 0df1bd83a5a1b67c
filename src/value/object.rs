//! Hybrid object (member map) storage (spec §4.3): a document object begins as an
//! insertion-ordered vector of `(name-handle, value)` pairs and is promoted to an
//! auxiliary hash index once its member count crosses [`Object::PROMOTION_THRESHOLD`].
//! Both representations report identical iteration order.
//!
//! Grounded on the teacher's `doc::heap::HeapField`/`BumpVec<HeapField>` (binary-searched
//! sorted vector of fields), generalized here to the spec's requirement that objects
//! preserve *insertion* order rather than lexicographic order, and to promote to a true
//! hash table — keyed by handle pointer identity per DESIGN NOTES — once membership passes
//! the threshold, instead of always doing a linear or binary scan.

use fxhash::FxHashMap;

use crate::keytable::{Handle, Table as KeyTable};
use crate::value::Value;

/// An object's member storage: an insertion-ordered list of fields, optionally backed by a
/// hash index once promoted.
#[derive(Debug, Default)]
pub struct Object {
    entries: Vec<(Handle, Value)>,
    /// Maps a handle's pointer identity to its position in `entries`. Present only once
    /// promoted; rebuilt in full on any structural mutation, which is acceptable because
    /// mutation is already O(n) relative to `entries` at that point.
    index: Option<FxHashMap<usize, usize>>,
}

impl Object {
    /// Open question (spec §9) resolved: promotion threshold, expressed as a member count,
    /// analogous to the source's "hash-table minimum size used as a proxy". See DESIGN.md.
    pub const PROMOTION_THRESHOLD: usize = 64;

    /// A new, empty object.
    pub fn new() -> Self {
        Object::default()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if this object has no members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True once this object has been promoted to hash-indexed storage.
    pub fn is_hashed(&self) -> bool {
        self.index.is_some()
    }

    /// Lookup by member name. The hash index is keyed by handle pointer identity, not text,
    /// so a plain string lookup still scans `entries`; what promotion buys is O(1)
    /// *handle* lookups via [`Object::position_of_handle`], the path mutation code actually
    /// takes once it already holds a resolved handle from an earlier step.
    fn position_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(h, _)| h.as_str() == name)
    }

    /// O(1) lookup by an already-known handle, valid once promoted.
    fn position_of_handle(&self, h: Handle) -> Option<usize> {
        if let Some(index) = &self.index {
            index.get(&h.ptr()).copied()
        } else {
            self.entries.iter().position(|(e, _)| *e == h)
        }
    }

    fn rebuild_index(&mut self) {
        let mut map = FxHashMap::default();
        map.reserve(self.entries.len());
        for (i, (h, _)) in self.entries.iter().enumerate() {
            map.insert(h.ptr(), i);
        }
        self.index = Some(map);
    }

    /// Rebuild the hash index in place if this object is already promoted; a no-op
    /// otherwise. Called after any structural mutation (insert/remove) that shifts
    /// positions.
    fn rebuild_index_if_hashed(&mut self) {
        if self.index.is_some() {
            self.rebuild_index();
        }
    }

    fn maybe_promote(&mut self) {
        if self.index.is_none() && self.entries.len() > Self::PROMOTION_THRESHOLD {
            self.rebuild_index();
        }
    }

    /// Find a member by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position_of(name).map(|i| &self.entries[i].1)
    }

    /// Find a member by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.position_of(name).map(move |i| &mut self.entries[i].1)
    }

    /// Find a member by an already-resolved handle (O(1) once promoted).
    pub fn get_by_handle(&self, h: Handle) -> Option<&Value> {
        self.position_of_handle(h).map(|i| &self.entries[i].1)
    }

    /// Insert or update a member, interning `name` through `keys`. "Last wins" on conflict
    /// per spec §4.3 is the caller's responsibility during parse (see `parser`); this method
    /// itself is an ordinary upsert that keeps the *first* insertion's position, matching
    /// object mutation semantics elsewhere (`set` updates in place).
    pub fn insert(&mut self, keys: &KeyTable, name: &str, value: Value) -> &mut Value {
        if let Some(i) = self.position_of(name) {
            self.entries[i].1 = value;
            return &mut self.entries[i].1;
        }
        let handle = keys.make_handle(name, is_noescape(name));
        let i = self.entries.len();
        self.entries.push((handle, value));
        if self.index.is_some() {
            // Already hashed: extend the index incrementally rather than rebuilding.
            self.index.as_mut().unwrap().insert(handle.ptr(), i);
        } else {
            self.maybe_promote();
        }
        &mut self.entries[i].1
    }

    /// Remove a member by name, releasing its handle reference. Returns the removed value.
    pub fn remove(&mut self, keys: &KeyTable, name: &str) -> Option<Value> {
        let i = self.position_of(name)?;
        let (handle, value) = self.entries.remove(i);
        keys.destroy(handle);
        self.rebuild_index_if_hashed();
        Some(value)
    }

    /// Release all member handles and empty the object.
    pub fn clear(&mut self, keys: &KeyTable) {
        for (h, _) in self.entries.drain(..) {
            keys.destroy(h);
        }
        self.index = None;
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(h, v)| (h.as_str(), v))
    }

    /// Iterate over `(name, value)` mutably, in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.entries.iter_mut().map(|(h, v)| (h.as_str(), &mut *v))
    }

    /// Deep-copy this object, cloning handles (bumping refcounts) and values.
    pub fn deep_copy(&self, keys: &KeyTable) -> Object {
        let entries = self
            .entries
            .iter()
            .map(|(h, v)| (keys.clone_handle(*h), v.deep_copy(keys)))
            .collect::<Vec<_>>();
        let mut obj = Object { entries, index: None };
        obj.maybe_promote();
        obj
    }
}

/// Heuristic used when interning object-member names during mutation: a name needs no
/// escaping on re-serialization if it contains none of the JSON string characters that
/// `serializer::write_escaped_str` would otherwise have to escape.
fn is_noescape(s: &str) -> bool {
    s.bytes().all(|b| b >= 0x20 && b != b'"' && b != b'\\' && b < 0x80)
}

/// Objects compare by member sequence (name, value), not by handle identity or whether
/// either side has been promoted to hash-indexed storage.
impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len() && self.iter().eq(other.iter())
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        // Objects do not own a reference to the key table, so they cannot release handles
        // on drop; callers (`Document`, `ops`) must call `clear`/`remove` explicitly before
        // dropping a `Value` tree that still holds live handles. This mirrors the source's
        // requirement that `RemoveAllMembers`/`Erase` are the only paths that release
        // handle references in bulk.
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn insertion_order_preserved_across_inserts_and_removes() {
        let keys = KeyTable::default();
        let mut obj = Object::new();
        obj.insert(&keys, "b", Value::Null);
        obj.insert(&keys, "a", Value::Null);
        obj.insert(&keys, "c", Value::Null);
        let names: Vec<_> = obj.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);

        obj.remove(&keys, "a");
        let names: Vec<_> = obj.iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn promotes_above_threshold_and_preserves_order() {
        let keys = KeyTable::default();
        let mut obj = Object::new();
        for i in 0..(Object::PROMOTION_THRESHOLD + 5) {
            obj.insert(&keys, &format!("k{i}"), Value::Null);
        }
        assert!(obj.is_hashed());
        let names: Vec<_> = obj.iter().map(|(n, _)| n.to_string()).collect();
        let expected: Vec<_> = (0..(Object::PROMOTION_THRESHOLD + 5))
            .map(|i| format!("k{i}"))
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn last_write_wins_on_upsert() {
        let keys = KeyTable::default();
        let mut obj = Object::new();
        obj.insert(&keys, "a", Value::from(1i64));
        obj.insert(&keys, "a", Value::from(2i64));
        assert_eq!(obj.len(), 1);
        assert_eq!(obj.get("a"), Some(&Value::from(2i64)));
    }
}
