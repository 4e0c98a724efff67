use parking_lot::RwLock;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Number of attribute slots kept in the fixed inline array before the store
/// promotes itself to a `HashMap`. Most log calls carry only a handful of
/// top-level key=value pairs, and staying below this threshold avoids any
/// associative-container allocation on that path.
pub const INLINE_CAPACITY: usize = 8;

#[derive(Debug, Default, Clone)]
struct InlineSlot {
    key: String,
    value: Value,
}

/// Two-tier storage behind [`AttrMap`]'s lock. A key lives in exactly one
/// tier: the inline array until [`INLINE_CAPACITY`] is exceeded, the map
/// afterwards. Once promoted, a store stays on the map tier until dropped
/// (clearing keeps the map allocation for pool reuse).
#[derive(Debug, Default)]
struct Slots {
    inline: [InlineSlot; INLINE_CAPACITY],
    inline_len: usize,
    map: Option<HashMap<String, Value>>,
}

impl Slots {
    fn insert(&mut self, key: &str, value: Value) {
        if let Some(map) = self.map.as_mut() {
            map.insert(key.to_owned(), value);
            return;
        }
        for slot in self.inline[..self.inline_len].iter_mut() {
            if slot.key == key {
                slot.value = value;
                return;
            }
        }
        if self.inline_len < INLINE_CAPACITY {
            let slot = &mut self.inline[self.inline_len];
            slot.key.clear();
            slot.key.push_str(key);
            slot.value = value;
            self.inline_len += 1;
            return;
        }
        self.promote().insert(key.to_owned(), value);
    }

    /// Migrate the inline entries into a freshly allocated map tier.
    fn promote(&mut self) -> &mut HashMap<String, Value> {
        let mut map = HashMap::with_capacity(INLINE_CAPACITY * 2);
        for slot in self.inline[..self.inline_len].iter_mut() {
            map.insert(
                std::mem::take(&mut slot.key),
                std::mem::take(&mut slot.value),
            );
        }
        self.inline_len = 0;
        self.map.insert(map)
    }

    fn get(&self, key: &str) -> Option<&Value> {
        if let Some(map) = self.map.as_ref() {
            return map.get(key);
        }
        self.inline[..self.inline_len]
            .iter()
            .find(|slot| slot.key == key)
            .map(|slot| &slot.value)
    }

    fn remove(&mut self, key: &str) -> bool {
        if let Some(map) = self.map.as_mut() {
            return map.remove(key).is_some();
        }
        match self.inline[..self.inline_len]
            .iter()
            .position(|slot| slot.key == key)
        {
            Some(pos) => {
                self.inline.swap(pos, self.inline_len - 1);
                let vacated = &mut self.inline[self.inline_len - 1];
                vacated.key.clear();
                vacated.value = Value::Null;
                self.inline_len -= 1;
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        match self.map.as_ref() {
            Some(map) => map.len(),
            None => self.inline_len,
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&str, &Value)> + '_> {
        match self.map.as_ref() {
            Some(map) => Box::new(map.iter().map(|(k, v)| (k.as_str(), v))),
            None => Box::new(
                self.inline[..self.inline_len]
                    .iter()
                    .map(|slot| (slot.key.as_str(), &slot.value)),
            ),
        }
    }

    /// Remove every entry but keep the map allocation, so a pooled instance
    /// does not re-pay the allocation on its next borrow.
    fn clear(&mut self) {
        if let Some(map) = self.map.as_mut() {
            map.clear();
        }
        for slot in self.inline[..self.inline_len].iter_mut() {
            slot.key.clear();
            slot.value = Value::Null;
        }
        self.inline_len = 0;
    }
}

/// Concurrent flat attribute store mapping dotted key paths to
/// [`serde_json::Value`] payloads.
///
/// Keys are stored in their fully dot-joined form (`"user.profile.name"`);
/// the nested tree shape formatters sometimes need is derived on demand by
/// [`AttrMap::to_nested`] rather than maintained as a second engine.
///
/// Every mutating operation takes a write lock and every read a read lock,
/// so a store can be shared across threads. [`AttrMap::set_fast`] is the one
/// unlocked path: it requires `&mut self`, so exclusivity is enforced by the
/// borrow checker instead of a calling convention.
///
/// Note on path symmetry: the segment-slice API joins segments with `.`
/// before storing, and a dotted string supplied to `set_by_dot_path` is
/// never re-split. A segment that itself contains `.` is therefore
/// indistinguishable from a multi-segment path once stored; this asymmetry
/// is inherent to the flat representation and deliberately not papered over.
#[derive(Debug, Default)]
pub struct AttrMap {
    slots: RwLock<Slots>,
}

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at the path formed by joining `path` with `.`.
    /// An empty path is a silent no-op. Overwrites silently.
    pub fn set<V: Into<Value>>(&self, path: &[&str], value: V) {
        if path.is_empty() {
            return;
        }
        self.set_by_dot_path(&path.join("."), value);
    }

    /// Write `value` at a pre-joined dotted path. The empty string is a
    /// no-op, matching the empty-segment-path rule.
    pub fn set_by_dot_path<V: Into<Value>>(&self, dot_path: &str, value: V) {
        if dot_path.is_empty() {
            return;
        }
        self.slots.write().insert(dot_path, value.into());
    }

    /// Lock-free single-key write. Requires exclusive ownership, which makes
    /// it safe by construction: a record's store is `&mut` while the record
    /// is still owned by the logging call that built it.
    pub fn set_fast<V: Into<Value>>(&mut self, key: &str, value: V) {
        if key.is_empty() {
            return;
        }
        self.slots.get_mut().insert(key, value.into());
    }

    pub fn get(&self, path: &[&str]) -> Option<Value> {
        if path.is_empty() {
            return None;
        }
        self.get_by_dot_path(&path.join("."))
    }

    pub fn get_by_dot_path(&self, dot_path: &str) -> Option<Value> {
        self.slots.read().get(dot_path).cloned()
    }

    pub fn has(&self, path: &[&str]) -> bool {
        self.get(path).is_some()
    }

    pub fn has_by_dot_path(&self, dot_path: &str) -> bool {
        self.slots.read().get(dot_path).is_some()
    }

    /// Remove the value at `path`; returns whether something was removed.
    pub fn delete(&self, path: &[&str]) -> bool {
        if path.is_empty() {
            return false;
        }
        self.delete_by_dot_path(&path.join("."))
    }

    pub fn delete_by_dot_path(&self, dot_path: &str) -> bool {
        self.slots.write().remove(dot_path)
    }

    /// All populated dotted paths, order unspecified.
    pub fn keys(&self) -> Vec<String> {
        let slots = self.slots.read();
        slots.iter().map(|(k, _)| k.to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absorb every entry of `other`, overwriting on conflict. `other` is
    /// left unmodified and shares no mutable state with `self` afterwards.
    ///
    /// The source is snapshotted under its read lock before the target's
    /// write lock is taken, so two threads merging in opposite directions
    /// cannot deadlock.
    pub fn merge(&self, other: &AttrMap) {
        if std::ptr::eq(self, other) {
            return;
        }
        let snapshot: Vec<(String, Value)> = {
            let src = other.slots.read();
            src.iter().map(|(k, v)| (k.to_owned(), v.clone())).collect()
        };
        if snapshot.is_empty() {
            return;
        }
        let mut slots = self.slots.write();
        for (key, value) in snapshot {
            slots.insert(&key, value);
        }
    }

    /// Visit every populated (dotted path, value) pair. The read lock is
    /// held for the duration, so the visitor sees a consistent snapshot;
    /// do not call mutating operations on the same store from inside it.
    pub fn walk<F>(&self, mut visitor: F)
    where
        F: FnMut(&str, &Value),
    {
        let slots = self.slots.read();
        for (key, value) in slots.iter() {
            visitor(key, value);
        }
    }

    /// Materialize the tree-shaped view used by nested renderers, splitting
    /// every flat key on `.`.
    ///
    /// When both a scalar and a longer path compete for a slot (keys `"a"`
    /// and `"a.b"` both populated), structure wins: the scalar is dropped.
    /// The rule is order-independent, so the result is deterministic even
    /// though the underlying iteration order is not.
    pub fn to_nested(&self) -> Map<String, Value> {
        let slots = self.slots.read();
        let mut nested = Map::new();
        for (key, value) in slots.iter() {
            insert_nested(&mut nested, key, value.clone());
        }
        nested
    }

    /// Serialize the flat store as a single JSON object, `{}` when empty.
    /// Key and string escaping are handled by `serde_json`.
    pub fn to_compact_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Remove every entry from both tiers, keeping allocations. This is the
    /// pool reset contract: a cleared store is indistinguishable from a
    /// fresh one to its next borrower.
    pub fn clear(&mut self) {
        self.slots.get_mut().clear();
    }
}

impl Clone for AttrMap {
    fn clone(&self) -> Self {
        let mut slots = Slots::default();
        {
            let src = self.slots.read();
            for (key, value) in src.iter() {
                slots.insert(key, value.clone());
            }
        }
        Self {
            slots: RwLock::new(slots),
        }
    }
}

impl Serialize for AttrMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let slots = self.slots.read();
        let mut map = serializer.serialize_map(Some(slots.len()))?;
        for (key, value) in slots.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

fn insert_nested(root: &mut Map<String, Value>, dotted: &str, value: Value) {
    let mut parts = dotted.split('.').peekable();
    let mut current = root;
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            // Leaf position: an existing object keeps precedence over the
            // scalar, making the view independent of insertion order.
            if !matches!(current.get(part), Some(Value::Object(_))) {
                current.insert(part.to_owned(), value);
            }
            return;
        }
        // Intermediate position: anything that is not an object is replaced
        // by one, for the same order-independence reason.
        if !matches!(current.get(part), Some(Value::Object(_))) {
            current.insert(part.to_owned(), Value::Object(Map::new()));
        }
        current = match current.get_mut(part) {
            Some(Value::Object(map)) => map,
            _ => return,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_round_trips() {
        let attrs = AttrMap::new();
        attrs.set(&["user", "profile", "name"], "Ada");
        assert_eq!(
            attrs.get(&["user", "profile", "name"]),
            Some(json!("Ada"))
        );
        assert_eq!(attrs.get_by_dot_path("user.profile.name"), Some(json!("Ada")));
    }

    #[test]
    fn last_write_wins() {
        let attrs = AttrMap::new();
        attrs.set_by_dot_path("k", 1);
        attrs.set_by_dot_path("k", 2);
        assert_eq!(attrs.get_by_dot_path("k"), Some(json!(2)));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn empty_path_is_a_no_op() {
        let attrs = AttrMap::new();
        attrs.set(&[], "ignored");
        attrs.set_by_dot_path("", "ignored");
        assert_eq!(attrs.get(&[]), None);
        assert!(attrs.is_empty());
    }

    #[test]
    fn segment_containing_delimiter_joins_flat() {
        let attrs = AttrMap::new();
        attrs.set(&["a.b"], 1);
        // Known asymmetry of the flat representation: the joined form is
        // indistinguishable from a two-segment path.
        assert_eq!(attrs.get(&["a", "b"]), Some(json!(1)));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn set_fast_stays_inline_below_threshold() {
        let mut attrs = AttrMap::new();
        for i in 0..INLINE_CAPACITY {
            attrs.set_fast(&format!("k{i}"), i as i64);
        }
        assert!(attrs.slots.get_mut().map.is_none());
        assert_eq!(attrs.len(), INLINE_CAPACITY);
        attrs.set_fast("k0", 99);
        assert_eq!(attrs.len(), INLINE_CAPACITY);
        assert_eq!(attrs.get_by_dot_path("k0"), Some(json!(99)));
    }

    #[test]
    fn promotion_migrates_inline_entries() {
        let mut attrs = AttrMap::new();
        for i in 0..INLINE_CAPACITY + 4 {
            attrs.set_fast(&format!("k{i}"), i as i64);
        }
        assert!(attrs.slots.get_mut().map.is_some());
        assert_eq!(attrs.slots.get_mut().inline_len, 0);
        assert_eq!(attrs.len(), INLINE_CAPACITY + 4);
        for i in 0..INLINE_CAPACITY + 4 {
            assert_eq!(attrs.get_by_dot_path(&format!("k{i}")), Some(json!(i)));
        }
    }

    #[test]
    fn locked_set_uses_the_same_tiers() {
        let attrs = AttrMap::new();
        attrs.set_by_dot_path("a", 1);
        // Same key through the locked path must not shadow the inline entry.
        attrs.set_by_dot_path("a", 2);
        assert_eq!(attrs.get_by_dot_path("a"), Some(json!(2)));
        assert_eq!(attrs.len(), 1);
    }

    #[test]
    fn delete_from_both_tiers() {
        let mut attrs = AttrMap::new();
        attrs.set_fast("inline", 1);
        assert!(attrs.delete(&["inline"]));
        assert!(!attrs.delete(&["inline"]));
        assert!(attrs.is_empty());

        for i in 0..INLINE_CAPACITY + 1 {
            attrs.set_fast(&format!("k{i}"), i as i64);
        }
        assert!(attrs.delete_by_dot_path("k3"));
        assert!(!attrs.has_by_dot_path("k3"));
        assert_eq!(attrs.len(), INLINE_CAPACITY);
        assert!(!attrs.delete(&[]));
    }

    #[test]
    fn merge_absorbs_disjoint_sets() {
        let a = AttrMap::new();
        let b = AttrMap::new();
        a.set_by_dot_path("x", 1);
        b.set_by_dot_path("y", 2);
        a.merge(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get_by_dot_path("y"), Some(json!(2)));
        // Source unchanged.
        assert_eq!(b.len(), 1);
        assert!(!b.has_by_dot_path("x"));
    }

    #[test]
    fn merge_conflict_source_wins() {
        let a = AttrMap::new();
        let b = AttrMap::new();
        a.set_by_dot_path("k", "old");
        b.set_by_dot_path("k", "new");
        a.merge(&b);
        assert_eq!(a.get_by_dot_path("k"), Some(json!("new")));
    }

    #[test]
    fn merge_copies_inline_tier_of_source() {
        let mut b = AttrMap::new();
        b.set_fast("inline_key", true);
        let a = AttrMap::new();
        a.merge(&b);
        assert_eq!(a.get_by_dot_path("inline_key"), Some(json!(true)));
        // Post-merge mutation of the source must not leak into the target.
        b.set_fast("inline_key", false);
        assert_eq!(a.get_by_dot_path("inline_key"), Some(json!(true)));
    }

    #[test]
    fn merge_with_self_is_a_no_op() {
        let a = AttrMap::new();
        a.set_by_dot_path("k", 1);
        a.merge(&a);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn clone_is_independent() {
        let a = AttrMap::new();
        a.set_by_dot_path("shared", 1);
        let c = a.clone();
        a.set_by_dot_path("only_a", 2);
        c.set_by_dot_path("only_c", 3);
        assert!(!c.has_by_dot_path("only_a"));
        assert!(!a.has_by_dot_path("only_c"));
        assert_eq!(c.get_by_dot_path("shared"), Some(json!(1)));
    }

    #[test]
    fn walk_visits_every_path_once() {
        let mut attrs = AttrMap::new();
        attrs.set_fast("a", 1);
        attrs.set_by_dot_path("b.c", 2);
        let mut seen = Vec::new();
        attrs.walk(|path, _| seen.push(path.to_owned()));
        seen.sort();
        assert_eq!(seen, vec!["a", "b.c"]);
    }

    #[test]
    fn keys_and_clear() {
        let mut attrs = AttrMap::new();
        attrs.set_by_dot_path("a", 1);
        attrs.set_by_dot_path("b", 2);
        let mut keys = attrs.keys();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
        attrs.clear();
        assert!(attrs.is_empty());
        assert!(attrs.keys().is_empty());
    }

    #[test]
    fn nested_view_splits_flat_keys() {
        let attrs = AttrMap::new();
        attrs.set_by_dot_path("user.profile.name", "Ada");
        attrs.set_by_dot_path("user.profile.email", "ada@example.org");
        attrs.set(&["active"], true);
        let nested = Value::Object(attrs.to_nested());
        assert_eq!(
            nested,
            json!({
                "user": {"profile": {"name": "Ada", "email": "ada@example.org"}},
                "active": true
            })
        );
    }

    #[test]
    fn nested_view_conflict_prefers_structure() {
        let leaf_first = AttrMap::new();
        leaf_first.set_by_dot_path("a", "scalar");
        leaf_first.set_by_dot_path("a.b", 1);

        let tree_first = AttrMap::new();
        tree_first.set_by_dot_path("a.b", 1);
        tree_first.set_by_dot_path("a", "scalar");

        let expected = json!({"a": {"b": 1}});
        assert_eq!(Value::Object(leaf_first.to_nested()), expected);
        assert_eq!(Value::Object(tree_first.to_nested()), expected);
    }

    #[test]
    fn compact_json_is_flat_and_escaped() {
        let attrs = AttrMap::new();
        attrs.set_by_dot_path("user.name", "A\"da\n");
        attrs.set_by_dot_path("tab\tkey", 1);
        let bytes = attrs.to_compact_json().unwrap();
        let parsed: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["user.name"], json!("A\"da\n"));
        assert_eq!(parsed["tab\tkey"], json!(1));
    }

    #[test]
    fn compact_json_of_empty_store_is_empty_object() {
        let attrs = AttrMap::new();
        assert_eq!(attrs.to_compact_json().unwrap(), b"{}");
    }
}
