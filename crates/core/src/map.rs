//! Maps
//!
//! Hash-array-mapped tries keyed by object hash, five bits per level.
//! Spines are `Arc`-shared; updates copy only the path from root to the
//! touched slot (`Arc::make_mut`), so a uniquely owned map updates in
//! place and a shared one copies-on-write. Keys may be any hashable
//! object.

use crate::hashing;
use crate::object::{AvailObject, Repr};
use std::sync::Arc;

const BITS_PER_LEVEL: u32 = 5;
const LEVEL_MASK: u32 = 0x1F;
/// Past this depth the 32-bit hash is exhausted; ties become collision
/// buckets.
const MAX_DEPTH: u32 = 32 / BITS_PER_LEVEL;

#[derive(Clone)]
enum Entry {
    Leaf { key: AvailObject, value: AvailObject },
    Child(Arc<Node>),
}

#[derive(Clone)]
enum Node {
    Bitmap { bitmap: u32, entries: Vec<Entry> },
    Collision { pairs: Vec<(AvailObject, AvailObject)> },
}

impl Node {
    fn empty_bitmap() -> Node {
        Node::Bitmap {
            bitmap: 0,
            entries: Vec::new(),
        }
    }
}

/// A persistent dictionary from objects to objects.
#[derive(Clone, Default)]
pub struct AvailMap {
    root: Option<Arc<Node>>,
    size: usize,
}

impl AvailMap {
    pub fn new() -> AvailMap {
        AvailMap::default()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn get(&self, key: &AvailObject) -> Option<AvailObject> {
        let root = self.root.as_ref()?;
        let hash = key.hash();
        lookup(root, key, hash, 0)
    }

    pub fn contains_key(&self, key: &AvailObject) -> bool {
        self.get(key).is_some()
    }

    /// This map plus one binding. Replacing an existing key keeps the size.
    pub fn with(&self, key: AvailObject, value: AvailObject) -> AvailMap {
        let hash = key.hash();
        let mut root = self
            .root
            .clone()
            .unwrap_or_else(|| Arc::new(Node::empty_bitmap()));
        let added = insert(&mut root, key, value, hash, 0);
        AvailMap {
            root: Some(root),
            size: self.size + usize::from(added),
        }
    }

    /// This map minus one binding, if present.
    pub fn without(&self, key: &AvailObject) -> AvailMap {
        let Some(root) = self.root.clone() else {
            return self.clone();
        };
        let mut root = root;
        let removed = remove(&mut root, key, key.hash(), 0);
        if !removed {
            return self.clone();
        }
        AvailMap {
            root: Some(root),
            size: self.size - 1,
        }
    }

    /// Visit every binding. Order is hash order: stable for a given
    /// population, meaningless to callers.
    pub fn for_each(&self, mut f: impl FnMut(&AvailObject, &AvailObject)) {
        if let Some(root) = &self.root {
            walk(root, &mut f);
        }
    }

    pub fn entries(&self) -> Vec<(AvailObject, AvailObject)> {
        let mut out = Vec::with_capacity(self.size);
        self.for_each(|k, v| out.push((k.clone(), v.clone())));
        out
    }

    pub fn keys(&self) -> Vec<AvailObject> {
        let mut out = Vec::with_capacity(self.size);
        self.for_each(|k, _| out.push(k.clone()));
        out
    }

    pub fn values(&self) -> Vec<AvailObject> {
        let mut out = Vec::with_capacity(self.size);
        self.for_each(|_, v| out.push(v.clone()));
        out
    }

    /// Structural equality: same size, and every binding of one is present
    /// (with an equal value) in the other.
    pub fn equals(&self, other: &AvailMap) -> bool {
        if self.size != other.size {
            return false;
        }
        let mut equal = true;
        self.for_each(|k, v| {
            if equal {
                match other.get(k) {
                    Some(other_value) if other_value.equals(v) => {}
                    _ => equal = false,
                }
            }
        });
        equal
    }

    /// Order-independent hash over the bindings.
    pub fn hash(&self) -> u32 {
        let mut acc = hashing::scramble(0x4D41_5000 ^ self.size as u32);
        self.for_each(|k, v| {
            acc = hashing::combine_unordered(acc, k.hash() ^ v.hash().rotate_left(13));
        });
        acc
    }

    pub fn children(&self) -> Vec<AvailObject> {
        let mut out = Vec::with_capacity(self.size * 2);
        self.for_each(|k, v| {
            out.push(k.clone());
            out.push(v.clone());
        });
        out
    }

    pub(crate) fn format(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        let mut result = Ok(());
        self.for_each(|k, v| {
            if result.is_ok() {
                if !first {
                    result = write!(f, ", ");
                }
                if result.is_ok() {
                    result = write!(f, "{}→{}", k, v);
                }
                first = false;
            }
        });
        result?;
        write!(f, "}}")
    }
}

/// Wrap into an object.
pub fn map_object(map: AvailMap) -> AvailObject {
    AvailObject::new(Repr::Map(map))
}

fn slot_index(hash: u32, depth: u32) -> u32 {
    (hash >> (depth * BITS_PER_LEVEL)) & LEVEL_MASK
}

fn lookup(node: &Node, key: &AvailObject, hash: u32, depth: u32) -> Option<AvailObject> {
    match node {
        Node::Collision { pairs } => pairs
            .iter()
            .find(|(k, _)| k.equals(key))
            .map(|(_, v)| v.clone()),
        Node::Bitmap { bitmap, entries } => {
            let bit = 1u32 << slot_index(hash, depth);
            if bitmap & bit == 0 {
                return None;
            }
            let position = (bitmap & (bit - 1)).count_ones() as usize;
            match &entries[position] {
                Entry::Leaf { key: k, value } if k.equals(key) => Some(value.clone()),
                Entry::Leaf { .. } => None,
                Entry::Child(child) => lookup(child, key, hash, depth + 1),
            }
        }
    }
}

/// Insert along the path, copying shared spine nodes. Returns true when a
/// new binding was added (false when an existing key was replaced).
fn insert(node: &mut Arc<Node>, key: AvailObject, value: AvailObject, hash: u32, depth: u32) -> bool {
    let node = Arc::make_mut(node);
    match node {
        Node::Collision { pairs } => {
            if let Some(slot) = pairs.iter_mut().find(|(k, _)| k.equals(&key)) {
                slot.1 = value;
                false
            } else {
                pairs.push((key, value));
                true
            }
        }
        Node::Bitmap { bitmap, entries } => {
            let bit = 1u32 << slot_index(hash, depth);
            let position = (*bitmap & (bit - 1)).count_ones() as usize;
            if *bitmap & bit == 0 {
                entries.insert(position, Entry::Leaf { key, value });
                *bitmap |= bit;
                return true;
            }
            match &mut entries[position] {
                Entry::Child(child) => insert(child, key, value, hash, depth + 1),
                Entry::Leaf {
                    key: existing_key,
                    value: existing_value,
                } => {
                    if existing_key.equals(&key) {
                        *existing_value = value;
                        return false;
                    }
                    // Two distinct keys share this slot: grow a child.
                    let old_key = existing_key.clone();
                    let old_value = existing_value.clone();
                    let old_hash = old_key.hash();
                    let mut child = if depth + 1 >= MAX_DEPTH {
                        Arc::new(Node::Collision {
                            pairs: vec![(old_key, old_value)],
                        })
                    } else {
                        let mut fresh = Arc::new(Node::empty_bitmap());
                        insert(&mut fresh, old_key, old_value, old_hash, depth + 1);
                        fresh
                    };
                    let added = insert(&mut child, key, value, hash, depth + 1);
                    entries[position] = Entry::Child(child);
                    added
                }
            }
        }
    }
}

fn remove(node: &mut Arc<Node>, key: &AvailObject, hash: u32, depth: u32) -> bool {
    let node = Arc::make_mut(node);
    match node {
        Node::Collision { pairs } => {
            if let Some(index) = pairs.iter().position(|(k, _)| k.equals(key)) {
                pairs.remove(index);
                true
            } else {
                false
            }
        }
        Node::Bitmap { bitmap, entries } => {
            let bit = 1u32 << slot_index(hash, depth);
            if *bitmap & bit == 0 {
                return false;
            }
            let position = (*bitmap & (bit - 1)).count_ones() as usize;
            match &mut entries[position] {
                Entry::Leaf { key: k, .. } => {
                    if k.equals(key) {
                        entries.remove(position);
                        *bitmap &= !bit;
                        true
                    } else {
                        false
                    }
                }
                Entry::Child(child) => remove(child, key, hash, depth + 1),
            }
        }
    }
}

fn walk(node: &Node, f: &mut impl FnMut(&AvailObject, &AvailObject)) {
    match node {
        Node::Collision { pairs } => {
            for (k, v) in pairs {
                f(k, v);
            }
        }
        Node::Bitmap { entries, .. } => {
            for entry in entries {
                match entry {
                    Entry::Leaf { key, value } => f(key, value),
                    Entry::Child(child) => walk(child, f),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::string_from_str;

    fn int(v: i64) -> AvailObject {
        AvailObject::from_i64(v)
    }

    #[test]
    fn test_insert_get_remove() {
        let mut map = AvailMap::new();
        for i in 0..200 {
            map = map.with(int(i), int(i * 10));
        }
        assert_eq!(map.size(), 200);
        for i in 0..200 {
            assert!(map.get(&int(i)).unwrap().equals(&int(i * 10)));
        }
        assert!(map.get(&int(999)).is_none());
        for i in (0..200).step_by(2) {
            map = map.without(&int(i));
        }
        assert_eq!(map.size(), 100);
        assert!(map.get(&int(0)).is_none());
        assert!(map.get(&int(1)).is_some());
    }

    #[test]
    fn test_replace_keeps_size() {
        let map = AvailMap::new().with(int(1), int(10)).with(int(1), int(20));
        assert_eq!(map.size(), 1);
        assert!(map.get(&int(1)).unwrap().equals(&int(20)));
    }

    #[test]
    fn test_persistence() {
        let base = AvailMap::new().with(int(1), int(10));
        let extended = base.with(int(2), int(20));
        assert_eq!(base.size(), 1);
        assert_eq!(extended.size(), 2);
        assert!(base.get(&int(2)).is_none());
    }

    #[test]
    fn test_structural_keys() {
        let map = AvailMap::new().with(string_from_str("key"), int(5));
        // A fresh, structurally equal string finds the binding.
        assert!(map.get(&string_from_str("key")).unwrap().equals(&int(5)));
    }

    #[test]
    fn test_equality_and_hash_ignore_insertion_order() {
        let a = AvailMap::new()
            .with(int(1), int(10))
            .with(int(2), int(20))
            .with(int(3), int(30));
        let b = AvailMap::new()
            .with(int(3), int(30))
            .with(int(1), int(10))
            .with(int(2), int(20));
        assert!(a.equals(&b));
        assert_eq!(a.hash(), b.hash());
        let c = b.with(int(1), int(99));
        assert!(!a.equals(&c));
    }
}
