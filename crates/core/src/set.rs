//! Sets
//!
//! A set is a unit-valued map: membership rides the same hash-array-mapped
//! trie the dictionaries use. Element order is hash order and never
//! observable in-language.

use crate::hashing;
use crate::map::AvailMap;
use crate::object::{AvailObject, Repr};

#[derive(Clone, Default)]
pub struct AvailSet {
    map: AvailMap,
}

impl AvailSet {
    pub fn new() -> AvailSet {
        AvailSet::default()
    }

    pub fn from_elements(elements: impl IntoIterator<Item = AvailObject>) -> AvailSet {
        let mut set = AvailSet::new();
        for element in elements {
            set = set.with(element);
        }
        set
    }

    pub fn size(&self) -> usize {
        self.map.size()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, element: &AvailObject) -> bool {
        self.map.contains_key(element)
    }

    pub fn with(&self, element: AvailObject) -> AvailSet {
        AvailSet {
            map: self.map.with(element, AvailObject::nil()),
        }
    }

    pub fn without(&self, element: &AvailObject) -> AvailSet {
        AvailSet {
            map: self.map.without(element),
        }
    }

    pub fn elements(&self) -> Vec<AvailObject> {
        self.map.keys()
    }

    pub fn for_each(&self, mut f: impl FnMut(&AvailObject)) {
        self.map.for_each(|k, _| f(k));
    }

    pub fn union(&self, other: &AvailSet) -> AvailSet {
        // Fold the smaller side into the larger.
        let (small, large) = if self.size() <= other.size() {
            (self, other)
        } else {
            (other, self)
        };
        let mut out = large.clone();
        small.for_each(|e| {
            if !out.contains(e) {
                out = out.with(e.clone());
            }
        });
        out
    }

    pub fn intersection(&self, other: &AvailSet) -> AvailSet {
        let (small, large) = if self.size() <= other.size() {
            (self, other)
        } else {
            (other, self)
        };
        let mut out = AvailSet::new();
        small.for_each(|e| {
            if large.contains(e) {
                out = out.with(e.clone());
            }
        });
        out
    }

    pub fn difference(&self, other: &AvailSet) -> AvailSet {
        let mut out = AvailSet::new();
        self.for_each(|e| {
            if !other.contains(e) {
                out = out.with(e.clone());
            }
        });
        out
    }

    pub fn is_subset_of(&self, other: &AvailSet) -> bool {
        if self.size() > other.size() {
            return false;
        }
        let mut subset = true;
        self.for_each(|e| {
            if subset && !other.contains(e) {
                subset = false;
            }
        });
        subset
    }

    pub fn equals(&self, other: &AvailSet) -> bool {
        self.size() == other.size() && self.is_subset_of(other)
    }

    /// Order-independent hash with a set-specific toggle so a set never
    /// hashes like the map carrying the same keys.
    pub fn hash(&self) -> u32 {
        let mut acc = hashing::scramble(0x5E70_0000 ^ self.size() as u32);
        self.for_each(|e| {
            acc = hashing::combine_unordered(acc, e.hash());
        });
        acc
    }

    pub fn children(&self) -> Vec<AvailObject> {
        self.elements()
    }

    pub(crate) fn format(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        let mut result = Ok(());
        self.for_each(|e| {
            if result.is_ok() {
                if !first {
                    result = write!(f, ", ");
                }
                if result.is_ok() {
                    result = write!(f, "{}", e);
                }
                first = false;
            }
        });
        result?;
        write!(f, "}}")
    }
}

/// Wrap into an object.
pub fn set_object(set: AvailSet) -> AvailObject {
    AvailObject::new(Repr::Set(set))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> AvailObject {
        AvailObject::from_i64(v)
    }

    fn set_of(values: &[i64]) -> AvailSet {
        AvailSet::from_elements(values.iter().map(|v| int(*v)))
    }

    #[test]
    fn test_membership_dedups() {
        let set = set_of(&[1, 2, 2, 3, 1]);
        assert_eq!(set.size(), 3);
        assert!(set.contains(&int(2)));
        assert!(!set.contains(&int(4)));
    }

    #[test]
    fn test_algebra() {
        let a = set_of(&[1, 2, 3]);
        let b = set_of(&[3, 4]);
        assert!(a.union(&b).equals(&set_of(&[1, 2, 3, 4])));
        assert!(a.intersection(&b).equals(&set_of(&[3])));
        assert!(a.difference(&b).equals(&set_of(&[1, 2])));
        assert!(set_of(&[1, 3]).is_subset_of(&a));
        assert!(!set_of(&[1, 9]).is_subset_of(&a));
    }

    #[test]
    fn test_hash_ignores_order() {
        let a = set_of(&[10, 20, 30]);
        let b = set_of(&[30, 10, 20]);
        assert!(a.equals(&b));
        assert_eq!(a.hash(), b.hash());
    }
}
