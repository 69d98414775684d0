//! Concatenation trees
//!
//! Large concatenations build shallow, wide trees instead of copying.
//! Every node records cumulative child sizes for O(log n) indexing and a
//! level; children always have strictly smaller levels (a non-tree tuple
//! is level 0), which bounds depth logarithmically in the number of
//! concatenations.

use super::{element_at, tuple_size, Element, TupleRepr};
use crate::object::{AvailObject, Repr};

/// Widest a node grows before concatenation starts a new sibling.
pub const MAX_CHILDREN: usize = 16;

#[derive(Clone)]
pub struct TreeTuple {
    /// Child tuples, any representation, level strictly below ours.
    pub children: Vec<AvailObject>,
    /// `cumulative[i]` = total size of children `0..=i`.
    pub cumulative: Vec<usize>,
    pub level: u8,
}

impl TreeTuple {
    pub fn size(&self) -> usize {
        *self.cumulative.last().unwrap_or(&0)
    }

    /// 1-based element lookup: binary search the cumulative sizes, then
    /// recurse into the owning child.
    pub fn element_at(&self, index: usize) -> Element {
        let child_index = self.cumulative.partition_point(|end| *end < index);
        let child = &self.children[child_index];
        let before = if child_index == 0 {
            0
        } else {
            self.cumulative[child_index - 1]
        };
        let repr = match child.traverse().repr_snapshot() {
            Repr::Tuple(t) => t,
            _ => panic!("tree tuple child is not a tuple"),
        };
        element_at(&repr, index - before)
    }
}

/// The level of any tuple: trees carry one, everything else is level 0.
pub fn level_of(object: &AvailObject) -> u8 {
    match &*object.traverse().read_repr() {
        Repr::Tuple(TupleRepr::Tree(t)) => t.level,
        _ => 0,
    }
}

/// Build a node at `level` over the given children (sizes recomputed).
pub fn tree_from_children(children: Vec<AvailObject>, level: u8) -> AvailObject {
    debug_assert!(!children.is_empty());
    debug_assert!(children.iter().all(|c| level_of(c) < level));
    let mut cumulative = Vec::with_capacity(children.len());
    let mut total = 0usize;
    for child in &children {
        total += tuple_size(child);
        cumulative.push(total);
    }
    AvailObject::new(Repr::Tuple(TupleRepr::Tree(TreeTuple {
        children,
        cumulative,
        level,
    })))
}

/// Concatenate two tuples into a tree, keeping nodes wide and levels low.
pub fn tree_concat(a: AvailObject, b: AvailObject) -> AvailObject {
    let level_a = level_of(&a);
    let level_b = level_of(&b);
    if level_a == level_b {
        // Same height: merge child lists when both are trees with room,
        // else pair them under a fresh parent.
        if level_a > 0 {
            let (ca, cb) = (children_of_tree(&a), children_of_tree(&b));
            if ca.len() + cb.len() <= MAX_CHILDREN {
                let mut children = ca;
                children.extend(cb);
                return tree_from_children(children, level_a);
            }
        }
        return tree_from_children(vec![a, b], level_a + 1);
    }
    if level_a > level_b {
        // Push b down into a's rightmost child.
        let mut children = children_of_tree(&a);
        let last = children.pop().expect("tree node with no children");
        let merged = tree_concat(last, b);
        if level_of(&merged) < level_a {
            children.push(merged);
            return tree_from_children(children, level_a);
        }
        // The merge grew to our own level: splice its children in.
        let merged_children = children_of_tree(&merged);
        if children.len() + merged_children.len() <= MAX_CHILDREN {
            children.extend(merged_children);
            return tree_from_children(children, level_a);
        }
        let left = tree_from_children(children, level_a);
        return tree_from_children(vec![left, merged], level_a + 1);
    }
    // Mirror image: push a down into b's leftmost child.
    let mut children = children_of_tree(&b);
    let first = children.remove(0);
    let merged = tree_concat(a, first);
    if level_of(&merged) < level_b {
        children.insert(0, merged);
        return tree_from_children(children, level_b);
    }
    let merged_children = children_of_tree(&merged);
    if children.len() + merged_children.len() <= MAX_CHILDREN {
        let mut all = merged_children;
        all.extend(children);
        return tree_from_children(all, level_b);
    }
    let right = tree_from_children(children, level_b);
    tree_from_children(vec![merged, right], level_b + 1)
}

fn children_of_tree(object: &AvailObject) -> Vec<AvailObject> {
    match &*object.traverse().read_repr() {
        Repr::Tuple(TupleRepr::Tree(t)) => t.children.clone(),
        _ => panic!("expected a tree tuple"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{concatenate, tuple_at, tuple_from_objects};

    fn ints(range: std::ops::Range<i64>) -> AvailObject {
        tuple_from_objects(range.map(AvailObject::from_i64).collect())
    }

    #[test]
    fn test_level_invariant_after_repeated_concat() {
        let mut acc = ints(0..50);
        for chunk in 0..20 {
            let next = ints(chunk * 50..(chunk + 1) * 50);
            acc = concatenate(&acc, &next, false);
        }
        fn check(object: &AvailObject) {
            if let Repr::Tuple(TupleRepr::Tree(t)) = &*object.traverse().read_repr() {
                for child in &t.children {
                    assert!(level_of(child) < t.level, "child level must be below parent");
                    check(child);
                }
            }
        }
        check(&acc);
    }

    #[test]
    fn test_indexing_across_children() {
        let a = ints(0..60);
        let b = ints(100..170);
        let joined = tree_concat(a, b);
        assert_eq!(tuple_at(&joined, 1).as_i64(), Some(0));
        assert_eq!(tuple_at(&joined, 60).as_i64(), Some(59));
        assert_eq!(tuple_at(&joined, 61).as_i64(), Some(100));
        assert_eq!(tuple_at(&joined, 130).as_i64(), Some(169));
    }

    #[test]
    fn test_wide_merge_keeps_level() {
        let a = tree_concat(ints(0..60), ints(0..60));
        let b = tree_concat(ints(0..60), ints(0..60));
        let joined = tree_concat(a, b);
        // Two level-1 nodes with four total children merge flat.
        assert_eq!(level_of(&joined), 1);
    }
}
