//! Integer range types
//!
//! A range type admits the extended integers between its two bounds.
//! Finite bounds are always stored inclusive: an exclusive finite bound is
//! rewritten by one at construction, so `(3..7)` and `[4..6]` are the same
//! type with the same hash. Only the infinities keep an inclusivity flag
//! (an inclusive infinite bound admits the infinity itself, the extended-
//! integer case). An empty range degenerates to bottom.

use crate::integer::IntegerRepr;
use num_bigint::BigInt;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBound {
    pub value: IntegerRepr,
    pub inclusive: bool,
}

impl TypeBound {
    pub fn inclusive(value: IntegerRepr) -> TypeBound {
        TypeBound {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: IntegerRepr) -> TypeBound {
        TypeBound {
            value,
            inclusive: false,
        }
    }
}

/// A canonical range: finite bounds inclusive, known non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRepr {
    pub lower: TypeBound,
    pub upper: TypeBound,
}

/// Canonicalize; `None` means the range is empty (the caller answers
/// bottom).
pub fn canonicalize(lower: TypeBound, upper: TypeBound) -> Option<RangeRepr> {
    let lower = match (&lower.value, lower.inclusive) {
        (IntegerRepr::Finite(v), false) => TypeBound::inclusive(IntegerRepr::Finite(v + 1)),
        _ => lower,
    };
    let upper = match (&upper.value, upper.inclusive) {
        (IntegerRepr::Finite(v), false) => TypeBound::inclusive(IntegerRepr::Finite(v - 1)),
        _ => upper,
    };
    match lower.value.compare(&upper.value) {
        Ordering::Greater => None,
        Ordering::Equal => {
            if lower.inclusive && upper.inclusive {
                Some(RangeRepr { lower, upper })
            } else {
                None
            }
        }
        Ordering::Less => Some(RangeRepr { lower, upper }),
    }
}

impl RangeRepr {
    /// Does the range admit this extended integer?
    pub fn admits(&self, value: &IntegerRepr) -> bool {
        let above_lower = match value.compare(&self.lower.value) {
            Ordering::Greater => true,
            Ordering::Equal => self.lower.inclusive,
            Ordering::Less => false,
        };
        let below_upper = match value.compare(&self.upper.value) {
            Ordering::Less => true,
            Ordering::Equal => self.upper.inclusive,
            Ordering::Greater => false,
        };
        above_lower && below_upper
    }

    /// Is this range a single integer `[x..x]`?
    pub fn single_value(&self) -> Option<&IntegerRepr> {
        if self.lower.value == self.upper.value {
            Some(&self.lower.value)
        } else {
            None
        }
    }

    /// Subtype reduces to four boundary comparisons.
    pub fn is_subrange_of(&self, other: &RangeRepr) -> bool {
        lower_admits_all(&other.lower, &self.lower) && upper_admits_all(&other.upper, &self.upper)
    }

    /// Smallest range covering both (the join in the range sublattice).
    pub fn union(&self, other: &RangeRepr) -> RangeRepr {
        RangeRepr {
            lower: wider_lower(&self.lower, &other.lower).clone(),
            upper: wider_upper(&self.upper, &other.upper).clone(),
        }
    }

    /// Overlap of the two; `None` when disjoint.
    pub fn intersection(&self, other: &RangeRepr) -> Option<RangeRepr> {
        let lower = narrower_lower(&self.lower, &other.lower).clone();
        let upper = narrower_upper(&self.upper, &other.upper).clone();
        canonicalize(lower, upper)
    }
}

/// Does `outer` (a lower bound) admit everything `inner` (another lower
/// bound) admits?
fn lower_admits_all(outer: &TypeBound, inner: &TypeBound) -> bool {
    match outer.value.compare(&inner.value) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => outer.inclusive || !inner.inclusive,
    }
}

fn upper_admits_all(outer: &TypeBound, inner: &TypeBound) -> bool {
    match outer.value.compare(&inner.value) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => outer.inclusive || !inner.inclusive,
    }
}

fn wider_lower<'a>(a: &'a TypeBound, b: &'a TypeBound) -> &'a TypeBound {
    if lower_admits_all(a, b) { a } else { b }
}

fn narrower_lower<'a>(a: &'a TypeBound, b: &'a TypeBound) -> &'a TypeBound {
    if lower_admits_all(a, b) { b } else { a }
}

fn wider_upper<'a>(a: &'a TypeBound, b: &'a TypeBound) -> &'a TypeBound {
    if upper_admits_all(a, b) { a } else { b }
}

fn narrower_upper<'a>(a: &'a TypeBound, b: &'a TypeBound) -> &'a TypeBound {
    if upper_admits_all(a, b) { b } else { a }
}

/// `[x..x]`.
pub fn single(value: BigInt) -> RangeRepr {
    let bound = TypeBound::inclusive(IntegerRepr::from_bigint(value));
    RangeRepr {
        lower: bound.clone(),
        upper: bound,
    }
}
