//! The type lattice
//!
//! Types are first-class objects. The lattice runs from bottom (no
//! instances) to top (every value including nil), with `any` just below
//! top covering every proper value. Between them sit the primitive kinds,
//! integer ranges, finite enumerations, and the parameterized tuple,
//! function, and phrase types.
//!
//! Three operations drive everything: `is_subtype_of`, `type_union` (join)
//! and `type_intersection` (meet). Unions may widen (the join of two
//! unrelated kinds is `any`), intersections only ever narrow.

pub mod integer_range;

use crate::hashing;
use crate::integer::{self, IntegerRepr};
use crate::object::{AvailObject, Repr};
use crate::phrase::PhraseKind;
use crate::set::AvailSet;
use crate::tuple;
use num_bigint::BigInt;
use std::fmt;
use std::sync::{Arc, OnceLock};

pub use integer_range::{RangeRepr, TypeBound};

/// Unparameterized kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    /// Every value except nil.
    Any,
    Atom,
    Character,
    /// Integers and floats together.
    Number,
    Float,
    Map,
    Set,
    Token,
    Variable,
    /// The kind of type objects (one-level metatype).
    Type,
}

impl PrimitiveKind {
    fn parent(self) -> Option<PrimitiveKind> {
        match self {
            PrimitiveKind::Any => None,
            PrimitiveKind::Float => Some(PrimitiveKind::Number),
            _ => Some(PrimitiveKind::Any),
        }
    }

    fn is_subkind_of(self, other: PrimitiveKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// Tuple types: a size range, exact types for the first few positions,
/// and a default type for the rest.
#[derive(Clone)]
pub struct TupleTypeRepr {
    pub sizes: RangeRepr,
    pub leading: Vec<AvailObject>,
    pub default: AvailObject,
}

impl TupleTypeRepr {
    /// The element type at 1-based `index`.
    pub fn type_at(&self, index: usize) -> AvailObject {
        if index <= self.leading.len() {
            self.leading[index - 1].clone()
        } else {
            self.default.clone()
        }
    }
}

/// The payload of a type object.
pub enum TypeRepr {
    Top,
    Bottom,
    Primitive(PrimitiveKind),
    IntegerRange(RangeRepr),
    Enumeration { instances: AvailSet },
    Tuple(TupleTypeRepr),
    Function {
        argument_types: Vec<AvailObject>,
        return_type: AvailObject,
    },
    Phrase {
        phrase_kind: PhraseKind,
        yield_type: AvailObject,
    },
}

fn type_object(repr: TypeRepr) -> AvailObject {
    AvailObject::new(Repr::Type(Arc::new(repr)))
}

// ----------------------------------------------------------------------
// Singleton constructors
// ----------------------------------------------------------------------

macro_rules! cached_type {
    ($name:ident, $repr:expr) => {
        pub fn $name() -> AvailObject {
            static CACHE: OnceLock<AvailObject> = OnceLock::new();
            CACHE
                .get_or_init(|| AvailObject::new_shared(Repr::Type(Arc::new($repr))))
                .clone()
        }
    };
}

cached_type!(top_type, TypeRepr::Top);
cached_type!(bottom_type, TypeRepr::Bottom);
cached_type!(any_type, TypeRepr::Primitive(PrimitiveKind::Any));
cached_type!(atom_type, TypeRepr::Primitive(PrimitiveKind::Atom));
cached_type!(character_type, TypeRepr::Primitive(PrimitiveKind::Character));
cached_type!(number_type, TypeRepr::Primitive(PrimitiveKind::Number));
cached_type!(float_type, TypeRepr::Primitive(PrimitiveKind::Float));
cached_type!(map_type, TypeRepr::Primitive(PrimitiveKind::Map));
cached_type!(set_type, TypeRepr::Primitive(PrimitiveKind::Set));
cached_type!(token_type, TypeRepr::Primitive(PrimitiveKind::Token));
cached_type!(variable_type, TypeRepr::Primitive(PrimitiveKind::Variable));
cached_type!(type_type, TypeRepr::Primitive(PrimitiveKind::Type));

/// `(-∞..∞)`: all finite integers.
pub fn integer_type() -> AvailObject {
    static CACHE: OnceLock<AvailObject> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            integer_range_type(
                TypeBound::exclusive(IntegerRepr::NegativeInfinity),
                TypeBound::exclusive(IntegerRepr::PositiveInfinity),
            )
            .make_shared()
        })
        .clone()
}

/// `[-∞..∞]`: integers plus both infinities.
pub fn extended_integer_type() -> AvailObject {
    static CACHE: OnceLock<AvailObject> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            integer_range_type(
                TypeBound::inclusive(IntegerRepr::NegativeInfinity),
                TypeBound::inclusive(IntegerRepr::PositiveInfinity),
            )
            .make_shared()
        })
        .clone()
}

/// `[0..∞)`.
pub fn whole_number_type() -> AvailObject {
    static CACHE: OnceLock<AvailObject> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            integer_range_type(
                TypeBound::inclusive(IntegerRepr::from_i64(0)),
                TypeBound::exclusive(IntegerRepr::PositiveInfinity),
            )
            .make_shared()
        })
        .clone()
}

/// `[1..∞)`.
pub fn natural_number_type() -> AvailObject {
    static CACHE: OnceLock<AvailObject> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            integer_range_type(
                TypeBound::inclusive(IntegerRepr::from_i64(1)),
                TypeBound::exclusive(IntegerRepr::PositiveInfinity),
            )
            .make_shared()
        })
        .clone()
}

/// The type of all strings: tuples of characters, any size.
pub fn string_type() -> AvailObject {
    static CACHE: OnceLock<AvailObject> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            tuple_type(
                whole_range(),
                Vec::new(),
                character_type(),
            )
            .make_shared()
        })
        .clone()
}

/// The most general tuple type.
pub fn most_general_tuple_type() -> AvailObject {
    static CACHE: OnceLock<AvailObject> = OnceLock::new();
    CACHE
        .get_or_init(|| tuple_type(whole_range(), Vec::new(), any_type()).make_shared())
        .clone()
}

/// `{true, false}`.
pub fn boolean_type() -> AvailObject {
    static CACHE: OnceLock<AvailObject> = OnceLock::new();
    CACHE
        .get_or_init(|| {
            enumeration_type(AvailSet::from_elements([
                crate::atom::true_object(),
                crate::atom::false_object(),
            ]))
            .make_shared()
        })
        .clone()
}

fn whole_range() -> RangeRepr {
    integer_range::canonicalize(
        TypeBound::inclusive(IntegerRepr::from_i64(0)),
        TypeBound::exclusive(IntegerRepr::PositiveInfinity),
    )
    .expect("whole-number range is not empty")
}

// ----------------------------------------------------------------------
// Parameterized constructors
// ----------------------------------------------------------------------

/// An integer range type; empty ranges collapse to bottom.
pub fn integer_range_type(lower: TypeBound, upper: TypeBound) -> AvailObject {
    match integer_range::canonicalize(lower, upper) {
        Some(range) => type_object(TypeRepr::IntegerRange(range)),
        None => bottom_type(),
    }
}

/// `[x..x]`.
pub fn single_integer(value: BigInt) -> AvailObject {
    type_object(TypeRepr::IntegerRange(integer_range::single(value)))
}

/// An enumeration over a finite instance set; the empty set is bottom.
pub fn enumeration_type(instances: AvailSet) -> AvailObject {
    if instances.is_empty() {
        return bottom_type();
    }
    type_object(TypeRepr::Enumeration { instances })
}

/// The type whose sole instance is `value`. Integers canonicalize to
/// `[x..x]` so that `5`'s type and the range built from 5 never alias
/// into distinct types.
pub fn instance_type(value: &AvailObject) -> AvailObject {
    if let Some(IntegerRepr::Finite(v)) = value.as_integer() {
        return single_integer(v);
    }
    enumeration_type(AvailSet::from_elements([value.make_immutable()]))
}

pub fn tuple_type(
    sizes: RangeRepr,
    leading: Vec<AvailObject>,
    default: AvailObject,
) -> AvailObject {
    type_object(TypeRepr::Tuple(TupleTypeRepr {
        sizes,
        leading,
        default,
    }))
}

/// A fixed-arity tuple type with exact per-position types.
pub fn tuple_type_for_leading(leading: Vec<AvailObject>) -> AvailObject {
    let n = leading.len() as i64;
    let sizes = integer_range::canonicalize(
        TypeBound::inclusive(IntegerRepr::from_i64(n)),
        TypeBound::inclusive(IntegerRepr::from_i64(n)),
    )
    .expect("degenerate size range");
    tuple_type(sizes, leading, bottom_type())
}

pub fn function_type(argument_types: Vec<AvailObject>, return_type: AvailObject) -> AvailObject {
    type_object(TypeRepr::Function {
        argument_types,
        return_type,
    })
}

pub fn phrase_type(phrase_kind: PhraseKind, yield_type: AvailObject) -> AvailObject {
    type_object(TypeRepr::Phrase {
        phrase_kind,
        yield_type,
    })
}

// ----------------------------------------------------------------------
// kind() and instance tests
// ----------------------------------------------------------------------

/// The most-general type of a value.
pub fn kind_of(object: &AvailObject) -> AvailObject {
    let repr = object.traverse().repr_snapshot();
    match &repr {
        Repr::Indirection(t) => kind_of(t),
        Repr::Nil => top_type(),
        Repr::Atom(_) => atom_type(),
        Repr::Character(_) => character_type(),
        Repr::Integer(IntegerRepr::Finite(v)) => single_integer(v.clone()),
        Repr::Integer(infinite) => {
            let bound = TypeBound::inclusive(infinite.clone());
            integer_range_type(bound.clone(), bound)
        }
        Repr::Float(_) => float_type(),
        Repr::Tuple(t) => {
            let size = t.size();
            let sizes = integer_range::canonicalize(
                TypeBound::inclusive(IntegerRepr::from_i64(size as i64)),
                TypeBound::inclusive(IntegerRepr::from_i64(size as i64)),
            )
            .expect("degenerate size range");
            // Keep per-position precision for short tuples; summarize long
            // ones through the default.
            if size <= 10 {
                let leading: Vec<AvailObject> =
                    tuple::tuple_iter(object).map(|e| kind_of(&e)).collect();
                tuple_type(sizes, leading, bottom_type())
            } else {
                let mut default = bottom_type();
                for element in tuple::tuple_iter(object) {
                    default = type_union(&default, &kind_of(&element));
                }
                tuple_type(sizes, Vec::new(), default)
            }
        }
        Repr::Map(_) => map_type(),
        Repr::Set(_) => set_type(),
        Repr::Token(_) => token_type(),
        Repr::Variable(_) => variable_type(),
        Repr::Function(f) => f.raw.function_type.clone(),
        Repr::Phrase(p) => phrase_type(p.phrase_kind(), p.expression_type()),
        Repr::Type(_) => type_type(),
    }
}

/// Is `value` an instance of the type `type_object`?
pub fn is_instance(value: &AvailObject, type_object: &AvailObject) -> bool {
    let Some(repr) = type_object.as_type() else {
        return false;
    };
    match &*repr {
        TypeRepr::Top => true,
        TypeRepr::Bottom => false,
        TypeRepr::Primitive(kind) => primitive_instance(value, *kind),
        TypeRepr::IntegerRange(range) => match value.as_integer() {
            Some(v) => range.admits(&v),
            None => false,
        },
        TypeRepr::Enumeration { instances } => instances.contains(value),
        TypeRepr::Tuple(tt) => {
            if !value.is_tuple() {
                return false;
            }
            let size = tuple::tuple_size(value);
            if !tt.sizes.admits(&IntegerRepr::from_i64(size as i64)) {
                return false;
            }
            (1..=size).all(|i| {
                let element = tuple::tuple_at(value, i);
                is_instance(&element, &tt.type_at(i))
            })
        }
        TypeRepr::Function { .. } => match value.as_function() {
            Some(f) => is_subtype_of(&f.raw.function_type, type_object),
            None => false,
        },
        TypeRepr::Phrase {
            phrase_kind,
            yield_type,
        } => match value.as_phrase() {
            Some(p) => {
                p.phrase_kind().is_subkind_of(*phrase_kind)
                    && is_subtype_of(&p.expression_type(), yield_type)
            }
            None => false,
        },
    }
}

fn primitive_instance(value: &AvailObject, kind: PrimitiveKind) -> bool {
    use crate::descriptor::ReprKind;
    let repr_kind = value.repr_kind();
    match kind {
        PrimitiveKind::Any => !value.is_nil(),
        PrimitiveKind::Atom => repr_kind == ReprKind::Atom,
        PrimitiveKind::Character => repr_kind == ReprKind::Character,
        PrimitiveKind::Number => {
            repr_kind == ReprKind::Integer || repr_kind == ReprKind::Float
        }
        PrimitiveKind::Float => repr_kind == ReprKind::Float,
        PrimitiveKind::Map => repr_kind == ReprKind::Map,
        PrimitiveKind::Set => repr_kind == ReprKind::Set,
        PrimitiveKind::Token => repr_kind == ReprKind::Token,
        PrimitiveKind::Variable => repr_kind == ReprKind::Variable,
        PrimitiveKind::Type => repr_kind == ReprKind::Type,
    }
}

// ----------------------------------------------------------------------
// Subtype
// ----------------------------------------------------------------------

pub fn is_subtype_of(a: &AvailObject, b: &AvailObject) -> bool {
    let (Some(ra), Some(rb)) = (a.as_type(), b.as_type()) else {
        return false;
    };
    subtype(&ra, a, &rb, b)
}

fn subtype(ra: &TypeRepr, _a: &AvailObject, rb: &TypeRepr, b: &AvailObject) -> bool {
    match (ra, rb) {
        (TypeRepr::Bottom, _) => true,
        (_, TypeRepr::Top) => true,
        (TypeRepr::Top, _) => false,
        (_, TypeRepr::Bottom) => false,
        // An enumeration is a subtype of anything all its members inhabit.
        (TypeRepr::Enumeration { instances }, _) => {
            let mut all_in = true;
            instances.for_each(|instance| {
                if all_in && !is_instance(instance, b) {
                    all_in = false;
                }
            });
            all_in
        }
        (TypeRepr::IntegerRange(x), TypeRepr::IntegerRange(y)) => x.is_subrange_of(y),
        (TypeRepr::IntegerRange(x), TypeRepr::Enumeration { instances }) => {
            match x.single_value() {
                Some(IntegerRepr::Finite(v)) => {
                    instances.contains(&AvailObject::from_bigint(v.clone()))
                }
                _ => false,
            }
        }
        (TypeRepr::IntegerRange(_), TypeRepr::Primitive(kind)) => {
            PrimitiveKind::Number.is_subkind_of(*kind)
        }
        (TypeRepr::Primitive(x), TypeRepr::Primitive(y)) => x.is_subkind_of(*y),
        (TypeRepr::Tuple(x), TypeRepr::Tuple(y)) => tuple_subtype(x, y),
        (TypeRepr::Tuple(_), TypeRepr::Primitive(kind)) => *kind == PrimitiveKind::Any,
        (
            TypeRepr::Function {
                argument_types: args_a,
                return_type: ret_a,
            },
            TypeRepr::Function {
                argument_types: args_b,
                return_type: ret_b,
            },
        ) => {
            args_a.len() == args_b.len()
                && args_b
                    .iter()
                    .zip(args_a)
                    .all(|(wider, narrower)| is_subtype_of(wider, narrower))
                && is_subtype_of(ret_a, ret_b)
        }
        (TypeRepr::Function { .. }, TypeRepr::Primitive(kind)) => *kind == PrimitiveKind::Any,
        (
            TypeRepr::Phrase {
                phrase_kind: ka,
                yield_type: ya,
            },
            TypeRepr::Phrase {
                phrase_kind: kb,
                yield_type: yb,
            },
        ) => ka.is_subkind_of(*kb) && is_subtype_of(ya, yb),
        (TypeRepr::Phrase { .. }, TypeRepr::Primitive(kind)) => *kind == PrimitiveKind::Any,
        _ => false,
    }
}

fn tuple_subtype(a: &TupleTypeRepr, b: &TupleTypeRepr) -> bool {
    if !a.sizes.is_subrange_of(&b.sizes) {
        return false;
    }
    let positions = a.leading.len().max(b.leading.len());
    for i in 1..=positions {
        if !is_subtype_of(&a.type_at(i), &b.type_at(i)) {
            return false;
        }
    }
    is_subtype_of(&a.default, &b.default)
}

// ----------------------------------------------------------------------
// Union and intersection
// ----------------------------------------------------------------------

pub fn type_union(a: &AvailObject, b: &AvailObject) -> AvailObject {
    if is_subtype_of(a, b) {
        return b.clone();
    }
    if is_subtype_of(b, a) {
        return a.clone();
    }
    let (Some(ra), Some(rb)) = (a.as_type(), b.as_type()) else {
        return top_type();
    };
    match (&*ra, &*rb) {
        (TypeRepr::Enumeration { instances: x }, TypeRepr::Enumeration { instances: y }) => {
            enumeration_type(x.union(y))
        }
        (TypeRepr::IntegerRange(x), TypeRepr::IntegerRange(y)) => {
            type_object(TypeRepr::IntegerRange(x.union(y)))
        }
        (TypeRepr::Enumeration { instances }, TypeRepr::IntegerRange(range))
        | (TypeRepr::IntegerRange(range), TypeRepr::Enumeration { instances }) => {
            // All-integer enumerations widen into the covering range.
            let mut widened = range.clone();
            let mut all_integers = true;
            instances.for_each(|instance| {
                match instance.as_integer() {
                    Some(IntegerRepr::Finite(v)) => {
                        widened = widened.union(&integer_range::single(v));
                    }
                    _ => all_integers = false,
                }
            });
            if all_integers {
                type_object(TypeRepr::IntegerRange(widened))
            } else {
                any_type()
            }
        }
        (TypeRepr::Tuple(x), TypeRepr::Tuple(y)) => {
            let positions = x.leading.len().max(y.leading.len());
            let leading: Vec<AvailObject> = (1..=positions)
                .map(|i| type_union(&x.type_at(i), &y.type_at(i)))
                .collect();
            tuple_type(
                x.sizes.union(&y.sizes),
                leading,
                type_union(&x.default, &y.default),
            )
        }
        (
            TypeRepr::Function {
                argument_types: args_a,
                return_type: ret_a,
            },
            TypeRepr::Function {
                argument_types: args_b,
                return_type: ret_b,
            },
        ) if args_a.len() == args_b.len() => {
            let arguments: Vec<AvailObject> = args_a
                .iter()
                .zip(args_b)
                .map(|(x, y)| type_intersection(x, y))
                .collect();
            function_type(arguments, type_union(ret_a, ret_b))
        }
        (
            TypeRepr::Phrase {
                phrase_kind: ka,
                yield_type: ya,
            },
            TypeRepr::Phrase {
                phrase_kind: kb,
                yield_type: yb,
            },
        ) => phrase_type(ka.common_ancestor(*kb), type_union(ya, yb)),
        _ => {
            // Unrelated shapes join at the nearest primitive kind.
            let number_a = matches!(&*ra, TypeRepr::IntegerRange(_))
                || matches!(&*ra, TypeRepr::Primitive(PrimitiveKind::Float | PrimitiveKind::Number));
            let number_b = matches!(&*rb, TypeRepr::IntegerRange(_))
                || matches!(&*rb, TypeRepr::Primitive(PrimitiveKind::Float | PrimitiveKind::Number));
            if number_a && number_b {
                number_type()
            } else if matches!(&*ra, TypeRepr::Top) || matches!(&*rb, TypeRepr::Top) {
                top_type()
            } else {
                any_type()
            }
        }
    }
}

pub fn type_intersection(a: &AvailObject, b: &AvailObject) -> AvailObject {
    if is_subtype_of(a, b) {
        return a.clone();
    }
    if is_subtype_of(b, a) {
        return b.clone();
    }
    let (Some(ra), Some(rb)) = (a.as_type(), b.as_type()) else {
        return bottom_type();
    };
    match (&*ra, &*rb) {
        (TypeRepr::Enumeration { instances }, _) => {
            let survivors = AvailSet::from_elements(
                instances
                    .elements()
                    .into_iter()
                    .filter(|instance| is_instance(instance, b)),
            );
            enumeration_type(survivors)
        }
        (_, TypeRepr::Enumeration { instances }) => {
            let survivors = AvailSet::from_elements(
                instances
                    .elements()
                    .into_iter()
                    .filter(|instance| is_instance(instance, a)),
            );
            enumeration_type(survivors)
        }
        (TypeRepr::IntegerRange(x), TypeRepr::IntegerRange(y)) => match x.intersection(y) {
            Some(range) => type_object(TypeRepr::IntegerRange(range)),
            None => bottom_type(),
        },
        (TypeRepr::IntegerRange(_), TypeRepr::Primitive(kind))
        | (TypeRepr::Primitive(kind), TypeRepr::IntegerRange(_)) => {
            if PrimitiveKind::Number.is_subkind_of(*kind) {
                // The range side is the narrower of the two.
                if matches!(&*ra, TypeRepr::IntegerRange(_)) {
                    a.clone()
                } else {
                    b.clone()
                }
            } else {
                bottom_type()
            }
        }
        (TypeRepr::Tuple(x), TypeRepr::Tuple(y)) => {
            let Some(sizes) = x.sizes.intersection(&y.sizes) else {
                return bottom_type();
            };
            let positions = x.leading.len().max(y.leading.len());
            let leading: Vec<AvailObject> = (1..=positions)
                .map(|i| type_intersection(&x.type_at(i), &y.type_at(i)))
                .collect();
            tuple_type(sizes, leading, type_intersection(&x.default, &y.default))
        }
        (
            TypeRepr::Function {
                argument_types: args_a,
                return_type: ret_a,
            },
            TypeRepr::Function {
                argument_types: args_b,
                return_type: ret_b,
            },
        ) if args_a.len() == args_b.len() => {
            let arguments: Vec<AvailObject> = args_a
                .iter()
                .zip(args_b)
                .map(|(x, y)| type_union(x, y))
                .collect();
            function_type(arguments, type_intersection(ret_a, ret_b))
        }
        (
            TypeRepr::Phrase {
                phrase_kind: ka,
                yield_type: ya,
            },
            TypeRepr::Phrase {
                phrase_kind: kb,
                yield_type: yb,
            },
        ) => {
            let kind = if ka.is_subkind_of(*kb) {
                *ka
            } else if kb.is_subkind_of(*ka) {
                *kb
            } else {
                return bottom_type();
            };
            phrase_type(kind, type_intersection(ya, yb))
        }
        _ => bottom_type(),
    }
}

// ----------------------------------------------------------------------
// Reflection
// ----------------------------------------------------------------------

/// The instance set of an enumeration (or singular range).
pub fn instances(type_object: &AvailObject) -> Option<AvailSet> {
    match &*type_object.as_type()? {
        TypeRepr::Enumeration { instances } => Some(instances.clone()),
        TypeRepr::IntegerRange(range) => {
            let single = range.single_value()?;
            let object = AvailObject::new(Repr::Integer(single.clone()));
            Some(AvailSet::from_elements([object]))
        }
        _ => None,
    }
}

/// The element default of a tuple type.
pub fn content_type(type_object: &AvailObject) -> Option<AvailObject> {
    match &*type_object.as_type()? {
        TypeRepr::Tuple(tt) => Some(tt.default.clone()),
        _ => None,
    }
}

pub fn types_equal(a: &TypeRepr, b: &TypeRepr) -> bool {
    match (a, b) {
        (TypeRepr::Top, TypeRepr::Top) => true,
        (TypeRepr::Bottom, TypeRepr::Bottom) => true,
        (TypeRepr::Primitive(x), TypeRepr::Primitive(y)) => x == y,
        (TypeRepr::IntegerRange(x), TypeRepr::IntegerRange(y)) => x == y,
        (TypeRepr::Enumeration { instances: x }, TypeRepr::Enumeration { instances: y }) => {
            x.equals(y)
        }
        (TypeRepr::Tuple(x), TypeRepr::Tuple(y)) => {
            x.sizes == y.sizes
                && x.leading.len() == y.leading.len()
                && x.leading.iter().zip(&y.leading).all(|(p, q)| p.equals(q))
                && x.default.equals(&y.default)
        }
        (
            TypeRepr::Function {
                argument_types: args_a,
                return_type: ret_a,
            },
            TypeRepr::Function {
                argument_types: args_b,
                return_type: ret_b,
            },
        ) => {
            args_a.len() == args_b.len()
                && args_a.iter().zip(args_b).all(|(p, q)| p.equals(q))
                && ret_a.equals(ret_b)
        }
        (
            TypeRepr::Phrase {
                phrase_kind: ka,
                yield_type: ya,
            },
            TypeRepr::Phrase {
                phrase_kind: kb,
                yield_type: yb,
            },
        ) => ka == kb && ya.equals(yb),
        _ => false,
    }
}

pub fn hash_type(repr: &TypeRepr) -> u32 {
    match repr {
        TypeRepr::Top => hashing::scramble(0x7097_0000),
        TypeRepr::Bottom => hashing::scramble(0xB077_0000),
        TypeRepr::Primitive(kind) => hashing::scramble(0x4B00_0000 ^ *kind as u32),
        TypeRepr::IntegerRange(range) => {
            let lower = integer::hash_integer(&range.lower.value)
                ^ u32::from(range.lower.inclusive);
            let upper = integer::hash_integer(&range.upper.value)
                ^ u32::from(range.upper.inclusive);
            hashing::scramble(lower.wrapping_mul(hashing::MULTIPLIER).wrapping_add(upper))
        }
        // An enumeration's hash is derived from its instance set's hash.
        TypeRepr::Enumeration { instances } => hashing::scramble(instances.hash() ^ 0xE4F1_0000),
        TypeRepr::Tuple(tt) => {
            let mut h = hash_type(&TypeRepr::IntegerRange(tt.sizes.clone())) ^ 0x7091_E000;
            for leading in &tt.leading {
                h = h.wrapping_mul(hashing::MULTIPLIER).wrapping_add(leading.hash());
            }
            h.wrapping_mul(hashing::MULTIPLIER)
                .wrapping_add(tt.default.hash())
        }
        TypeRepr::Function {
            argument_types,
            return_type,
        } => {
            let mut h = hashing::scramble(0xF4_4C00 ^ argument_types.len() as u32);
            for arg in argument_types {
                h = h.wrapping_mul(hashing::MULTIPLIER).wrapping_add(arg.hash());
            }
            h.wrapping_mul(hashing::MULTIPLIER)
                .wrapping_add(return_type.hash())
        }
        TypeRepr::Phrase {
            phrase_kind,
            yield_type,
        } => hashing::scramble(*phrase_kind as u32 ^ 0x5045_0000)
            .wrapping_mul(hashing::MULTIPLIER)
            .wrapping_add(yield_type.hash()),
    }
}

pub(crate) fn children_of(repr: &TypeRepr) -> Vec<AvailObject> {
    match repr {
        TypeRepr::Enumeration { instances } => instances.elements(),
        TypeRepr::Tuple(tt) => {
            let mut out = tt.leading.clone();
            out.push(tt.default.clone());
            out
        }
        TypeRepr::Function {
            argument_types,
            return_type,
        } => {
            let mut out = argument_types.clone();
            out.push(return_type.clone());
            out
        }
        TypeRepr::Phrase { yield_type, .. } => vec![yield_type.clone()],
        _ => Vec::new(),
    }
}

pub(crate) fn format_type(repr: &TypeRepr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match repr {
        TypeRepr::Top => write!(f, "⊤"),
        TypeRepr::Bottom => write!(f, "⊥"),
        TypeRepr::Primitive(kind) => write!(f, "{}", format!("{:?}", kind).to_lowercase()),
        TypeRepr::IntegerRange(range) => {
            let open = if range.lower.inclusive { "[" } else { "(" };
            let close = if range.upper.inclusive { "]" } else { ")" };
            write!(
                f,
                "{}{}..{}{}",
                open, range.lower.value, range.upper.value, close
            )
        }
        TypeRepr::Enumeration { instances } => {
            write!(f, "enum")?;
            instances.format(f)
        }
        TypeRepr::Tuple(tt) => {
            write!(f, "tuple(")?;
            for (i, leading) in tt.leading.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", leading)?;
            }
            if !tt.leading.is_empty() {
                write!(f, "; ")?;
            }
            write!(f, "{}…)", tt.default)
        }
        TypeRepr::Function {
            argument_types,
            return_type,
        } => {
            write!(f, "[")?;
            for (i, arg) in argument_types.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", arg)?;
            }
            write!(f, "]→{}", return_type)
        }
        TypeRepr::Phrase {
            phrase_kind,
            yield_type,
        } => write!(f, "{:?}⇒{}", phrase_kind, yield_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom;
    use crate::tuple::string_from_str;

    fn int(v: i64) -> AvailObject {
        AvailObject::from_i64(v)
    }

    fn range_type(lo: i64, hi: i64) -> AvailObject {
        integer_range_type(
            TypeBound::inclusive(IntegerRepr::from_i64(lo)),
            TypeBound::inclusive(IntegerRepr::from_i64(hi)),
        )
    }

    #[test]
    fn test_range_canonicalization() {
        // (3..7) == [4..6], including hashes.
        let exclusive = integer_range_type(
            TypeBound::exclusive(IntegerRepr::from_i64(3)),
            TypeBound::exclusive(IntegerRepr::from_i64(7)),
        );
        let inclusive = range_type(4, 6);
        assert!(exclusive.equals(&inclusive));
        assert_eq!(exclusive.hash(), inclusive.hash());
        // Empty ranges collapse to bottom.
        assert!(range_type(5, 4).equals(&bottom_type()));
    }

    #[test]
    fn test_lattice_extremes() {
        assert!(is_subtype_of(&bottom_type(), &range_type(0, 1)));
        assert!(is_subtype_of(&range_type(0, 1), &top_type()));
        assert!(is_subtype_of(&any_type(), &top_type()));
        assert!(!is_subtype_of(&top_type(), &any_type()));
        assert!(AvailObject::nil().is_instance_of(&top_type()));
        assert!(!AvailObject::nil().is_instance_of(&any_type()));
    }

    #[test]
    fn test_integer_range_subtyping() {
        assert!(is_subtype_of(&range_type(2, 5), &range_type(0, 10)));
        assert!(is_subtype_of(&range_type(0, 10), &integer_type()));
        assert!(is_subtype_of(&integer_type(), &extended_integer_type()));
        assert!(!is_subtype_of(&extended_integer_type(), &integer_type()));
        assert!(is_subtype_of(&whole_number_type(), &number_type()));
    }

    #[test]
    fn test_instance_types() {
        let t = instance_type(&int(5));
        assert!(int(5).is_instance_of(&t));
        assert!(!int(6).is_instance_of(&t));
        // Integer instance types are single ranges, not enumerations.
        assert!(t.equals(&range_type(5, 5)));
        assert!(is_subtype_of(&t, &whole_number_type()));

        let s = instance_type(&string_from_str("hi"));
        assert!(string_from_str("hi").is_instance_of(&s));
        assert!(!string_from_str("ho").is_instance_of(&s));
    }

    #[test]
    fn test_boolean_enumeration() {
        assert!(atom::true_object().is_instance_of(&boolean_type()));
        assert!(atom::false_object().is_instance_of(&boolean_type()));
        assert!(!int(1).is_instance_of(&boolean_type()));
        let just_true = instance_type(&atom::true_object());
        assert!(is_subtype_of(&just_true, &boolean_type()));
        assert!(!is_subtype_of(&boolean_type(), &just_true));
    }

    #[test]
    fn test_union_and_intersection_of_ranges() {
        let u = type_union(&range_type(0, 5), &range_type(3, 9));
        assert!(u.equals(&range_type(0, 9)));
        let i = type_intersection(&range_type(0, 5), &range_type(3, 9));
        assert!(i.equals(&range_type(3, 5)));
        let disjoint = type_intersection(&range_type(0, 2), &range_type(5, 9));
        assert!(disjoint.equals(&bottom_type()));
    }

    #[test]
    fn test_enumeration_hash_tracks_instance_set() {
        let a = enumeration_type(AvailSet::from_elements([int(1), int(2)]));
        let b = enumeration_type(AvailSet::from_elements([int(2), int(1)]));
        assert!(a.equals(&b));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_tuple_types() {
        let pair = tuple_type_for_leading(vec![range_type(0, 9), string_type()]);
        let value = crate::tuple::tuple_from_objects(vec![int(3), string_from_str("ok")]);
        assert!(value.is_instance_of(&pair));
        let wrong_arity = crate::tuple::tuple_from_objects(vec![int(3)]);
        assert!(!wrong_arity.is_instance_of(&pair));
        let wrong_element = crate::tuple::tuple_from_objects(vec![int(30), string_from_str("ok")]);
        assert!(!wrong_element.is_instance_of(&pair));
        // Covariance.
        let wider = tuple_type_for_leading(vec![integer_type(), most_general_tuple_type()]);
        assert!(is_subtype_of(&pair, &wider));
        assert!(!is_subtype_of(&wider, &pair));
    }

    #[test]
    fn test_function_contravariance() {
        let narrow_arg = function_type(vec![range_type(0, 5)], integer_type());
        let wide_arg = function_type(vec![integer_type()], range_type(0, 5));
        // Accepting more and returning less is the subtype.
        assert!(is_subtype_of(&wide_arg, &narrow_arg));
        assert!(!is_subtype_of(&narrow_arg, &wide_arg));
    }

    #[test]
    fn test_phrase_types() {
        use crate::phrase::{literal_phrase, PhraseKind};
        let p = literal_phrase(int(3), "3");
        let literal_of_ints = phrase_type(PhraseKind::LiteralPhrase, integer_type());
        let expr_of_ints = phrase_type(PhraseKind::ExpressionPhrase, integer_type());
        assert!(p.is_instance_of(&literal_of_ints));
        assert!(p.is_instance_of(&expr_of_ints));
        assert!(is_subtype_of(&literal_of_ints, &expr_of_ints));
        assert!(!is_subtype_of(&expr_of_ints, &literal_of_ints));
        let literal_of_strings = phrase_type(PhraseKind::LiteralPhrase, string_type());
        assert!(!p.is_instance_of(&literal_of_strings));
    }

    #[test]
    fn test_string_type() {
        assert!(string_from_str("abc").is_instance_of(&string_type()));
        assert!(!int(3).is_instance_of(&string_type()));
        let t = crate::tuple::tuple_from_objects(vec![int(1)]);
        assert!(!t.is_instance_of(&string_type()));
    }

    #[test]
    fn test_intersection_strengthens_sends() {
        // The macro-yield strengthening case: intersect a declared yield
        // with a restriction's answer.
        let declared = integer_type();
        let restricted = range_type(0, 100);
        let strengthened = type_intersection(&declared, &restricted);
        assert!(strengthened.equals(&range_type(0, 100)));
    }
}
