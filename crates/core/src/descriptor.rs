//! Descriptors: (representation, mutability) pairs
//!
//! Historically each representation kept one descriptor singleton per
//! mutability state and dispatched every operation through it. Here the
//! descriptor is a plain value pair: the representation kind is derived from
//! the payload and the mutability tag lives on the object cell. Operations
//! still dispatch on the representation, but there is exactly one table.

use std::fmt;

/// Monotone ownership states. The only legal transitions are
/// Mutable -> Immutable -> Shared; never the reverse.
///
/// - Mutable: owned by exactly one logical thread of control; destructive
///   operations with `can_destroy` may reuse its storage.
/// - Immutable: structurally frozen; freely aliased within a thread.
/// - Shared: safe to hand across threads. Only the cached hash slot may be
///   lazily written once Shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Mutability {
    Mutable = 0,
    Immutable = 1,
    Shared = 2,
}

impl Mutability {
    pub fn from_tag(tag: u8) -> Mutability {
        match tag {
            0 => Mutability::Mutable,
            1 => Mutability::Immutable,
            _ => Mutability::Shared,
        }
    }
}

/// The physical representation families an object can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReprKind {
    Indirection,
    Nil,
    Atom,
    Character,
    Integer,
    Float,
    NybbleTuple,
    ByteTuple,
    ByteString,
    TwoByteString,
    ObjectTuple,
    SmallIntegerIntervalTuple,
    IntegerIntervalTuple,
    TreeTuple,
    SpliceTuple,
    Map,
    Set,
    Token,
    Variable,
    Function,
    Phrase,
    Type,
}

impl ReprKind {
    /// True for every tuple representation, including strings.
    pub fn is_tuple(self) -> bool {
        matches!(
            self,
            ReprKind::NybbleTuple
                | ReprKind::ByteTuple
                | ReprKind::ByteString
                | ReprKind::TwoByteString
                | ReprKind::ObjectTuple
                | ReprKind::SmallIntegerIntervalTuple
                | ReprKind::IntegerIntervalTuple
                | ReprKind::TreeTuple
                | ReprKind::SpliceTuple
        )
    }

    /// Storage cost per element, used to decide which of two equal tuples
    /// survives equality-induced coalescing (smaller is better). Structure
    /// sharing representations report coarse costs that still order them
    /// sensibly: an interval beats everything, flat packed forms beat
    /// object arrays, and trees/splices lose to any flat form.
    pub fn bits_per_entry(self) -> u32 {
        match self {
            ReprKind::SmallIntegerIntervalTuple | ReprKind::IntegerIntervalTuple => 1,
            ReprKind::NybbleTuple => 4,
            ReprKind::ByteTuple | ReprKind::ByteString => 8,
            ReprKind::TwoByteString => 16,
            ReprKind::ObjectTuple => 64,
            ReprKind::TreeTuple | ReprKind::SpliceTuple => 128,
            _ => 64,
        }
    }
}

/// What `AvailObject::descriptor()` reports: the flyweight pair governing an
/// object's behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: ReprKind,
    pub mutability: Mutability,
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?})", self.kind, self.mutability)
    }
}
