//! The uniform object
//!
//! `AvailObject` is a cheap-clone handle to a heap cell. The cell carries a
//! monotone mutability tag, a lazily cached 32-bit hash (zero means "not
//! yet computed"), and the representation payload. All behavior dispatches
//! on the representation; the handle itself never cares whether it holds a
//! byte string, a concatenation tree, or a phrase.
//!
//! # Identity vs. equality
//!
//! Two handles are identical when they point at the same cell. They are
//! equal when their representations describe the same abstract value.
//! Discovering equality between distinct cells coalesces storage: the cell
//! with the worse representation is rewritten into a transparent
//! indirection to the better one, so the comparison is paid at most once.
//!
//! # Locking
//!
//! The payload sits behind an `RwLock`. No operation ever holds two object
//! locks at once (representations are cloned out under a single lock), so
//! lock ordering is a non-issue. The cached hash is an atomic and may be
//! written lazily even on Shared objects; nothing else mutates once Shared.

use crate::atom::AtomData;
use crate::character;
use crate::descriptor::{Descriptor, Mutability, ReprKind};
use crate::function::FunctionData;
use crate::hashing;
use crate::integer::{self, IntegerRepr};
use crate::map::AvailMap;
use crate::phrase::{self, PhraseRepr};
use crate::set::AvailSet;
use crate::token::TokenData;
use crate::tuple::{self, TupleRepr};
use crate::types::{self, TypeRepr};
use crate::variable::VariableCell;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The physical payload of an object cell.
#[derive(Clone)]
pub enum Repr {
    /// Transparent forwarder to an equal object. Every dispatch resolves
    /// through it; `traverse` compresses chains.
    Indirection(AvailObject),
    /// The unique absent value, the sole instance of top.
    Nil,
    Atom(Arc<AtomData>),
    /// A Unicode code point.
    Character(u32),
    Integer(IntegerRepr),
    Float(f32),
    Tuple(TupleRepr),
    Map(AvailMap),
    Set(AvailSet),
    Token(Arc<TokenData>),
    Variable(Arc<VariableCell>),
    Function(Arc<FunctionData>),
    Phrase(Arc<PhraseRepr>),
    Type(Arc<TypeRepr>),
}

impl Repr {
    pub fn kind(&self) -> ReprKind {
        match self {
            Repr::Indirection(_) => ReprKind::Indirection,
            Repr::Nil => ReprKind::Nil,
            Repr::Atom(_) => ReprKind::Atom,
            Repr::Character(_) => ReprKind::Character,
            Repr::Integer(_) => ReprKind::Integer,
            Repr::Float(_) => ReprKind::Float,
            Repr::Tuple(t) => t.repr_kind(),
            Repr::Map(_) => ReprKind::Map,
            Repr::Set(_) => ReprKind::Set,
            Repr::Token(_) => ReprKind::Token,
            Repr::Variable(_) => ReprKind::Variable,
            Repr::Function(_) => ReprKind::Function,
            Repr::Phrase(_) => ReprKind::Phrase,
            Repr::Type(_) => ReprKind::Type,
        }
    }
}

struct ObjectCell {
    mutability: AtomicU8,
    /// Cached hash; 0 = not yet computed.
    hash: AtomicU32,
    repr: RwLock<Repr>,
}

/// Handle to a runtime value. Cloning is an `Arc` bump.
#[derive(Clone)]
pub struct AvailObject {
    cell: Arc<ObjectCell>,
}

static NIL: OnceLock<AvailObject> = OnceLock::new();

impl AvailObject {
    /// Create a fresh Mutable object around `repr`.
    pub fn new(repr: Repr) -> AvailObject {
        AvailObject {
            cell: Arc::new(ObjectCell {
                mutability: AtomicU8::new(Mutability::Mutable as u8),
                hash: AtomicU32::new(0),
                repr: RwLock::new(repr),
            }),
        }
    }

    /// Create an object already in the Shared state (for well-known
    /// constants built at startup).
    pub fn new_shared(repr: Repr) -> AvailObject {
        AvailObject {
            cell: Arc::new(ObjectCell {
                mutability: AtomicU8::new(Mutability::Shared as u8),
                hash: AtomicU32::new(0),
                repr: RwLock::new(repr),
            }),
        }
    }

    /// The unique `nil`.
    pub fn nil() -> AvailObject {
        NIL.get_or_init(|| AvailObject::new_shared(Repr::Nil)).clone()
    }

    pub fn character(code_point: char) -> AvailObject {
        AvailObject::new(Repr::Character(code_point as u32))
    }

    pub fn from_code_point(code_point: u32) -> AvailObject {
        AvailObject::new(Repr::Character(code_point))
    }

    pub fn from_i64(value: i64) -> AvailObject {
        AvailObject::new(Repr::Integer(IntegerRepr::from_i64(value)))
    }

    pub fn from_bigint(value: num_bigint::BigInt) -> AvailObject {
        AvailObject::new(Repr::Integer(IntegerRepr::from_bigint(value)))
    }

    pub fn float(value: f32) -> AvailObject {
        AvailObject::new(Repr::Float(value))
    }

    // ------------------------------------------------------------------
    // Identity, descriptor, mutability
    // ------------------------------------------------------------------

    /// Address identity: do both handles name the same cell?
    pub fn same_identity(&self, other: &AvailObject) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    pub fn mutability(&self) -> Mutability {
        Mutability::from_tag(self.cell.mutability.load(Ordering::Acquire))
    }

    pub fn is_mutable(&self) -> bool {
        self.mutability() == Mutability::Mutable
    }

    pub fn is_shared(&self) -> bool {
        self.mutability() == Mutability::Shared
    }

    /// The (representation, mutability) flyweight currently governing this
    /// object. Indirections are resolved first.
    pub fn descriptor(&self) -> Descriptor {
        let target = self.traverse();
        let descriptor = Descriptor {
            kind: target.read_repr().kind(),
            mutability: target.mutability(),
        };
        descriptor
    }

    /// The representation kind after resolving indirections.
    pub fn repr_kind(&self) -> ReprKind {
        self.traverse().read_repr().kind()
    }

    pub(crate) fn read_repr(&self) -> RwLockReadGuard<'_, Repr> {
        self.cell.repr.read().expect("object lock poisoned")
    }

    pub(crate) fn write_repr(&self) -> RwLockWriteGuard<'_, Repr> {
        self.cell.repr.write().expect("object lock poisoned")
    }

    /// Snapshot the payload. Indirections are NOT resolved here; callers
    /// that need canonical form traverse first.
    pub(crate) fn repr_snapshot(&self) -> Repr {
        self.read_repr().clone()
    }

    /// Invalidate the cached hash after a destructive update.
    pub(crate) fn invalidate_hash(&self) {
        self.cell.hash.store(0, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Indirections
    // ------------------------------------------------------------------

    /// Follow indirections to the canonical cell, compressing the path
    /// behind us when the receiver may still be rewritten.
    pub fn traverse(&self) -> AvailObject {
        let mut current = self.clone();
        loop {
            let next = match &*current.read_repr() {
                Repr::Indirection(target) => target.clone(),
                _ => break,
            };
            current = next;
        }
        if !self.same_identity(&current) && !self.is_shared() {
            *self.write_repr() = Repr::Indirection(current.clone());
        }
        current
    }

    /// Rewrite the receiver so every future dispatch forwards to `target`.
    /// Legal only while the receiver is not Shared; the two must already be
    /// equal, which the caller has just established.
    ///
    /// # Panics
    ///
    /// Panics if the receiver is Shared. That is a fatal contract
    /// violation, not a recoverable failure.
    pub fn become_indirection_to(&self, target: &AvailObject) {
        assert!(
            !self.is_shared(),
            "a Shared object must never become an indirection"
        );
        if self.same_identity(target) {
            return;
        }
        *self.write_repr() = Repr::Indirection(target.clone());
    }

    // ------------------------------------------------------------------
    // Mutability transitions
    // ------------------------------------------------------------------

    /// Freeze this object and everything reachable from it. Returns the
    /// canonical handle for chaining. Idempotent; cycles terminate because
    /// the tag is advanced before recursing.
    pub fn make_immutable(&self) -> AvailObject {
        let target = self.traverse();
        if target.mutability() == Mutability::Mutable {
            target
                .cell
                .mutability
                .store(Mutability::Immutable as u8, Ordering::Release);
            for child in target.children() {
                child.make_immutable();
            }
        }
        target
    }

    /// Promote this object and everything reachable from it to Shared.
    pub fn make_shared(&self) -> AvailObject {
        let target = self.traverse();
        if target.mutability() != Mutability::Shared {
            target
                .cell
                .mutability
                .store(Mutability::Shared as u8, Ordering::Release);
            for child in target.children() {
                child.make_shared();
            }
        }
        target
    }

    /// Every object directly referenced by the payload.
    pub(crate) fn children(&self) -> Vec<AvailObject> {
        let repr = self.repr_snapshot();
        match repr {
            Repr::Indirection(t) => vec![t],
            Repr::Nil
            | Repr::Atom(_)
            | Repr::Character(_)
            | Repr::Integer(_)
            | Repr::Float(_) => Vec::new(),
            Repr::Tuple(t) => tuple::children_of(&t),
            Repr::Map(m) => m.children(),
            Repr::Set(s) => s.children(),
            Repr::Token(t) => t.children(),
            Repr::Variable(v) => v.children(),
            Repr::Function(f) => f.children(),
            Repr::Phrase(p) => p.children(),
            Repr::Type(t) => types::children_of(&t),
        }
    }

    // ------------------------------------------------------------------
    // Hashing
    // ------------------------------------------------------------------

    /// The object's 32-bit hash. Computed lazily, cached unless the true
    /// hash is zero (which recomputes each time, by design of the empty
    /// cache encoding).
    pub fn hash(&self) -> u32 {
        let target = self.traverse();
        let cached = target.cell.hash.load(Ordering::Acquire);
        if cached != 0 {
            return cached;
        }
        let computed = target.compute_hash();
        if computed != 0 {
            target.cell.hash.store(computed, Ordering::Release);
        }
        computed
    }

    pub(crate) fn cached_hash(&self) -> u32 {
        self.cell.hash.load(Ordering::Acquire)
    }

    fn compute_hash(&self) -> u32 {
        let repr = self.repr_snapshot();
        match &repr {
            Repr::Indirection(t) => t.hash(),
            Repr::Nil => hashing::scramble(0x4E1A_11CE),
            Repr::Atom(a) => a.hash(),
            Repr::Character(cp) => character::hash_code_point(*cp),
            Repr::Integer(i) => integer::hash_integer(i),
            Repr::Float(f) => hashing::scramble(f.to_bits() ^ 0xF10A_7000),
            Repr::Tuple(t) => tuple::tuple_hash(t),
            Repr::Map(m) => m.hash(),
            Repr::Set(s) => s.hash(),
            Repr::Token(t) => t.hash(),
            Repr::Variable(v) => v.identity_hash(),
            Repr::Function(f) => f.identity_hash(),
            Repr::Phrase(p) => phrase::hash_phrase(p),
            Repr::Type(t) => types::hash_type(t),
        }
    }

    // ------------------------------------------------------------------
    // Equality
    // ------------------------------------------------------------------

    /// Structural equality. On success between distinct, non-Shared cells
    /// the worse representation becomes an indirection to the better, so
    /// later comparisons are identity checks.
    pub fn equals(&self, other: &AvailObject) -> bool {
        loop {
            let a = self.traverse();
            let b = other.traverse();
            if a.same_identity(&b) {
                return true;
            }
            let (ha, hb) = (a.cached_hash(), b.cached_hash());
            if ha != 0 && hb != 0 && ha != hb {
                return false;
            }
            let ra = a.repr_snapshot();
            let rb = b.repr_snapshot();
            // A racing coalesce may have rewritten either side; retry from
            // canonical form rather than comparing through a forwarder.
            if matches!(ra, Repr::Indirection(_)) || matches!(rb, Repr::Indirection(_)) {
                continue;
            }
            let equal = repr_equals(&ra, &rb);
            if equal {
                coalesce(&a, &b, &ra, &rb);
            }
            return equal;
        }
    }

    // ------------------------------------------------------------------
    // Typing
    // ------------------------------------------------------------------

    /// The most-general type this object belongs to.
    pub fn kind(&self) -> AvailObject {
        types::kind_of(self)
    }

    /// Membership test against a type object.
    pub fn is_instance_of(&self, type_object: &AvailObject) -> bool {
        types::is_instance(self, type_object)
    }

    // ------------------------------------------------------------------
    // Convenience accessors (panic on representation mismatch; callers in
    // primitives pre-check and report error codes instead)
    // ------------------------------------------------------------------

    pub fn is_nil(&self) -> bool {
        matches!(&*self.traverse().read_repr(), Repr::Nil)
    }

    pub fn as_atom(&self) -> Option<Arc<AtomData>> {
        match &*self.traverse().read_repr() {
            Repr::Atom(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<IntegerRepr> {
        match &*self.traverse().read_repr() {
            Repr::Integer(i) => Some(i.clone()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_integer().and_then(|i| i.to_i64())
    }

    pub fn as_character(&self) -> Option<u32> {
        match &*self.traverse().read_repr() {
            Repr::Character(cp) => Some(*cp),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<AvailMap> {
        match &*self.traverse().read_repr() {
            Repr::Map(m) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<AvailSet> {
        match &*self.traverse().read_repr() {
            Repr::Set(s) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<Arc<TokenData>> {
        match &*self.traverse().read_repr() {
            Repr::Token(t) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<Arc<VariableCell>> {
        match &*self.traverse().read_repr() {
            Repr::Variable(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<Arc<FunctionData>> {
        match &*self.traverse().read_repr() {
            Repr::Function(f) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn as_phrase(&self) -> Option<Arc<PhraseRepr>> {
        match &*self.traverse().read_repr() {
            Repr::Phrase(p) => Some(p.clone()),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<Arc<TypeRepr>> {
        match &*self.traverse().read_repr() {
            Repr::Type(t) => Some(t.clone()),
            _ => None,
        }
    }

    /// Extract a Rust string if this object is a tuple of characters.
    pub fn as_string(&self) -> Option<String> {
        tuple::extract_string(self)
    }

    pub fn is_tuple(&self) -> bool {
        self.repr_kind().is_tuple()
    }

    pub fn is_string(&self) -> bool {
        tuple::is_string(self)
    }

    pub fn is_type(&self) -> bool {
        matches!(&*self.traverse().read_repr(), Repr::Type(_))
    }
}

/// Structural comparison of two already-canonical payloads.
fn repr_equals(a: &Repr, b: &Repr) -> bool {
    match (a, b) {
        (Repr::Nil, Repr::Nil) => true,
        (Repr::Atom(x), Repr::Atom(y)) => x.id == y.id,
        (Repr::Character(x), Repr::Character(y)) => x == y,
        (Repr::Integer(x), Repr::Integer(y)) => x == y,
        // IEEE equality would declare 0.0 == -0.0 and NaN != NaN; object
        // equality must be an equivalence relation, so compare bits.
        (Repr::Float(x), Repr::Float(y)) => x.to_bits() == y.to_bits(),
        (Repr::Tuple(x), Repr::Tuple(y)) => tuple::tuple_reprs_equal(x, y),
        (Repr::Map(x), Repr::Map(y)) => x.equals(y),
        (Repr::Set(x), Repr::Set(y)) => x.equals(y),
        (Repr::Token(x), Repr::Token(y)) => x.equals(y),
        (Repr::Variable(x), Repr::Variable(y)) => Arc::ptr_eq(x, y),
        (Repr::Function(x), Repr::Function(y)) => Arc::ptr_eq(x, y),
        (Repr::Phrase(x), Repr::Phrase(y)) => phrase::phrases_equal(x, y),
        (Repr::Type(x), Repr::Type(y)) => types::types_equal(x, y),
        _ => false,
    }
}

/// After equality is established between distinct cells, rewrite the worse
/// representation into an indirection to the better. Shared cells are never
/// rewritten; if both are Shared the discovery is simply not recorded.
fn coalesce(a: &AvailObject, b: &AvailObject, ra: &Repr, rb: &Repr) {
    let (ka, kb) = (ra.kind(), rb.kind());
    let a_better = ka.bits_per_entry() <= kb.bits_per_entry();
    let (keep, rewrite) = if a_better { (a, b) } else { (b, a) };
    if !rewrite.is_shared() {
        rewrite.become_indirection_to(keep);
    } else if !keep.is_shared() {
        keep.become_indirection_to(rewrite);
    }
}

impl fmt::Display for AvailObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = self.traverse().repr_snapshot();
        match &repr {
            Repr::Indirection(t) => write!(f, "{}", t),
            Repr::Nil => write!(f, "nil"),
            Repr::Atom(a) => write!(f, "${}", a.name),
            Repr::Character(cp) => match char::from_u32(*cp) {
                Some(c) => write!(f, "¢{}", c),
                None => write!(f, "¢\\u{{{cp:x}}}"),
            },
            Repr::Integer(i) => write!(f, "{}", i),
            Repr::Float(v) => write!(f, "{v}"),
            Repr::Tuple(_) => tuple::format_tuple(self, f),
            Repr::Map(m) => m.format(f),
            Repr::Set(s) => s.format(f),
            Repr::Token(t) => write!(f, "token({})", t.text),
            Repr::Variable(v) => write!(f, "var#{}", v.identity()),
            Repr::Function(func) => write!(f, "function#{}", func.identity()),
            Repr::Phrase(p) => phrase::format_phrase(p, f),
            Repr::Type(t) => types::format_type(t, f),
        }
    }
}

impl fmt::Debug for AvailObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
