//! Atoms
//!
//! An atom is an identity created by fiat: two atoms are equal exactly when
//! they are the same creation event, no matter what display name they
//! carry. Names are for people; nothing stops two distinct atoms from both
//! printing as "red".
//!
//! Atoms carry a small property map (atom-keyed) used by the loader and the
//! macro machinery to hang bookkeeping off well-known keys.

use crate::hashing;
use crate::ids::AtomId;
use crate::object::{AvailObject, Repr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{OnceLock, RwLock};

/// Creation counter. Ids are process-unique and monotonically increasing;
/// deserialization reconstitutes atoms with their recorded ids and bumps
/// this counter past them.
static NEXT_ATOM_ID: AtomicU64 = AtomicU64::new(16);

/// Reserve ids below this for well-known atoms wired at startup.
const FIRST_DYNAMIC_ID: u64 = 16;

const TRUE_ID: u64 = 1;
const FALSE_ID: u64 = 2;

pub struct AtomData {
    pub id: AtomId,
    pub name: String,
    /// Property associations, atom-keyed. Linear scan: property maps hold a
    /// handful of entries at most.
    properties: RwLock<Vec<(AvailObject, AvailObject)>>,
}

impl AtomData {
    pub fn hash(&self) -> u32 {
        hashing::scramble((self.id.0 as u32) ^ ((self.id.0 >> 32) as u32) ^ 0xA702_0000)
    }

    /// Look up a property by atom key.
    pub fn property(&self, key: &AvailObject) -> Option<AvailObject> {
        let props = self.properties.read().expect("atom property lock poisoned");
        props
            .iter()
            .find(|(k, _)| k.equals(key))
            .map(|(_, v)| v.clone())
    }

    /// Install or replace a property.
    pub fn set_property(&self, key: AvailObject, value: AvailObject) {
        let mut props = self
            .properties
            .write()
            .expect("atom property lock poisoned");
        if let Some(slot) = props.iter_mut().find(|(k, _)| k.equals(&key)) {
            slot.1 = value;
        } else {
            props.push((key, value));
        }
    }

    pub fn remove_property(&self, key: &AvailObject) -> Option<AvailObject> {
        let mut props = self
            .properties
            .write()
            .expect("atom property lock poisoned");
        let index = props.iter().position(|(k, _)| k.equals(key))?;
        Some(props.remove(index).1)
    }

    /// Is this one of the atoms wired at startup? Those reject certain
    /// operations (renaming, property clearing) with `E18 special-atom`.
    pub fn is_special(&self) -> bool {
        self.id.0 < FIRST_DYNAMIC_ID
    }
}

/// Create a fresh atom with a new identity.
pub fn create_atom(name: impl Into<String>) -> AvailObject {
    let id = AtomId(NEXT_ATOM_ID.fetch_add(1, Ordering::Relaxed));
    atom_with_id(id, name)
}

/// Reconstitute an atom with a known id (deserialization, bootstrap
/// wiring). Advances the creation counter past `id` so future creations
/// cannot collide.
pub fn atom_with_id(id: AtomId, name: impl Into<String>) -> AvailObject {
    let mut observed = NEXT_ATOM_ID.load(Ordering::Relaxed);
    while observed <= id.0 {
        match NEXT_ATOM_ID.compare_exchange_weak(
            observed,
            id.0 + 1,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(current) => observed = current,
        }
    }
    AvailObject::new(Repr::Atom(std::sync::Arc::new(AtomData {
        id,
        name: name.into(),
        properties: RwLock::new(Vec::new()),
    })))
}

static TRUE_ATOM: OnceLock<AvailObject> = OnceLock::new();
static FALSE_ATOM: OnceLock<AvailObject> = OnceLock::new();

/// The distinguished `true` atom.
pub fn true_object() -> AvailObject {
    TRUE_ATOM
        .get_or_init(|| atom_with_id(AtomId(TRUE_ID), "true").make_shared())
        .clone()
}

/// The distinguished `false` atom.
pub fn false_object() -> AvailObject {
    FALSE_ATOM
        .get_or_init(|| atom_with_id(AtomId(FALSE_ID), "false").make_shared())
        .clone()
}

/// Boolean-to-atom bridge used by primitives.
pub fn boolean(value: bool) -> AvailObject {
    if value { true_object() } else { false_object() }
}

/// Atom-to-boolean bridge; `None` when the object is not a boolean atom.
pub fn as_boolean(object: &AvailObject) -> Option<bool> {
    let atom = object.as_atom()?;
    match atom.id.0 {
        TRUE_ID => Some(true),
        FALSE_ID => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atoms_with_same_name_are_distinct() {
        let a = create_atom("red");
        let b = create_atom("red");
        assert!(!a.equals(&b));
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_atom_equals_itself_across_handles() {
        let a = create_atom("k");
        let b = a.clone();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_true_and_false_are_special_singletons() {
        assert!(true_object().equals(&true_object()));
        assert!(!true_object().equals(&false_object()));
        assert!(true_object().as_atom().unwrap().is_special());
        assert_eq!(as_boolean(&false_object()), Some(false));
        assert_eq!(as_boolean(&create_atom("x")), None);
    }

    #[test]
    fn test_properties_round_trip() {
        let atom = create_atom("holder");
        let key = create_atom("key");
        let data = atom.as_atom().unwrap();
        assert!(data.property(&key).is_none());
        data.set_property(key.clone(), AvailObject::from_i64(42));
        assert!(data.property(&key).unwrap().equals(&AvailObject::from_i64(42)));
        data.remove_property(&key);
        assert!(data.property(&key).is_none());
    }
}
