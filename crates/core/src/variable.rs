//! Variables
//!
//! A variable is the language's one mutable cell: it has an inner type and
//! holds at most one value. Variables compare by identity (two variables
//! with the same content are still different variables) and remain
//! assignable even once Shared; assignment under Shared is exactly the
//! "descriptor locking discipline" case, realized here by the cell's lock.

use crate::error::ErrorCode;
use crate::hashing;
use crate::object::{AvailObject, Repr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_VARIABLE_ID: AtomicU64 = AtomicU64::new(1);

pub struct VariableCell {
    id: u64,
    /// The type values must conform to.
    pub inner_type: AvailObject,
    /// Optional name, for diagnostics (module variables have one).
    pub name: Option<String>,
    value: RwLock<Option<AvailObject>>,
}

impl VariableCell {
    pub fn identity(&self) -> u64 {
        self.id
    }

    pub fn identity_hash(&self) -> u32 {
        hashing::scramble((self.id as u32) ^ ((self.id >> 32) as u32) ^ 0x7A21_AB1E)
    }

    /// Read the current value; unassigned variables reject.
    pub fn get(&self) -> Result<AvailObject, ErrorCode> {
        self.value
            .read()
            .expect("variable lock poisoned")
            .clone()
            .ok_or(ErrorCode::CannotReadUnassignedVariable)
    }

    pub fn is_assigned(&self) -> bool {
        self.value.read().expect("variable lock poisoned").is_some()
    }

    /// Store a value after checking it against the inner type.
    pub fn set(&self, value: AvailObject) -> Result<(), ErrorCode> {
        if !value.is_instance_of(&self.inner_type) {
            return Err(ErrorCode::CannotStoreIncorrectlyTypedValue);
        }
        *self.value.write().expect("variable lock poisoned") = Some(value);
        Ok(())
    }

    /// Clear the binding (used when rolling back module state).
    pub fn clear(&self) {
        *self.value.write().expect("variable lock poisoned") = None;
    }

    pub fn children(&self) -> Vec<AvailObject> {
        let mut out = vec![self.inner_type.clone()];
        if let Some(v) = self.value.read().expect("variable lock poisoned").clone() {
            out.push(v);
        }
        out
    }
}

/// Create an unassigned variable with the given inner type.
pub fn new_variable(inner_type: AvailObject) -> AvailObject {
    named_variable(inner_type, None)
}

/// Create a named variable (module scope).
pub fn named_variable(inner_type: AvailObject, name: Option<String>) -> AvailObject {
    AvailObject::new(Repr::Variable(Arc::new(VariableCell {
        id: NEXT_VARIABLE_ID.fetch_add(1, Ordering::Relaxed),
        inner_type,
        name,
        value: RwLock::new(None),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types;

    #[test]
    fn test_unassigned_read_rejects() {
        let var = new_variable(types::any_type());
        let cell = var.as_variable().unwrap();
        assert_eq!(cell.get().unwrap_err(), ErrorCode::CannotReadUnassignedVariable);
    }

    #[test]
    fn test_set_then_get() {
        let var = new_variable(types::any_type());
        let cell = var.as_variable().unwrap();
        cell.set(AvailObject::from_i64(10)).unwrap();
        assert!(cell.get().unwrap().equals(&AvailObject::from_i64(10)));
    }

    #[test]
    fn test_type_check_on_store() {
        let var = new_variable(types::whole_number_type());
        let cell = var.as_variable().unwrap();
        let err = cell.set(AvailObject::from_i64(-1)).unwrap_err();
        assert_eq!(err, ErrorCode::CannotStoreIncorrectlyTypedValue);
    }

    #[test]
    fn test_variables_compare_by_identity() {
        let a = new_variable(types::any_type());
        let b = new_variable(types::any_type());
        assert!(!a.equals(&b));
        assert!(a.equals(&a.clone()));
    }
}
