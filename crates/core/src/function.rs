//! Functions and level-one code
//!
//! A function object pairs an identity with a raw function: the literal
//! table, the local-slot schema, and a short vector of level-one
//! instructions. The level-one set is deliberately tiny; it exists to run
//! compile-time phrases and bootstrap bodies, not to be fast.
//!
//! Local slots are laid out arguments-first, then local variables, then
//! local constants. Local-variable slots hold variable objects created at
//! frame entry; reads and writes go through `GetVariable`/`SetVariable`.

use crate::hashing;
use crate::ids::MethodId;
use crate::object::{AvailObject, Repr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One level-one instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum L1Instruction {
    /// Push `literals[index]`.
    PushLiteral(u32),
    /// Push the value in the given frame slot.
    PushLocal(u16),
    /// Overwrite the given frame slot with the popped value.
    SetLocal(u16),
    /// Discard the top of stack.
    Pop,
    /// Pop `num_args` arguments (pushed left to right), perform full
    /// polymorphic lookup in the method, and invoke the winner.
    Call { method: MethodId, num_args: u16 },
    /// Pop a variable object, push its current value.
    GetVariable,
    /// Pop a variable object, then pop the value to store into it.
    SetVariable,
    /// Pop `size` values (pushed left to right), push the tuple of them.
    MakeTuple(u16),
    /// Return the top of stack from this frame.
    Return,
}

/// The compiled body shared by every invocation of one function.
#[derive(Debug)]
pub struct RawFunction {
    pub num_args: u16,
    /// Inner types of the local-variable slots created at frame entry.
    pub local_variable_types: Vec<AvailObject>,
    /// Number of local-constant slots (filled by `SetLocal` during the
    /// body, after the variable slots).
    pub num_constants: u16,
    pub literals: Vec<AvailObject>,
    pub code: Vec<L1Instruction>,
    /// The function type reported by `kind()`.
    pub function_type: AvailObject,
    /// Name of a primitive to attempt before running the body, if any.
    pub primitive: Option<String>,
}

impl RawFunction {
    pub fn num_slots(&self) -> usize {
        self.num_args as usize + self.local_variable_types.len() + self.num_constants as usize
    }
}

/// A function object's payload. Functions compare by identity.
#[derive(Debug)]
pub struct FunctionData {
    id: u64,
    pub raw: Arc<RawFunction>,
}

static NEXT_FUNCTION_ID: AtomicU64 = AtomicU64::new(1);

impl FunctionData {
    pub fn identity(&self) -> u64 {
        self.id
    }

    pub fn identity_hash(&self) -> u32 {
        hashing::scramble((self.id as u32) ^ ((self.id >> 32) as u32) ^ 0xF4_AC70)
    }

    pub fn children(&self) -> Vec<AvailObject> {
        let mut out = self.raw.literals.clone();
        out.push(self.raw.function_type.clone());
        out.extend(self.raw.local_variable_types.iter().cloned());
        out
    }
}

/// Wrap a raw function into a fresh function object.
pub fn function_object(raw: Arc<RawFunction>) -> AvailObject {
    AvailObject::new(Repr::Function(Arc::new(FunctionData {
        id: NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed),
        raw,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types;

    fn trivial_raw() -> Arc<RawFunction> {
        Arc::new(RawFunction {
            num_args: 0,
            local_variable_types: Vec::new(),
            num_constants: 0,
            literals: vec![AvailObject::from_i64(1)],
            code: vec![L1Instruction::PushLiteral(0), L1Instruction::Return],
            function_type: types::function_type(Vec::new(), types::any_type()),
            primitive: None,
        })
    }

    #[test]
    fn test_functions_compare_by_identity() {
        let raw = trivial_raw();
        let f = function_object(raw.clone());
        let g = function_object(raw);
        assert!(!f.equals(&g));
        assert!(f.equals(&f.clone()));
    }

    #[test]
    fn test_kind_is_function_type() {
        let f = function_object(trivial_raw());
        let kind = f.kind();
        assert!(kind.is_type());
    }

    #[test]
    fn test_slot_layout() {
        let raw = RawFunction {
            num_args: 2,
            local_variable_types: vec![types::any_type()],
            num_constants: 1,
            literals: Vec::new(),
            code: vec![L1Instruction::Return],
            function_type: types::function_type(
                vec![types::any_type(), types::any_type()],
                types::any_type(),
            ),
            primitive: None,
        };
        assert_eq!(raw.num_slots(), 4);
    }
}
