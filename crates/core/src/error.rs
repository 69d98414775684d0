//! Primitive failure codes
//!
//! Every failure a primitive (or the interpreter) can report is one of these
//! codes. The numeric values are part of the language's contract: compiled
//! modules store them, and in-language failure handlers switch on them, so
//! they must stay stable across releases.

use std::fmt;

/// Stable small-integer failure codes delivered to a fiber's failure
/// continuation or to a primitive's in-language failure variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// An operation has no implementation for the receiver's representation.
    NoImplementation = 1,
    /// `+inf + -inf` and friends have no defined sum.
    CannotAddUnlikeInfinities = 2,
    /// `inf * 0` has no defined product.
    CannotMultiplyZeroAndInfinity = 3,
    /// Division by exact zero.
    CannotDivideByZero = 4,
    /// Dividing one infinity by another.
    CannotDivideInfinities = 5,
    /// Reading a variable that has never been assigned.
    CannotReadUnassignedVariable = 6,
    /// Storing a value outside a variable's declared type.
    CannotStoreIncorrectlyTypedValue = 7,
    /// Tuple or string subscript outside `1..size`.
    SubscriptOutOfBounds = 8,
    /// A function was applied to the wrong number of arguments.
    IncorrectNumberOfArguments = 9,
    /// Map lookup for an absent key.
    KeyNotFound = 10,
    /// An I/O action failed in the embedding runtime.
    IoError = 11,
    /// A handle value does not denote a live resource.
    InvalidHandle = 12,
    /// The operation is not permitted for the caller.
    PermissionDenied = 13,
    /// Method lookup found no applicable definition.
    NoMethodDefinition = 14,
    /// Method lookup found several incomparable definitions.
    AmbiguousMethodDefinition = 15,
    /// The target fiber already ended.
    FiberIsTerminated = 16,
    /// Attempted to modify a final field.
    CannotModifyFinalField = 17,
    /// The operation is forbidden for a special atom.
    SpecialAtom = 18,
    /// An argument's type was outside the primitive's domain.
    IncorrectArgumentType = 19,
    /// A forward declaration was re-declared or redefined inconsistently.
    ForwardMethodMismatch = 20,
    /// A value could not be serialized (functions, fibers, live handles).
    NotSerializable = 21,
    /// A message name failed to split into parsing instructions.
    MalformedMessage = 22,
    /// The loader observed a definition conflict inside one module.
    DefinitionConflict = 23,
}

impl ErrorCode {
    /// The stable numeric code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Human-readable summary, used in diagnostics and failure values.
    pub fn describe(self) -> &'static str {
        match self {
            ErrorCode::NoImplementation => "operation has no implementation for this value",
            ErrorCode::CannotAddUnlikeInfinities => "cannot add unlike infinities",
            ErrorCode::CannotMultiplyZeroAndInfinity => "cannot multiply zero and infinity",
            ErrorCode::CannotDivideByZero => "cannot divide by zero",
            ErrorCode::CannotDivideInfinities => "cannot divide infinity by infinity",
            ErrorCode::CannotReadUnassignedVariable => "cannot read unassigned variable",
            ErrorCode::CannotStoreIncorrectlyTypedValue => {
                "cannot store incorrectly typed value into variable"
            }
            ErrorCode::SubscriptOutOfBounds => "subscript out of bounds",
            ErrorCode::IncorrectNumberOfArguments => "incorrect number of arguments",
            ErrorCode::KeyNotFound => "key not found in map",
            ErrorCode::IoError => "I/O error",
            ErrorCode::InvalidHandle => "invalid handle",
            ErrorCode::PermissionDenied => "permission denied",
            ErrorCode::NoMethodDefinition => "no applicable method definition",
            ErrorCode::AmbiguousMethodDefinition => "ambiguous method definition",
            ErrorCode::FiberIsTerminated => "fiber is terminated",
            ErrorCode::CannotModifyFinalField => "cannot modify final field",
            ErrorCode::SpecialAtom => "operation forbidden for special atom",
            ErrorCode::IncorrectArgumentType => "incorrect argument type",
            ErrorCode::ForwardMethodMismatch => "forward declaration mismatch",
            ErrorCode::NotSerializable => "value cannot be serialized",
            ErrorCode::MalformedMessage => "malformed message name",
            ErrorCode::DefinitionConflict => "conflicting definition in module",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}: {}", self.code(), self.describe())
    }
}

impl std::error::Error for ErrorCode {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        // These values are load-bearing for compiled modules; a renumbering
        // is a compatibility break, not a refactor.
        assert_eq!(ErrorCode::CannotAddUnlikeInfinities.code(), 2);
        assert_eq!(ErrorCode::CannotDivideByZero.code(), 4);
        assert_eq!(ErrorCode::KeyNotFound.code(), 10);
        assert_eq!(ErrorCode::NoMethodDefinition.code(), 14);
        assert_eq!(ErrorCode::SpecialAtom.code(), 18);
    }

    #[test]
    fn test_display_includes_code() {
        let text = ErrorCode::SubscriptOutOfBounds.to_string();
        assert!(text.starts_with("E8:"));
        assert!(text.contains("subscript"));
    }
}
