//! Avail core: a uniform object model with descriptor-dispatched behavior
//!
//! Key design principles:
//! - `AvailObject`: the one value type the language talks about. Every
//!   integer, string, map, type, and phrase is an `AvailObject`.
//! - `Repr`: the physical representation behind an object. Many
//!   representations impersonate the same abstract datatype (a byte string,
//!   a two-byte string, and a concatenation tree are all "tuple").
//! - Mutability is a monotone tag (Mutable -> Immutable -> Shared), not a
//!   family of descriptor singletons.
//! - Equality is structural; discovering equality coalesces storage through
//!   transparent indirections.

pub mod atom;
pub mod character;
pub mod descriptor;
pub mod error;
pub mod float;
pub mod function;
pub mod hashing;
pub mod ids;
pub mod integer;
pub mod map;
pub mod object;
pub mod phrase;
pub mod serialize;
pub mod set;
pub mod token;
pub mod tuple;
pub mod types;
pub mod variable;

// Re-export the types nearly every consumer needs
pub use descriptor::{Descriptor, Mutability, ReprKind};
pub use error::ErrorCode;
pub use ids::{AtomId, BundleId, MethodId, ModuleId};
pub use object::{AvailObject, Repr};
pub use phrase::{DeclarationKind, PhraseKind, PhraseRepr};
pub use types::TypeRepr;
