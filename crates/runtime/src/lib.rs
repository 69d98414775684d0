//! Avail runtime: the context every compilation and execution threads through
//!
//! Key design principles:
//! - No process-global runtime. A `Runtime` value owns the method, bundle,
//!   and module tables and is passed (behind a lock) wherever it is needed.
//! - The entity graph (atom <-> bundle <-> method <-> module) is cyclic in
//!   meaning but acyclic in ownership: cross-links are index handles.
//! - Work units and fibers run on May coroutines; the completion barrier is
//!   a pair of atomic counters with an event-driven drain.

pub mod executor;
pub mod fiber;
pub mod interpreter;
pub mod method;
pub mod module;
pub mod primitives;
pub mod runtime;

pub use executor::{Executor, WorkUnitBarrier};
pub use fiber::{EvalOutcome, Fiber};
pub use interpreter::Interpreter;
pub use method::{
    BundleData, Definition, DefinitionBody, GrammaticalRestriction, MethodData,
    RestrictionBody, RestrictionResult, SemanticRestriction,
};
pub use module::ModuleData;
pub use runtime::Runtime;
