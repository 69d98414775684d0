//! Methods, definitions, and bundles
//!
//! A method is a named multimethod: a set of definitions dispatched by
//! argument types. A bundle ties an atom (the method's true name) to the
//! parsed form of its message and to the method itself. Cross-references
//! run through index handles; the tables live on the `Runtime`.

use avail_core::object::AvailObject;
use avail_core::types;
use avail_core::{BundleId, ErrorCode, MethodId, ModuleId};

/// The concrete flavor of one definition.
#[derive(Debug)]
pub enum DefinitionBody {
    /// An ordinary body function.
    Method(AvailObject),
    /// Declared but deliberately bodiless (subclasses must override).
    Abstract,
    /// Declared ahead of its body; must be resolved before end of module.
    Forward,
    /// A macro: the body produces a phrase at parse time, and the prefix
    /// functions run at each section checkpoint of the message.
    Macro {
        body: AvailObject,
        prefix_functions: Vec<AvailObject>,
    },
}

impl DefinitionBody {
    pub fn is_macro(&self) -> bool {
        matches!(self, DefinitionBody::Macro { .. })
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, DefinitionBody::Forward)
    }
}

/// One signature on a method.
#[derive(Debug)]
pub struct Definition {
    /// A function type: argument types and return type.
    pub signature: AvailObject,
    pub body: DefinitionBody,
    /// The module that added this definition (None for bootstrap wiring).
    pub module: Option<ModuleId>,
}

impl Definition {
    pub fn argument_types(&self) -> Vec<AvailObject> {
        signature_argument_types(&self.signature)
    }

    pub fn return_type(&self) -> AvailObject {
        signature_return_type(&self.signature)
    }
}

pub fn signature_argument_types(signature: &AvailObject) -> Vec<AvailObject> {
    match signature.as_type().as_deref() {
        Some(avail_core::TypeRepr::Function { argument_types, .. }) => argument_types.clone(),
        _ => Vec::new(),
    }
}

pub fn signature_return_type(signature: &AvailObject) -> AvailObject {
    match signature.as_type().as_deref() {
        Some(avail_core::TypeRepr::Function { return_type, .. }) => return_type.clone(),
        _ => types::top_type(),
    }
}

/// What a semantic restriction decided about a proposed call site.
pub enum RestrictionResult {
    /// Refine the send's return type by intersecting with this.
    ReturnType(AvailObject),
    /// Kill this parse path, with a human reason.
    Rejected(String),
}

/// The body of a semantic restriction: an in-language function run in a
/// fiber, or a native function wired during bootstrap.
#[derive(Clone)]
pub enum RestrictionBody {
    Function(AvailObject),
    Native(fn(&[AvailObject]) -> RestrictionResult),
}

/// A semantic restriction: a function from argument types to a refined
/// return type, run at compile time.
pub struct SemanticRestriction {
    pub body: RestrictionBody,
    pub module: Option<ModuleId>,
}

pub struct MethodData {
    /// The message string, for diagnostics.
    pub message: String,
    pub definitions: Vec<Definition>,
    pub semantic_restrictions: Vec<SemanticRestriction>,
}

impl MethodData {
    pub fn new(message: impl Into<String>) -> MethodData {
        MethodData {
            message: message.into(),
            definitions: Vec::new(),
            semantic_restrictions: Vec::new(),
        }
    }

    pub fn macro_definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter().filter(|d| d.body.is_macro())
    }

    pub fn method_definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter().filter(|d| !d.body.is_macro())
    }

    /// All definitions applicable to these argument values, by instance
    /// tests against each signature.
    fn applicable_by_values<'a>(&'a self, arguments: &[AvailObject]) -> Vec<&'a Definition> {
        self.method_definitions()
            .filter(|definition| {
                let parameter_types = definition.argument_types();
                parameter_types.len() == arguments.len()
                    && arguments
                        .iter()
                        .zip(&parameter_types)
                        .all(|(argument, parameter)| argument.is_instance_of(parameter))
            })
            .collect()
    }

    /// Full polymorphic lookup: the unique most-specific applicable
    /// definition, or the error naming why there is none.
    pub fn lookup_by_values<'a>(
        &'a self,
        arguments: &[AvailObject],
    ) -> Result<&'a Definition, ErrorCode> {
        let applicable = self.applicable_by_values(arguments);
        most_specific(&applicable).ok_or(if applicable.is_empty() {
            ErrorCode::NoMethodDefinition
        } else {
            ErrorCode::AmbiguousMethodDefinition
        })
    }

    /// Macro lookup dispatches on the argument *phrases'* yield types.
    pub fn lookup_macro_by_phrase_types<'a>(
        &'a self,
        argument_types: &[AvailObject],
    ) -> Result<&'a Definition, ErrorCode> {
        let applicable: Vec<&Definition> = self
            .macro_definitions()
            .filter(|definition| {
                let parameter_types = definition.argument_types();
                parameter_types.len() == argument_types.len()
                    && argument_types
                        .iter()
                        .zip(&parameter_types)
                        .all(|(argument, parameter)| types::is_subtype_of(argument, parameter))
            })
            .collect();
        most_specific(&applicable).ok_or(if applicable.is_empty() {
            ErrorCode::NoMethodDefinition
        } else {
            ErrorCode::AmbiguousMethodDefinition
        })
    }

    /// Return types of every definition applicable to these argument
    /// types (statically). The send's base return type is their
    /// intersection; an empty vector means no definition can apply.
    pub fn return_types_for_argument_types(
        &self,
        argument_types: &[AvailObject],
    ) -> Vec<AvailObject> {
        self.method_definitions()
            .filter(|definition| {
                let parameter_types = definition.argument_types();
                parameter_types.len() == argument_types.len()
                    && argument_types.iter().zip(&parameter_types).all(
                        |(argument, parameter)| {
                            // A definition might apply unless the types are
                            // provably disjoint.
                            !types::type_intersection(argument, parameter)
                                .equals(&types::bottom_type())
                        },
                    )
            })
            .map(|definition| definition.return_type())
            .collect()
    }

    /// Definitions still declared `Forward`; `Runtime::unresolved_forwards`
    /// joins these against the module's pending records for end-of-module
    /// reporting.
    pub fn pending_forwards(&self) -> Vec<&Definition> {
        self.definitions
            .iter()
            .filter(|d| d.body.is_forward())
            .collect()
    }
}

/// Is `a` strictly more specific than `b` (argument-wise subtypes)?
fn more_specific(a: &Definition, b: &Definition) -> bool {
    let args_a = a.argument_types();
    let args_b = b.argument_types();
    args_a.len() == args_b.len()
        && args_a
            .iter()
            .zip(&args_b)
            .all(|(x, y)| types::is_subtype_of(x, y))
}

fn most_specific<'a>(applicable: &[&'a Definition]) -> Option<&'a Definition> {
    let winner = applicable.iter().copied().find(|candidate| {
        applicable
            .iter()
            .all(|other| std::ptr::eq(*candidate, *other) || more_specific(candidate, other))
    })?;
    Some(winner)
}

/// A grammatical restriction: bundle `forbidden` may not appear as the
/// (1-based) `argument_index`-th argument of the owning bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammaticalRestriction {
    pub argument_index: usize,
    pub forbidden: BundleId,
    pub module: Option<ModuleId>,
}

/// An atom plus its parsed message name plus its method.
pub struct BundleData {
    pub atom: AvailObject,
    pub message: String,
    pub method: MethodId,
    /// Keyword/operator parts of the message, 1-based in instructions.
    pub message_parts: Vec<String>,
    /// Encoded parsing instructions compiled from the message.
    pub instructions: Vec<i64>,
    /// Number of top-level argument positions in the message.
    pub num_args: usize,
    /// Permutations referenced by `PermuteList` instructions, 1-based.
    pub permutations: Vec<Vec<usize>>,
    pub grammatical_restrictions: Vec<GrammaticalRestriction>,
}

impl BundleData {
    /// Is `candidate` forbidden in `argument_index` here?
    pub fn forbids(&self, argument_index: usize, candidate: BundleId) -> bool {
        self.grammatical_restrictions
            .iter()
            .any(|r| r.argument_index == argument_index && r.forbidden == candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::object::AvailObject;

    fn dummy_function() -> AvailObject {
        avail_core::function::function_object(std::sync::Arc::new(
            avail_core::function::RawFunction {
                num_args: 2,
                local_variable_types: Vec::new(),
                num_constants: 0,
                literals: Vec::new(),
                code: vec![avail_core::function::L1Instruction::Return],
                function_type: types::function_type(
                    vec![types::integer_type(), types::integer_type()],
                    types::integer_type(),
                ),
                primitive: None,
            },
        ))
    }

    fn definition(arg: AvailObject, ret: AvailObject) -> Definition {
        Definition {
            signature: types::function_type(vec![arg.clone(), arg], ret),
            body: DefinitionBody::Method(dummy_function()),
            module: None,
        }
    }

    #[test]
    fn test_most_specific_wins() {
        let mut method = MethodData::new("_+_");
        method
            .definitions
            .push(definition(types::number_type(), types::number_type()));
        method
            .definitions
            .push(definition(types::integer_type(), types::integer_type()));
        let args = [AvailObject::from_i64(1), AvailObject::from_i64(2)];
        let winner = method.lookup_by_values(&args).unwrap();
        assert!(winner.argument_types()[0].equals(&types::integer_type()));
    }

    #[test]
    fn test_no_applicable_definition() {
        let mut method = MethodData::new("_+_");
        method
            .definitions
            .push(definition(types::integer_type(), types::integer_type()));
        let args = [
            avail_core::tuple::string_from_str("x"),
            AvailObject::from_i64(2),
        ];
        assert_eq!(
            method.lookup_by_values(&args).unwrap_err(),
            ErrorCode::NoMethodDefinition
        );
    }

    #[test]
    fn test_incomparable_definitions_are_ambiguous() {
        // [0..10] and [5..20] both admit 7, neither is more specific.
        let range_a = types::integer_range_type(
            types::TypeBound::inclusive(avail_core::integer::IntegerRepr::from_i64(0)),
            types::TypeBound::inclusive(avail_core::integer::IntegerRepr::from_i64(10)),
        );
        let range_b = types::integer_range_type(
            types::TypeBound::inclusive(avail_core::integer::IntegerRepr::from_i64(5)),
            types::TypeBound::inclusive(avail_core::integer::IntegerRepr::from_i64(20)),
        );
        let mut method = MethodData::new("f_ _");
        method.definitions.push(definition(range_a, types::integer_type()));
        method.definitions.push(definition(range_b, types::integer_type()));
        let args = [AvailObject::from_i64(7), AvailObject::from_i64(7)];
        assert_eq!(
            method.lookup_by_values(&args).unwrap_err(),
            ErrorCode::AmbiguousMethodDefinition
        );
    }

    #[test]
    fn test_pending_forwards_lists_only_forward_bodies() {
        let mut method = MethodData::new("fwd_ _");
        method.definitions.push(Definition {
            signature: types::function_type(
                vec![types::integer_type(), types::integer_type()],
                types::top_type(),
            ),
            body: DefinitionBody::Forward,
            module: None,
        });
        method
            .definitions
            .push(definition(types::integer_type(), types::integer_type()));
        let pending = method.pending_forwards();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].body.is_forward());
    }

    #[test]
    fn test_return_type_candidates() {
        let mut method = MethodData::new("_+_");
        method
            .definitions
            .push(definition(types::integer_type(), types::integer_type()));
        let candidates = method.return_types_for_argument_types(&[
            types::integer_type(),
            types::integer_type(),
        ]);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].equals(&types::integer_type()));
        let none = method
            .return_types_for_argument_types(&[types::string_type(), types::string_type()]);
        assert!(none.is_empty());
    }
}
