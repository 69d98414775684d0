//! Bootstrap primitives
//!
//! The handful of native operations the core needs before the language can
//! define anything for itself: arithmetic, tuple and map plumbing, atom
//! creation, variable access, fiber spawning, and the parse-control
//! primitives macros use to veto or force-accept a parse path.
//!
//! Pragmas reference primitives by these names
//! (`"method=Add=_+_"`), so the names are part of the bootstrap contract.

use crate::executor::Executor;
use crate::fiber::Fiber;
use crate::runtime::Runtime;
use avail_core::atom;
use avail_core::integer::IntegerRepr;
use avail_core::object::{AvailObject, Repr};
use avail_core::phrase::{self, PhraseRepr};
use avail_core::tuple;
use avail_core::types;
use avail_core::variable::new_variable;
use avail_core::ErrorCode;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::info;

/// What a primitive attempt produced.
pub enum PrimitiveResult {
    Value(AvailObject),
    Failure(ErrorCode),
    ParseRejected(String),
    ParseAccepted,
    AssertionFailed(String),
    EmergencyExit(String),
}

pub struct PrimitiveContext<'a> {
    pub runtime: &'a Arc<RwLock<Runtime>>,
    pub fiber: Arc<Fiber>,
    pub executor: Option<Arc<Executor>>,
}

type PrimitiveFn = fn(&[AvailObject], &mut PrimitiveContext<'_>) -> PrimitiveResult;

fn registry() -> &'static HashMap<&'static str, PrimitiveFn> {
    static REGISTRY: OnceLock<HashMap<&'static str, PrimitiveFn>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut table: HashMap<&'static str, PrimitiveFn> = HashMap::new();
        table.insert("Add", add);
        table.insert("Subtract", subtract);
        table.insert("Multiply", multiply);
        table.insert("Divide", divide);
        table.insert("Modulo", modulo);
        table.insert("LessThan", less_than);
        table.insert("LessOrEqual", less_or_equal);
        table.insert("ValuesEqual", values_equal);
        table.insert("TupleSize", tuple_size);
        table.insert("TupleAt", tuple_at);
        table.insert("TupleConcatenate", tuple_concatenate);
        table.insert("TupleCopyFromTo", tuple_copy_from_to);
        table.insert("TupleAppend", tuple_append);
        table.insert("TupleReverse", tuple_reverse);
        table.insert("MapAt", map_at);
        table.insert("MapInsert", map_insert);
        table.insert("MapSize", map_size);
        table.insert("CreateAtom", create_atom_primitive);
        table.insert("CreateVariable", create_variable);
        table.insert("ReadVariable", read_variable);
        table.insert("WriteVariable", write_variable);
        table.insert("ApplyFunction", apply_function);
        table.insert("SpawnFiber", spawn_fiber);
        table.insert("Print", print_value);
        table.insert("Stringify", stringify);
        table.insert("RejectParse", reject_parse);
        table.insert("AcceptParse", accept_parse);
        table.insert("ListPhraseSize", list_phrase_size);
        table.insert("ConstantDeclarationFromPhrase", constant_declaration);
        table
    })
}

/// Look up and run a primitive by name.
pub fn invoke(
    name: &str,
    arguments: &[AvailObject],
    context: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    match registry().get(name) {
        Some(primitive) => primitive(arguments, context),
        None => PrimitiveResult::Failure(ErrorCode::NoImplementation),
    }
}

/// Is this a known primitive name? (Pragma validation.)
pub fn exists(name: &str) -> bool {
    registry().contains_key(name)
}

/// The function type a `method=`/`macro=` pragma should install for a
/// primitive. Macro-body primitives take and yield phrases.
pub fn bootstrap_signature(name: &str) -> Option<AvailObject> {
    use avail_core::phrase::PhraseKind;
    let integer = types::integer_type;
    let sig = |args: Vec<AvailObject>, ret: AvailObject| Some(types::function_type(args, ret));
    match name {
        "Add" | "Subtract" | "Multiply" | "Divide" | "Modulo" => {
            sig(vec![integer(), integer()], integer())
        }
        "LessThan" | "LessOrEqual" => sig(vec![integer(), integer()], types::boolean_type()),
        "ValuesEqual" => sig(vec![types::any_type(), types::any_type()], types::boolean_type()),
        "TupleSize" => sig(vec![types::most_general_tuple_type()], types::whole_number_type()),
        "TupleAt" => sig(
            vec![types::most_general_tuple_type(), types::natural_number_type()],
            types::any_type(),
        ),
        "TupleConcatenate" => sig(
            vec![
                types::most_general_tuple_type(),
                types::most_general_tuple_type(),
            ],
            types::most_general_tuple_type(),
        ),
        "TupleCopyFromTo" => sig(
            vec![
                types::most_general_tuple_type(),
                types::natural_number_type(),
                types::whole_number_type(),
            ],
            types::most_general_tuple_type(),
        ),
        "TupleAppend" => sig(
            vec![types::most_general_tuple_type(), types::any_type()],
            types::most_general_tuple_type(),
        ),
        "TupleReverse" => sig(
            vec![types::most_general_tuple_type()],
            types::most_general_tuple_type(),
        ),
        "MapAt" => sig(vec![types::map_type(), types::any_type()], types::any_type()),
        "MapInsert" => sig(
            vec![types::map_type(), types::any_type(), types::any_type()],
            types::map_type(),
        ),
        "MapSize" => sig(vec![types::map_type()], types::whole_number_type()),
        "CreateAtom" => sig(vec![types::string_type()], types::atom_type()),
        "CreateVariable" => sig(vec![types::type_type()], types::variable_type()),
        "ReadVariable" => sig(vec![types::variable_type()], types::any_type()),
        "WriteVariable" => sig(
            vec![types::variable_type(), types::any_type()],
            types::top_type(),
        ),
        "ApplyFunction" => sig(
            vec![types::any_type(), types::most_general_tuple_type()],
            types::any_type(),
        ),
        "SpawnFiber" => sig(
            vec![
                types::any_type(),
                types::most_general_tuple_type(),
                types::whole_number_type(),
            ],
            types::top_type(),
        ),
        "Print" => sig(vec![types::string_type()], types::top_type()),
        "Stringify" => sig(vec![types::any_type()], types::string_type()),
        "RejectParse" => sig(vec![types::string_type()], types::bottom_type()),
        "AcceptParse" => sig(Vec::new(), types::bottom_type()),
        "ListPhraseSize" => sig(
            vec![types::phrase_type(PhraseKind::ListPhrase, types::top_type())],
            types::phrase_type(PhraseKind::LiteralPhrase, types::any_type()),
        ),
        "ConstantDeclarationFromPhrase" => sig(
            vec![
                types::phrase_type(PhraseKind::LiteralPhrase, types::any_type()),
                types::phrase_type(PhraseKind::ExpressionPhrase, types::any_type()),
            ],
            types::phrase_type(PhraseKind::DeclarationPhrase, types::top_type()),
        ),
        _ => None,
    }
}

// ----------------------------------------------------------------------
// Arithmetic
// ----------------------------------------------------------------------

fn numeric_pair(
    arguments: &[AvailObject],
) -> Result<(IntegerRepr, IntegerRepr), PrimitiveResult> {
    if arguments.len() != 2 {
        return Err(PrimitiveResult::Failure(
            ErrorCode::IncorrectNumberOfArguments,
        ));
    }
    match (arguments[0].as_integer(), arguments[1].as_integer()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType)),
    }
}

fn arithmetic(
    arguments: &[AvailObject],
    op: fn(&IntegerRepr, &IntegerRepr) -> Result<IntegerRepr, ErrorCode>,
) -> PrimitiveResult {
    match numeric_pair(arguments) {
        Ok((a, b)) => match op(&a, &b) {
            Ok(result) => PrimitiveResult::Value(AvailObject::new(Repr::Integer(result))),
            Err(code) => PrimitiveResult::Failure(code),
        },
        Err(failure) => failure,
    }
}

fn add(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    arithmetic(arguments, IntegerRepr::add)
}

fn subtract(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    arithmetic(arguments, IntegerRepr::subtract)
}

fn multiply(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    arithmetic(arguments, IntegerRepr::multiply)
}

fn divide(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    arithmetic(arguments, IntegerRepr::divide)
}

fn modulo(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    arithmetic(arguments, IntegerRepr::modulo)
}

fn less_than(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    match numeric_pair(arguments) {
        Ok((a, b)) => PrimitiveResult::Value(atom::boolean(
            a.compare(&b) == std::cmp::Ordering::Less,
        )),
        Err(failure) => failure,
    }
}

fn less_or_equal(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    match numeric_pair(arguments) {
        Ok((a, b)) => PrimitiveResult::Value(atom::boolean(
            a.compare(&b) != std::cmp::Ordering::Greater,
        )),
        Err(failure) => failure,
    }
}

fn values_equal(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    PrimitiveResult::Value(atom::boolean(arguments[0].equals(&arguments[1])))
}

// ----------------------------------------------------------------------
// Tuples
// ----------------------------------------------------------------------

fn expect_tuple(argument: &AvailObject) -> Result<(), PrimitiveResult> {
    if argument.is_tuple() {
        Ok(())
    } else {
        Err(PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType))
    }
}

fn tuple_size(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    if let Err(failure) = expect_tuple(&arguments[0]) {
        return failure;
    }
    PrimitiveResult::Value(AvailObject::from_i64(
        tuple::tuple_size(&arguments[0]) as i64
    ))
}

fn tuple_at(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    if let Err(failure) = expect_tuple(&arguments[0]) {
        return failure;
    }
    let Some(index) = arguments[1].as_i64() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    let size = tuple::tuple_size(&arguments[0]) as i64;
    if index < 1 || index > size {
        return PrimitiveResult::Failure(ErrorCode::SubscriptOutOfBounds);
    }
    PrimitiveResult::Value(tuple::tuple_at(&arguments[0], index as usize))
}

fn tuple_concatenate(
    arguments: &[AvailObject],
    _: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    for argument in arguments {
        if let Err(failure) = expect_tuple(argument) {
            return failure;
        }
    }
    PrimitiveResult::Value(tuple::concatenate(&arguments[0], &arguments[1], false))
}

fn tuple_copy_from_to(
    arguments: &[AvailObject],
    _: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    if arguments.len() != 3 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    if let Err(failure) = expect_tuple(&arguments[0]) {
        return failure;
    }
    let (Some(start), Some(end)) = (arguments[1].as_i64(), arguments[2].as_i64()) else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    let size = tuple::tuple_size(&arguments[0]) as i64;
    if start < 1 || end > size || start > end + 1 {
        return PrimitiveResult::Failure(ErrorCode::SubscriptOutOfBounds);
    }
    PrimitiveResult::Value(tuple::copy_tuple_from_to(
        &arguments[0],
        start as usize,
        end as usize,
        false,
    ))
}

fn tuple_append(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    if let Err(failure) = expect_tuple(&arguments[0]) {
        return failure;
    }
    PrimitiveResult::Value(tuple::append(&arguments[0], &arguments[1], false))
}

fn tuple_reverse(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    if let Err(failure) = expect_tuple(&arguments[0]) {
        return failure;
    }
    PrimitiveResult::Value(tuple::reverse(&arguments[0], false))
}

// ----------------------------------------------------------------------
// Maps
// ----------------------------------------------------------------------

fn map_at(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let Some(map) = arguments[0].as_map() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    match map.get(&arguments[1]) {
        Some(value) => PrimitiveResult::Value(value),
        None => PrimitiveResult::Failure(ErrorCode::KeyNotFound),
    }
}

fn map_insert(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 3 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let Some(map) = arguments[0].as_map() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    PrimitiveResult::Value(avail_core::map::map_object(
        map.with(arguments[1].clone(), arguments[2].clone()),
    ))
}

fn map_size(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let Some(map) = arguments[0].as_map() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    PrimitiveResult::Value(AvailObject::from_i64(map.size() as i64))
}

// ----------------------------------------------------------------------
// Atoms and variables
// ----------------------------------------------------------------------

fn create_atom_primitive(
    arguments: &[AvailObject],
    _: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let Some(name) = arguments[0].as_string() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    PrimitiveResult::Value(atom::create_atom(name))
}

fn create_variable(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    if !arguments[0].is_type() {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    }
    PrimitiveResult::Value(new_variable(arguments[0].clone()))
}

fn read_variable(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let Some(cell) = arguments[0].as_variable() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    match cell.get() {
        Ok(value) => PrimitiveResult::Value(value),
        Err(code) => PrimitiveResult::Failure(code),
    }
}

fn write_variable(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let Some(cell) = arguments[0].as_variable() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    match cell.set(arguments[1].clone()) {
        Ok(()) => PrimitiveResult::Value(AvailObject::nil()),
        Err(code) => PrimitiveResult::Failure(code),
    }
}

// ----------------------------------------------------------------------
// Functions and fibers
// ----------------------------------------------------------------------

fn apply_function(
    arguments: &[AvailObject],
    context: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    if arguments[0].as_function().is_none() || !arguments[1].is_tuple() {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    }
    let applied_args = tuple::tuple_to_vec(&arguments[1]);
    let mut interpreter = crate::interpreter::Interpreter::new(
        Arc::clone(context.runtime),
        Arc::clone(&context.fiber),
        context.executor.clone(),
    );
    match interpreter.run_function(&arguments[0], applied_args) {
        crate::fiber::EvalOutcome::Returned(value) => PrimitiveResult::Value(value),
        crate::fiber::EvalOutcome::Failed(code) => PrimitiveResult::Failure(code),
        crate::fiber::EvalOutcome::Rejected(reason) => PrimitiveResult::ParseRejected(reason),
        crate::fiber::EvalOutcome::Accepted => PrimitiveResult::ParseAccepted,
        crate::fiber::EvalOutcome::AssertionFailed(reason) => {
            PrimitiveResult::AssertionFailed(reason)
        }
        crate::fiber::EvalOutcome::EmergencyExit(reason) => {
            PrimitiveResult::EmergencyExit(reason)
        }
    }
}

fn spawn_fiber(
    arguments: &[AvailObject],
    context: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    if arguments.len() != 3 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let (function, args_tuple, priority) =
        (&arguments[0], &arguments[1], arguments[2].as_i64());
    let Some(priority) = priority else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    if function.as_function().is_none() || !args_tuple.is_tuple() {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    }
    let Some(executor) = context.executor.clone() else {
        return PrimitiveResult::Failure(ErrorCode::PermissionDenied);
    };
    let fiber = Fiber::new_fiber(types::top_type(), priority.clamp(0, 255) as u8);
    fiber.run_outermost_function(
        context.runtime,
        &executor,
        function.clone(),
        tuple::tuple_to_vec(args_tuple),
    );
    PrimitiveResult::Value(AvailObject::nil())
}

// ----------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------

fn print_value(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    match arguments[0].as_string() {
        Some(text) => {
            info!(target: "avail::output", "{text}");
            PrimitiveResult::Value(AvailObject::nil())
        }
        None => PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType),
    }
}

fn stringify(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    PrimitiveResult::Value(tuple::string_from_str(&arguments[0].to_string()))
}

// ----------------------------------------------------------------------
// Parse control (used inside macro bodies and prefix functions)
// ----------------------------------------------------------------------

fn reject_parse(arguments: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    let reason = arguments
        .first()
        .and_then(|a| a.as_string())
        .unwrap_or_else(|| "parse rejected".to_string());
    PrimitiveResult::ParseRejected(reason)
}

fn accept_parse(_: &[AvailObject], _: &mut PrimitiveContext<'_>) -> PrimitiveResult {
    PrimitiveResult::ParseAccepted
}

// ----------------------------------------------------------------------
// Phrase construction (bootstrap macro bodies)
// ----------------------------------------------------------------------

fn list_phrase_size(
    arguments: &[AvailObject],
    _: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    if arguments.len() != 1 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    let elements = phrase::list_phrase_expressions(&arguments[0]);
    let size = AvailObject::from_i64(elements.len() as i64);
    PrimitiveResult::Value(phrase::literal_phrase(size.clone(), size.to_string()))
}

/// Build a local-constant declaration from a name-bearing literal phrase
/// and a value phrase. The loader hoists it to module scope.
fn constant_declaration(
    arguments: &[AvailObject],
    _: &mut PrimitiveContext<'_>,
) -> PrimitiveResult {
    if arguments.len() != 2 {
        return PrimitiveResult::Failure(ErrorCode::IncorrectNumberOfArguments);
    }
    // The name arrives as a literal phrase wrapping the raw keyword token
    // (the literal's value is the token object itself).
    let name_token = match arguments[0].as_phrase().as_deref() {
        Some(PhraseRepr::Literal { token }) => match token.as_token() {
            Some(data) => match &data.literal {
                Some(value) if value.as_token().is_some() => value.clone(),
                _ => token.clone(),
            },
            None => return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType),
        },
        _ => return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType),
    };
    let Some(value_phrase) = arguments[1].as_phrase() else {
        return PrimitiveResult::Failure(ErrorCode::IncorrectArgumentType);
    };
    let declared_type = value_phrase.expression_type();
    PrimitiveResult::Value(phrase::phrase_object(PhraseRepr::Declaration {
        kind: avail_core::DeclarationKind::LocalConstant,
        token: name_token,
        declared_type,
        initializer: Some(arguments[1].clone()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_pieces() -> (Arc<RwLock<Runtime>>, Arc<Fiber>) {
        (
            Arc::new(RwLock::new(Runtime::new())),
            Fiber::new_fiber(types::top_type(), 50),
        )
    }

    fn run(name: &str, arguments: &[AvailObject]) -> PrimitiveResult {
        let (runtime, fiber) = context_pieces();
        let mut context = PrimitiveContext {
            runtime: &runtime,
            fiber,
            executor: None,
        };
        invoke(name, arguments, &mut context)
    }

    fn value(result: PrimitiveResult) -> AvailObject {
        match result {
            PrimitiveResult::Value(v) => v,
            PrimitiveResult::Failure(code) => panic!("unexpected failure {code}"),
            _ => panic!("unexpected parse-control result"),
        }
    }

    #[test]
    fn test_arithmetic_primitives() {
        let three = value(run(
            "Add",
            &[AvailObject::from_i64(1), AvailObject::from_i64(2)],
        ));
        assert_eq!(three.as_i64(), Some(3));
        let floored = value(run(
            "Divide",
            &[AvailObject::from_i64(-7), AvailObject::from_i64(2)],
        ));
        assert_eq!(floored.as_i64(), Some(-4));
    }

    #[test]
    fn test_infinity_failures_carry_codes() {
        let pos = AvailObject::new(Repr::Integer(IntegerRepr::PositiveInfinity));
        let neg = AvailObject::new(Repr::Integer(IntegerRepr::NegativeInfinity));
        match run("Add", &[pos.clone(), neg]) {
            PrimitiveResult::Failure(code) => {
                assert_eq!(code, ErrorCode::CannotAddUnlikeInfinities)
            }
            _ => panic!("expected failure"),
        }
        match run("Multiply", &[pos, AvailObject::from_i64(0)]) {
            PrimitiveResult::Failure(code) => {
                assert_eq!(code, ErrorCode::CannotMultiplyZeroAndInfinity)
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_tuple_primitives() {
        let t = tuple::tuple_from_objects(vec![
            AvailObject::from_i64(5),
            AvailObject::from_i64(6),
        ]);
        assert_eq!(value(run("TupleSize", &[t.clone()])).as_i64(), Some(2));
        assert_eq!(
            value(run("TupleAt", &[t.clone(), AvailObject::from_i64(2)])).as_i64(),
            Some(6)
        );
        match run("TupleAt", &[t, AvailObject::from_i64(3)]) {
            PrimitiveResult::Failure(code) => assert_eq!(code, ErrorCode::SubscriptOutOfBounds),
            _ => panic!("expected subscript failure"),
        }
    }

    #[test]
    fn test_map_primitives() {
        let map = avail_core::map::map_object(avail_core::map::AvailMap::new());
        let map = value(run(
            "MapInsert",
            &[map, tuple::string_from_str("k"), AvailObject::from_i64(9)],
        ));
        assert_eq!(
            value(run("MapAt", &[map.clone(), tuple::string_from_str("k")])).as_i64(),
            Some(9)
        );
        match run("MapAt", &[map, tuple::string_from_str("missing")]) {
            PrimitiveResult::Failure(code) => assert_eq!(code, ErrorCode::KeyNotFound),
            _ => panic!("expected key-not-found"),
        }
    }

    #[test]
    fn test_parse_control() {
        match run("RejectParse", &[tuple::string_from_str("wrong turn")]) {
            PrimitiveResult::ParseRejected(reason) => assert_eq!(reason, "wrong turn"),
            _ => panic!("expected rejection"),
        }
        assert!(matches!(
            run("AcceptParse", &[]),
            PrimitiveResult::ParseAccepted
        ));
    }

    #[test]
    fn test_list_phrase_size() {
        let list = phrase::list_phrase(vec![
            phrase::literal_phrase(AvailObject::from_i64(1), "1"),
            phrase::literal_phrase(AvailObject::from_i64(2), "2"),
            phrase::literal_phrase(AvailObject::from_i64(3), "3"),
        ]);
        let literal = value(run("ListPhraseSize", &[list]));
        let repr = literal.as_phrase().unwrap();
        match &*repr {
            PhraseRepr::Literal { token } => {
                let v = token.as_token().unwrap().literal.clone().unwrap();
                assert_eq!(v.as_i64(), Some(3));
            }
            _ => panic!("expected literal phrase"),
        }
    }

    #[test]
    fn test_unknown_primitive() {
        assert!(matches!(
            run("NoSuchPrimitive", &[]),
            PrimitiveResult::Failure(ErrorCode::NoImplementation)
        ));
        assert!(exists("Add"));
        assert!(!exists("NoSuchPrimitive"));
    }
}
