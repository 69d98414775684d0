//! The level-one interpreter
//!
//! A small stack machine, just enough to evaluate compile-time phrases and
//! bootstrap bodies: push literal, push/set frame slot, call with full
//! polymorphic lookup, variable read/write, tuple construction, return.
//! Speed is a non-goal; the optimizing tier is someone else's problem.
//!
//! Frame layout: arguments first, then local-variable slots (fresh
//! variable objects created at entry), then local-constant slots.
//!
//! A function with a primitive attempts it first. On primitive success the
//! frame never runs; on failure the body runs with the failure code bound
//! into its first non-argument slot (or, with no body to run, the failure
//! propagates to the fiber).

use crate::executor::Executor;
use crate::fiber::{EvalOutcome, Fiber};
use crate::primitives::{self, PrimitiveContext, PrimitiveResult};
use crate::runtime::Runtime;
use avail_core::function::L1Instruction;
use avail_core::object::AvailObject;
use avail_core::variable::new_variable;
use avail_core::ErrorCode;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Recursion guard: compile-time evaluation should be shallow; a runaway
/// macro is better reported than overflowed.
const MAXIMUM_CALL_DEPTH: usize = 512;

pub struct Interpreter {
    runtime: Arc<RwLock<Runtime>>,
    fiber: Arc<Fiber>,
    executor: Option<Arc<Executor>>,
    depth: usize,
}

impl Interpreter {
    pub fn new(
        runtime: Arc<RwLock<Runtime>>,
        fiber: Arc<Fiber>,
        executor: Option<Arc<Executor>>,
    ) -> Interpreter {
        Interpreter {
            runtime,
            fiber,
            executor,
            depth: 0,
        }
    }

    pub fn runtime(&self) -> &Arc<RwLock<Runtime>> {
        &self.runtime
    }

    /// Apply a function object to arguments.
    pub fn run_function(
        &mut self,
        function: &AvailObject,
        arguments: Vec<AvailObject>,
    ) -> EvalOutcome {
        let Some(function_data) = function.as_function() else {
            return EvalOutcome::Failed(ErrorCode::IncorrectArgumentType);
        };
        let raw = Arc::clone(&function_data.raw);
        if arguments.len() != raw.num_args as usize {
            return EvalOutcome::Failed(ErrorCode::IncorrectNumberOfArguments);
        }
        if self.fiber.is_cancel_requested() {
            return EvalOutcome::Failed(ErrorCode::FiberIsTerminated);
        }
        if self.depth >= MAXIMUM_CALL_DEPTH {
            return EvalOutcome::AssertionFailed(format!(
                "call depth exceeded {MAXIMUM_CALL_DEPTH} while evaluating a compile-time function"
            ));
        }

        // Primitive attempt.
        let mut primitive_failure: Option<ErrorCode> = None;
        if let Some(primitive_name) = &raw.primitive {
            let mut context = PrimitiveContext {
                runtime: &self.runtime,
                fiber: Arc::clone(&self.fiber),
                executor: self.executor.clone(),
            };
            match primitives::invoke(primitive_name, &arguments, &mut context) {
                PrimitiveResult::Value(value) => return EvalOutcome::Returned(value),
                PrimitiveResult::ParseRejected(reason) => return EvalOutcome::Rejected(reason),
                PrimitiveResult::ParseAccepted => return EvalOutcome::Accepted,
                PrimitiveResult::AssertionFailed(reason) => {
                    return EvalOutcome::AssertionFailed(reason)
                }
                PrimitiveResult::EmergencyExit(reason) => {
                    return EvalOutcome::EmergencyExit(reason)
                }
                PrimitiveResult::Failure(code) => {
                    if raw.code.len() <= 1 {
                        // No failure body: propagate to the fiber.
                        return EvalOutcome::Failed(code);
                    }
                    primitive_failure = Some(code);
                }
            }
        }

        // Build the frame.
        let mut slots: Vec<AvailObject> = Vec::with_capacity(raw.num_slots());
        slots.extend(arguments);
        for inner_type in &raw.local_variable_types {
            slots.push(new_variable(inner_type.clone()));
        }
        for _ in 0..raw.num_constants {
            slots.push(AvailObject::nil());
        }
        if let Some(code) = primitive_failure {
            // Bind the failure code into the first non-argument slot.
            let failure_slot = raw.num_args as usize;
            if failure_slot < slots.len() {
                slots[failure_slot] = AvailObject::from_i64(code.code() as i64);
            }
        }

        self.depth += 1;
        let outcome = self.run_frame(&raw.code, &raw.literals, slots);
        self.depth -= 1;
        outcome
    }

    fn run_frame(
        &mut self,
        code: &[L1Instruction],
        literals: &[AvailObject],
        mut slots: Vec<AvailObject>,
    ) -> EvalOutcome {
        let mut stack: Vec<AvailObject> = Vec::new();
        for instruction in code {
            trace!(?instruction, stack_depth = stack.len(), "level-one step");
            match instruction {
                L1Instruction::PushLiteral(index) => {
                    stack.push(literals[*index as usize].clone());
                }
                L1Instruction::PushLocal(slot) => {
                    stack.push(slots[*slot as usize].clone());
                }
                L1Instruction::SetLocal(slot) => {
                    let value = match stack.pop() {
                        Some(v) => v,
                        None => return underflow(),
                    };
                    slots[*slot as usize] = value;
                }
                L1Instruction::Pop => {
                    if stack.pop().is_none() {
                        return underflow();
                    }
                }
                L1Instruction::Call { method, num_args } => {
                    let count = *num_args as usize;
                    if stack.len() < count {
                        return underflow();
                    }
                    let arguments: Vec<AvailObject> =
                        stack.split_off(stack.len() - count);
                    // Look up under the read lock, then release it before
                    // recursing; bodies may take the write lock.
                    let body = {
                        let runtime = self.runtime.read().expect("runtime lock poisoned");
                        let method_data = runtime.method(*method);
                        match method_data.lookup_by_values(&arguments) {
                            Ok(definition) => match &definition.body {
                                crate::method::DefinitionBody::Method(function) => {
                                    Ok(function.clone())
                                }
                                _ => Err(ErrorCode::NoMethodDefinition),
                            },
                            Err(code) => Err(code),
                        }
                    };
                    match body {
                        Ok(function) => match self.run_function(&function, arguments) {
                            EvalOutcome::Returned(value) => stack.push(value),
                            other => return other,
                        },
                        Err(code) => return EvalOutcome::Failed(code),
                    }
                }
                L1Instruction::GetVariable => {
                    let variable = match stack.pop() {
                        Some(v) => v,
                        None => return underflow(),
                    };
                    let Some(cell) = variable.as_variable() else {
                        return EvalOutcome::Failed(ErrorCode::IncorrectArgumentType);
                    };
                    match cell.get() {
                        Ok(value) => stack.push(value),
                        Err(code) => return EvalOutcome::Failed(code),
                    }
                }
                L1Instruction::SetVariable => {
                    let variable = match stack.pop() {
                        Some(v) => v,
                        None => return underflow(),
                    };
                    let value = match stack.pop() {
                        Some(v) => v,
                        None => return underflow(),
                    };
                    let Some(cell) = variable.as_variable() else {
                        return EvalOutcome::Failed(ErrorCode::IncorrectArgumentType);
                    };
                    if let Err(code) = cell.set(value) {
                        return EvalOutcome::Failed(code);
                    }
                }
                L1Instruction::MakeTuple(size) => {
                    let count = *size as usize;
                    if stack.len() < count {
                        return underflow();
                    }
                    let elements: Vec<AvailObject> = stack.split_off(stack.len() - count);
                    stack.push(avail_core::tuple::tuple_from_objects(elements));
                }
                L1Instruction::Return => {
                    return EvalOutcome::Returned(stack.pop().unwrap_or_else(AvailObject::nil));
                }
            }
        }
        EvalOutcome::Returned(stack.pop().unwrap_or_else(AvailObject::nil))
    }
}

fn underflow() -> EvalOutcome {
    EvalOutcome::AssertionFailed("level-one operand stack underflow".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::function::{function_object, RawFunction};
    use avail_core::types;

    fn runtime() -> Arc<RwLock<Runtime>> {
        Arc::new(RwLock::new(Runtime::new()))
    }

    fn fiber() -> Arc<Fiber> {
        Fiber::new_fiber(types::top_type(), 50)
    }

    fn run(function: &AvailObject, args: Vec<AvailObject>) -> EvalOutcome {
        Interpreter::new(runtime(), fiber(), None).run_function(function, args)
    }

    fn raw(
        num_args: u16,
        literals: Vec<AvailObject>,
        code: Vec<L1Instruction>,
    ) -> AvailObject {
        function_object(Arc::new(RawFunction {
            num_args,
            local_variable_types: Vec::new(),
            num_constants: 0,
            literals,
            code,
            function_type: types::function_type(
                (0..num_args).map(|_| types::any_type()).collect(),
                types::any_type(),
            ),
            primitive: None,
        }))
    }

    #[test]
    fn test_push_literal_and_return() {
        let f = raw(
            0,
            vec![AvailObject::from_i64(9)],
            vec![L1Instruction::PushLiteral(0), L1Instruction::Return],
        );
        match run(&f, vec![]) {
            EvalOutcome::Returned(v) => assert_eq!(v.as_i64(), Some(9)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_arguments_land_in_slots() {
        let f = raw(
            2,
            vec![],
            vec![L1Instruction::PushLocal(1), L1Instruction::Return],
        );
        match run(&f, vec![AvailObject::from_i64(1), AvailObject::from_i64(2)]) {
            EvalOutcome::Returned(v) => assert_eq!(v.as_i64(), Some(2)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_arity_mismatch_fails() {
        let f = raw(1, vec![], vec![L1Instruction::Return]);
        match run(&f, vec![]) {
            EvalOutcome::Failed(code) => {
                assert_eq!(code, ErrorCode::IncorrectNumberOfArguments)
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_make_tuple() {
        let f = raw(
            2,
            vec![],
            vec![
                L1Instruction::PushLocal(0),
                L1Instruction::PushLocal(1),
                L1Instruction::MakeTuple(2),
                L1Instruction::Return,
            ],
        );
        match run(&f, vec![AvailObject::from_i64(4), AvailObject::from_i64(5)]) {
            EvalOutcome::Returned(v) => {
                assert_eq!(avail_core::tuple::tuple_size(&v), 2);
                assert_eq!(avail_core::tuple::tuple_at(&v, 1).as_i64(), Some(4));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_primitive_function() {
        let f = function_object(Arc::new(RawFunction {
            num_args: 2,
            local_variable_types: Vec::new(),
            num_constants: 0,
            literals: Vec::new(),
            code: vec![L1Instruction::Return],
            function_type: types::function_type(
                vec![types::integer_type(), types::integer_type()],
                types::integer_type(),
            ),
            primitive: Some("Add".to_string()),
        }));
        match run(&f, vec![AvailObject::from_i64(20), AvailObject::from_i64(22)]) {
            EvalOutcome::Returned(v) => assert_eq!(v.as_i64(), Some(42)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_primitive_failure_propagates_without_body() {
        let f = function_object(Arc::new(RawFunction {
            num_args: 2,
            local_variable_types: Vec::new(),
            num_constants: 0,
            literals: Vec::new(),
            code: vec![L1Instruction::Return],
            function_type: types::function_type(
                vec![types::integer_type(), types::integer_type()],
                types::integer_type(),
            ),
            primitive: Some("Divide".to_string()),
        }));
        match run(&f, vec![AvailObject::from_i64(1), AvailObject::from_i64(0)]) {
            EvalOutcome::Failed(code) => assert_eq!(code, ErrorCode::CannotDivideByZero),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_method_call_dispatch() {
        let runtime = runtime();
        let atom = avail_core::atom::create_atom("_+_");
        let method_id = {
            let mut rt = runtime.write().unwrap();
            let bundle = rt
                .bundle_for_atom(&atom, "_+_", vec!["+".into()], vec![], 2)
                .unwrap();
            let method_id = rt.bundle(bundle).method;
            let add = function_object(Arc::new(RawFunction {
                num_args: 2,
                local_variable_types: Vec::new(),
                num_constants: 0,
                literals: Vec::new(),
                code: vec![L1Instruction::Return],
                function_type: types::function_type(
                    vec![types::integer_type(), types::integer_type()],
                    types::integer_type(),
                ),
                primitive: Some("Add".to_string()),
            }));
            rt.add_definition(
                method_id,
                crate::method::Definition {
                    signature: types::function_type(
                        vec![types::integer_type(), types::integer_type()],
                        types::integer_type(),
                    ),
                    body: crate::method::DefinitionBody::Method(add),
                    module: None,
                },
            );
            method_id
        };
        let caller = raw(
            0,
            vec![AvailObject::from_i64(1), AvailObject::from_i64(2)],
            vec![
                L1Instruction::PushLiteral(0),
                L1Instruction::PushLiteral(1),
                L1Instruction::Call {
                    method: method_id,
                    num_args: 2,
                },
                L1Instruction::Return,
            ],
        );
        let outcome =
            Interpreter::new(runtime, fiber(), None).run_function(&caller, vec![]);
        match outcome {
            EvalOutcome::Returned(v) => assert_eq!(v.as_i64(), Some(3)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
