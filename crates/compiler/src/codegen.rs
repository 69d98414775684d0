//! Phrase compilation
//!
//! Turns a parsed phrase into a level-one function the runtime can
//! invoke. Top-level statements compile to zero-argument functions;
//! blocks compile to functions with their argument declarations as frame
//! slots. Module variables and constants are already runtime objects by
//! the time code is generated, so they load as literals.

use avail_core::function::{function_object, L1Instruction, RawFunction};
use avail_core::object::AvailObject;
use avail_core::phrase::{self, DeclarationKind, PhraseRepr};
use avail_core::types;
use avail_runtime::runtime::Runtime;
use std::collections::HashMap;
use std::sync::Arc;

/// How a name in scope reaches the generated code.
#[derive(Clone)]
pub enum Binding {
    /// A frame slot (block argument or local).
    Slot(u16),
    /// A module variable object, loaded as a literal then dereferenced.
    ModuleVariable(AvailObject),
    /// A module constant's value, loaded directly.
    ModuleConstant(AvailObject),
}

#[derive(Default)]
struct CodeBuilder {
    literals: Vec<AvailObject>,
    code: Vec<L1Instruction>,
    bindings: HashMap<String, Binding>,
    next_slot: u16,
}

impl CodeBuilder {
    fn literal_index(&mut self, value: AvailObject) -> u32 {
        if let Some(index) = self.literals.iter().position(|l| l.equals(&value)) {
            return index as u32;
        }
        self.literals.push(value);
        (self.literals.len() - 1) as u32
    }

    fn emit(&mut self, instruction: L1Instruction) {
        self.code.push(instruction);
    }
}

/// Compile a phrase into a zero-argument function evaluating it.
/// `module_bindings` maps names already hoisted to module scope.
pub fn compile_top_level(
    runtime: &Runtime,
    phrase_object: &AvailObject,
    module_bindings: &HashMap<String, Binding>,
) -> Result<AvailObject, String> {
    let mut builder = CodeBuilder {
        bindings: module_bindings.clone(),
        ..CodeBuilder::default()
    };
    generate(runtime, phrase_object, &mut builder)?;
    builder.emit(L1Instruction::Return);
    let yield_type = phrase::phrase_expression_type(phrase_object);
    let raw = RawFunction {
        num_args: 0,
        local_variable_types: Vec::new(),
        num_constants: builder.next_slot,
        literals: builder.literals,
        code: builder.code,
        function_type: types::function_type(Vec::new(), yield_type),
        primitive: None,
    };
    Ok(function_object(Arc::new(raw)))
}

fn generate(
    runtime: &Runtime,
    phrase_object: &AvailObject,
    builder: &mut CodeBuilder,
) -> Result<(), String> {
    let Some(repr) = phrase_object.as_phrase() else {
        return Err("cannot generate code for a non-phrase".to_string());
    };
    match &*repr {
        PhraseRepr::Literal { token } => {
            let value = token
                .as_token()
                .and_then(|t| t.literal.clone())
                .ok_or("literal phrase with no literal value")?;
            let index = builder.literal_index(value);
            builder.emit(L1Instruction::PushLiteral(index));
        }
        PhraseRepr::MacroSubstitution { replacement, .. } => {
            generate(runtime, replacement, builder)?;
        }
        PhraseRepr::List { expressions } => {
            for expression in expressions {
                generate(runtime, expression, builder)?;
            }
            builder.emit(L1Instruction::MakeTuple(expressions.len() as u16));
        }
        PhraseRepr::PermutedList { .. } => {
            let expressions = phrase::list_phrase_expressions(phrase_object);
            for expression in &expressions {
                generate(runtime, expression, builder)?;
            }
            builder.emit(L1Instruction::MakeTuple(expressions.len() as u16));
        }
        PhraseRepr::Send {
            bundle, arguments, ..
        } => {
            let expressions = phrase::list_phrase_expressions(arguments);
            for expression in &expressions {
                generate(runtime, expression, builder)?;
            }
            let method = runtime.bundle(*bundle).method;
            builder.emit(L1Instruction::Call {
                method,
                num_args: expressions.len() as u16,
            });
        }
        PhraseRepr::VariableUse { declaration, .. } => {
            let name = declaration
                .as_phrase()
                .and_then(|d| d.declaration_token_text())
                .ok_or("variable use of an unnamed declaration")?;
            match builder.bindings.get(&name).cloned() {
                Some(Binding::Slot(slot)) => builder.emit(L1Instruction::PushLocal(slot)),
                Some(Binding::ModuleVariable(variable)) => {
                    let index = builder.literal_index(variable);
                    builder.emit(L1Instruction::PushLiteral(index));
                    builder.emit(L1Instruction::GetVariable);
                }
                Some(Binding::ModuleConstant(value)) => {
                    let index = builder.literal_index(value);
                    builder.emit(L1Instruction::PushLiteral(index));
                }
                None => return Err(format!("name `{name}` is not bound in this scope")),
            }
        }
        PhraseRepr::Reference { variable_use } => {
            let name = match variable_use.as_phrase().as_deref() {
                Some(PhraseRepr::VariableUse { declaration, .. }) => declaration
                    .as_phrase()
                    .and_then(|d| d.declaration_token_text())
                    .ok_or("reference to an unnamed declaration")?,
                _ => return Err("reference phrase without a variable use".to_string()),
            };
            match builder.bindings.get(&name).cloned() {
                Some(Binding::ModuleVariable(variable)) => {
                    let index = builder.literal_index(variable);
                    builder.emit(L1Instruction::PushLiteral(index));
                }
                _ => {
                    return Err(format!(
                        "`↑{name}` requires a module variable in scope"
                    ))
                }
            }
        }
        PhraseRepr::Assignment {
            variable_use,
            value,
        } => {
            let name = match variable_use.as_phrase().as_deref() {
                Some(PhraseRepr::VariableUse { declaration, .. }) => declaration
                    .as_phrase()
                    .and_then(|d| d.declaration_token_text())
                    .ok_or("assignment to an unnamed declaration")?,
                _ => return Err("assignment without a variable use".to_string()),
            };
            match builder.bindings.get(&name).cloned() {
                Some(Binding::ModuleVariable(variable)) => {
                    generate(runtime, value, builder)?;
                    let index = builder.literal_index(variable);
                    builder.emit(L1Instruction::PushLiteral(index));
                    builder.emit(L1Instruction::SetVariable);
                }
                Some(Binding::Slot(slot)) => {
                    generate(runtime, value, builder)?;
                    builder.emit(L1Instruction::SetLocal(slot));
                }
                _ => return Err(format!("cannot assign to `{name}`")),
            }
        }
        PhraseRepr::Declaration { kind, .. } => {
            // Top-level declarations are hoisted by the loader before
            // codegen; anything else here is local to a block body.
            return Err(format!(
                "declaration ({kind:?}) reached the code generator unhoisted"
            ));
        }
        PhraseRepr::Block {
            arguments,
            statements,
            return_type,
        } => {
            let function = compile_block(runtime, arguments, statements, return_type, builder)?;
            let index = builder.literal_index(function);
            builder.emit(L1Instruction::PushLiteral(index));
        }
    }
    Ok(())
}

fn compile_block(
    runtime: &Runtime,
    arguments: &[AvailObject],
    statements: &[AvailObject],
    return_type: &AvailObject,
    outer: &CodeBuilder,
) -> Result<AvailObject, String> {
    let mut builder = CodeBuilder::default();
    // Blocks see module bindings but not the enclosing frame.
    for (name, binding) in &outer.bindings {
        if !matches!(binding, Binding::Slot(_)) {
            builder.bindings.insert(name.clone(), binding.clone());
        }
    }
    let mut argument_types = Vec::with_capacity(arguments.len());
    for argument in arguments {
        let Some(repr) = argument.as_phrase() else {
            return Err("block argument is not a phrase".to_string());
        };
        let PhraseRepr::Declaration {
            kind: DeclarationKind::Argument,
            declared_type,
            ..
        } = &*repr
        else {
            return Err("block argument is not an argument declaration".to_string());
        };
        let name = repr
            .declaration_token_text()
            .ok_or("unnamed block argument")?;
        builder
            .bindings
            .insert(name, Binding::Slot(builder.next_slot));
        builder.next_slot += 1;
        argument_types.push(declared_type.clone());
    }
    for (index, statement) in statements.iter().enumerate() {
        generate(runtime, statement, &mut builder)?;
        if index + 1 < statements.len() {
            builder.emit(L1Instruction::Pop);
        }
    }
    builder.emit(L1Instruction::Return);
    let raw = RawFunction {
        num_args: arguments.len() as u16,
        local_variable_types: Vec::new(),
        num_constants: 0,
        literals: builder.literals,
        code: builder.code,
        function_type: types::function_type(argument_types, return_type.clone()),
        primitive: None,
    };
    Ok(function_object(Arc::new(raw)))
}

/// Compile and immediately evaluate a phrase, for `CONVERT` rules and the
/// loader's statement execution.
pub fn evaluate_phrase(
    runtime: &Arc<std::sync::RwLock<Runtime>>,
    executor: Option<Arc<avail_runtime::executor::Executor>>,
    phrase_object: &AvailObject,
    module_bindings: &HashMap<String, Binding>,
) -> Result<AvailObject, String> {
    let function = {
        let guard = runtime.read().expect("runtime lock poisoned");
        compile_top_level(&guard, phrase_object, module_bindings)?
    };
    let fiber = avail_runtime::fiber::Fiber::new_fiber(types::top_type(), 50);
    match fiber.run_now(runtime, executor, &function, Vec::new()) {
        avail_runtime::fiber::EvalOutcome::Returned(value) => Ok(value),
        avail_runtime::fiber::EvalOutcome::Failed(code) => {
            Err(format!("evaluation failed: {code}"))
        }
        avail_runtime::fiber::EvalOutcome::Rejected(reason) => {
            Err(format!("evaluation rejected a parse: {reason}"))
        }
        avail_runtime::fiber::EvalOutcome::Accepted => {
            Err("evaluation escaped with a parse acceptance".to_string())
        }
        avail_runtime::fiber::EvalOutcome::AssertionFailed(reason) => {
            Err(format!("assertion failed: {reason}"))
        }
        avail_runtime::fiber::EvalOutcome::EmergencyExit(reason) => {
            Err(format!("emergency exit: {reason}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::atom::create_atom;
    use avail_core::function::L1Instruction;
    use avail_core::phrase::{list_phrase, literal_phrase, phrase_object};
    use std::sync::RwLock;

    fn shared_runtime() -> Arc<RwLock<Runtime>> {
        Arc::new(RwLock::new(Runtime::new()))
    }

    #[test]
    fn test_literal_compiles_to_push() {
        let runtime = shared_runtime();
        let phrase = literal_phrase(AvailObject::from_i64(7), "7");
        let value =
            evaluate_phrase(&runtime, None, &phrase, &HashMap::new()).unwrap();
        assert_eq!(value.as_i64(), Some(7));
    }

    #[test]
    fn test_list_compiles_to_tuple() {
        let runtime = shared_runtime();
        let phrase = list_phrase(vec![
            literal_phrase(AvailObject::from_i64(1), "1"),
            literal_phrase(AvailObject::from_i64(2), "2"),
        ]);
        let value =
            evaluate_phrase(&runtime, None, &phrase, &HashMap::new()).unwrap();
        assert_eq!(avail_core::tuple::tuple_size(&value), 2);
    }

    #[test]
    fn test_send_compiles_to_call() {
        let runtime = shared_runtime();
        let bundle = {
            let mut rt = runtime.write().unwrap();
            let atom = create_atom("_+_");
            let bundle = rt
                .bundle_for_atom(&atom, "_+_", vec!["+".into()], Vec::new(), 2)
                .unwrap();
            let method = rt.bundle(bundle).method;
            let signature = types::function_type(
                vec![types::integer_type(), types::integer_type()],
                types::integer_type(),
            );
            let add = function_object(Arc::new(RawFunction {
                num_args: 2,
                local_variable_types: Vec::new(),
                num_constants: 0,
                literals: Vec::new(),
                code: vec![L1Instruction::Return],
                function_type: signature.clone(),
                primitive: Some("Add".to_string()),
            }));
            rt.add_definition(
                method,
                avail_runtime::method::Definition {
                    signature,
                    body: avail_runtime::method::DefinitionBody::Method(add),
                    module: None,
                },
            );
            bundle
        };
        let send = phrase_object(PhraseRepr::Send {
            bundle,
            message: "_+_".to_string(),
            arguments: list_phrase(vec![
                literal_phrase(AvailObject::from_i64(20), "20"),
                literal_phrase(AvailObject::from_i64(22), "22"),
            ]),
            return_type: types::integer_type(),
            tokens: Vec::new(),
        });
        let value = evaluate_phrase(&runtime, None, &send, &HashMap::new()).unwrap();
        assert_eq!(value.as_i64(), Some(42));
    }

    #[test]
    fn test_module_variable_binding() {
        let runtime = shared_runtime();
        let variable = avail_core::variable::named_variable(
            types::integer_type(),
            Some("counter".to_string()),
        );
        variable
            .as_variable()
            .unwrap()
            .set(AvailObject::from_i64(5))
            .unwrap();
        let mut bindings = HashMap::new();
        bindings.insert(
            "counter".to_string(),
            Binding::ModuleVariable(variable.clone()),
        );
        let declaration = phrase_object(PhraseRepr::Declaration {
            kind: DeclarationKind::ModuleVariable,
            token: avail_core::token::token_object(avail_core::token::TokenData::new(
                avail_core::token::TokenKind::Keyword,
                "counter",
                0,
                1,
            )),
            declared_type: types::integer_type(),
            initializer: None,
        });
        let use_phrase = phrase_object(PhraseRepr::VariableUse {
            declaration,
            token: avail_core::token::token_object(avail_core::token::TokenData::new(
                avail_core::token::TokenKind::Keyword,
                "counter",
                0,
                1,
            )),
        });
        let value = evaluate_phrase(&runtime, None, &use_phrase, &bindings).unwrap();
        assert_eq!(value.as_i64(), Some(5));
    }
}
