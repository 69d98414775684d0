//! The parser engine
//!
//! A nondeterministic, backtracking, memoizing interpreter of parsing
//! instructions. Every step of every alternative is its own work unit on
//! the shared executor, counted by the completion barrier, so a top-level
//! statement is finished exactly when the barrier drains. Subexpression
//! parses rendezvous through the fragment cache: any number of callers may
//! ask for "an expression starting here" and the expression is parsed
//! once.
//!
//! Sends with a leading argument (`_+_`) are reached by extension: every
//! time a solution appears at a position, a walk is seeded that offers the
//! solved phrase as the first argument of any bundle whose program begins
//! by parsing an argument. Chains of such extensions give left-leaning
//! nests; the competing right-leaning nests come from ordinary
//! subexpression requests, and grammatical restrictions decide which
//! survive.

pub mod fragment_cache;
pub mod state;

use crate::bundle_tree::{self, BundleTree, NodeRef};
use crate::codegen::{self, Binding};
use crate::lexer::{next_significant_tokens, LexerDef};
use crate::problems::ExpectationSet;
use crate::splitter::{ConversionRule, ParsingOperation};
use avail_core::atom;
use avail_core::map::map_object;
use avail_core::object::AvailObject;
use avail_core::phrase::{self, PhraseRepr};
use avail_core::token::TokenKind;
use avail_core::types;
use avail_core::{BundleId, ModuleId};
use avail_runtime::executor::{Executor, WorkUnitBarrier};
use avail_runtime::fiber::{EvalOutcome, Fiber};
use avail_runtime::method::DefinitionBody;
use avail_runtime::runtime::Runtime;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

pub use fragment_cache::{FragmentCache, Solution};
pub use state::ParserState;

/// Fiber-global key under which prefix functions and macro bodies see the
/// parser's client data.
pub fn client_data_key() -> AvailObject {
    static KEY: OnceLock<AvailObject> = OnceLock::new();
    KEY.get_or_init(|| atom::create_atom("compiler client data").make_shared())
        .clone()
}

/// Everything a parse of one top-level statement needs.
pub struct CompilationContext {
    pub runtime: Arc<RwLock<Runtime>>,
    pub executor: Arc<Executor>,
    pub barrier: Arc<WorkUnitBarrier>,
    pub module: ModuleId,
    pub lexers: Arc<Vec<LexerDef>>,
    pub cache: Arc<FragmentCache>,
    pub expectations: Arc<ExpectationSet>,
    pub tree: Arc<BundleTree>,
    pub module_bindings: Arc<HashMap<String, Binding>>,
}

type Consumer = Arc<dyn Fn(Solution) + Send + Sync>;

/// One in-flight walk through the bundle tree.
#[derive(Clone)]
struct Attempt {
    node: NodeRef,
    state: ParserState,
    /// Where this send began (solutions are recorded there).
    origin: ParserState,
    /// Parse stack: list phrases and argument phrases under construction.
    stack: Vec<AvailObject>,
    /// Saved positions for zero-progress detection.
    marks: Vec<usize>,
    /// Tokens consumed by this send (for the phrase's provenance).
    tokens: Vec<AvailObject>,
    /// How many source tokens this walk has consumed.
    consumed: usize,
    /// A pre-parsed first argument not yet claimed by a `ParseArgument`.
    leading: Option<Solution>,
}

// ----------------------------------------------------------------------
// Entry points
// ----------------------------------------------------------------------

/// Ask for expressions starting at `state`; `consumer` sees every
/// solution exactly once. The first request at a state starts the actual
/// parsing machinery there.
pub fn parse_expression(
    context: &Arc<CompilationContext>,
    state: &ParserState,
    consumer: Consumer,
) {
    let first_request = context.cache.add_consumer(state, consumer);
    if first_request {
        start_expression_walks(context, state);
    }
}

/// Parse one top-level statement starting at `state`. Work units are
/// scheduled against the context's barrier; the caller drains the barrier
/// and then inspects the returned collector.
pub fn parse_top_level_statement(
    context: &Arc<CompilationContext>,
    state: &ParserState,
) -> Arc<std::sync::Mutex<Vec<Solution>>> {
    let solutions = Arc::new(std::sync::Mutex::new(Vec::new()));
    let collector = Arc::clone(&solutions);
    let context2 = Arc::clone(context);
    let state2 = state.clone();
    context.barrier.schedule(&context.executor, move || {
        let collector2 = Arc::clone(&collector);
        parse_expression(
            &context2,
            &state2,
            Arc::new(move |solution: Solution| {
                if is_statement_shaped(&solution.phrase) {
                    collector2
                        .lock()
                        .expect("solution collector poisoned")
                        .push(solution);
                }
            }),
        );
    });
    solutions
}

/// Top-level statements must not produce a value: their type is top, or
/// they are declarations.
fn is_statement_shaped(phrase_object: &AvailObject) -> bool {
    let Some(repr) = phrase_object.as_phrase() else {
        return false;
    };
    if repr
        .phrase_kind()
        .is_subkind_of(avail_core::PhraseKind::StatementPhrase)
    {
        return true;
    }
    repr.expression_type().equals(&types::top_type())
}

fn start_expression_walks(context: &Arc<CompilationContext>, state: &ParserState) {
    // Token-level solutions: literals and names in scope.
    let candidates = {
        let runtime = &context.runtime;
        next_significant_tokens(&state.lexing, &context.lexers, runtime)
    };
    if candidates.is_empty() {
        context.expectations.expect(
            state.position(),
            state.line(),
            "a token (no lexer accepted this input)",
        );
    }
    for candidate in &candidates {
        let Some(data) = candidate.token.as_token() else {
            continue;
        };
        match data.kind {
            TokenKind::Literal => {
                let solution = Solution {
                    after: state.with_lexing(candidate.after.clone()),
                    phrase: phrase::literal_phrase_from_token(candidate.token.clone()),
                };
                report_solution(context, state, solution);
            }
            TokenKind::Keyword => {
                if let Some(declaration) = state.lookup_declaration(&data.text) {
                    let solution = Solution {
                        after: state.with_lexing(candidate.after.clone()),
                        phrase: phrase::phrase_object(PhraseRepr::VariableUse {
                            declaration,
                            token: candidate.token.clone(),
                        }),
                    };
                    report_solution(context, state, solution);
                }
            }
            _ => {}
        }
    }
    // The send walk from the bundle tree root.
    let attempt = Attempt {
        node: Arc::clone(&context.tree.root),
        state: state.clone(),
        origin: state.clone(),
        stack: Vec::new(),
        marks: Vec::new(),
        tokens: Vec::new(),
        consumed: 0,
        leading: None,
    };
    schedule_attempt(context, attempt);
}

/// Record a solution and seed the leading-argument extension walk for it.
fn report_solution(context: &Arc<CompilationContext>, origin: &ParserState, solution: Solution) {
    debug!(
        target: "avail::parser",
        at = origin.position(),
        phrase = %solution.phrase,
        "solution"
    );
    if !context.cache.add_solution(origin, solution.clone()) {
        return;
    }
    let attempt = Attempt {
        node: Arc::clone(&context.tree.root),
        state: origin.clone(),
        origin: origin.clone(),
        stack: Vec::new(),
        marks: Vec::new(),
        tokens: Vec::new(),
        consumed: 0,
        leading: Some(solution),
    };
    schedule_attempt(context, attempt);
}

fn schedule_attempt(context: &Arc<CompilationContext>, attempt: Attempt) {
    let context2 = Arc::clone(context);
    context.barrier.schedule(&context.executor, move || {
        run_attempt(&context2, attempt);
    });
}

// ----------------------------------------------------------------------
// The instruction dispatch loop
// ----------------------------------------------------------------------

fn run_attempt(context: &Arc<CompilationContext>, attempt: Attempt) {
    {
        let runtime = context.runtime.read().expect("runtime lock poisoned");
        bundle_tree::expand(&attempt.node, &runtime);
    }
    let (complete, incomplete, incomplete_ci, actions) = {
        let node = attempt.node.read().expect("bundle tree lock poisoned");
        (
            node.complete.clone(),
            node.incomplete.clone(),
            node.incomplete_case_insensitive.clone(),
            node.actions.values().cloned().collect::<Vec<_>>(),
        )
    };

    // 1. Completions: a send is finished here.
    if attempt.leading.is_none() && attempt.consumed > 0 {
        for bundle in &complete {
            let context2 = Arc::clone(context);
            let attempt2 = attempt.clone();
            let bundle = *bundle;
            context.barrier.schedule(&context.executor, move || {
                complete_send(&context2, &attempt2, bundle);
            });
        }
    }

    // 2. Keyword steps. Suppressed while a leading argument is pending:
    // a bundle that starts with a keyword is reachable by the ordinary
    // walk instead.
    if attempt.leading.is_none() && !(incomplete.is_empty() && incomplete_ci.is_empty()) {
        let candidates = next_significant_tokens(&attempt.state.lexing, &context.lexers, &context.runtime);
        let mut matched = false;
        for candidate in &candidates {
            let Some(data) = candidate.token.as_token() else {
                continue;
            };
            if !matches!(data.kind, TokenKind::Keyword | TokenKind::Operator) {
                continue;
            }
            let mut successors: Vec<NodeRef> = Vec::new();
            if let Some(successor) = incomplete.get(&data.text) {
                successors.push(Arc::clone(successor));
            }
            if let Some(successor) = incomplete_ci.get(&data.text.to_lowercase()) {
                successors.push(Arc::clone(successor));
            }
            for successor in successors {
                matched = true;
                let mut next = attempt.clone();
                next.node = successor;
                next.state = attempt.state.with_lexing(candidate.after.clone());
                next.tokens.push(candidate.token.clone());
                next.consumed += 1;
                schedule_attempt(context, next);
            }
        }
        if !matched && complete.is_empty() && actions.is_empty() {
            let mut expected: Vec<String> = incomplete.keys().cloned().collect();
            expected.extend(incomplete_ci.keys().cloned());
            expected.sort();
            context.expectations.expect(
                attempt.state.position(),
                attempt.state.line(),
                format!("the keyword `{}`", expected.join("` or `")),
            );
        }
    }

    // 3. Actions.
    for (operation, successors) in actions {
        let context2 = Arc::clone(context);
        let attempt2 = attempt.clone();
        context.barrier.schedule(&context.executor, move || {
            perform_action(&context2, attempt2, operation, &successors);
        });
    }
}

fn descend(context: &Arc<CompilationContext>, attempt: &Attempt, successor: &NodeRef) {
    let mut next = attempt.clone();
    next.node = Arc::clone(successor);
    schedule_attempt(context, next);
}

fn perform_action(
    context: &Arc<CompilationContext>,
    mut attempt: Attempt,
    operation: ParsingOperation,
    successors: &[NodeRef],
) {
    match operation {
        ParsingOperation::ParsePart { .. }
        | ParsingOperation::ParsePartCaseInsensitively { .. } => {
            // Keyword steps live in the incomplete maps, never in actions.
        }
        ParsingOperation::ParseArgument
        | ParsingOperation::ParseTopValuedArgument
        | ParsingOperation::ParseVariableReference
        | ParsingOperation::ParseArgumentInModuleScope => {
            let admit = admission_rule(operation);
            if let Some(leading) = attempt.leading.take() {
                match admit(leading.phrase.clone()) {
                    Ok(phrase) => {
                        attempt.stack.push(phrase);
                        attempt.state = leading.after;
                        descend(context, &attempt, &successors[0]);
                    }
                    Err(_) => {
                        // The offered leading phrase is not acceptable in
                        // this position; quiet prune.
                    }
                }
                return;
            }
            if attempt.consumed == 0 {
                // A send never begins by parsing its own argument; those
                // walks are seeded from existing solutions as leading
                // arguments, which is also what prevents a duplicate of
                // every leading-argument send.
                return;
            }
            request_argument(context, &attempt, successors, admit);
        }
        ParsingOperation::ParseAnyRawToken
        | ParsingOperation::ParseRawKeywordToken
        | ParsingOperation::ParseRawStringLiteralToken
        | ParsingOperation::ParseRawWholeNumberLiteralToken => {
            if attempt.leading.is_some() {
                return;
            }
            consume_raw_token(context, attempt, operation, successors);
        }
        ParsingOperation::EmptyList => {
            attempt.stack.push(phrase::list_phrase(Vec::new()));
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::AppendArgument => {
            let Some(value) = attempt.stack.pop() else {
                return;
            };
            let Some(list) = attempt.stack.pop() else {
                return;
            };
            let mut elements = phrase::list_phrase_expressions(&list);
            elements.push(value);
            attempt.stack.push(phrase::list_phrase(elements));
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::Prepend => {
            let Some(value) = attempt.stack.pop() else {
                return;
            };
            let Some(list) = attempt.stack.pop() else {
                return;
            };
            let mut elements = phrase::list_phrase_expressions(&list);
            elements.insert(0, value);
            attempt.stack.push(phrase::list_phrase(elements));
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::SaveParsePosition => {
            attempt.marks.push(attempt.state.position());
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::DiscardSavedParsePosition => {
            attempt.marks.pop();
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::EnsureParseProgress => {
            match attempt.marks.last_mut() {
                Some(mark) if *mark == attempt.state.position() => {
                    // A zero-width iteration: kill this path quietly.
                }
                Some(mark) => {
                    *mark = attempt.state.position();
                    descend(context, &attempt, &successors[0]);
                }
                None => {}
            }
        }
        ParsingOperation::Branch { .. } => {
            descend(context, &attempt, &successors[0]);
            descend(context, &attempt, &successors[1]);
        }
        ParsingOperation::Jump { .. } => {
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::CheckArgument { bundle, argument } => {
            let Some(top) = attempt.stack.last() else {
                return;
            };
            if let Some(argument_bundle) = root_bundle_of(top) {
                let forbidden = {
                    let runtime = context.runtime.read().expect("runtime lock poisoned");
                    runtime.bundle(bundle).forbids(argument, argument_bundle)
                };
                if forbidden {
                    let message = {
                        let runtime = context.runtime.read().expect("runtime lock poisoned");
                        format!(
                            "an argument other than `{}` in position {} of `{}` (grammatical restriction)",
                            runtime.bundle(argument_bundle).message,
                            argument,
                            runtime.bundle(bundle).message,
                        )
                    };
                    context.expectations.expect(
                        attempt.state.position(),
                        attempt.state.line(),
                        message,
                    );
                    return;
                }
            }
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::TypeCheckArgument { bundle, argument } => {
            let Some(top) = attempt.stack.last() else {
                return;
            };
            if type_check_argument(context, bundle, argument, top) {
                descend(context, &attempt, &successors[0]);
            } else {
                let message = {
                    let runtime = context.runtime.read().expect("runtime lock poisoned");
                    format!(
                        "argument {} of `{}` to have a suitable type (found {})",
                        argument,
                        runtime.bundle(bundle).message,
                        phrase::phrase_expression_type(top),
                    )
                };
                context
                    .expectations
                    .expect(attempt.state.position(), attempt.state.line(), message);
            }
        }
        ParsingOperation::Convert { rule } => match rule {
            ConversionRule::ListToSize => {
                let Some(list) = attempt.stack.pop() else {
                    return;
                };
                let size = phrase::list_phrase_expressions(&list).len();
                let value = AvailObject::from_i64(size as i64);
                attempt
                    .stack
                    .push(phrase::literal_phrase(value, size.to_string()));
                descend(context, &attempt, &successors[0]);
            }
            ConversionRule::EvaluateExpression => {
                let Some(expression) = attempt.stack.pop() else {
                    return;
                };
                match codegen::evaluate_phrase(
                    &context.runtime,
                    Some(Arc::clone(&context.executor)),
                    &expression,
                    &context.module_bindings,
                ) {
                    Ok(value) => {
                        let text = value.to_string();
                        attempt.stack.push(phrase::literal_phrase(value, text));
                        descend(context, &attempt, &successors[0]);
                    }
                    Err(reason) => {
                        context.expectations.expect(
                            attempt.state.position(),
                            attempt.state.line(),
                            format!("a compile-time-evaluable expression ({reason})"),
                        );
                    }
                }
            }
        },
        ParsingOperation::PrepareToRunPrefixFunction => {
            let snapshot = phrase::list_phrase(attempt.stack.clone());
            attempt.stack.push(snapshot);
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::RunPrefixFunction { bundle, index } => {
            let Some(snapshot) = attempt.stack.pop() else {
                return;
            };
            run_prefix_function(context, attempt, bundle, index, snapshot, successors);
        }
        ParsingOperation::PermuteList { permutation } => {
            let Some(list) = attempt.stack.pop() else {
                return;
            };
            // The splitter registers permutations on the owning bundle; a
            // plan carrying this instruction with no registered
            // permutation is not viable.
            let order = {
                let runtime = context.runtime.read().expect("runtime lock poisoned");
                (0..runtime.bundle_count())
                    .map(|i| runtime.bundle(BundleId(i as u32)))
                    .find_map(|b| b.permutations.get(permutation - 1).cloned())
            };
            let Some(order) = order else {
                return;
            };
            attempt.stack.push(phrase::phrase_object(PhraseRepr::PermutedList {
                list,
                permutation: order,
            }));
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::ReverseStack { depth } => {
            let len = attempt.stack.len();
            if depth > len {
                return;
            }
            attempt.stack[len - depth..].reverse();
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::WrapInList { count } => {
            let len = attempt.stack.len();
            if count > len {
                return;
            }
            let elements = attempt.stack.split_off(len - count);
            attempt.stack.push(phrase::list_phrase(elements));
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::Concatenate => {
            let Some(right) = attempt.stack.pop() else {
                return;
            };
            let Some(left) = attempt.stack.pop() else {
                return;
            };
            let mut elements = phrase::list_phrase_expressions(&left);
            elements.extend(phrase::list_phrase_expressions(&right));
            attempt.stack.push(phrase::list_phrase(elements));
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::PushLiteral { constant } => {
            let value = atom::boolean(constant != 0);
            let text = value.to_string();
            attempt.stack.push(phrase::literal_phrase(value, text));
            descend(context, &attempt, &successors[0]);
        }
        ParsingOperation::CheckAtLeast { limit } => {
            let Some(top) = attempt.stack.last() else {
                return;
            };
            if phrase::list_phrase_expressions(top).len() >= limit {
                descend(context, &attempt, &successors[0]);
            }
        }
        ParsingOperation::CheckAtMost { limit } => {
            let Some(top) = attempt.stack.last() else {
                return;
            };
            if phrase::list_phrase_expressions(top).len() <= limit {
                descend(context, &attempt, &successors[0]);
            }
        }
    }
}

/// The bundle at the root of a send (seeing through macro substitution).
fn root_bundle_of(phrase_object: &AvailObject) -> Option<BundleId> {
    match phrase_object.as_phrase().as_deref() {
        Some(PhraseRepr::Send { bundle, .. }) => Some(*bundle),
        Some(PhraseRepr::MacroSubstitution { original, .. }) => root_bundle_of(original),
        _ => None,
    }
}

/// The filter/transform an argument-parsing instruction applies to each
/// candidate subexpression.
fn admission_rule(
    operation: ParsingOperation,
) -> impl Fn(AvailObject) -> Result<AvailObject, String> + Send + Sync + Clone + 'static {
    move |phrase: AvailObject| match operation {
        ParsingOperation::ParseArgument => {
            if phrase::phrase_expression_type(&phrase).equals(&types::top_type()) {
                Err("an expression that yields a value".to_string())
            } else {
                Ok(phrase)
            }
        }
        ParsingOperation::ParseTopValuedArgument => Ok(phrase),
        ParsingOperation::ParseVariableReference => match phrase.as_phrase().as_deref() {
            Some(PhraseRepr::VariableUse { .. }) => {
                Ok(phrase::phrase_object(PhraseRepr::Reference {
                    variable_use: phrase.clone(),
                }))
            }
            _ => Err("a variable name (for a ↑reference)".to_string()),
        },
        ParsingOperation::ParseArgumentInModuleScope => {
            if uses_local_declarations(&phrase) {
                Err("an expression mentioning no local names".to_string())
            } else {
                Ok(phrase)
            }
        }
        _ => Ok(phrase),
    }
}

fn uses_local_declarations(phrase_object: &AvailObject) -> bool {
    let Some(repr) = phrase_object.as_phrase() else {
        return false;
    };
    if let PhraseRepr::VariableUse { declaration, .. } = &*repr {
        if let Some(decl) = declaration.as_phrase() {
            if let PhraseRepr::Declaration { kind, .. } = &*decl {
                if !kind.is_module_scoped() {
                    return true;
                }
            }
        }
    }
    repr.children().iter().any(uses_local_declarations)
}

/// Request a subexpression at the attempt's position; each solution is
/// filtered/transformed by `admit` and continues the walk.
fn request_argument(
    context: &Arc<CompilationContext>,
    attempt: &Attempt,
    successors: &[NodeRef],
    admit: impl Fn(AvailObject) -> Result<AvailObject, String> + Send + Sync + 'static,
) {
    let successor = Arc::clone(&successors[0]);
    let context2 = Arc::clone(context);
    let attempt2 = attempt.clone();
    let request_state = attempt.state.clone();
    parse_expression(
        context,
        &request_state,
        Arc::new(move |solution: Solution| {
            match admit(solution.phrase.clone()) {
                Ok(phrase) => {
                    let mut next = attempt2.clone();
                    next.stack.push(phrase);
                    // Keep our own client data; the subexpression's scope
                    // effects do not leak outward.
                    next.state = attempt2
                        .state
                        .with_lexing(solution.after.lexing.clone());
                    next.node = Arc::clone(&successor);
                    schedule_attempt(&context2, next);
                }
                Err(expectation) => {
                    context2.expectations.expect(
                        solution.after.position(),
                        solution.after.line(),
                        expectation,
                    );
                }
            }
        }),
    );
}

fn consume_raw_token(
    context: &Arc<CompilationContext>,
    attempt: Attempt,
    operation: ParsingOperation,
    successors: &[NodeRef],
) {
    let candidates =
        next_significant_tokens(&attempt.state.lexing, &context.lexers, &context.runtime);
    for candidate in candidates {
        let Some(data) = candidate.token.as_token() else {
            continue;
        };
        let acceptable = match operation {
            ParsingOperation::ParseAnyRawToken => data.kind != TokenKind::EndOfFile,
            ParsingOperation::ParseRawKeywordToken => data.kind == TokenKind::Keyword,
            ParsingOperation::ParseRawStringLiteralToken => {
                data.kind == TokenKind::Literal
                    && data
                        .literal
                        .as_ref()
                        .map(|v| v.is_string())
                        .unwrap_or(false)
            }
            ParsingOperation::ParseRawWholeNumberLiteralToken => {
                data.kind == TokenKind::Literal
                    && data
                        .literal
                        .as_ref()
                        .and_then(|v| v.as_integer())
                        .is_some()
            }
            _ => false,
        };
        if !acceptable {
            continue;
        }
        // The literal phrase's value is the token object itself, so
        // macro bodies receive the raw token.
        let literal_token = avail_core::token::TokenData::literal(
            data.text.clone(),
            data.start,
            data.line,
            candidate.token.clone(),
        );
        let mut next = attempt.clone();
        next.stack.push(phrase::literal_phrase_from_token(
            avail_core::token::token_object(literal_token),
        ));
        next.state = attempt.state.with_lexing(candidate.after.clone());
        next.tokens.push(candidate.token.clone());
        next.consumed += 1;
        descend(context, &next, &successors[0]);
    }
}

// ----------------------------------------------------------------------
// Prefix functions
// ----------------------------------------------------------------------

fn run_prefix_function(
    context: &Arc<CompilationContext>,
    attempt: Attempt,
    bundle: BundleId,
    index: usize,
    snapshot: AvailObject,
    successors: &[NodeRef],
) {
    let prefix_function = {
        let runtime = context.runtime.read().expect("runtime lock poisoned");
        let method = runtime.method(runtime.bundle(bundle).method);
        let result = method.macro_definitions().find_map(|definition| {
            match &definition.body {
                DefinitionBody::Macro {
                    prefix_functions, ..
                } if prefix_functions.len() >= index => {
                    Some(prefix_functions[index - 1].clone())
                }
                _ => None,
            }
        });
        result
    };
    let Some(prefix_function) = prefix_function else {
        context.expectations.expect(
            attempt.state.position(),
            attempt.state.line(),
            "a macro with enough prefix functions for its section checkpoints",
        );
        return;
    };
    let fiber = Fiber::new_fiber(types::top_type(), 50);
    fiber.set_global(
        client_data_key(),
        map_object(attempt.state.client_data.clone()),
    );
    let outcome = fiber.run_now(&context.runtime, None, &prefix_function, vec![snapshot]);
    match outcome {
        EvalOutcome::Returned(_) | EvalOutcome::Accepted => {
            let client_data = fiber
                .global(&client_data_key())
                .and_then(|m| m.as_map())
                .unwrap_or_else(|| attempt.state.client_data.clone());
            let mut next = attempt.clone();
            next.state = attempt.state.with_client_data(client_data);
            next.node = Arc::clone(&successors[0]);
            schedule_attempt(context, next);
        }
        EvalOutcome::Rejected(reason) => {
            context
                .expectations
                .expect(attempt.state.position(), attempt.state.line(), reason);
        }
        EvalOutcome::Failed(code) => {
            context.expectations.expect(
                attempt.state.position(),
                attempt.state.line(),
                format!("prefix function to succeed (failed: {code})"),
            );
        }
        fatal => {
            context.expectations.expect(
                attempt.state.position(),
                attempt.state.line(),
                format!("prefix function not to end fatally ({fatal:?})"),
            );
        }
    }
}

// ----------------------------------------------------------------------
// Type filtering
// ----------------------------------------------------------------------

/// Would any definition of the bundle's method accept this phrase in the
/// given argument position?
fn type_check_argument(
    context: &Arc<CompilationContext>,
    bundle: BundleId,
    argument: usize,
    phrase_object: &AvailObject,
) -> bool {
    let runtime = context.runtime.read().expect("runtime lock poisoned");
    let bundle_data = runtime.bundle(bundle);
    let method = runtime.method(bundle_data.method);
    if method.definitions.is_empty() {
        // Nothing installed yet (a forward-parsed bundle): let the send
        // completion report the absence.
        return true;
    }
    let value_type = phrase::phrase_expression_type(phrase_object);
    let phrase_kind = phrase_object.kind();
    method.definitions.iter().any(|definition| {
        let parameters = definition.argument_types();
        if parameters.len() != bundle_data.num_args || argument > parameters.len() {
            return false;
        }
        let parameter = &parameters[argument - 1];
        if matches!(
            parameter.as_type().as_deref(),
            Some(avail_core::TypeRepr::Phrase { .. })
        ) {
            // Macro parameter: dispatch on the phrase itself.
            types::is_subtype_of(&phrase_kind, parameter)
        } else {
            !types::type_intersection(&value_type, parameter).equals(&types::bottom_type())
        }
    })
}

// ----------------------------------------------------------------------
// Send completion
// ----------------------------------------------------------------------

fn complete_send(context: &Arc<CompilationContext>, attempt: &Attempt, bundle: BundleId) {
    let Some(arguments_list) = attempt.stack.last().cloned() else {
        return;
    };
    let argument_phrases = phrase::list_phrase_expressions(&arguments_list);
    let (message, method_id, num_args) = {
        let runtime = context.runtime.read().expect("runtime lock poisoned");
        let data = runtime.bundle(bundle);
        (data.message.clone(), data.method, data.num_args)
    };
    if argument_phrases.len() != num_args {
        return;
    }
    debug!(
        target: "avail::parser",
        message = %message,
        args = argument_phrases.len(),
        "completing send"
    );

    // Macro lookup dispatches on the argument phrases' own kinds.
    let macro_definition = {
        let runtime = context.runtime.read().expect("runtime lock poisoned");
        let method = runtime.method(method_id);
        if method.macro_definitions().next().is_some() {
            let phrase_kinds: Vec<AvailObject> =
                argument_phrases.iter().map(|p| p.kind()).collect();
            match method.lookup_macro_by_phrase_types(&phrase_kinds) {
                Ok(definition) => match &definition.body {
                    DefinitionBody::Macro { body, .. } => Some(Ok(body.clone())),
                    _ => None,
                },
                Err(code) => Some(Err(code)),
            }
        } else {
            None
        }
    };

    match macro_definition {
        Some(Ok(body)) => {
            complete_macro_send(context, attempt, bundle, message, arguments_list, body)
        }
        Some(Err(code)) => {
            context.expectations.expect(
                attempt.state.position(),
                attempt.state.line(),
                format!("a unique applicable macro for `{message}` ({code})"),
            );
        }
        None => complete_method_send(
            context,
            attempt,
            bundle,
            message,
            arguments_list,
            argument_phrases,
        ),
    }
}

fn complete_macro_send(
    context: &Arc<CompilationContext>,
    attempt: &Attempt,
    bundle: BundleId,
    message: String,
    arguments_list: AvailObject,
    body: AvailObject,
) {
    let argument_phrases = phrase::list_phrase_expressions(&arguments_list);
    let fiber = Fiber::new_fiber(types::top_type(), 50);
    fiber.set_global(
        client_data_key(),
        map_object(attempt.state.client_data.clone()),
    );
    let outcome = fiber.run_now(&context.runtime, None, &body, argument_phrases);
    match outcome {
        EvalOutcome::Returned(replacement) => {
            if replacement.as_phrase().is_none() {
                context.expectations.expect(
                    attempt.state.position(),
                    attempt.state.line(),
                    format!("macro `{message}` to answer a phrase"),
                );
                return;
            }
            let original = phrase::phrase_object(PhraseRepr::Send {
                bundle,
                message,
                arguments: arguments_list,
                return_type: types::top_type(),
                tokens: attempt.tokens.clone(),
            });
            let substitution = phrase::phrase_object(PhraseRepr::MacroSubstitution {
                original,
                replacement,
            });
            let solution = Solution {
                after: attempt.state.clone(),
                phrase: substitution,
            };
            report_solution(context, &attempt.origin, solution);
        }
        EvalOutcome::Rejected(reason) => {
            context
                .expectations
                .expect(attempt.state.position(), attempt.state.line(), reason);
        }
        EvalOutcome::Accepted => {
            // Force-accepted with no replacement: keep the send as-is.
            let send = phrase::phrase_object(PhraseRepr::Send {
                bundle,
                message,
                arguments: arguments_list,
                return_type: types::top_type(),
                tokens: attempt.tokens.clone(),
            });
            let solution = Solution {
                after: attempt.state.clone(),
                phrase: send,
            };
            report_solution(context, &attempt.origin, solution);
        }
        EvalOutcome::Failed(code) => {
            context.expectations.expect(
                attempt.state.position(),
                attempt.state.line(),
                format!("macro `{message}` to succeed (failed: {code})"),
            );
        }
        fatal => {
            context.expectations.expect(
                attempt.state.position(),
                attempt.state.line(),
                format!("macro `{message}` not to end fatally ({fatal:?})"),
            );
        }
    }
}

fn complete_method_send(
    context: &Arc<CompilationContext>,
    attempt: &Attempt,
    bundle: BundleId,
    message: String,
    arguments_list: AvailObject,
    argument_phrases: Vec<AvailObject>,
) {
    let argument_types: Vec<AvailObject> = argument_phrases
        .iter()
        .map(phrase::phrase_expression_type)
        .collect();
    let (candidates, restrictions) = {
        let runtime = context.runtime.read().expect("runtime lock poisoned");
        let method = runtime.method(runtime.bundle(bundle).method);
        (
            method.return_types_for_argument_types(&argument_types),
            method
                .semantic_restrictions
                .iter()
                .map(|r| r.body.clone())
                .collect::<Vec<_>>(),
        )
    };
    if candidates.is_empty() {
        context.expectations.expect(
            attempt.state.position(),
            attempt.state.line(),
            format!("an applicable definition of `{message}`"),
        );
        return;
    }
    let mut return_type = candidates
        .into_iter()
        .fold(types::top_type(), |acc, t| types::type_intersection(&acc, &t));

    // Semantic restrictions run against the argument types; their answers
    // intersect into the return type (an associative, commutative
    // combination, so evaluation order is irrelevant), and any rejection
    // kills the path.
    let mut rejections: Vec<String> = Vec::new();
    for restriction in restrictions {
        match restriction {
            avail_runtime::method::RestrictionBody::Native(body) => {
                match body(&argument_types) {
                    avail_runtime::method::RestrictionResult::ReturnType(answer) => {
                        if answer.is_type() {
                            return_type = types::type_intersection(&return_type, &answer);
                        }
                    }
                    avail_runtime::method::RestrictionResult::Rejected(reason) => {
                        rejections.push(reason)
                    }
                }
            }
            avail_runtime::method::RestrictionBody::Function(function) => {
                let fiber = Fiber::new_fiber(types::top_type(), 50);
                match fiber.run_now(&context.runtime, None, &function, argument_types.clone()) {
                    EvalOutcome::Returned(answer) => {
                        if answer.is_type() {
                            return_type = types::type_intersection(&return_type, &answer);
                        }
                    }
                    EvalOutcome::Rejected(reason) => rejections.push(reason),
                    EvalOutcome::Accepted => {}
                    EvalOutcome::Failed(code) => {
                        rejections.push(format!("semantic restriction failed: {code}"));
                    }
                    fatal => {
                        rejections.push(format!("semantic restriction ended fatally: {fatal:?}"))
                    }
                }
            }
        }
    }
    if !rejections.is_empty() {
        context.expectations.expect(
            attempt.state.position(),
            attempt.state.line(),
            rejections.join("; also, "),
        );
        return;
    }

    let send = phrase::phrase_object(PhraseRepr::Send {
        bundle,
        message,
        arguments: arguments_list,
        return_type,
        tokens: attempt.tokens.clone(),
    });
    let solution = Solution {
        after: attempt.state.clone(),
        phrase: send,
    };
    report_solution(context, &attempt.origin, solution);
}

// ----------------------------------------------------------------------
// Ambiguity reporting
// ----------------------------------------------------------------------

/// For two surviving top-level parses, find the most specific pair of
/// disagreeing sub-phrases and describe them.
pub fn describe_ambiguity(a: &AvailObject, b: &AvailObject) -> String {
    let (left, right) = deepest_disagreement(a, b);
    format!(
        "ambiguous statement: could be {} or {}",
        left, right
    )
}

fn deepest_disagreement(a: &AvailObject, b: &AvailObject) -> (AvailObject, AvailObject) {
    let (Some(ra), Some(rb)) = (a.as_phrase(), b.as_phrase()) else {
        return (a.clone(), b.clone());
    };
    if ra.phrase_kind() != rb.phrase_kind() {
        return (a.clone(), b.clone());
    }
    if let (
        PhraseRepr::Send {
            bundle: bundle_a, ..
        },
        PhraseRepr::Send {
            bundle: bundle_b, ..
        },
    ) = (&*ra, &*rb)
    {
        if bundle_a != bundle_b {
            return (a.clone(), b.clone());
        }
    }
    let children_a = ra.children();
    let children_b = rb.children();
    if children_a.len() == children_b.len() {
        let disagreements: Vec<(AvailObject, AvailObject)> = children_a
            .iter()
            .zip(&children_b)
            .filter(|(x, y)| !x.equals(y))
            .map(|(x, y)| (x.clone(), y.clone()))
            .collect();
        if disagreements.len() == 1 {
            return deepest_disagreement(&disagreements[0].0, &disagreements[0].1);
        }
    }
    (a.clone(), b.clone())
}
