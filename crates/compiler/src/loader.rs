//! The module loader and top-level evaluator
//!
//! A module loads transactionally: every effect on the runtime (a
//! definition, a restriction, a coined or imported name, a module-scope
//! binding) is journaled, and any failure rolls the journal back in
//! reverse order before reporting. On success the module is committed
//! into the runtime.
//!
//! Statements run one at a time. Each is parsed under its own completion
//! barrier and must be unambiguous: zero solutions compile the recorded
//! expectations into a diagnostic, two or more report the most specific
//! disagreeing sub-phrases. Top-level declarations are hoisted to module
//! scope and remapped so later statements see module bindings.

use crate::bundle_tree::BundleTree;
use crate::codegen::{self, Binding};
use crate::header::{self, ImportSpec, ModuleHeader, NameFilter};
use crate::lexer::{
    bootstrap_lexers, native_lexer, next_significant_tokens, LexerDef, LexingState,
};
use crate::parser::{
    self, describe_ambiguity, CompilationContext, FragmentCache, ParserState, Solution,
};
use crate::pragma::{parse_pragma, Pragma};
use crate::problems::ExpectationSet;
use crate::splitter;
use avail_core::function::{function_object, L1Instruction, RawFunction};
use avail_core::object::AvailObject;
use avail_core::phrase::{self, DeclarationKind, PhraseRepr};
use avail_core::token::TokenKind;
use avail_core::types;
use avail_core::{BundleId, MethodId, ModuleId, PhraseKind};
use avail_runtime::executor::{Executor, WorkUnitBarrier};
use avail_runtime::method::{Definition, DefinitionBody, GrammaticalRestriction};
use avail_runtime::runtime::Runtime;
use avail_runtime::primitives;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Knobs for one compilation, threaded explicitly (no process globals).
pub struct CompilerConfig {
    /// Worker coroutines in the parse executor.
    pub workers: usize,
    /// Cooperative cancellation oracle, polled at work-unit start.
    pub abort_oracle: Option<Arc<dyn Fn() -> bool + Send + Sync>>,
}

impl Default for CompilerConfig {
    fn default() -> CompilerConfig {
        CompilerConfig {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            abort_oracle: None,
        }
    }
}

/// One reversible runtime effect.
enum LoaderEffect {
    DefinitionAdded { method: MethodId, index: usize },
    SemanticRestrictionAdded { method: MethodId, index: usize },
    GrammaticalRestrictionAdded {
        bundle: BundleId,
        restriction: GrammaticalRestriction,
    },
    NameImported { name: String, atom: AvailObject },
    PrivateNameCoined { name: String },
    VariableBound { name: String },
    ConstantBound { name: String },
    ForwardRecorded {
        method: MethodId,
        signature: AvailObject,
    },
}

pub struct ModuleLoader {
    pub runtime: Arc<RwLock<Runtime>>,
    executor: Arc<Executor>,
    config: CompilerConfig,
    pub module: ModuleId,
    journal: Vec<LoaderEffect>,
    lexers: Vec<LexerDef>,
    module_bindings: HashMap<String, Binding>,
    /// Module-scope declaration phrases visible to later statements.
    scope_declarations: Vec<AvailObject>,
}

/// Load a whole module from source, committing on success and rolling
/// back on any failure.
pub fn load_module(
    runtime: &Arc<RwLock<Runtime>>,
    source: &str,
    config: CompilerConfig,
) -> Result<ModuleId, String> {
    let header = header::parse_header(source)?;
    let mut loader = ModuleLoader::new(runtime, &header.name, config)?;
    match loader.load(source, &header) {
        Ok(()) => {
            loader.commit();
            Ok(loader.module)
        }
        Err(message) => {
            loader.rollback();
            Err(message)
        }
    }
}

impl ModuleLoader {
    pub fn new(
        runtime: &Arc<RwLock<Runtime>>,
        name: &str,
        config: CompilerConfig,
    ) -> Result<ModuleLoader, String> {
        let module = {
            let mut guard = runtime.write().expect("runtime lock poisoned");
            if guard.find_module(name).map(|m| m.loaded).unwrap_or(false) {
                return Err(format!("module \"{name}\" is already loaded"));
            }
            guard.new_module(name)
        };
        Ok(ModuleLoader {
            runtime: Arc::clone(runtime),
            executor: Executor::new(config.workers),
            config,
            module,
            journal: Vec::new(),
            lexers: bootstrap_lexers(),
            module_bindings: HashMap::new(),
            scope_declarations: Vec::new(),
        })
    }

    fn load(&mut self, source: &str, header: &ModuleHeader) -> Result<(), String> {
        info!(target: "avail::loader", module = %header.name, "loading module");
        {
            let mut runtime = self.runtime.write().expect("runtime lock poisoned");
            runtime.module_mut(self.module).versions = header.versions.clone();
            runtime.module_mut(self.module).entry_points = header.entries.clone();
        }
        for import in &header.extends {
            self.process_import(import, true)?;
        }
        for import in &header.uses {
            self.process_import(import, false)?;
        }
        for name in &header.names {
            self.coin_name(name)?;
        }
        for pragma_text in &header.pragmas {
            let pragma = parse_pragma(pragma_text)?;
            self.install_pragma(&pragma)?;
        }
        self.run_statements(source, header.body_position, header.body_line)?;
        self.check_end_of_module()
    }

    // ------------------------------------------------------------------
    // Imports and names
    // ------------------------------------------------------------------

    fn process_import(&mut self, import: &ImportSpec, re_export: bool) -> Result<(), String> {
        let mut runtime = self.runtime.write().expect("runtime lock poisoned");
        let Some(imported) = runtime.find_module(&import.module_name) else {
            return Err(format!(
                "import of unknown module \"{}\"",
                import.module_name
            ));
        };
        if !imported.loaded {
            return Err(format!(
                "import of unfinished module \"{}\"",
                import.module_name
            ));
        }
        if !import.versions.is_empty()
            && !imported.versions.iter().any(|v| import.versions.contains(v))
        {
            return Err(format!(
                "module \"{}\" offers none of the requested versions",
                import.module_name
            ));
        }
        let exported: Vec<(String, AvailObject)> = imported
            .exported_names
            .iter()
            .map(|(n, a)| (n.clone(), a.clone()))
            .collect();
        drop(runtime);

        let filters = if import.filters.is_empty() {
            vec![NameFilter::Wildcard]
        } else {
            import.filters.clone()
        };
        let mentioned: Vec<&str> = filters
            .iter()
            .filter_map(|f| match f {
                NameFilter::Keep(n) | NameFilter::Exclude(n) => Some(n.as_str()),
                NameFilter::Rename { from, .. } => Some(from.as_str()),
                NameFilter::Wildcard => None,
            })
            .collect();
        for filter in &filters {
            match filter {
                NameFilter::Keep(name) => {
                    let atom = lookup_export(&exported, name, &import.module_name)?;
                    self.import_binding(name.clone(), atom, re_export);
                }
                NameFilter::Rename { from, to } => {
                    let atom = lookup_export(&exported, from, &import.module_name)?;
                    self.import_binding(to.clone(), atom, re_export);
                }
                NameFilter::Exclude(_) => {}
                NameFilter::Wildcard => {
                    for (name, atom) in &exported {
                        if !mentioned.contains(&name.as_str()) {
                            self.import_binding(name.clone(), atom.clone(), re_export);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn import_binding(&mut self, name: String, atom: AvailObject, re_export: bool) {
        let mut runtime = self.runtime.write().expect("runtime lock poisoned");
        let bundle = runtime.bundle_id_for_atom(&atom);
        let module = runtime.module_mut(self.module);
        module.import_name(name.clone(), atom.clone());
        if re_export {
            module.exported_names.insert(name.clone(), atom.clone());
        }
        if let Some(bundle) = bundle {
            if !module.visible_bundles.contains(&bundle) {
                module.visible_bundles.push(bundle);
            }
        }
        drop(runtime);
        self.journal.push(LoaderEffect::NameImported { name, atom });
    }

    fn coin_name(&mut self, name: &str) -> Result<(), String> {
        let atom = avail_core::atom::create_atom(name);
        let mut runtime = self.runtime.write().expect("runtime lock poisoned");
        let module = runtime.module_mut(self.module);
        if module.private_names.contains_key(name) {
            return Err(format!("name \"{name}\" coined twice"));
        }
        module.private_names.insert(name.to_string(), atom.clone());
        module.exported_names.insert(name.to_string(), atom);
        drop(runtime);
        self.journal.push(LoaderEffect::PrivateNameCoined {
            name: name.to_string(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pragmas
    // ------------------------------------------------------------------

    pub fn install_pragma(&mut self, pragma: &Pragma) -> Result<(), String> {
        match pragma {
            Pragma::CheckVersion(versions) => {
                let runtime = self.runtime.read().expect("runtime lock poisoned");
                if runtime.active_versions.iter().any(|v| versions.contains(v)) {
                    Ok(())
                } else {
                    Err(format!(
                        "runtime versions {:?} satisfy none of {:?}",
                        runtime.active_versions, versions
                    ))
                }
            }
            Pragma::Method { primitive, name } => {
                if !primitives::exists(primitive) {
                    return Err(format!("method pragma names unknown primitive `{primitive}`"));
                }
                let signature = primitives::bootstrap_signature(primitive)
                    .ok_or_else(|| format!("primitive `{primitive}` has no bootstrap signature"))?;
                let bundle = self.bundle_for_new_name(name)?;
                let function = primitive_function(primitive, &signature);
                let method = {
                    let runtime = self.runtime.read().expect("runtime lock poisoned");
                    runtime.bundle(bundle).method
                };
                self.add_definition_journaled(
                    method,
                    Definition {
                        signature,
                        body: DefinitionBody::Method(function),
                        module: Some(self.module),
                    },
                );
                Ok(())
            }
            Pragma::Macro {
                prefix_primitives,
                body_primitive,
                name,
            } => {
                for primitive in prefix_primitives.iter().chain([body_primitive]) {
                    if !primitives::exists(primitive) {
                        return Err(format!(
                            "macro pragma names unknown primitive `{primitive}`"
                        ));
                    }
                }
                let bundle = self.bundle_for_new_name(name)?;
                let (method, num_args) = {
                    let runtime = self.runtime.read().expect("runtime lock poisoned");
                    let data = runtime.bundle(bundle);
                    (data.method, data.num_args)
                };
                let signature = primitives::bootstrap_signature(body_primitive)
                    .unwrap_or_else(|| generic_macro_signature(num_args));
                let body = primitive_function(body_primitive, &signature);
                let prefix_functions: Vec<AvailObject> = prefix_primitives
                    .iter()
                    .map(|p| {
                        let prefix_signature = types::function_type(
                            vec![types::phrase_type(
                                PhraseKind::ListPhrase,
                                types::top_type(),
                            )],
                            types::top_type(),
                        );
                        primitive_function(p, &prefix_signature)
                    })
                    .collect();
                self.add_definition_journaled(
                    method,
                    Definition {
                        signature,
                        body: DefinitionBody::Macro {
                            body,
                            prefix_functions,
                        },
                        module: Some(self.module),
                    },
                );
                Ok(())
            }
            Pragma::Stringify(name) => {
                let bundle = self.bundle_for_new_name(name)?;
                let mut runtime = self.runtime.write().expect("runtime lock poisoned");
                runtime.stringifier = Some(bundle);
                Ok(())
            }
            Pragma::Lexer {
                filter_primitive,
                body_primitive,
                name,
            } => match native_lexer(filter_primitive, body_primitive) {
                Some(mut lexer) => {
                    lexer.name = name.clone();
                    self.lexers.push(lexer);
                    Ok(())
                }
                None => Err(format!(
                    "lexer pragma names unknown native pair `{filter_primitive}`/`{body_primitive}`"
                )),
            },
        }
    }

    /// The bundle for a (possibly new) name in this module, with its
    /// message split and installed.
    fn bundle_for_new_name(&mut self, name: &str) -> Result<BundleId, String> {
        let atom = {
            let runtime = self.runtime.read().expect("runtime lock poisoned");
            let module = runtime.module(self.module);
            module.atoms_for_name(name).into_iter().next()
        };
        let (atom, coined) = match atom {
            Some(atom) => (atom, false),
            None => (avail_core::atom::create_atom(name), true),
        };
        let mut runtime = self.runtime.write().expect("runtime lock poisoned");
        let bundle = runtime
            .bundle_for_atom(&atom, name, Vec::new(), Vec::new(), 0)
            .map_err(|code| format!("cannot create bundle for `{name}`: {code}"))?;
        let split = splitter::split(name, bundle)?;
        {
            let data = runtime.bundle_mut(bundle);
            data.message_parts = split.parts.clone();
            data.instructions = split.encoded();
            data.num_args = split.num_args;
        }
        let module = runtime.module_mut(self.module);
        if coined {
            module.private_names.insert(name.to_string(), atom.clone());
            module.exported_names.insert(name.to_string(), atom);
        }
        if !module.visible_bundles.contains(&bundle) {
            module.visible_bundles.push(bundle);
        }
        drop(runtime);
        if coined {
            self.journal.push(LoaderEffect::PrivateNameCoined {
                name: name.to_string(),
            });
        }
        Ok(bundle)
    }

    fn add_definition_journaled(&mut self, method: MethodId, definition: Definition) {
        let mut runtime = self.runtime.write().expect("runtime lock poisoned");
        // A concrete body resolves a matching pending forward.
        if matches!(
            definition.body,
            DefinitionBody::Method(_) | DefinitionBody::Macro { .. }
        ) {
            let signature = definition.signature.clone();
            runtime
                .module_mut(self.module)
                .resolve_forward(method, &signature);
        }
        let index = runtime.add_definition(method, definition);
        drop(runtime);
        self.journal
            .push(LoaderEffect::DefinitionAdded { method, index });
    }

    /// Record a forward declaration (resolved later by a concrete body).
    pub fn declare_forward(&mut self, name: &str, signature: AvailObject) -> Result<(), String> {
        let bundle = self.bundle_for_new_name(name)?;
        let method = {
            let runtime = self.runtime.read().expect("runtime lock poisoned");
            runtime.bundle(bundle).method
        };
        self.add_definition_journaled(
            method,
            Definition {
                signature: signature.clone(),
                body: DefinitionBody::Forward,
                module: Some(self.module),
            },
        );
        {
            let mut runtime = self.runtime.write().expect("runtime lock poisoned");
            runtime
                .module_mut(self.module)
                .record_forward(method, signature.clone());
        }
        self.journal.push(LoaderEffect::ForwardRecorded {
            method,
            signature,
        });
        Ok(())
    }

    /// Install a grammatical restriction (also used by bootstrap tests).
    pub fn restrict_grammar(
        &mut self,
        parent: BundleId,
        argument_index: usize,
        forbidden: BundleId,
    ) {
        let restriction = GrammaticalRestriction {
            argument_index,
            forbidden,
            module: Some(self.module),
        };
        {
            let mut runtime = self.runtime.write().expect("runtime lock poisoned");
            runtime.add_grammatical_restriction(parent, restriction.clone());
        }
        self.journal.push(LoaderEffect::GrammaticalRestrictionAdded {
            bundle: parent,
            restriction,
        });
    }

    /// Install a semantic restriction on a method.
    pub fn restrict_semantics(
        &mut self,
        method: MethodId,
        body: avail_runtime::method::RestrictionBody,
    ) {
        let index = {
            let mut runtime = self.runtime.write().expect("runtime lock poisoned");
            runtime.add_semantic_restriction(
                method,
                avail_runtime::method::SemanticRestriction {
                    body,
                    module: Some(self.module),
                },
            )
        };
        self.journal
            .push(LoaderEffect::SemanticRestrictionAdded { method, index });
    }

    // ------------------------------------------------------------------
    // The statement loop
    // ------------------------------------------------------------------

    fn run_statements(
        &mut self,
        source: &str,
        body_position: usize,
        body_line: u32,
    ) -> Result<(), String> {
        let source: Arc<str> = Arc::from(source);
        let mut lexing = LexingState {
            source: Arc::clone(&source),
            position: body_position,
            line: body_line,
        };
        loop {
            // End of module?
            let at_end = {
                let candidates =
                    next_significant_tokens(&lexing, &self.lexers, &self.runtime);
                candidates.iter().all(|c| {
                    c.token
                        .as_token()
                        .map(|t| t.kind == TokenKind::EndOfFile)
                        .unwrap_or(false)
                }) && !candidates.is_empty()
            };
            if at_end {
                return Ok(());
            }
            lexing = self.run_one_statement(lexing)?;
        }
    }

    fn run_one_statement(&mut self, lexing: LexingState) -> Result<LexingState, String> {
        let context = self.fresh_context();
        let mut state = ParserState {
            lexing,
            client_data: avail_core::map::AvailMap::new(),
        };
        for declaration in &self.scope_declarations {
            state = state.with_declaration(declaration.clone());
        }
        debug!(
            target: "avail::loader",
            position = state.position(),
            "parsing top-level statement"
        );
        let solutions = parser::parse_top_level_statement(&context, &state);
        context.barrier.wait_until_drained();
        if context.barrier.is_aborted() {
            return Err("compilation aborted".to_string());
        }
        let duplicates = context.cache.duplicate_errors();
        if !duplicates.is_empty() {
            return Err(format!(
                "internal parser error: {}",
                duplicates.join("; ")
            ));
        }
        let solutions = solutions.lock().expect("solution collector poisoned");
        match solutions.len() {
            0 => Err(context.expectations.render()),
            1 => {
                let solution = solutions[0].clone();
                drop(solutions);
                self.execute_statement(&solution)?;
                Ok(solution.after.lexing)
            }
            _ => Err(describe_ambiguity(
                &solutions[0].phrase,
                &solutions[1].phrase,
            )),
        }
    }

    fn fresh_context(&self) -> Arc<CompilationContext> {
        let barrier = WorkUnitBarrier::new();
        if let Some(oracle) = &self.config.abort_oracle {
            barrier.set_abort_oracle(Arc::clone(oracle));
        }
        let visible = {
            let runtime = self.runtime.read().expect("runtime lock poisoned");
            runtime.module(self.module).visible_bundles.clone()
        };
        Arc::new(CompilationContext {
            runtime: Arc::clone(&self.runtime),
            executor: Arc::clone(&self.executor),
            barrier,
            module: self.module,
            lexers: Arc::new(self.lexers.clone()),
            cache: Arc::new(FragmentCache::new()),
            expectations: Arc::new(ExpectationSet::new()),
            tree: Arc::new(BundleTree::new(visible)),
            module_bindings: Arc::new(self.module_bindings.clone()),
        })
    }

    fn execute_statement(&mut self, solution: &Solution) -> Result<(), String> {
        let effective = strip_macro_substitution(&solution.phrase);
        if let Some(repr) = effective.as_phrase() {
            if let PhraseRepr::Declaration {
                kind,
                token,
                declared_type,
                initializer,
            } = &*repr
            {
                return self.hoist_declaration(*kind, token, declared_type, initializer);
            }
        }
        // An ordinary top-level statement: compile and run it.
        codegen::evaluate_phrase(
            &self.runtime,
            Some(Arc::clone(&self.executor)),
            &solution.phrase,
            &self.module_bindings,
        )
        .map(|_| ())
    }

    /// Rewrite a top-level declaration into module scope: evaluate the
    /// initializer, create the module binding, and remap the name so
    /// subsequent statements resolve it to the module-scoped declaration.
    fn hoist_declaration(
        &mut self,
        kind: DeclarationKind,
        token: &AvailObject,
        declared_type: &AvailObject,
        initializer: &Option<AvailObject>,
    ) -> Result<(), String> {
        let name = token
            .as_token()
            .map(|t| t.text.clone())
            .ok_or("declaration with no name token")?;
        if self.module_bindings.contains_key(&name) {
            return Err(format!("`{name}` is already bound at module scope"));
        }
        let initial_value = match initializer {
            Some(phrase) => Some(codegen::evaluate_phrase(
                &self.runtime,
                Some(Arc::clone(&self.executor)),
                phrase,
                &self.module_bindings,
            )?),
            None => None,
        };
        let module_kind = match kind {
            DeclarationKind::LocalConstant | DeclarationKind::ModuleConstant => {
                DeclarationKind::ModuleConstant
            }
            _ => DeclarationKind::ModuleVariable,
        };
        match module_kind {
            DeclarationKind::ModuleConstant => {
                let value = initial_value
                    .ok_or_else(|| format!("constant `{name}` has no initializing value"))?
                    .make_immutable();
                {
                    let mut runtime = self.runtime.write().expect("runtime lock poisoned");
                    runtime
                        .module_mut(self.module)
                        .constants
                        .insert(name.clone(), value.clone());
                }
                self.module_bindings
                    .insert(name.clone(), Binding::ModuleConstant(value.clone()));
                self.journal
                    .push(LoaderEffect::ConstantBound { name: name.clone() });
                // The remapped declaration later statements resolve to.
                let declaration = phrase::phrase_object(PhraseRepr::Declaration {
                    kind: DeclarationKind::ModuleConstant,
                    token: token.clone(),
                    declared_type: types::instance_type(&value),
                    initializer: None,
                });
                self.scope_declarations.push(declaration);
            }
            _ => {
                let variable = avail_core::variable::named_variable(
                    declared_type.clone(),
                    Some(name.clone()),
                );
                if let Some(value) = initial_value {
                    variable
                        .as_variable()
                        .expect("named_variable answers a variable")
                        .set(value)
                        .map_err(|code| format!("initializing `{name}`: {code}"))?;
                }
                {
                    let mut runtime = self.runtime.write().expect("runtime lock poisoned");
                    runtime
                        .module_mut(self.module)
                        .variables
                        .insert(name.clone(), variable.clone());
                }
                self.module_bindings
                    .insert(name.clone(), Binding::ModuleVariable(variable));
                self.journal
                    .push(LoaderEffect::VariableBound { name: name.clone() });
                let declaration = phrase::phrase_object(PhraseRepr::Declaration {
                    kind: DeclarationKind::ModuleVariable,
                    token: token.clone(),
                    declared_type: declared_type.clone(),
                    initializer: None,
                });
                self.scope_declarations.push(declaration);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // End of module, commit, rollback
    // ------------------------------------------------------------------

    /// Unresolved forwards are an end-of-module error.
    pub fn check_end_of_module(&self) -> Result<(), String> {
        let runtime = self.runtime.read().expect("runtime lock poisoned");
        let pending = runtime.unresolved_forwards(self.module);
        if pending.is_empty() {
            return Ok(());
        }
        let mut descriptions = Vec::new();
        for (method, signature) in &pending {
            descriptions.push(format!(
                "`{}` at {}",
                runtime.method(*method).message,
                signature
            ));
        }
        Err(format!(
            "module ends with unresolved forward declarations: {}",
            descriptions.join(", ")
        ))
    }

    pub fn commit(&mut self) {
        let mut runtime = self.runtime.write().expect("runtime lock poisoned");
        runtime.module_mut(self.module).loaded = true;
        info!(
            target: "avail::loader",
            module = %runtime.module(self.module).name,
            effects = self.journal.len(),
            "committed module"
        );
        self.journal.clear();
    }

    /// Undo every journaled effect, most recent first.
    pub fn rollback(&mut self) {
        let mut runtime = self.runtime.write().expect("runtime lock poisoned");
        for effect in self.journal.drain(..).rev() {
            match effect {
                LoaderEffect::DefinitionAdded { method, index } => {
                    runtime.remove_definition(method, index);
                }
                LoaderEffect::SemanticRestrictionAdded { method, index } => {
                    runtime.remove_semantic_restriction(method, index);
                }
                LoaderEffect::GrammaticalRestrictionAdded {
                    bundle,
                    restriction,
                } => {
                    runtime.remove_grammatical_restriction(bundle, &restriction);
                }
                LoaderEffect::NameImported { name, atom } => {
                    let module = runtime.module_mut(self.module);
                    module.unimport_name(&name, &atom);
                    module.exported_names.remove(&name);
                }
                LoaderEffect::PrivateNameCoined { name } => {
                    let module = runtime.module_mut(self.module);
                    module.private_names.remove(&name);
                    module.exported_names.remove(&name);
                }
                LoaderEffect::VariableBound { name } => {
                    runtime.module_mut(self.module).variables.remove(&name);
                }
                LoaderEffect::ConstantBound { name } => {
                    runtime.module_mut(self.module).constants.remove(&name);
                }
                LoaderEffect::ForwardRecorded { method, signature } => {
                    runtime
                        .module_mut(self.module)
                        .resolve_forward(method, &signature);
                }
            }
        }
        info!(target: "avail::loader", "rolled back module effects");
    }
}

fn strip_macro_substitution(phrase_object: &AvailObject) -> AvailObject {
    match phrase_object.as_phrase().as_deref() {
        Some(PhraseRepr::MacroSubstitution { replacement, .. }) => {
            strip_macro_substitution(replacement)
        }
        _ => phrase_object.clone(),
    }
}

fn lookup_export(
    exported: &[(String, AvailObject)],
    name: &str,
    module_name: &str,
) -> Result<AvailObject, String> {
    exported
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, a)| a.clone())
        .ok_or_else(|| format!("module \"{module_name}\" does not export \"{name}\""))
}

/// A function object whose body is one primitive attempt.
fn primitive_function(primitive: &str, signature: &AvailObject) -> AvailObject {
    let num_args = avail_runtime::method::signature_argument_types(signature).len();
    function_object(Arc::new(RawFunction {
        num_args: num_args as u16,
        local_variable_types: Vec::new(),
        num_constants: 0,
        literals: Vec::new(),
        code: vec![L1Instruction::Return],
        function_type: signature.clone(),
        primitive: Some(primitive.to_string()),
    }))
}

fn generic_macro_signature(num_args: usize) -> AvailObject {
    let argument = types::phrase_type(PhraseKind::ParsePhrase, types::top_type());
    types::function_type(
        (0..num_args).map(|_| argument.clone()).collect(),
        types::phrase_type(PhraseKind::ParsePhrase, types::top_type()),
    )
}
