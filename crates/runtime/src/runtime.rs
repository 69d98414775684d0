//! The runtime context
//!
//! One `Runtime` owns the method, bundle, and module tables. There is no
//! process-global instance: the compiler and interpreter receive the
//! runtime (behind a lock) as an explicit parameter, so tests can spin up
//! as many independent runtimes as they like.

use crate::method::{BundleData, Definition, GrammaticalRestriction, MethodData};
use crate::module::ModuleData;
use avail_core::object::AvailObject;
use avail_core::{BundleId, ErrorCode, MethodId, ModuleId};
use std::collections::HashMap;

pub struct Runtime {
    methods: Vec<MethodData>,
    bundles: Vec<BundleData>,
    modules: Vec<ModuleData>,
    bundles_by_atom: HashMap<avail_core::AtomId, BundleId>,
    /// Version strings this runtime honors for `check=version=` pragmas.
    pub active_versions: Vec<String>,
    /// The printer method, named by a `stringify=` pragma.
    pub stringifier: Option<BundleId>,
}

impl Runtime {
    pub fn new() -> Runtime {
        Runtime {
            methods: Vec::new(),
            bundles: Vec::new(),
            modules: Vec::new(),
            bundles_by_atom: HashMap::new(),
            active_versions: vec!["1.0.0".to_string()],
            stringifier: None,
        }
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    pub fn method(&self, id: MethodId) -> &MethodData {
        &self.methods[id.0 as usize]
    }

    pub fn method_mut(&mut self, id: MethodId) -> &mut MethodData {
        &mut self.methods[id.0 as usize]
    }

    fn new_method(&mut self, message: &str) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(MethodData::new(message));
        id
    }

    /// Append a definition, answering its index for the rollback journal.
    pub fn add_definition(&mut self, method: MethodId, definition: Definition) -> usize {
        let definitions = &mut self.method_mut(method).definitions;
        definitions.push(definition);
        definitions.len() - 1
    }

    /// Remove the definition at `index` (reverse of `add_definition`).
    pub fn remove_definition(&mut self, method: MethodId, index: usize) {
        self.method_mut(method).definitions.remove(index);
    }

    /// Append a semantic restriction, answering its index for rollback.
    pub fn add_semantic_restriction(
        &mut self,
        method: MethodId,
        restriction: crate::method::SemanticRestriction,
    ) -> usize {
        let restrictions = &mut self.method_mut(method).semantic_restrictions;
        restrictions.push(restriction);
        restrictions.len() - 1
    }

    pub fn remove_semantic_restriction(&mut self, method: MethodId, index: usize) {
        self.method_mut(method).semantic_restrictions.remove(index);
    }

    // ------------------------------------------------------------------
    // Bundles
    // ------------------------------------------------------------------

    pub fn bundle(&self, id: BundleId) -> &BundleData {
        &self.bundles[id.0 as usize]
    }

    pub fn bundle_mut(&mut self, id: BundleId) -> &mut BundleData {
        &mut self.bundles[id.0 as usize]
    }

    pub fn bundle_count(&self) -> usize {
        self.bundles.len()
    }

    /// The bundle for this atom, creating bundle and method on first use.
    /// `message_parts`/`instructions`/`num_args` come from the message
    /// splitter; the runtime stores them opaquely.
    pub fn bundle_for_atom(
        &mut self,
        atom: &AvailObject,
        message: &str,
        message_parts: Vec<String>,
        instructions: Vec<i64>,
        num_args: usize,
    ) -> Result<BundleId, ErrorCode> {
        let atom_data = atom.as_atom().ok_or(ErrorCode::IncorrectArgumentType)?;
        if let Some(existing) = self.bundles_by_atom.get(&atom_data.id) {
            return Ok(*existing);
        }
        let method = self.new_method(message);
        let id = BundleId(self.bundles.len() as u32);
        self.bundles.push(BundleData {
            atom: atom.make_shared(),
            message: message.to_string(),
            method,
            message_parts,
            instructions,
            num_args,
            permutations: Vec::new(),
            grammatical_restrictions: Vec::new(),
        });
        self.bundles_by_atom.insert(atom_data.id, id);
        Ok(id)
    }

    pub fn bundle_id_for_atom(&self, atom: &AvailObject) -> Option<BundleId> {
        let atom_data = atom.as_atom()?;
        self.bundles_by_atom.get(&atom_data.id).copied()
    }

    pub fn add_grammatical_restriction(
        &mut self,
        parent: BundleId,
        restriction: GrammaticalRestriction,
    ) {
        self.bundle_mut(parent)
            .grammatical_restrictions
            .push(restriction);
    }

    pub fn remove_grammatical_restriction(
        &mut self,
        parent: BundleId,
        restriction: &GrammaticalRestriction,
    ) {
        self.bundle_mut(parent)
            .grammatical_restrictions
            .retain(|r| r != restriction);
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    pub fn new_module(&mut self, name: &str) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(ModuleData::new(id, name));
        id
    }

    pub fn module(&self, id: ModuleId) -> &ModuleData {
        &self.modules[id.0 as usize]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleData {
        &mut self.modules[id.0 as usize]
    }

    pub fn find_module(&self, name: &str) -> Option<&ModuleData> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Every unresolved forward across a module, for end-of-module
    /// reporting. A forward counts only while the module still records it
    /// AND the method still carries a `Forward` definition at that
    /// signature.
    pub fn unresolved_forwards(&self, module: ModuleId) -> Vec<(MethodId, AvailObject)> {
        self.module(module)
            .pending_forwards
            .iter()
            .filter(|(method, signature)| {
                self.method(*method)
                    .pending_forwards()
                    .iter()
                    .any(|definition| definition.signature.equals(signature))
            })
            .map(|(method, signature)| (*method, signature.clone()))
            .collect()
    }
}

impl Default for Runtime {
    fn default() -> Runtime {
        Runtime::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::atom::create_atom;

    #[test]
    fn test_bundle_for_atom_is_idempotent() {
        let mut runtime = Runtime::new();
        let atom = create_atom("_+_");
        let a = runtime
            .bundle_for_atom(&atom, "_+_", vec!["+".into()], vec![], 2)
            .unwrap();
        let b = runtime
            .bundle_for_atom(&atom, "_+_", vec!["+".into()], vec![], 2)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(runtime.bundle(a).message, "_+_");
        assert_eq!(runtime.method(runtime.bundle(a).method).message, "_+_");
    }

    #[test]
    fn test_distinct_atoms_distinct_bundles() {
        let mut runtime = Runtime::new();
        let a = runtime
            .bundle_for_atom(&create_atom("f_"), "f_", vec!["f".into()], vec![], 1)
            .unwrap();
        let b = runtime
            .bundle_for_atom(&create_atom("f_"), "f_", vec!["f".into()], vec![], 1)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_definition_journal_round_trip() {
        let mut runtime = Runtime::new();
        let atom = create_atom("g_");
        let bundle = runtime
            .bundle_for_atom(&atom, "g_", vec!["g".into()], vec![], 1)
            .unwrap();
        let method = runtime.bundle(bundle).method;
        let index = runtime.add_definition(
            method,
            Definition {
                signature: avail_core::types::function_type(
                    vec![avail_core::types::integer_type()],
                    avail_core::types::top_type(),
                ),
                body: crate::method::DefinitionBody::Forward,
                module: None,
            },
        );
        assert_eq!(runtime.method(method).definitions.len(), 1);
        runtime.remove_definition(method, index);
        assert!(runtime.method(method).definitions.is_empty());
    }

    #[test]
    fn test_unresolved_forwards_joins_module_and_method_records() {
        let mut runtime = Runtime::new();
        let atom = create_atom("h_");
        let bundle = runtime
            .bundle_for_atom(&atom, "h_", vec!["h".into()], vec![], 1)
            .unwrap();
        let method = runtime.bundle(bundle).method;
        let module = runtime.new_module("Seed");
        let signature = avail_core::types::function_type(
            vec![avail_core::types::integer_type()],
            avail_core::types::top_type(),
        );
        let index = runtime.add_definition(
            method,
            Definition {
                signature: signature.clone(),
                body: crate::method::DefinitionBody::Forward,
                module: Some(module),
            },
        );
        runtime
            .module_mut(module)
            .record_forward(method, signature.clone());
        let pending = runtime.unresolved_forwards(module);
        assert_eq!(pending.len(), 1);
        assert!(pending[0].1.equals(&signature));
        // A stale module record with no Forward definition left on the
        // method does not report.
        runtime.remove_definition(method, index);
        assert!(runtime.unresolved_forwards(module).is_empty());
    }
}
