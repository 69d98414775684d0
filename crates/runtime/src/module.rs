//! Modules
//!
//! A module is a namespace under construction: the names it imports, the
//! names it coins, its variable and constant bindings, and the forward
//! declarations still waiting for bodies. The loader mutates modules only
//! through the runtime so that every effect can be journaled and rolled
//! back.

use avail_core::object::AvailObject;
use avail_core::{BundleId, MethodId, ModuleId};
use std::collections::HashMap;

pub struct ModuleData {
    pub id: ModuleId,
    pub name: String,
    /// Names visible here through Extends/Uses imports: string to the
    /// atoms it may denote (several when imports collide; the parser
    /// treats each as a candidate bundle).
    pub imported_names: HashMap<String, Vec<AvailObject>>,
    /// Names this module coined (its Names section plus private coinage).
    pub private_names: HashMap<String, AvailObject>,
    /// Names re-exported to downstream modules.
    pub exported_names: HashMap<String, AvailObject>,
    /// Module-scope variable bindings, name to variable object.
    pub variables: HashMap<String, AvailObject>,
    /// Module-scope constants, name to value.
    pub constants: HashMap<String, AvailObject>,
    /// Bundles parseable inside this module's statements.
    pub visible_bundles: Vec<BundleId>,
    /// Methods with forward declarations this module must resolve.
    pub pending_forwards: Vec<(MethodId, AvailObject)>,
    /// Entry point names, from the header.
    pub entry_points: Vec<String>,
    /// Declared version strings.
    pub versions: Vec<String>,
    pub loaded: bool,
}

impl ModuleData {
    pub fn new(id: ModuleId, name: impl Into<String>) -> ModuleData {
        ModuleData {
            id,
            name: name.into(),
            imported_names: HashMap::new(),
            private_names: HashMap::new(),
            exported_names: HashMap::new(),
            variables: HashMap::new(),
            constants: HashMap::new(),
            visible_bundles: Vec::new(),
            pending_forwards: Vec::new(),
            entry_points: Vec::new(),
            versions: Vec::new(),
            loaded: false,
        }
    }

    /// Every atom a name may denote here: imports first, then coinage.
    pub fn atoms_for_name(&self, name: &str) -> Vec<AvailObject> {
        let mut out = Vec::new();
        if let Some(imported) = self.imported_names.get(name) {
            out.extend(imported.iter().cloned());
        }
        if let Some(coined) = self.private_names.get(name) {
            if !out.iter().any(|a| a.equals(coined)) {
                out.push(coined.clone());
            }
        }
        out
    }

    /// Record an imported name binding.
    pub fn import_name(&mut self, name: impl Into<String>, atom: AvailObject) {
        let entry = self.imported_names.entry(name.into()).or_default();
        if !entry.iter().any(|a| a.equals(&atom)) {
            entry.push(atom);
        }
    }

    /// Remove an imported binding (rollback path).
    pub fn unimport_name(&mut self, name: &str, atom: &AvailObject) {
        if let Some(entry) = self.imported_names.get_mut(name) {
            entry.retain(|a| !a.equals(atom));
            if entry.is_empty() {
                self.imported_names.remove(name);
            }
        }
    }

    pub fn record_forward(&mut self, method: MethodId, signature: AvailObject) {
        self.pending_forwards.push((method, signature));
    }

    pub fn resolve_forward(&mut self, method: MethodId, signature: &AvailObject) {
        self.pending_forwards
            .retain(|(m, s)| !(*m == method && s.equals(signature)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::atom::create_atom;

    #[test]
    fn test_name_resolution_prefers_both_sources() {
        let mut module = ModuleData::new(ModuleId(0), "Test");
        let imported = create_atom("x");
        let coined = create_atom("x");
        module.import_name("x", imported.clone());
        module.private_names.insert("x".to_string(), coined.clone());
        let candidates = module.atoms_for_name("x");
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].equals(&imported));
        assert!(candidates[1].equals(&coined));
    }

    #[test]
    fn test_unimport_removes_binding() {
        let mut module = ModuleData::new(ModuleId(0), "Test");
        let atom = create_atom("y");
        module.import_name("y", atom.clone());
        module.unimport_name("y", &atom);
        assert!(module.atoms_for_name("y").is_empty());
    }

    #[test]
    fn test_forward_tracking() {
        let mut module = ModuleData::new(ModuleId(0), "Test");
        let signature = avail_core::types::function_type(
            vec![avail_core::types::integer_type()],
            avail_core::types::integer_type(),
        );
        module.record_forward(MethodId(3), signature.clone());
        assert_eq!(module.pending_forwards.len(), 1);
        module.resolve_forward(MethodId(3), &signature);
        assert!(module.pending_forwards.is_empty());
    }
}
