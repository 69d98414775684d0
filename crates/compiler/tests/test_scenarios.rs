//! End-to-end module loading scenarios
//!
//! These drive whole modules through the loader: pragma bootstrap,
//! statement parsing under the completion barrier, macro expansion,
//! hoisting, restrictions, imports, and the failure paths.

use availc::loader::{load_module, CompilerConfig, ModuleLoader};
use availc::pragma::Pragma;
use avail_core::object::AvailObject;
use avail_core::types;
use avail_runtime::method::{GrammaticalRestriction, RestrictionBody, RestrictionResult};
use avail_runtime::runtime::Runtime;
use num_bigint::BigInt;
use serial_test::serial;
use std::sync::{Arc, RwLock};

fn config() -> CompilerConfig {
    CompilerConfig {
        workers: 2,
        abort_oracle: None,
    }
}

fn shared_runtime() -> Arc<RwLock<Runtime>> {
    // RUST_LOG=avail::parser=debug shows the solution/work-unit flow.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    Arc::new(RwLock::new(Runtime::new()))
}

/// Build a committed "Core" module exporting `_+_` bound to the addition
/// primitive, the way a bootstrap origin module would.
fn install_core(runtime: &Arc<RwLock<Runtime>>) {
    let mut loader = ModuleLoader::new(runtime, "Core", config()).unwrap();
    loader
        .install_pragma(&Pragma::Method {
            primitive: "Add".to_string(),
            name: "_+_".to_string(),
        })
        .unwrap();
    loader.commit();
}

fn constant(runtime: &Arc<RwLock<Runtime>>, module_name: &str, name: &str) -> AvailObject {
    let guard = runtime.read().unwrap();
    let module = guard.find_module(module_name).expect("module missing");
    module
        .constants
        .get(name)
        .unwrap_or_else(|| panic!("constant `{name}` not bound"))
        .clone()
}

#[test]
#[serial]
fn test_constant_binding_statement() {
    // "x = 1 + 2;" with `_+_` installed as the addition primitive and
    // `…=_;` as the constant-binding macro leaves x bound to 3.
    let runtime = shared_runtime();
    let source = r#"Module "Arith"
Pragma "method=Add=_+_", "macro=ConstantDeclarationFromPhrase=…=_;"
Body
x = 1 + 2;
y = x + 4;
"#;
    load_module(&runtime, source, config()).unwrap();
    assert_eq!(constant(&runtime, "Arith", "x").as_i64(), Some(3));
    // Hoisting remapped x for the second statement.
    assert_eq!(constant(&runtime, "Arith", "y").as_i64(), Some(7));
}

#[test]
#[serial]
fn test_left_associative_chain() {
    // With `_+_` forbidden as its own second argument (the standard
    // associativity restriction), 1 + 2 + 3 parses uniquely as
    // (1 + 2) + 3 and yields 6.
    let runtime = shared_runtime();
    install_core(&runtime);
    {
        let mut guard = runtime.write().unwrap();
        let atom = guard
            .find_module("Core")
            .unwrap()
            .exported_names
            .get("_+_")
            .unwrap()
            .clone();
        let plus = guard.bundle_id_for_atom(&atom).unwrap();
        guard.add_grammatical_restriction(
            plus,
            GrammaticalRestriction {
                argument_index: 2,
                forbidden: plus,
                module: None,
            },
        );
    }
    let source = r#"Module "Assoc"
Uses "Core"
Pragma "macro=ConstantDeclarationFromPhrase=…=_;"
Body
r = 1 + 2 + 3;
"#;
    load_module(&runtime, source, config()).unwrap();
    assert_eq!(constant(&runtime, "Assoc", "r").as_i64(), Some(6));
}

#[test]
#[serial]
fn test_grammatical_restriction_prunes_only_that_position() {
    // The restriction forbids + as the SECOND argument; it must still be
    // welcome as the first.
    let runtime = shared_runtime();
    install_core(&runtime);
    {
        let mut guard = runtime.write().unwrap();
        let atom = guard
            .find_module("Core")
            .unwrap()
            .exported_names
            .get("_+_")
            .unwrap()
            .clone();
        let plus = guard.bundle_id_for_atom(&atom).unwrap();
        guard.add_grammatical_restriction(
            plus,
            GrammaticalRestriction {
                argument_index: 2,
                forbidden: plus,
                module: None,
            },
        );
    }
    let source = r#"Module "LeftOnly"
Uses "Core"
Pragma "macro=ConstantDeclarationFromPhrase=…=_;"
Body
a = 1 + 2 + 3 + 4;
"#;
    load_module(&runtime, source, config()).unwrap();
    assert_eq!(constant(&runtime, "LeftOnly", "a").as_i64(), Some(10));
}

#[test]
#[serial]
fn test_ambiguous_statement_is_reported() {
    // Two bundles that both parse the same token sequence: the statement
    // must be rejected with both interpretations named.
    let runtime = shared_runtime();
    let mut loader = ModuleLoader::new(&runtime, "CoreAmbig", config()).unwrap();
    loader
        .install_pragma(&Pragma::Method {
            primitive: "Print".to_string(),
            name: "keep_".to_string(),
        })
        .unwrap();
    loader
        .install_pragma(&Pragma::Method {
            primitive: "Print".to_string(),
            name: "keep_now".to_string(),
        })
        .unwrap();
    loader.commit();

    let source = r#"Module "Ambig"
Uses "CoreAmbig"
Body
keep "tools" now
"#;
    let error = load_module(&runtime, source, config()).unwrap_err();
    assert!(error.contains("ambiguous"), "got: {error}");
    assert!(error.contains("keep"), "got: {error}");
}

#[test]
#[serial]
fn test_group_macro_converts_list_to_size() {
    // The literal-guillemet list macro: «1,2,3» becomes the literal 3.
    let runtime = shared_runtime();
    let source = r#"Module "Lists"
Pragma "macro=ConstantDeclarationFromPhrase=…=_;", "macro=ListPhraseSize=`««_‡,»`»"
Body
n = «1,2,3»;
empty = «»;
"#;
    load_module(&runtime, source, config()).unwrap();
    assert_eq!(constant(&runtime, "Lists", "n").as_i64(), Some(3));
    assert_eq!(constant(&runtime, "Lists", "empty").as_i64(), Some(0));
}

#[test]
#[serial]
fn test_unresolved_forward_reported_at_end_of_module() {
    let runtime = shared_runtime();
    let mut loader = ModuleLoader::new(&runtime, "Fwd", config()).unwrap();
    let signature = types::function_type(
        vec![types::any_type()],
        types::string_type(),
    );
    loader.declare_forward("foo_", signature).unwrap();
    let error = loader.check_end_of_module().unwrap_err();
    assert!(error.contains("foo_"), "got: {error}");
    assert!(error.contains("unresolved forward"), "got: {error}");

    // A concrete definition with the same signature resolves it.
    loader
        .install_pragma(&Pragma::Method {
            primitive: "Stringify".to_string(),
            name: "foo_".to_string(),
        })
        .unwrap();
    loader.check_end_of_module().unwrap();
}

#[test]
#[serial]
fn test_semantic_restriction_rejects_and_refines() {
    fn no_zero_pair(argument_types: &[AvailObject]) -> RestrictionResult {
        let zero = types::single_integer(BigInt::from(0));
        if argument_types.len() == 2 && argument_types.iter().all(|t| t.equals(&zero)) {
            RestrictionResult::Rejected(
                "the operands must not both be the literal 0".to_string(),
            )
        } else {
            RestrictionResult::ReturnType(types::integer_type())
        }
    }

    let runtime = shared_runtime();
    install_core(&runtime);
    {
        let mut guard = runtime.write().unwrap();
        let atom = guard
            .find_module("Core")
            .unwrap()
            .exported_names
            .get("_+_")
            .unwrap()
            .clone();
        let plus = guard.bundle_id_for_atom(&atom).unwrap();
        let method = guard.bundle(plus).method;
        guard.add_semantic_restriction(
            method,
            avail_runtime::method::SemanticRestriction {
                body: RestrictionBody::Native(no_zero_pair),
                module: None,
            },
        );
    }

    let rejected = r#"Module "Zero"
Uses "Core"
Pragma "macro=ConstantDeclarationFromPhrase=…=_;"
Body
z = 0 + 0;
"#;
    let error = load_module(&runtime, rejected, config()).unwrap_err();
    assert!(error.contains("literal 0"), "got: {error}");

    let accepted = r#"Module "NonZero"
Uses "Core"
Pragma "macro=ConstantDeclarationFromPhrase=…=_;"
Body
z = 0 + 1;
"#;
    load_module(&runtime, accepted, config()).unwrap();
    assert_eq!(constant(&runtime, "NonZero", "z").as_i64(), Some(1));
}

#[test]
#[serial]
fn test_extends_rename_rebinds_name() {
    let runtime = shared_runtime();
    load_module(
        &runtime,
        "Module \"M\"\nNames \"a\"\nBody\n",
        config(),
    )
    .unwrap();
    let module_id = load_module(
        &runtime,
        "Module \"R\"\nExtends \"M\" (\"a\" → \"b\")\nBody\n",
        config(),
    )
    .unwrap();
    let guard = runtime.read().unwrap();
    let original = guard
        .find_module("M")
        .unwrap()
        .exported_names
        .get("a")
        .unwrap()
        .clone();
    let module = guard.module(module_id);
    let renamed = module.atoms_for_name("b");
    assert_eq!(renamed.len(), 1);
    assert!(renamed[0].equals(&original));
    assert!(module.atoms_for_name("a").is_empty());
}

#[test]
#[serial]
fn test_parse_failure_renders_furthest_expectation() {
    let runtime = shared_runtime();
    let source = r#"Module "Broken"
Pragma "method=Add=_+_", "macro=ConstantDeclarationFromPhrase=…=_;"
Body
x = 1 + ;
"#;
    let error = load_module(&runtime, source, config()).unwrap_err();
    assert!(error.contains("expected"), "got: {error}");
    // The module rolled back: nothing was committed.
    let guard = runtime.read().unwrap();
    assert!(!guard.find_module("Broken").unwrap().loaded);
}

#[test]
#[serial]
fn test_rollback_undoes_definitions() {
    let runtime = shared_runtime();
    let broken = r#"Module "Half"
Pragma "method=Add=_+_", "macro=ConstantDeclarationFromPhrase=…=_;"
Body
ok = 1 + 2;
bad = 3 + ;
"#;
    let error = load_module(&runtime, broken, config()).unwrap_err();
    assert!(error.contains("expected"), "got: {error}");
    let guard = runtime.read().unwrap();
    let module = guard.find_module("Half").unwrap();
    assert!(!module.loaded);
    // The successful first statement's binding was rolled back too.
    assert!(module.constants.is_empty());
}

#[test]
#[serial]
fn test_cooperative_abort_short_circuits_compilation() {
    let runtime = shared_runtime();
    let source = r#"Module "Aborted"
Pragma "method=Add=_+_", "macro=ConstantDeclarationFromPhrase=…=_;"
Body
x = 1 + 2;
"#;
    let config = CompilerConfig {
        workers: 2,
        abort_oracle: Some(Arc::new(|| true)),
    };
    let error = load_module(&runtime, source, config).unwrap_err();
    assert!(error.contains("abort"), "got: {error}");
}

#[test]
#[serial]
fn test_version_check_pragma() {
    let runtime = shared_runtime();
    let bad = "Module \"V\"\nPragma \"check=version=9.9.9\"\nBody\n";
    assert!(load_module(&runtime, bad, config()).is_err());
    let good = "Module \"V2\"\nPragma \"check=version=1.0.0\"\nBody\n";
    load_module(&runtime, good, config()).unwrap();
}
