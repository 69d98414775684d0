//! Phrases: the syntactic intermediate representation
//!
//! Phrases are ordinary objects, so macro bodies can take them apart,
//! rebuild them, and hand them back to the parser. The kinds form a small
//! hierarchy used by phrase types: a literal phrase is an expression
//! phrase is a parse phrase, a local-variable declaration is a declaration
//! is a statement.

use crate::hashing;
use crate::ids::BundleId;
use crate::object::{AvailObject, Repr};
use crate::types;
use std::fmt;
use std::sync::Arc;

/// The phrase-kind lattice, a tree under `parent()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhraseKind {
    ParsePhrase,
    ExpressionPhrase,
    LiteralPhrase,
    ListPhrase,
    PermutedListPhrase,
    VariableUsePhrase,
    ReferencePhrase,
    SendPhrase,
    MacroSubstitutionPhrase,
    BlockPhrase,
    StatementPhrase,
    AssignmentPhrase,
    DeclarationPhrase,
    ArgumentPhrase,
    LocalVariablePhrase,
    LocalConstantPhrase,
    ModuleVariablePhrase,
    ModuleConstantPhrase,
}

impl PhraseKind {
    pub fn parent(self) -> Option<PhraseKind> {
        use PhraseKind::*;
        match self {
            ParsePhrase => None,
            ExpressionPhrase | StatementPhrase => Some(ParsePhrase),
            LiteralPhrase | ListPhrase | VariableUsePhrase | ReferencePhrase | SendPhrase
            | MacroSubstitutionPhrase | BlockPhrase => Some(ExpressionPhrase),
            PermutedListPhrase => Some(ListPhrase),
            AssignmentPhrase | DeclarationPhrase => Some(StatementPhrase),
            ArgumentPhrase | LocalVariablePhrase | LocalConstantPhrase | ModuleVariablePhrase
            | ModuleConstantPhrase => Some(DeclarationPhrase),
        }
    }

    /// Reflexive-transitive subkind test, walking up the parent chain.
    pub fn is_subkind_of(self, other: PhraseKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// The nearest kind at or above both.
    pub fn common_ancestor(self, other: PhraseKind) -> PhraseKind {
        let mut candidate = Some(self);
        while let Some(kind) = candidate {
            if other.is_subkind_of(kind) {
                return kind;
            }
            candidate = kind.parent();
        }
        PhraseKind::ParsePhrase
    }
}

/// Which scope a declaration introduces its binding into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Argument,
    LocalVariable,
    LocalConstant,
    ModuleVariable,
    ModuleConstant,
}

impl DeclarationKind {
    pub fn phrase_kind(self) -> PhraseKind {
        match self {
            DeclarationKind::Argument => PhraseKind::ArgumentPhrase,
            DeclarationKind::LocalVariable => PhraseKind::LocalVariablePhrase,
            DeclarationKind::LocalConstant => PhraseKind::LocalConstantPhrase,
            DeclarationKind::ModuleVariable => PhraseKind::ModuleVariablePhrase,
            DeclarationKind::ModuleConstant => PhraseKind::ModuleConstantPhrase,
        }
    }

    pub fn is_module_scoped(self) -> bool {
        matches!(
            self,
            DeclarationKind::ModuleVariable | DeclarationKind::ModuleConstant
        )
    }
}

/// Payload of a phrase object. Child links are full objects so phrases can
/// be traded with in-language code.
pub enum PhraseRepr {
    /// A literal token wrapped as an expression.
    Literal { token: AvailObject },
    /// An ordered collection of expressions (the arguments of a send).
    List { expressions: Vec<AvailObject> },
    /// A list whose elements were written in a different order than they
    /// are consumed; `permutation[i]` is the 1-based source position of
    /// the i-th consumed element.
    PermutedList {
        list: AvailObject,
        permutation: Vec<usize>,
    },
    /// Mention of a declared name.
    VariableUse {
        declaration: AvailObject,
        token: AvailObject,
    },
    /// Introduction of a name.
    Declaration {
        kind: DeclarationKind,
        token: AvailObject,
        declared_type: AvailObject,
        initializer: Option<AvailObject>,
    },
    Assignment {
        variable_use: AvailObject,
        value: AvailObject,
    },
    /// `↑x`: the variable itself rather than its value.
    Reference { variable_use: AvailObject },
    /// A (possibly partially parsed) call of a message bundle.
    Send {
        bundle: BundleId,
        /// The message name, carried for diagnostics and printing.
        message: String,
        /// A list phrase of the arguments.
        arguments: AvailObject,
        return_type: AvailObject,
        /// The keyword/operator tokens that spelled this send.
        tokens: Vec<AvailObject>,
    },
    /// Records that a macro rewrote `original` into `replacement`; behaves
    /// as the replacement everywhere except provenance queries.
    MacroSubstitution {
        original: AvailObject,
        replacement: AvailObject,
    },
    Block {
        arguments: Vec<AvailObject>,
        statements: Vec<AvailObject>,
        return_type: AvailObject,
    },
}

impl PhraseRepr {
    pub fn phrase_kind(&self) -> PhraseKind {
        match self {
            PhraseRepr::Literal { .. } => PhraseKind::LiteralPhrase,
            PhraseRepr::List { .. } => PhraseKind::ListPhrase,
            PhraseRepr::PermutedList { .. } => PhraseKind::PermutedListPhrase,
            PhraseRepr::VariableUse { .. } => PhraseKind::VariableUsePhrase,
            PhraseRepr::Declaration { kind, .. } => kind.phrase_kind(),
            PhraseRepr::Assignment { .. } => PhraseKind::AssignmentPhrase,
            PhraseRepr::Reference { .. } => PhraseKind::ReferencePhrase,
            PhraseRepr::Send { .. } => PhraseKind::SendPhrase,
            PhraseRepr::MacroSubstitution { .. } => PhraseKind::MacroSubstitutionPhrase,
            PhraseRepr::Block { .. } => PhraseKind::BlockPhrase,
        }
    }

    /// The type of value this phrase produces when evaluated. Statements
    /// produce top.
    pub fn expression_type(&self) -> AvailObject {
        match self {
            PhraseRepr::Literal { token } => {
                let value = token
                    .as_token()
                    .and_then(|t| t.literal.clone())
                    .unwrap_or_else(AvailObject::nil);
                types::instance_type(&value)
            }
            PhraseRepr::List { expressions } => {
                let leading: Vec<AvailObject> = expressions
                    .iter()
                    .map(|e| phrase_expression_type(e))
                    .collect();
                types::tuple_type_for_leading(leading)
            }
            PhraseRepr::PermutedList { list, .. } => phrase_expression_type(list),
            PhraseRepr::VariableUse { declaration, .. } => declaration_type(declaration),
            PhraseRepr::Declaration { .. } => types::top_type(),
            PhraseRepr::Assignment { .. } => types::top_type(),
            PhraseRepr::Reference { variable_use } => phrase_expression_type(variable_use),
            PhraseRepr::Send { return_type, .. } => return_type.clone(),
            PhraseRepr::MacroSubstitution { replacement, .. } => {
                phrase_expression_type(replacement)
            }
            PhraseRepr::Block {
                arguments,
                return_type,
                ..
            } => {
                let arg_types: Vec<AvailObject> =
                    arguments.iter().map(|a| declaration_type(a)).collect();
                types::function_type(arg_types, return_type.clone())
            }
        }
    }

    pub fn children(&self) -> Vec<AvailObject> {
        match self {
            PhraseRepr::Literal { token } => vec![token.clone()],
            PhraseRepr::List { expressions } => expressions.clone(),
            PhraseRepr::PermutedList { list, .. } => vec![list.clone()],
            PhraseRepr::VariableUse { declaration, token } => {
                vec![declaration.clone(), token.clone()]
            }
            PhraseRepr::Declaration {
                token,
                declared_type,
                initializer,
                ..
            } => {
                let mut out = vec![token.clone(), declared_type.clone()];
                out.extend(initializer.iter().cloned());
                out
            }
            PhraseRepr::Assignment {
                variable_use,
                value,
            } => vec![variable_use.clone(), value.clone()],
            PhraseRepr::Reference { variable_use } => vec![variable_use.clone()],
            PhraseRepr::Send {
                arguments, tokens, ..
            } => {
                let mut out = vec![arguments.clone()];
                out.extend(tokens.iter().cloned());
                out
            }
            PhraseRepr::MacroSubstitution {
                original,
                replacement,
            } => vec![original.clone(), replacement.clone()],
            PhraseRepr::Block {
                arguments,
                statements,
                return_type,
            } => {
                let mut out = arguments.clone();
                out.extend(statements.iter().cloned());
                out.push(return_type.clone());
                out
            }
        }
    }

    /// The name token of a declaration.
    pub fn declaration_token_text(&self) -> Option<String> {
        match self {
            PhraseRepr::Declaration { token, .. } => token.as_token().map(|t| t.text.clone()),
            _ => None,
        }
    }
}

/// `expression_type` of a phrase object.
pub fn phrase_expression_type(phrase: &AvailObject) -> AvailObject {
    match phrase.as_phrase() {
        Some(p) => p.expression_type(),
        None => types::bottom_type(),
    }
}

fn declaration_type(declaration: &AvailObject) -> AvailObject {
    match declaration.as_phrase().as_deref() {
        Some(PhraseRepr::Declaration { declared_type, .. }) => declared_type.clone(),
        _ => types::bottom_type(),
    }
}

pub fn phrases_equal(a: &PhraseRepr, b: &PhraseRepr) -> bool {
    use PhraseRepr::*;
    match (a, b) {
        (Literal { token: t1 }, Literal { token: t2 }) => t1.equals(t2),
        (List { expressions: e1 }, List { expressions: e2 }) => {
            e1.len() == e2.len() && e1.iter().zip(e2).all(|(x, y)| x.equals(y))
        }
        (
            PermutedList {
                list: l1,
                permutation: p1,
            },
            PermutedList {
                list: l2,
                permutation: p2,
            },
        ) => p1 == p2 && l1.equals(l2),
        (
            VariableUse {
                declaration: d1,
                token: t1,
            },
            VariableUse {
                declaration: d2,
                token: t2,
            },
        ) => d1.equals(d2) && t1.equals(t2),
        (
            Declaration {
                kind: k1,
                token: t1,
                declared_type: ty1,
                initializer: i1,
            },
            Declaration {
                kind: k2,
                token: t2,
                declared_type: ty2,
                initializer: i2,
            },
        ) => {
            k1 == k2
                && t1.equals(t2)
                && ty1.equals(ty2)
                && match (i1, i2) {
                    (None, None) => true,
                    (Some(x), Some(y)) => x.equals(y),
                    _ => false,
                }
        }
        (
            Assignment {
                variable_use: v1,
                value: x1,
            },
            Assignment {
                variable_use: v2,
                value: x2,
            },
        ) => v1.equals(v2) && x1.equals(x2),
        (Reference { variable_use: v1 }, Reference { variable_use: v2 }) => v1.equals(v2),
        (
            Send {
                bundle: b1,
                arguments: a1,
                ..
            },
            Send {
                bundle: b2,
                arguments: a2,
                ..
            },
        ) => b1 == b2 && a1.equals(a2),
        (
            MacroSubstitution {
                original: o1,
                replacement: r1,
            },
            MacroSubstitution {
                original: o2,
                replacement: r2,
            },
        ) => o1.equals(o2) && r1.equals(r2),
        (
            Block {
                arguments: a1,
                statements: s1,
                return_type: r1,
            },
            Block {
                arguments: a2,
                statements: s2,
                return_type: r2,
            },
        ) => {
            a1.len() == a2.len()
                && s1.len() == s2.len()
                && a1.iter().zip(a2).all(|(x, y)| x.equals(y))
                && s1.iter().zip(s2).all(|(x, y)| x.equals(y))
                && r1.equals(r2)
        }
        _ => false,
    }
}

pub fn hash_phrase(phrase: &PhraseRepr) -> u32 {
    let seed = hashing::scramble(phrase.phrase_kind() as u32 ^ 0x5048_5221);
    let children = phrase.children();
    let body = hashing::hash_of_elements(
        children
            .iter()
            .map(|c| c.hash())
            .collect::<Vec<_>>()
            .into_iter(),
    );
    seed.wrapping_add(body)
}

// ----------------------------------------------------------------------
// Constructors
// ----------------------------------------------------------------------

pub fn phrase_object(repr: PhraseRepr) -> AvailObject {
    AvailObject::new(Repr::Phrase(Arc::new(repr)))
}

/// A literal phrase around an existing literal token.
pub fn literal_phrase_from_token(token: AvailObject) -> AvailObject {
    phrase_object(PhraseRepr::Literal { token })
}

/// A synthetic literal phrase around a value (builds the token).
pub fn literal_phrase(value: AvailObject, text: impl Into<String>) -> AvailObject {
    let token = crate::token::token_object(crate::token::TokenData::literal(
        text.into(),
        0,
        0,
        value,
    ));
    phrase_object(PhraseRepr::Literal { token })
}

pub fn list_phrase(expressions: Vec<AvailObject>) -> AvailObject {
    phrase_object(PhraseRepr::List { expressions })
}

/// Elements of a list phrase (resolving one level of permutation).
pub fn list_phrase_expressions(phrase: &AvailObject) -> Vec<AvailObject> {
    match phrase.as_phrase().as_deref() {
        Some(PhraseRepr::List { expressions }) => expressions.clone(),
        Some(PhraseRepr::PermutedList { list, permutation }) => {
            let inner = list_phrase_expressions(list);
            permutation.iter().map(|i| inner[*i - 1].clone()).collect()
        }
        _ => Vec::new(),
    }
}

pub(crate) fn format_phrase(phrase: &PhraseRepr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match phrase {
        PhraseRepr::Literal { token } => match token.as_token().and_then(|t| t.literal.clone()) {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "<literal>"),
        },
        PhraseRepr::List { expressions } => {
            write!(f, "list(")?;
            for (i, e) in expressions.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", e)?;
            }
            write!(f, ")")
        }
        PhraseRepr::PermutedList { list, permutation } => {
            write!(f, "permuted{:?}{}", permutation, list)
        }
        PhraseRepr::VariableUse { token, .. } => match token.as_token() {
            Some(t) => write!(f, "{}", t.text),
            None => write!(f, "<use>"),
        },
        PhraseRepr::Declaration { kind, token, .. } => {
            let name = token.as_token().map(|t| t.text.clone()).unwrap_or_default();
            write!(f, "{:?} {}", kind, name)
        }
        PhraseRepr::Assignment {
            variable_use,
            value,
        } => write!(f, "{} := {}", variable_use, value),
        PhraseRepr::Reference { variable_use } => write!(f, "↑{}", variable_use),
        PhraseRepr::Send {
            message, arguments, ..
        } => write!(f, "{}{}", message, arguments),
        PhraseRepr::MacroSubstitution { replacement, .. } => write!(f, "{}", replacement),
        PhraseRepr::Block { statements, .. } => {
            write!(f, "[")?;
            for (i, s) in statements.iter().enumerate() {
                if i > 0 {
                    write!(f, "; ")?;
                }
                write!(f, "{}", s)?;
            }
            write!(f, "]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_hierarchy() {
        assert!(PhraseKind::LiteralPhrase.is_subkind_of(PhraseKind::ExpressionPhrase));
        assert!(PhraseKind::LiteralPhrase.is_subkind_of(PhraseKind::ParsePhrase));
        assert!(!PhraseKind::LiteralPhrase.is_subkind_of(PhraseKind::StatementPhrase));
        assert!(PhraseKind::PermutedListPhrase.is_subkind_of(PhraseKind::ListPhrase));
        assert!(
            PhraseKind::LocalConstantPhrase.is_subkind_of(PhraseKind::DeclarationPhrase)
        );
        assert_eq!(
            PhraseKind::LiteralPhrase.common_ancestor(PhraseKind::SendPhrase),
            PhraseKind::ExpressionPhrase
        );
        assert_eq!(
            PhraseKind::LiteralPhrase.common_ancestor(PhraseKind::DeclarationPhrase),
            PhraseKind::ParsePhrase
        );
    }

    #[test]
    fn test_literal_phrase_type_is_instance_type() {
        let p = literal_phrase(AvailObject::from_i64(3), "3");
        let ty = phrase_expression_type(&p);
        assert!(AvailObject::from_i64(3).is_instance_of(&ty));
        assert!(!AvailObject::from_i64(4).is_instance_of(&ty));
    }

    #[test]
    fn test_list_phrase_type_is_tuple_type() {
        let p = list_phrase(vec![
            literal_phrase(AvailObject::from_i64(1), "1"),
            literal_phrase(crate::tuple::string_from_str("x"), "\"x\""),
        ]);
        let ty = phrase_expression_type(&p);
        let value = crate::tuple::tuple_from_objects(vec![
            AvailObject::from_i64(1),
            crate::tuple::string_from_str("x"),
        ]);
        assert!(value.is_instance_of(&ty));
    }

    #[test]
    fn test_permuted_list_reorders() {
        let list = list_phrase(vec![
            literal_phrase(AvailObject::from_i64(10), "10"),
            literal_phrase(AvailObject::from_i64(20), "20"),
        ]);
        let permuted = phrase_object(PhraseRepr::PermutedList {
            list,
            permutation: vec![2, 1],
        });
        let exprs = list_phrase_expressions(&permuted);
        let first = exprs[0].as_phrase().unwrap();
        match &*first {
            PhraseRepr::Literal { token } => {
                let v = token.as_token().unwrap().literal.clone().unwrap();
                assert_eq!(v.as_i64(), Some(20));
            }
            _ => panic!("expected literal"),
        }
    }

    #[test]
    fn test_structural_equality() {
        let a = literal_phrase(AvailObject::from_i64(5), "5");
        let b = literal_phrase(AvailObject::from_i64(5), "5");
        assert!(a.equals(&b));
        assert_eq!(a.hash(), b.hash());
    }
}
