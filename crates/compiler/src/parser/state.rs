//! Parser states
//!
//! A parser state is a lexing position plus an immutable client-data map:
//! the scope chain of visible declarations, and whatever prefix functions
//! have hung off well-known keys. Two states are interchangeable for
//! memoization exactly when position and client data agree, which is what
//! lets the fragment cache rendezvous solutions with consumers.

use crate::lexer::LexingState;
use avail_core::atom;
use avail_core::map::AvailMap;
use avail_core::object::AvailObject;
use avail_core::phrase::PhraseRepr;
use std::sync::{Arc, OnceLock};

/// Key into client data holding the scope map (name string -> declaration
/// phrase).
pub fn scope_key() -> AvailObject {
    static KEY: OnceLock<AvailObject> = OnceLock::new();
    KEY.get_or_init(|| atom::create_atom("compiler scope map").make_shared())
        .clone()
}

#[derive(Clone)]
pub struct ParserState {
    pub lexing: LexingState,
    pub client_data: AvailMap,
}

impl ParserState {
    pub fn start(source: Arc<str>) -> ParserState {
        ParserState {
            lexing: LexingState::start(source),
            client_data: AvailMap::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.lexing.position
    }

    pub fn line(&self) -> u32 {
        self.lexing.line
    }

    pub fn at_end(&self) -> bool {
        self.lexing.at_end()
    }

    pub fn with_lexing(&self, lexing: LexingState) -> ParserState {
        ParserState {
            lexing,
            client_data: self.client_data.clone(),
        }
    }

    pub fn with_client_data(&self, client_data: AvailMap) -> ParserState {
        ParserState {
            lexing: self.lexing.clone(),
            client_data,
        }
    }

    /// Memoization identity.
    pub fn same_state(&self, other: &ParserState) -> bool {
        self.lexing.position == other.lexing.position
            && self.client_data.equals(&other.client_data)
    }

    /// Key for the fragment cache: position plus client-data hash. Hash
    /// collisions are disambiguated by `same_state` at the entry.
    pub fn cache_fingerprint(&self) -> (usize, u32) {
        (self.lexing.position, self.client_data.hash())
    }

    // ------------------------------------------------------------------
    // Scope access
    // ------------------------------------------------------------------

    fn scope_map(&self) -> AvailMap {
        self.client_data
            .get(&scope_key())
            .and_then(|m| m.as_map())
            .unwrap_or_default()
    }

    /// The declaration phrase a name denotes here, if any.
    pub fn lookup_declaration(&self, name: &str) -> Option<AvailObject> {
        self.scope_map()
            .get(&avail_core::tuple::string_from_str(name))
    }

    /// A state with one more declaration in scope.
    pub fn with_declaration(&self, declaration: AvailObject) -> ParserState {
        let Some(phrase) = declaration.as_phrase() else {
            return self.clone();
        };
        let Some(name) = declaration_name(&phrase) else {
            return self.clone();
        };
        let scope = self
            .scope_map()
            .with(avail_core::tuple::string_from_str(&name), declaration.clone());
        let client_data = self
            .client_data
            .with(scope_key(), avail_core::map::map_object(scope));
        self.with_client_data(client_data)
    }

    /// All declarations currently in scope.
    pub fn declarations(&self) -> Vec<AvailObject> {
        self.scope_map().values()
    }
}

fn declaration_name(phrase: &PhraseRepr) -> Option<String> {
    phrase.declaration_token_text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use avail_core::phrase::{phrase_object, DeclarationKind};
    use avail_core::token::{token_object, TokenData, TokenKind};
    use avail_core::types;

    fn declaration(name: &str) -> AvailObject {
        phrase_object(PhraseRepr::Declaration {
            kind: DeclarationKind::LocalConstant,
            token: token_object(TokenData::new(TokenKind::Keyword, name, 0, 1)),
            declared_type: types::integer_type(),
            initializer: None,
        })
    }

    #[test]
    fn test_scope_lookup() {
        let state = ParserState::start(Arc::from("source"));
        assert!(state.lookup_declaration("x").is_none());
        let extended = state.with_declaration(declaration("x"));
        assert!(extended.lookup_declaration("x").is_some());
        // The original state is unchanged (immutable client data).
        assert!(state.lookup_declaration("x").is_none());
    }

    #[test]
    fn test_same_state_requires_equal_client_data() {
        let a = ParserState::start(Arc::from("source"));
        let b = ParserState::start(Arc::from("source"));
        assert!(a.same_state(&b));
        let extended = a.with_declaration(declaration("x"));
        assert!(!extended.same_state(&b));
        // Equal-by-content client data memoizes, identity is irrelevant.
        let extended2 = b.with_declaration(declaration("x"));
        assert!(extended.same_state(&extended2));
        assert_eq!(extended.cache_fingerprint(), extended2.cache_fingerprint());
    }
}
