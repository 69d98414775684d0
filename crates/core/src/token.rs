//! Tokens
//!
//! Tokens are objects because phrases carry them (a literal phrase wraps a
//! literal token; a send phrase records the keyword tokens that spelled
//! it). A token knows its spelling, its position, and, for literals, the
//! value it denotes.

use crate::hashing;
use crate::object::{AvailObject, Repr};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// An identifier-shaped word.
    Keyword,
    /// A single operator character.
    Operator,
    /// A literal with an attached value (string, whole number, ...).
    Literal,
    Comment,
    Whitespace,
    EndOfFile,
}

#[derive(Debug)]
pub struct TokenData {
    pub kind: TokenKind,
    /// The exact source spelling.
    pub text: String,
    /// Zero-based character position in the source.
    pub start: usize,
    /// One-based line number.
    pub line: u32,
    /// The denoted value, for `TokenKind::Literal`.
    pub literal: Option<AvailObject>,
}

impl TokenData {
    pub fn new(kind: TokenKind, text: impl Into<String>, start: usize, line: u32) -> TokenData {
        TokenData {
            kind,
            text: text.into(),
            start,
            line,
            literal: None,
        }
    }

    pub fn literal(
        text: impl Into<String>,
        start: usize,
        line: u32,
        value: AvailObject,
    ) -> TokenData {
        TokenData {
            kind: TokenKind::Literal,
            text: text.into(),
            start,
            line,
            literal: Some(value),
        }
    }

    pub fn equals(&self, other: &TokenData) -> bool {
        self.kind == other.kind
            && self.text == other.text
            && self.start == other.start
            && self.line == other.line
            && match (&self.literal, &other.literal) {
                (None, None) => true,
                (Some(a), Some(b)) => a.equals(b),
                _ => false,
            }
    }

    pub fn hash(&self) -> u32 {
        let mut h = hashing::scramble(self.kind as u32 ^ 0x70_4E00);
        h = h
            .wrapping_mul(hashing::MULTIPLIER)
            .wrapping_add(hashing::hash_of_elements(
                self.text
                    .chars()
                    .map(|c| crate::character::hash_code_point(c as u32))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ));
        h = h
            .wrapping_mul(hashing::MULTIPLIER)
            .wrapping_add(self.start as u32);
        if let Some(value) = &self.literal {
            h = h.wrapping_mul(hashing::MULTIPLIER).wrapping_add(value.hash());
        }
        h
    }

    pub fn children(&self) -> Vec<AvailObject> {
        self.literal.iter().cloned().collect()
    }
}

/// Wrap token data into an object.
pub fn token_object(data: TokenData) -> AvailObject {
    AvailObject::new(Repr::Token(Arc::new(data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_tokens_hash_equal() {
        let a = TokenData::new(TokenKind::Keyword, "If", 4, 1);
        let b = TokenData::new(TokenKind::Keyword, "If", 4, 1);
        assert!(a.equals(&b));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_position_distinguishes_tokens() {
        let a = TokenData::new(TokenKind::Keyword, "If", 4, 1);
        let b = TokenData::new(TokenKind::Keyword, "If", 9, 1);
        assert!(!a.equals(&b));
    }

    #[test]
    fn test_literal_token_carries_value() {
        let t = TokenData::literal("42", 0, 1, AvailObject::from_i64(42));
        assert!(t.literal.as_ref().unwrap().equals(&AvailObject::from_i64(42)));
        let obj = token_object(t);
        assert!(obj.as_token().is_some());
    }
}
