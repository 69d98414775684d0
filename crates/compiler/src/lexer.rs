//! Lexing
//!
//! The lexer set is extensible: each lexer owns a per-character filter and
//! a body that may produce any number of candidate tokens of varying
//! lengths at a position. Several lexers may accept the same leading
//! character, and each may return several tokens, so scanning a position
//! yields a *set* of candidates; the parser forks across them.
//!
//! The bootstrap lexers (whitespace, comments, keywords, operators, whole
//! numbers, string literals) are native. User lexers installed by the
//! `lexer=` pragma run their filter and body functions in fibers.

use avail_core::object::AvailObject;
use avail_core::token::{token_object, TokenData, TokenKind};
use avail_core::tuple::string_from_str;
use avail_runtime::fiber::{EvalOutcome, Fiber};
use avail_runtime::runtime::Runtime;
use avail_core::types;
use num_bigint::BigInt;
use std::sync::{Arc, RwLock};

/// A position in the source: character offset plus 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LexingState {
    pub source: Arc<str>,
    pub position: usize,
    pub line: u32,
}

impl LexingState {
    pub fn start(source: Arc<str>) -> LexingState {
        LexingState {
            source,
            position: 0,
            line: 1,
        }
    }

    pub fn rest(&self) -> &str {
        &self.source[self.position..]
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.source.len()
    }

    fn advanced_over(&self, text: &str) -> LexingState {
        LexingState {
            source: Arc::clone(&self.source),
            position: self.position + text.len(),
            line: self.line + text.matches('\n').count() as u32,
        }
    }
}

/// One candidate token and the state after it.
pub struct ScannedToken {
    pub token: AvailObject,
    pub after: LexingState,
}

type NativeBody = fn(&LexingState, char) -> Vec<ScannedToken>;

#[derive(Clone)]
pub enum LexerFilter {
    Native(fn(char) -> bool),
    /// In-language filter: char -> boolean, run in a fiber.
    Function(AvailObject),
}

#[derive(Clone)]
pub enum LexerBody {
    Native(NativeBody),
    /// In-language body: (source, position, line) -> tuple of token
    /// strings, run in a fiber. Each string becomes a keyword token.
    Function(AvailObject),
}

#[derive(Clone)]
pub struct LexerDef {
    pub name: String,
    pub filter: LexerFilter,
    pub body: LexerBody,
}

/// The bootstrap lexer set every module starts from.
pub fn bootstrap_lexers() -> Vec<LexerDef> {
    vec![
        LexerDef {
            name: "whitespace lexer".to_string(),
            filter: LexerFilter::Native(|c| c.is_whitespace()),
            body: LexerBody::Native(whitespace_body),
        },
        LexerDef {
            name: "comment lexer".to_string(),
            filter: LexerFilter::Native(|c| c == '/'),
            body: LexerBody::Native(comment_body),
        },
        LexerDef {
            name: "whole number lexer".to_string(),
            filter: LexerFilter::Native(|c| c.is_ascii_digit()),
            body: LexerBody::Native(whole_number_body),
        },
        LexerDef {
            name: "string literal lexer".to_string(),
            filter: LexerFilter::Native(|c| c == '"'),
            body: LexerBody::Native(string_literal_body),
        },
        LexerDef {
            name: "keyword lexer".to_string(),
            filter: LexerFilter::Native(|c| c.is_alphabetic()),
            body: LexerBody::Native(keyword_body),
        },
        LexerDef {
            name: "operator lexer".to_string(),
            filter: LexerFilter::Native(|c| {
                !c.is_alphanumeric() && !c.is_whitespace() && c != '"'
            }),
            body: LexerBody::Native(operator_body),
        },
    ]
}

/// Native lexer pairs reachable from `lexer=FILTER,BODY=name` pragmas.
pub fn native_lexer(filter_name: &str, body_name: &str) -> Option<LexerDef> {
    bootstrap_lexers()
        .into_iter()
        .find(|lexer| {
            let base = lexer.name.trim_end_matches(" lexer").replace(' ', "");
            filter_name
                .to_lowercase()
                .contains(&base.to_lowercase())
                && body_name.to_lowercase().contains(&base.to_lowercase())
        })
}

// ----------------------------------------------------------------------
// Native bodies
// ----------------------------------------------------------------------

fn whitespace_body(state: &LexingState, _leading: char) -> Vec<ScannedToken> {
    let text: String = state.rest().chars().take_while(|c| c.is_whitespace()).collect();
    single(state, TokenKind::Whitespace, text)
}

fn comment_body(state: &LexingState, _leading: char) -> Vec<ScannedToken> {
    let rest = state.rest();
    if rest.starts_with("/*") {
        // Nested block comments, as in the source language.
        let mut depth = 0usize;
        let mut end = None;
        let bytes: Vec<char> = rest.chars().collect();
        let mut i = 0;
        while i + 1 < bytes.len() {
            if bytes[i] == '/' && bytes[i + 1] == '*' {
                depth += 1;
                i += 2;
            } else if bytes[i] == '*' && bytes[i + 1] == '/' {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            } else {
                i += 1;
            }
        }
        if let Some(end) = end {
            let text: String = bytes[..end].iter().collect();
            return single(state, TokenKind::Comment, text);
        }
        return Vec::new();
    }
    if rest.starts_with("//") {
        let text: String = rest.chars().take_while(|c| *c != '\n').collect();
        return single(state, TokenKind::Comment, text);
    }
    Vec::new()
}

fn whole_number_body(state: &LexingState, _leading: char) -> Vec<ScannedToken> {
    let text: String = state
        .rest()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let value = text
        .parse::<BigInt>()
        .expect("digit run failed to parse as an integer");
    let token = TokenData::literal(
        text.clone(),
        state.position,
        state.line,
        AvailObject::from_bigint(value),
    );
    vec![ScannedToken {
        token: token_object(token),
        after: state.advanced_over(&text),
    }]
}

fn string_literal_body(state: &LexingState, _leading: char) -> Vec<ScannedToken> {
    let rest = state.rest();
    let mut chars = rest.char_indices().skip(1).peekable();
    let mut value = String::new();
    while let Some((index, c)) = chars.next() {
        match c {
            '"' => {
                let text = &rest[..index + c.len_utf8()];
                let token = TokenData::literal(
                    text.to_string(),
                    state.position,
                    state.line,
                    string_from_str(&value),
                );
                return vec![ScannedToken {
                    token: token_object(token),
                    after: state.advanced_over(text),
                }];
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, 't')) => value.push('\t'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => value.push(other),
                None => return Vec::new(),
            },
            other => value.push(other),
        }
    }
    // Unclosed string literal: no token; the parser's expectations will
    // point at this position.
    Vec::new()
}

fn keyword_body(state: &LexingState, _leading: char) -> Vec<ScannedToken> {
    let text: String = state
        .rest()
        .chars()
        .take_while(|c| c.is_alphanumeric())
        .collect();
    single(state, TokenKind::Keyword, text)
}

fn operator_body(state: &LexingState, leading: char) -> Vec<ScannedToken> {
    // One operator character per token; runs like `++` are two sends.
    single(state, TokenKind::Operator, leading.to_string())
}

fn single(state: &LexingState, kind: TokenKind, text: String) -> Vec<ScannedToken> {
    if text.is_empty() {
        return Vec::new();
    }
    let token = TokenData::new(kind, text.clone(), state.position, state.line);
    vec![ScannedToken {
        token: token_object(token),
        after: state.advanced_over(&text),
    }]
}

// ----------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------

/// All candidate tokens at this position, consulting every lexer whose
/// filter accepts the leading character. Whitespace and comments are
/// produced like any other token; `next_significant_tokens` skips them.
pub fn all_tokens_at(
    state: &LexingState,
    lexers: &[LexerDef],
    runtime: &Arc<RwLock<Runtime>>,
) -> Vec<ScannedToken> {
    let Some(leading) = state.rest().chars().next() else {
        let token = TokenData::new(TokenKind::EndOfFile, "", state.position, state.line);
        return vec![ScannedToken {
            token: token_object(token),
            after: state.clone(),
        }];
    };
    let mut candidates = Vec::new();
    for lexer in lexers {
        let accepted = match &lexer.filter {
            LexerFilter::Native(filter) => filter(leading),
            LexerFilter::Function(function) => run_filter_function(function, leading, runtime),
        };
        if !accepted {
            continue;
        }
        match &lexer.body {
            LexerBody::Native(body) => candidates.extend(body(state, leading)),
            LexerBody::Function(function) => {
                candidates.extend(run_body_function(function, state, runtime))
            }
        }
    }
    candidates
}

/// Candidate tokens with whitespace and comments skipped (each skip is
/// deterministic: the longest whitespace/comment token wins).
pub fn next_significant_tokens(
    state: &LexingState,
    lexers: &[LexerDef],
    runtime: &Arc<RwLock<Runtime>>,
) -> Vec<ScannedToken> {
    let mut current = state.clone();
    loop {
        let candidates = all_tokens_at(&current, lexers, runtime);
        let skippable = candidates
            .iter()
            .filter(|c| {
                c.token
                    .as_token()
                    .map(|t| matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment))
                    .unwrap_or(false)
            })
            .max_by_key(|c| c.after.position);
        match skippable {
            Some(skip) if skip.after.position > current.position => {
                current = skip.after.clone();
            }
            _ => {
                return candidates
                    .into_iter()
                    .filter(|c| {
                        c.token
                            .as_token()
                            .map(|t| {
                                !matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment)
                            })
                            .unwrap_or(true)
                    })
                    .collect()
            }
        }
    }
}

fn run_filter_function(
    function: &AvailObject,
    leading: char,
    runtime: &Arc<RwLock<Runtime>>,
) -> bool {
    let fiber = Fiber::new_fiber(types::boolean_type(), 50);
    match fiber.run_now(
        runtime,
        None,
        function,
        vec![AvailObject::character(leading)],
    ) {
        EvalOutcome::Returned(value) => {
            avail_core::atom::as_boolean(&value).unwrap_or(false)
        }
        _ => false,
    }
}

fn run_body_function(
    function: &AvailObject,
    state: &LexingState,
    runtime: &Arc<RwLock<Runtime>>,
) -> Vec<ScannedToken> {
    let fiber = Fiber::new_fiber(types::most_general_tuple_type(), 50);
    let outcome = fiber.run_now(
        runtime,
        None,
        function,
        vec![
            string_from_str(&state.source),
            AvailObject::from_i64(state.position as i64 + 1),
            AvailObject::from_i64(state.line as i64),
        ],
    );
    let EvalOutcome::Returned(tuple) = outcome else {
        return Vec::new();
    };
    if !tuple.is_tuple() {
        return Vec::new();
    }
    avail_core::tuple::tuple_iter(&tuple)
        .filter_map(|element| {
            let text = element.as_string()?;
            if !state.rest().starts_with(&text) {
                return None;
            }
            let token = TokenData::new(
                TokenKind::Keyword,
                text.clone(),
                state.position,
                state.line,
            );
            Some(ScannedToken {
                token: token_object(token),
                after: state.advanced_over(&text),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(source: &str) -> Vec<(TokenKind, String)> {
        let runtime = Arc::new(RwLock::new(Runtime::new()));
        let lexers = bootstrap_lexers();
        let mut state = LexingState::start(Arc::from(source));
        let mut out = Vec::new();
        loop {
            let candidates = next_significant_tokens(&state, &lexers, &runtime);
            let first = candidates
                .into_iter()
                .next()
                .expect("no token candidates at position");
            let data = first.token.as_token().unwrap();
            if data.kind == TokenKind::EndOfFile {
                return out;
            }
            out.push((data.kind, data.text.clone()));
            state = first.after;
        }
    }

    #[test]
    fn test_keywords_numbers_operators() {
        let tokens = scan_all("x = 1 + 23;");
        let texts: Vec<&str> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["x", "=", "1", "+", "23", ";"]);
        assert_eq!(tokens[0].0, TokenKind::Keyword);
        assert_eq!(tokens[1].0, TokenKind::Operator);
        assert_eq!(tokens[2].0, TokenKind::Literal);
    }

    #[test]
    fn test_string_literal_with_escapes() {
        let runtime = Arc::new(RwLock::new(Runtime::new()));
        let lexers = bootstrap_lexers();
        let state = LexingState::start(Arc::from("\"a\\nb\" rest"));
        let candidates = next_significant_tokens(&state, &lexers, &runtime);
        let data = candidates[0].token.as_token().unwrap();
        assert_eq!(data.kind, TokenKind::Literal);
        let value = data.literal.clone().unwrap();
        assert_eq!(value.as_string().unwrap(), "a\nb");
    }

    #[test]
    fn test_unclosed_string_yields_nothing() {
        let runtime = Arc::new(RwLock::new(Runtime::new()));
        let lexers = bootstrap_lexers();
        let state = LexingState::start(Arc::from("\"never ends"));
        let candidates = next_significant_tokens(&state, &lexers, &runtime);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = scan_all("a /* skip /* nested */ this */ b // line\nc");
        let texts: Vec<&str> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_line_tracking() {
        let runtime = Arc::new(RwLock::new(Runtime::new()));
        let lexers = bootstrap_lexers();
        let mut state = LexingState::start(Arc::from("a\nbb"));
        loop {
            let candidates = next_significant_tokens(&state, &lexers, &runtime);
            let data = candidates[0].token.as_token().unwrap();
            if data.text == "bb" {
                assert_eq!(data.line, 2);
                break;
            }
            assert_ne!(data.kind, TokenKind::EndOfFile, "never saw 'bb'");
            state = candidates.into_iter().next().unwrap().after;
        }
    }

    #[test]
    fn test_whole_number_token_value() {
        let tokens = scan_all("12345678901234567890123");
        assert_eq!(tokens.len(), 1);
        // The value is exact despite exceeding machine words; checked via
        // the literal's printed form.
        let runtime = Arc::new(RwLock::new(Runtime::new()));
        let lexers = bootstrap_lexers();
        let state = LexingState::start(Arc::from("12345678901234567890123"));
        let candidates = next_significant_tokens(&state, &lexers, &runtime);
        let value = candidates[0]
            .token
            .as_token()
            .unwrap()
            .literal
            .clone()
            .unwrap();
        assert_eq!(value.to_string(), "12345678901234567890123");
    }
}
