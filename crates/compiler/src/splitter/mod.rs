//! The message splitter
//!
//! Compiles a method name like `"_+_"`, `"If_then_else_"`, or `"«_‡,»"`
//! into a program of parsing instructions. The name's metacharacters:
//!
//! - `_`  argument; `_!` top-valued argument; `_↑` variable reference;
//!   `_#` argument parsed in module scope
//! - `…`  raw keyword token; `…!` any raw token; `…#` raw whole-number
//!   literal; `…$` raw string literal
//! - `«…»` group (repetition); `«L‡R»` repetition of L separated by R
//! - `?` after a group: optional; `#` after a group: counted
//! - `⁇` after a keyword: case-insensitive
//! - `§` section checkpoint (runs the macro's next prefix function)
//! - backquote escapes the following character into the current part
//!
//! Everything else (alphanumeric runs, single operator characters) is a
//! part the parser must match literally.

pub mod instruction;

use avail_core::BundleId;
pub use instruction::{ConversionRule, ParsingOperation};

/// The compiled form of a message name.
#[derive(Debug, Clone)]
pub struct SplitMessage {
    pub message: String,
    /// Keyword/operator parts, referenced 1-based by `ParsePart`.
    pub parts: Vec<String>,
    pub operations: Vec<ParsingOperation>,
    /// Top-level argument positions (underscores, raw tokens, groups).
    pub num_args: usize,
    /// Number of `§` checkpoints (prefix functions a macro must supply).
    pub num_prefix_functions: usize,
}

impl SplitMessage {
    /// Integer encoding stored on the bundle.
    pub fn encoded(&self) -> Vec<i64> {
        self.operations.iter().map(|op| op.encode()).collect()
    }
}

/// Split a message name, compiling its parsing program for `bundle`.
pub fn split(message: &str, bundle: BundleId) -> Result<SplitMessage, String> {
    let tokens = tokenize(message)?;
    let mut parser = MessageParser {
        message,
        tokens,
        position: 0,
    };
    let sequence = parser.parse_sequence(true)?;
    if parser.position < parser.tokens.len() {
        return Err(format!(
            "message \"{message}\": unexpected '{}' outside any group",
            parser.tokens[parser.position].describe()
        ));
    }
    if sequence.is_empty() {
        return Err(format!("message \"{message}\" is empty"));
    }
    let mut emitter = Emitter::new(bundle);
    emitter.emit(ParsingOperation::EmptyList);
    for expr in &sequence {
        emitter.emit_element(expr, true)?;
    }
    if emitter.parts.is_empty() {
        return Err(format!(
            "message \"{message}\" has no keyword or operator parts to anchor parsing"
        ));
    }
    Ok(SplitMessage {
        message: message.to_string(),
        parts: emitter.parts,
        operations: emitter.operations,
        num_args: emitter.top_level_args,
        num_prefix_functions: emitter.prefix_functions,
    })
}

// ----------------------------------------------------------------------
// Tokenizing the message itself
// ----------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum MessageToken {
    Part(String),
    Underscore,
    Ellipsis,
    OpenGuillemet,
    CloseGuillemet,
    DoubleDagger,
    Section,
    Question,
    Hash,
    Bang,
    DoubleQuestion,
    UpArrow,
    Dollar,
}

impl MessageToken {
    fn describe(&self) -> String {
        match self {
            MessageToken::Part(text) => text.clone(),
            MessageToken::Underscore => "_".to_string(),
            MessageToken::Ellipsis => "…".to_string(),
            MessageToken::OpenGuillemet => "«".to_string(),
            MessageToken::CloseGuillemet => "»".to_string(),
            MessageToken::DoubleDagger => "‡".to_string(),
            MessageToken::Section => "§".to_string(),
            MessageToken::Question => "?".to_string(),
            MessageToken::Hash => "#".to_string(),
            MessageToken::Bang => "!".to_string(),
            MessageToken::DoubleQuestion => "⁇".to_string(),
            MessageToken::UpArrow => "↑".to_string(),
            MessageToken::Dollar => "$".to_string(),
        }
    }
}

fn tokenize(message: &str) -> Result<Vec<MessageToken>, String> {
    let mut tokens = Vec::new();
    let mut part = String::new();
    let mut chars = message.chars().peekable();
    let mut flush = |part: &mut String, tokens: &mut Vec<MessageToken>| {
        if !part.is_empty() {
            tokens.push(MessageToken::Part(std::mem::take(part)));
        }
    };
    while let Some(c) = chars.next() {
        match c {
            '`' => match chars.next() {
                Some(escaped) => part.push(escaped),
                None => {
                    return Err(format!(
                        "message \"{message}\": dangling backquote at end"
                    ))
                }
            },
            '_' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Underscore);
            }
            '…' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Ellipsis);
            }
            '«' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::OpenGuillemet);
            }
            '»' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::CloseGuillemet);
            }
            '‡' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::DoubleDagger);
            }
            '§' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Section);
            }
            '?' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Question);
            }
            '#' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Hash);
            }
            '!' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Bang);
            }
            '⁇' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::DoubleQuestion);
            }
            '↑' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::UpArrow);
            }
            '$' => {
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Dollar);
            }
            c if c.is_whitespace() => flush(&mut part, &mut tokens),
            c if c.is_alphanumeric() => part.push(c),
            c => {
                // A lone operator character is its own part.
                flush(&mut part, &mut tokens);
                tokens.push(MessageToken::Part(c.to_string()));
            }
        }
    }
    flush(&mut part, &mut tokens);
    Ok(tokens)
}

// ----------------------------------------------------------------------
// The expression tree between tokens and instructions
// ----------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgumentKind {
    Ordinary,
    TopValued,
    VariableReference,
    ModuleScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawTokenKind {
    Any,
    Keyword,
    StringLiteral,
    WholeNumberLiteral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupSuffix {
    None,
    Optional,
    Counting,
}

#[derive(Debug, Clone)]
enum Expr {
    Part {
        text: String,
        case_insensitive: bool,
    },
    Argument(ArgumentKind),
    RawToken(RawTokenKind),
    Group {
        left: Vec<Expr>,
        separator: Option<Vec<Expr>>,
        suffix: GroupSuffix,
    },
    Section,
}

impl Expr {
    /// Does this element contribute one argument to the enclosing list?
    fn produces_argument(&self) -> bool {
        matches!(
            self,
            Expr::Argument(_) | Expr::RawToken(_) | Expr::Group { .. }
        )
    }
}

struct MessageParser<'a> {
    message: &'a str,
    tokens: Vec<MessageToken>,
    position: usize,
}

impl MessageParser<'_> {
    fn peek(&self) -> Option<&MessageToken> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<MessageToken> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat(&mut self, expected: &MessageToken) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Parse until end (top level) or a group terminator.
    fn parse_sequence(&mut self, top_level: bool) -> Result<Vec<Expr>, String> {
        let mut sequence = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                MessageToken::CloseGuillemet | MessageToken::DoubleDagger if !top_level => break,
                MessageToken::CloseGuillemet | MessageToken::DoubleDagger => {
                    return Err(format!(
                        "message \"{}\": '{}' outside any group",
                        self.message,
                        token.describe()
                    ));
                }
                _ => sequence.push(self.parse_element()?),
            }
        }
        Ok(sequence)
    }

    fn parse_element(&mut self) -> Result<Expr, String> {
        let token = self
            .advance()
            .ok_or_else(|| format!("message \"{}\": unexpected end", self.message))?;
        match token {
            MessageToken::Part(text) => {
                let case_insensitive = self.eat(&MessageToken::DoubleQuestion);
                Ok(Expr::Part {
                    text: if case_insensitive {
                        text.to_lowercase()
                    } else {
                        text
                    },
                    case_insensitive,
                })
            }
            MessageToken::Underscore => {
                if self.eat(&MessageToken::UpArrow) {
                    Ok(Expr::Argument(ArgumentKind::VariableReference))
                } else if self.eat(&MessageToken::Bang) {
                    Ok(Expr::Argument(ArgumentKind::TopValued))
                } else if self.eat(&MessageToken::Hash) {
                    Ok(Expr::Argument(ArgumentKind::ModuleScope))
                } else {
                    Ok(Expr::Argument(ArgumentKind::Ordinary))
                }
            }
            MessageToken::Ellipsis => {
                if self.eat(&MessageToken::Bang) {
                    Ok(Expr::RawToken(RawTokenKind::Any))
                } else if self.eat(&MessageToken::Hash) {
                    Ok(Expr::RawToken(RawTokenKind::WholeNumberLiteral))
                } else if self.eat(&MessageToken::Dollar) {
                    Ok(Expr::RawToken(RawTokenKind::StringLiteral))
                } else {
                    Ok(Expr::RawToken(RawTokenKind::Keyword))
                }
            }
            MessageToken::OpenGuillemet => {
                let left = self.parse_sequence(false)?;
                let separator = if self.eat(&MessageToken::DoubleDagger) {
                    Some(self.parse_sequence(false)?)
                } else {
                    None
                };
                if !self.eat(&MessageToken::CloseGuillemet) {
                    return Err(format!(
                        "message \"{}\": unterminated «group»",
                        self.message
                    ));
                }
                let suffix = if self.eat(&MessageToken::Question) {
                    GroupSuffix::Optional
                } else if self.eat(&MessageToken::Hash) {
                    GroupSuffix::Counting
                } else {
                    GroupSuffix::None
                };
                if let Some(separator) = &separator {
                    if separator.iter().any(Expr::produces_argument) {
                        return Err(format!(
                            "message \"{}\": a ‡separator may contain only keywords",
                            self.message
                        ));
                    }
                }
                if left.is_empty() {
                    return Err(format!("message \"{}\": empty «group»", self.message));
                }
                Ok(Expr::Group {
                    left,
                    separator,
                    suffix,
                })
            }
            MessageToken::Section => Ok(Expr::Section),
            other => Err(format!(
                "message \"{}\": unexpected '{}'",
                self.message,
                other.describe()
            )),
        }
    }
}

// ----------------------------------------------------------------------
// Emission
// ----------------------------------------------------------------------

struct Emitter {
    bundle: BundleId,
    parts: Vec<String>,
    operations: Vec<ParsingOperation>,
    top_level_args: usize,
    prefix_functions: usize,
}

impl Emitter {
    fn new(bundle: BundleId) -> Emitter {
        Emitter {
            bundle,
            parts: Vec::new(),
            operations: Vec::new(),
            top_level_args: 0,
            prefix_functions: 0,
        }
    }

    fn emit(&mut self, op: ParsingOperation) -> usize {
        self.operations.push(op);
        self.operations.len()
    }

    /// Emit a branch/jump with a target patched later.
    fn emit_placeholder(&mut self, branch: bool) -> usize {
        let index = self.operations.len();
        self.operations.push(if branch {
            ParsingOperation::Branch { target: 0 }
        } else {
            ParsingOperation::Jump { target: 0 }
        });
        index
    }

    /// Point the placeholder at the next instruction to be emitted.
    fn patch_to_here(&mut self, placeholder: usize) {
        let target = self.operations.len() + 1;
        self.operations[placeholder] = match self.operations[placeholder] {
            ParsingOperation::Branch { .. } => ParsingOperation::Branch { target },
            ParsingOperation::Jump { .. } => ParsingOperation::Jump { target },
            other => other,
        };
    }

    fn part_index(&mut self, text: &str) -> usize {
        self.parts.push(text.to_string());
        self.parts.len()
    }

    fn emit_element(&mut self, expr: &Expr, top_level: bool) -> Result<(), String> {
        match expr {
            Expr::Part {
                text,
                case_insensitive,
            } => {
                let part = self.part_index(text);
                self.emit(if *case_insensitive {
                    ParsingOperation::ParsePartCaseInsensitively { part }
                } else {
                    ParsingOperation::ParsePart { part }
                });
            }
            Expr::Argument(kind) => {
                self.emit(match kind {
                    ArgumentKind::Ordinary => ParsingOperation::ParseArgument,
                    ArgumentKind::TopValued => ParsingOperation::ParseTopValuedArgument,
                    ArgumentKind::VariableReference => ParsingOperation::ParseVariableReference,
                    ArgumentKind::ModuleScope => ParsingOperation::ParseArgumentInModuleScope,
                });
                if top_level {
                    let argument = self.top_level_args + 1;
                    self.emit(ParsingOperation::CheckArgument {
                        bundle: self.bundle,
                        argument,
                    });
                    self.emit(ParsingOperation::TypeCheckArgument {
                        bundle: self.bundle,
                        argument,
                    });
                }
                self.emit(ParsingOperation::AppendArgument);
                if top_level {
                    self.top_level_args += 1;
                }
            }
            Expr::RawToken(kind) => {
                self.emit(match kind {
                    RawTokenKind::Any => ParsingOperation::ParseAnyRawToken,
                    RawTokenKind::Keyword => ParsingOperation::ParseRawKeywordToken,
                    RawTokenKind::StringLiteral => ParsingOperation::ParseRawStringLiteralToken,
                    RawTokenKind::WholeNumberLiteral => {
                        ParsingOperation::ParseRawWholeNumberLiteralToken
                    }
                });
                self.emit(ParsingOperation::AppendArgument);
                if top_level {
                    self.top_level_args += 1;
                }
            }
            Expr::Section => {
                self.prefix_functions += 1;
                self.emit(ParsingOperation::PrepareToRunPrefixFunction);
                self.emit(ParsingOperation::RunPrefixFunction {
                    bundle: self.bundle,
                    index: self.prefix_functions,
                });
            }
            Expr::Group {
                left,
                separator,
                suffix,
            } => {
                self.emit_group(left, separator.as_deref(), *suffix)?;
                self.emit(ParsingOperation::AppendArgument);
                if top_level {
                    self.top_level_args += 1;
                }
            }
        }
        Ok(())
    }

    fn emit_group(
        &mut self,
        left: &[Expr],
        separator: Option<&[Expr]>,
        suffix: GroupSuffix,
    ) -> Result<(), String> {
        let inner_args = left.iter().filter(|e| e.produces_argument()).count();

        // `«keywords»?` with no inner arguments answers a boolean.
        if suffix == GroupSuffix::Optional && inner_args == 0 {
            let absent = self.emit_placeholder(true);
            for expr in left {
                self.emit_element(expr, false)?;
            }
            self.emit(ParsingOperation::PushLiteral { constant: 1 });
            let done = self.emit_placeholder(false);
            self.patch_to_here(absent);
            self.emit(ParsingOperation::PushLiteral { constant: 0 });
            self.patch_to_here(done);
            return Ok(());
        }

        // General repetition.
        self.emit(ParsingOperation::EmptyList);
        self.emit(ParsingOperation::SaveParsePosition);
        let mut exits = Vec::new();
        let loop_top = self.operations.len() + 1;
        exits.push(self.emit_placeholder(true));
        // One iteration. A single inner argument appends itself to the
        // group's list; several build a per-iteration sublist first; none
        // (pure keyword repetition) appends a marker so `#` can count.
        if inner_args > 1 {
            self.emit(ParsingOperation::EmptyList);
        }
        for expr in left {
            self.emit_element(expr, false)?;
        }
        if inner_args == 0 {
            self.emit(ParsingOperation::PushLiteral { constant: 1 });
        }
        if inner_args != 1 {
            self.emit(ParsingOperation::AppendArgument);
        }
        if let Some(separator) = separator {
            exits.push(self.emit_placeholder(true));
            for expr in separator {
                self.emit_element(expr, false)?;
            }
        }
        self.emit(ParsingOperation::EnsureParseProgress);
        self.emit(ParsingOperation::Jump { target: loop_top });
        for exit in exits {
            self.patch_to_here(exit);
        }
        self.emit(ParsingOperation::DiscardSavedParsePosition);
        match suffix {
            GroupSuffix::Counting => {
                self.emit(ParsingOperation::Convert {
                    rule: ConversionRule::ListToSize,
                });
            }
            GroupSuffix::Optional => {
                self.emit(ParsingOperation::CheckAtMost { limit: 1 });
            }
            GroupSuffix::None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_ok(message: &str) -> SplitMessage {
        split(message, BundleId(7)).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn test_binary_operator() {
        let s = split_ok("_+_");
        assert_eq!(s.parts, vec!["+"]);
        assert_eq!(s.num_args, 2);
        // EmptyList, arg1 (parse/check/type/append), "+", arg2, done.
        assert_eq!(s.operations[0], ParsingOperation::EmptyList);
        assert_eq!(s.operations[1], ParsingOperation::ParseArgument);
        assert!(matches!(
            s.operations[2],
            ParsingOperation::CheckArgument { argument: 1, .. }
        ));
        assert!(matches!(
            s.operations[3],
            ParsingOperation::TypeCheckArgument { argument: 1, .. }
        ));
        assert_eq!(s.operations[4], ParsingOperation::AppendArgument);
        assert_eq!(s.operations[5], ParsingOperation::ParsePart { part: 1 });
        assert_eq!(s.operations[6], ParsingOperation::ParseArgument);
    }

    #[test]
    fn test_keywords_split_into_parts() {
        let s = split_ok("If_then_else_");
        assert_eq!(s.parts, vec!["If", "then", "else"]);
        assert_eq!(s.num_args, 3);
    }

    #[test]
    fn test_case_insensitive_part() {
        let s = split_ok("If⁇_");
        assert_eq!(s.parts, vec!["if"]);
        assert!(matches!(
            s.operations[1],
            ParsingOperation::ParsePartCaseInsensitively { part: 1 }
        ));
    }

    #[test]
    fn test_group_with_separator() {
        let s = split_ok("«_‡,»");
        assert_eq!(s.parts, vec![","]);
        assert_eq!(s.num_args, 1);
        // The loop shape: a group list, a saved position, a fork that can
        // exit, and progress enforcement.
        assert!(s.operations.contains(&ParsingOperation::SaveParsePosition));
        assert!(s
            .operations
            .contains(&ParsingOperation::EnsureParseProgress));
        assert!(s
            .operations
            .contains(&ParsingOperation::DiscardSavedParsePosition));
        let branches = s
            .operations
            .iter()
            .filter(|op| matches!(op, ParsingOperation::Branch { .. }))
            .count();
        assert_eq!(branches, 2, "zero-iteration exit and post-element exit");
    }

    #[test]
    fn test_counting_group() {
        let s = split_ok("f«,»#");
        assert!(s.operations.contains(&ParsingOperation::Convert {
            rule: ConversionRule::ListToSize
        }));
        assert_eq!(s.num_args, 1);
    }

    #[test]
    fn test_boolean_optional_group() {
        let s = split_ok("close«forcefully»?");
        assert_eq!(s.num_args, 1);
        assert!(s
            .operations
            .contains(&ParsingOperation::PushLiteral { constant: 1 }));
        assert!(s
            .operations
            .contains(&ParsingOperation::PushLiteral { constant: 0 }));
    }

    #[test]
    fn test_raw_token_forms() {
        let s = split_ok("…=_");
        assert_eq!(s.operations[1], ParsingOperation::ParseRawKeywordToken);
        assert_eq!(s.num_args, 2);
        let s = split_ok("lit…#");
        assert!(s
            .operations
            .contains(&ParsingOperation::ParseRawWholeNumberLiteralToken));
    }

    #[test]
    fn test_section_checkpoint() {
        let s = split_ok("loop§_end");
        assert_eq!(s.num_prefix_functions, 1);
        assert!(s
            .operations
            .contains(&ParsingOperation::PrepareToRunPrefixFunction));
        assert!(matches!(
            s.operations[2],
            ParsingOperation::RunPrefixFunction { index: 1, .. }
        ));
    }

    #[test]
    fn test_backquote_escapes() {
        let s = split_ok("`«_");
        assert_eq!(s.parts, vec!["«"]);
    }

    #[test]
    fn test_malformed_messages() {
        assert!(split("«_", BundleId(0)).is_err());
        assert!(split("_»", BundleId(0)).is_err());
        assert!(split("a‡b", BundleId(0)).is_err());
        assert!(split("", BundleId(0)).is_err());
        assert!(split("«_‡_»", BundleId(0)).is_err());
        assert!(split("x`", BundleId(0)).is_err());
    }

    #[test]
    fn test_branch_targets_are_in_range() {
        for message in ["«_‡,»", "f«,»#", "a«b»?c", "«_»"] {
            let s = split_ok(message);
            for op in &s.operations {
                if let ParsingOperation::Branch { target } | ParsingOperation::Jump { target } =
                    op
                {
                    assert!(
                        *target >= 1 && *target <= s.operations.len() + 1,
                        "target {target} out of range in {message}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_encoding_round_trips_through_bundle_storage() {
        let s = split_ok("_+_");
        let decoded: Vec<ParsingOperation> = s
            .encoded()
            .into_iter()
            .map(|i| ParsingOperation::decode(i).unwrap())
            .collect();
        assert_eq!(decoded, s.operations);
    }
}
