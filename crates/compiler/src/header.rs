//! Module header parsing
//!
//! The header grammar is fixed (it is what bootstraps everything else):
//!
//! ```text
//! Module "Name"
//! Versions "1.0.0", "1.1.0"
//! Extends "Origin" ("a" → "b", -"c", …), "Other"
//! Uses "Helper"
//! Names "new name", "another_"
//! Entries "entry point"
//! Pragma "method=Add=_+_"
//! Body
//! ```
//!
//! Each section is a keyword followed by comma-separated string literals;
//! import sections allow a parenthesized filter list using `→` to rename,
//! `-` to exclude, and `…` to admit the rest wildcard-style.

use crate::lexer::{bootstrap_lexers, next_significant_tokens, LexingState};
use avail_core::token::TokenKind;
use avail_runtime::runtime::Runtime;
use std::sync::{Arc, RwLock};

/// One name filter inside an import specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    /// `"a"`: import exactly this name.
    Keep(String),
    /// `"a" → "b"`: import `a`, visible here as `b`.
    Rename { from: String, to: String },
    /// `-"a"`: do not import this name.
    Exclude(String),
    /// `…`: import everything not otherwise mentioned.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub module_name: String,
    pub versions: Vec<String>,
    /// Empty means "import everything" (same as a lone wildcard).
    pub filters: Vec<NameFilter>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleHeader {
    pub name: String,
    pub versions: Vec<String>,
    pub extends: Vec<ImportSpec>,
    pub uses: Vec<ImportSpec>,
    pub names: Vec<String>,
    pub entries: Vec<String>,
    pub pragmas: Vec<String>,
    /// Position just after the `Body` keyword.
    pub body_position: usize,
    pub body_line: u32,
}

struct HeaderParser {
    tokens: Vec<(TokenKind, String, usize, u32)>,
    position: usize,
    after_body: usize,
    after_body_line: u32,
}

/// Parse the header section of `source`.
pub fn parse_header(source: &str) -> Result<ModuleHeader, String> {
    let runtime = Arc::new(RwLock::new(Runtime::new()));
    let lexers = bootstrap_lexers();
    let mut lexing = LexingState::start(Arc::from(source));
    let mut tokens = Vec::new();
    let mut after_body = source.len();
    let mut after_body_line = 1;
    loop {
        let candidates = next_significant_tokens(&lexing, &lexers, &runtime);
        let Some(first) = candidates.into_iter().next() else {
            return Err(format!(
                "unlexable input in module header at position {}",
                lexing.position
            ));
        };
        let data = first.token.as_token().expect("scanner yields tokens");
        if data.kind == TokenKind::EndOfFile {
            break;
        }
        let is_body = data.kind == TokenKind::Keyword && data.text == "Body";
        tokens.push((data.kind, data.text.clone(), data.start, data.line));
        lexing = first.after;
        if is_body {
            after_body = lexing.position;
            after_body_line = lexing.line;
            break;
        }
    }
    let mut parser = HeaderParser {
        tokens,
        position: 0,
        after_body,
        after_body_line,
    };
    parser.parse()
}

impl HeaderParser {
    fn peek(&self) -> Option<&(TokenKind, String, usize, u32)> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<(TokenKind, String, usize, u32)> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some((TokenKind::Keyword, text, _, _)) if text == keyword => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    fn eat_operator(&mut self, operator: &str) -> bool {
        match self.peek() {
            Some((TokenKind::Operator, text, _, _)) if text == operator => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_string(&mut self, what: &str) -> Result<String, String> {
        match self.advance() {
            Some((TokenKind::Literal, text, _, _)) if text.starts_with('"') => {
                Ok(text.trim_matches('"').to_string())
            }
            Some((_, text, _, line)) => Err(format!(
                "line {line}: expected a string literal for {what}, found `{text}`"
            )),
            None => Err(format!("unexpected end of header wanting {what}")),
        }
    }

    fn parse(&mut self) -> Result<ModuleHeader, String> {
        let mut header = ModuleHeader {
            body_position: self.after_body,
            body_line: self.after_body_line,
            ..ModuleHeader::default()
        };
        if !self.eat_keyword("Module") {
            return Err("a module must begin with the `Module` keyword".to_string());
        }
        header.name = self.expect_string("the module name")?;
        loop {
            if self.eat_keyword("Versions") {
                header.versions = self.parse_string_list()?;
            } else if self.eat_keyword("Extends") {
                header.extends = self.parse_import_list()?;
            } else if self.eat_keyword("Uses") {
                header.uses = self.parse_import_list()?;
            } else if self.eat_keyword("Names") {
                header.names = self.parse_string_list()?;
            } else if self.eat_keyword("Entries") {
                header.entries = self.parse_string_list()?;
            } else if self.eat_keyword("Pragma") {
                header.pragmas = self.parse_string_list()?;
            } else if self.eat_keyword("Body") {
                return Ok(header);
            } else {
                match self.peek() {
                    Some((_, text, _, line)) => {
                        return Err(format!(
                            "line {line}: unexpected `{text}` in module header"
                        ))
                    }
                    None => {
                        return Err(
                            "module header ended without the `Body` keyword".to_string()
                        )
                    }
                }
            }
        }
    }

    fn parse_string_list(&mut self) -> Result<Vec<String>, String> {
        let mut out = vec![self.expect_string("a section entry")?];
        while self.eat_operator(",") {
            out.push(self.expect_string("a section entry")?);
        }
        Ok(out)
    }

    fn parse_import_list(&mut self) -> Result<Vec<ImportSpec>, String> {
        let mut out = vec![self.parse_import()?];
        while self.eat_operator(",") {
            out.push(self.parse_import()?);
        }
        Ok(out)
    }

    fn parse_import(&mut self) -> Result<ImportSpec, String> {
        let module_name = self.expect_string("an imported module name")?;
        let mut spec = ImportSpec {
            module_name,
            versions: Vec::new(),
            filters: Vec::new(),
        };
        // One paren group is a filter list; two groups mean the first was
        // a version tuple and the second the filters.
        if self.eat_operator("(") {
            let first = self.parse_filter_group()?;
            if self.eat_operator("(") {
                for filter in &first {
                    match filter {
                        NameFilter::Keep(version) => spec.versions.push(version.clone()),
                        _ => {
                            return Err(
                                "an import version tuple may contain only strings".to_string()
                            )
                        }
                    }
                }
                spec.filters = self.parse_filter_group()?;
            } else {
                spec.filters = first;
            }
        }
        Ok(spec)
    }

    fn parse_filter_group(&mut self) -> Result<Vec<NameFilter>, String> {
        let mut filters = Vec::new();
        loop {
            if self.eat_operator("…") {
                filters.push(NameFilter::Wildcard);
            } else if self.eat_operator("-") {
                let name = self.expect_string("an excluded name")?;
                filters.push(NameFilter::Exclude(name));
            } else {
                let name = self.expect_string("an imported name")?;
                if self.eat_operator("→") {
                    let to = self.expect_string("the local name after `→`")?;
                    filters.push(NameFilter::Rename { from: name, to });
                } else {
                    filters.push(NameFilter::Keep(name));
                }
            }
            if self.eat_operator(")") {
                return Ok(filters);
            }
            if !self.eat_operator(",") {
                return Err("expected `,` or `)` in an import filter list".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_header() {
        let header = parse_header("Module \"Tiny\"\nBody\n").unwrap();
        assert_eq!(header.name, "Tiny");
        assert!(header.extends.is_empty());
        assert!(header.pragmas.is_empty());
    }

    #[test]
    fn test_full_header() {
        let source = r#"
Module "Full"
Versions "1.0.0", "1.1.0"
Extends "Origin" ("a" → "b", -"c", …), "Other"
Uses "Helper"
Names "new name"
Entries "run"
Pragma "method=Add=_+_", "check=version=1.0.0"
Body
"#;
        let header = parse_header(source).unwrap();
        assert_eq!(header.name, "Full");
        assert_eq!(header.versions, vec!["1.0.0", "1.1.0"]);
        assert_eq!(header.extends.len(), 2);
        let origin = &header.extends[0];
        assert_eq!(origin.module_name, "Origin");
        assert_eq!(
            origin.filters,
            vec![
                NameFilter::Rename {
                    from: "a".to_string(),
                    to: "b".to_string()
                },
                NameFilter::Exclude("c".to_string()),
                NameFilter::Wildcard,
            ]
        );
        assert_eq!(header.uses[0].module_name, "Helper");
        assert_eq!(header.names, vec!["new name"]);
        assert_eq!(header.pragmas.len(), 2);
    }

    #[test]
    fn test_body_position_points_past_keyword() {
        let source = "Module \"M\"\nBody x := 1;";
        let header = parse_header(source).unwrap();
        assert_eq!(&source[header.body_position..], " x := 1;");
    }

    #[test]
    fn test_header_errors() {
        assert!(parse_header("Body").is_err());
        assert!(parse_header("Module Tiny Body").is_err());
        assert!(parse_header("Module \"T\" Exports \"x\" Body").is_err());
        assert!(parse_header("Module \"T\" Names \"x\"").is_err());
    }
}
