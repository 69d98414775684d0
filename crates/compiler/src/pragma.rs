//! Pragma parsing
//!
//! Pragmas are the bootstrap wiring: strings in the module header that
//! install primitives as methods, macros, the stringifier, and lexers
//! before any in-language definition machinery exists.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pragma {
    /// `check=version=<csv>`: the runtime must honor one of these
    /// versions.
    CheckVersion(Vec<String>),
    /// `method=<primitive>=<name>`: install a primitive as a method.
    Method { primitive: String, name: String },
    /// `macro=<p1>,<p2>,...=<name>`: the last primitive is the macro
    /// body, the preceding ones its prefix functions (one per `§`).
    Macro {
        prefix_primitives: Vec<String>,
        body_primitive: String,
        name: String,
    },
    /// `stringify=<name>`: names the printer method.
    Stringify(String),
    /// `lexer=<filter>,<body>=<name>`: install a bootstrap lexer.
    Lexer {
        filter_primitive: String,
        body_primitive: String,
        name: String,
    },
}

pub fn parse_pragma(text: &str) -> Result<Pragma, String> {
    let (key, rest) = text
        .split_once('=')
        .ok_or_else(|| format!("pragma `{text}` has no `=`"))?;
    match key {
        "check" => {
            let (what, versions) = rest
                .split_once('=')
                .ok_or_else(|| format!("pragma `{text}`: check needs `version=<csv>`"))?;
            if what != "version" {
                return Err(format!("pragma `{text}`: unknown check `{what}`"));
            }
            Ok(Pragma::CheckVersion(
                versions.split(',').map(|v| v.trim().to_string()).collect(),
            ))
        }
        "method" => {
            let (primitive, name) = rest
                .split_once('=')
                .ok_or_else(|| format!("pragma `{text}`: method needs `<prim>=<name>`"))?;
            Ok(Pragma::Method {
                primitive: primitive.to_string(),
                name: name.to_string(),
            })
        }
        "macro" => {
            let (primitives, name) = rest
                .split_once('=')
                .ok_or_else(|| format!("pragma `{text}`: macro needs `<prims>=<name>`"))?;
            let mut primitives: Vec<String> =
                primitives.split(',').map(|p| p.trim().to_string()).collect();
            let body_primitive = primitives
                .pop()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| format!("pragma `{text}`: macro needs a body primitive"))?;
            Ok(Pragma::Macro {
                prefix_primitives: primitives,
                body_primitive,
                name: name.to_string(),
            })
        }
        "stringify" => Ok(Pragma::Stringify(rest.to_string())),
        "lexer" => {
            let (primitives, name) = rest
                .split_once('=')
                .ok_or_else(|| format!("pragma `{text}`: lexer needs `<filter>,<body>=<name>`"))?;
            let (filter, body) = primitives.split_once(',').ok_or_else(|| {
                format!("pragma `{text}`: lexer needs both filter and body primitives")
            })?;
            Ok(Pragma::Lexer {
                filter_primitive: filter.trim().to_string(),
                body_primitive: body.trim().to_string(),
                name: name.to_string(),
            })
        }
        other => Err(format!("unknown pragma key `{other}`")),
    }
}
