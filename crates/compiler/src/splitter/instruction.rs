//! Parsing instructions
//!
//! The message splitter compiles a method name into a short program over
//! these instructions; the parser engine interprets them against the token
//! stream. Each instruction encodes into one integer (opcode in the low
//! six bits, operand above) so bundle trees can merge plans by comparing
//! ints.
//!
//! Per-bundle checks (`CheckArgument`, `TypeCheckArgument`,
//! `RunPrefixFunction`) fold the bundle into the operand, so plans from
//! different bundles never merge at a check even when the check looks the
//! same; everything else merges freely.

use avail_core::BundleId;
use std::fmt;

/// Conversions applied to the top of the parse stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionRule {
    /// Replace a list phrase by a literal phrase of its element count.
    ListToSize,
    /// Evaluate the phrase at compile time and wrap the value as a
    /// literal phrase.
    EvaluateExpression,
}

/// One step of the parsing program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsingOperation {
    /// Consume the keyword/operator at 1-based `part` of the message.
    ParsePart { part: usize },
    /// As above, case-insensitively (the part is stored lowercased).
    ParsePartCaseInsensitively { part: usize },
    /// Parse a subexpression and push it.
    ParseArgument,
    /// Parse a subexpression that may be top-valued (a statement).
    ParseTopValuedArgument,
    /// Parse a variable use and convert it to a reference phrase.
    ParseVariableReference,
    /// Parse a subexpression rejecting local-scope references.
    ParseArgumentInModuleScope,
    /// Consume one raw token of the given class and push it as a literal
    /// phrase.
    ParseAnyRawToken,
    ParseRawKeywordToken,
    ParseRawStringLiteralToken,
    ParseRawWholeNumberLiteralToken,
    /// Push an empty list phrase.
    EmptyList,
    /// Pop a value, append it to the list now on top.
    AppendArgument,
    /// Pop a value, prepend it to the list now on top.
    Prepend,
    SaveParsePosition,
    DiscardSavedParsePosition,
    /// Reject this path if no tokens were consumed since the saved mark;
    /// otherwise advance the mark.
    EnsureParseProgress,
    /// Nondeterministic fork: continue both at the next instruction and at
    /// `target` (1-based).
    Branch { target: usize },
    /// Continue only at `target` (1-based).
    Jump { target: usize },
    /// Apply the owning bundle's grammatical prefilter to the argument
    /// just parsed (1-based `argument`).
    CheckArgument { bundle: BundleId, argument: usize },
    /// Check the just-parsed argument's phrase type against the owning
    /// bundle's definitions at position `argument`.
    TypeCheckArgument { bundle: BundleId, argument: usize },
    Convert { rule: ConversionRule },
    /// Snapshot the arguments parsed so far into a list phrase and push it
    /// for the upcoming prefix function.
    PrepareToRunPrefixFunction,
    /// Run the owning bundle's `index`-th (1-based) prefix function.
    RunPrefixFunction { bundle: BundleId, index: usize },
    /// Pop a list phrase; push it re-ordered by the bundle's `permutation`
    /// (1-based index into the bundle's permutation table).
    PermuteList { permutation: usize },
    ReverseStack { depth: usize },
    /// Pop `count` values, push the list phrase of them.
    WrapInList { count: usize },
    /// Pop two list phrases, push their concatenation.
    Concatenate,
    /// Push a literal phrase for the well-known constant (0 = false,
    /// 1 = true).
    PushLiteral { constant: usize },
    /// Reject unless the list on top has at least `limit` elements.
    CheckAtLeast { limit: usize },
    /// Reject unless the list on top has at most `limit` elements.
    CheckAtMost { limit: usize },
}

const OPCODE_BITS: u32 = 6;
const OPCODE_MASK: i64 = (1 << OPCODE_BITS) - 1;
/// Bundle-dependent operands pack (bundle, small index) above the opcode.
const BUNDLE_SHIFT: u32 = 16;

impl ParsingOperation {
    fn opcode(self) -> i64 {
        match self {
            ParsingOperation::ParsePart { .. } => 1,
            ParsingOperation::ParsePartCaseInsensitively { .. } => 2,
            ParsingOperation::ParseArgument => 3,
            ParsingOperation::ParseTopValuedArgument => 4,
            ParsingOperation::ParseVariableReference => 5,
            ParsingOperation::ParseArgumentInModuleScope => 6,
            ParsingOperation::ParseAnyRawToken => 7,
            ParsingOperation::ParseRawKeywordToken => 8,
            ParsingOperation::ParseRawStringLiteralToken => 9,
            ParsingOperation::ParseRawWholeNumberLiteralToken => 10,
            ParsingOperation::EmptyList => 11,
            ParsingOperation::AppendArgument => 12,
            ParsingOperation::Prepend => 13,
            ParsingOperation::SaveParsePosition => 14,
            ParsingOperation::DiscardSavedParsePosition => 15,
            ParsingOperation::EnsureParseProgress => 16,
            ParsingOperation::Branch { .. } => 17,
            ParsingOperation::Jump { .. } => 18,
            ParsingOperation::CheckArgument { .. } => 19,
            ParsingOperation::TypeCheckArgument { .. } => 20,
            ParsingOperation::Convert { .. } => 21,
            ParsingOperation::PrepareToRunPrefixFunction => 22,
            ParsingOperation::RunPrefixFunction { .. } => 23,
            ParsingOperation::PermuteList { .. } => 24,
            ParsingOperation::ReverseStack { .. } => 25,
            ParsingOperation::WrapInList { .. } => 26,
            ParsingOperation::Concatenate => 27,
            ParsingOperation::PushLiteral { .. } => 28,
            ParsingOperation::CheckAtLeast { .. } => 29,
            ParsingOperation::CheckAtMost { .. } => 30,
        }
    }

    fn operand(self) -> i64 {
        match self {
            ParsingOperation::ParsePart { part }
            | ParsingOperation::ParsePartCaseInsensitively { part } => part as i64,
            ParsingOperation::Branch { target } | ParsingOperation::Jump { target } => {
                target as i64
            }
            ParsingOperation::CheckArgument { bundle, argument }
            | ParsingOperation::TypeCheckArgument { bundle, argument } => {
                ((bundle.0 as i64) << BUNDLE_SHIFT) | argument as i64
            }
            ParsingOperation::RunPrefixFunction { bundle, index } => {
                ((bundle.0 as i64) << BUNDLE_SHIFT) | index as i64
            }
            ParsingOperation::Convert { rule } => match rule {
                ConversionRule::ListToSize => 1,
                ConversionRule::EvaluateExpression => 2,
            },
            ParsingOperation::PermuteList { permutation } => permutation as i64,
            ParsingOperation::ReverseStack { depth } => depth as i64,
            ParsingOperation::WrapInList { count } => count as i64,
            ParsingOperation::PushLiteral { constant } => constant as i64,
            ParsingOperation::CheckAtLeast { limit } => limit as i64,
            ParsingOperation::CheckAtMost { limit } => limit as i64,
            _ => 0,
        }
    }

    /// The integer form stored in bundles and keyed on by the tree.
    pub fn encode(self) -> i64 {
        self.opcode() | (self.operand() << OPCODE_BITS)
    }

    pub fn decode(encoded: i64) -> Option<ParsingOperation> {
        let opcode = encoded & OPCODE_MASK;
        let operand = encoded >> OPCODE_BITS;
        let small = (operand & ((1 << BUNDLE_SHIFT) - 1)) as usize;
        let bundle = BundleId((operand >> BUNDLE_SHIFT) as u32);
        Some(match opcode {
            1 => ParsingOperation::ParsePart {
                part: operand as usize,
            },
            2 => ParsingOperation::ParsePartCaseInsensitively {
                part: operand as usize,
            },
            3 => ParsingOperation::ParseArgument,
            4 => ParsingOperation::ParseTopValuedArgument,
            5 => ParsingOperation::ParseVariableReference,
            6 => ParsingOperation::ParseArgumentInModuleScope,
            7 => ParsingOperation::ParseAnyRawToken,
            8 => ParsingOperation::ParseRawKeywordToken,
            9 => ParsingOperation::ParseRawStringLiteralToken,
            10 => ParsingOperation::ParseRawWholeNumberLiteralToken,
            11 => ParsingOperation::EmptyList,
            12 => ParsingOperation::AppendArgument,
            13 => ParsingOperation::Prepend,
            14 => ParsingOperation::SaveParsePosition,
            15 => ParsingOperation::DiscardSavedParsePosition,
            16 => ParsingOperation::EnsureParseProgress,
            17 => ParsingOperation::Branch {
                target: operand as usize,
            },
            18 => ParsingOperation::Jump {
                target: operand as usize,
            },
            19 => ParsingOperation::CheckArgument {
                bundle,
                argument: small,
            },
            20 => ParsingOperation::TypeCheckArgument {
                bundle,
                argument: small,
            },
            21 => ParsingOperation::Convert {
                rule: match operand {
                    1 => ConversionRule::ListToSize,
                    2 => ConversionRule::EvaluateExpression,
                    _ => return None,
                },
            },
            22 => ParsingOperation::PrepareToRunPrefixFunction,
            23 => ParsingOperation::RunPrefixFunction {
                bundle,
                index: small,
            },
            24 => ParsingOperation::PermuteList {
                permutation: operand as usize,
            },
            25 => ParsingOperation::ReverseStack {
                depth: operand as usize,
            },
            26 => ParsingOperation::WrapInList {
                count: operand as usize,
            },
            27 => ParsingOperation::Concatenate,
            28 => ParsingOperation::PushLiteral {
                constant: operand as usize,
            },
            29 => ParsingOperation::CheckAtLeast {
                limit: operand as usize,
            },
            30 => ParsingOperation::CheckAtMost {
                limit: operand as usize,
            },
            _ => return None,
        })
    }

    /// Does this instruction consume a source token when it succeeds?
    pub fn consumes_token(self) -> bool {
        matches!(
            self,
            ParsingOperation::ParsePart { .. }
                | ParsingOperation::ParsePartCaseInsensitively { .. }
                | ParsingOperation::ParseAnyRawToken
                | ParsingOperation::ParseRawKeywordToken
                | ParsingOperation::ParseRawStringLiteralToken
                | ParsingOperation::ParseRawWholeNumberLiteralToken
        )
    }
}

impl fmt::Display for ParsingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let samples = [
            ParsingOperation::ParsePart { part: 3 },
            ParsingOperation::ParseArgument,
            ParsingOperation::Branch { target: 17 },
            ParsingOperation::CheckArgument {
                bundle: BundleId(9),
                argument: 2,
            },
            ParsingOperation::TypeCheckArgument {
                bundle: BundleId(1000),
                argument: 1,
            },
            ParsingOperation::RunPrefixFunction {
                bundle: BundleId(4),
                index: 2,
            },
            ParsingOperation::Convert {
                rule: ConversionRule::ListToSize,
            },
            ParsingOperation::PushLiteral { constant: 1 },
            ParsingOperation::CheckAtMost { limit: 1 },
        ];
        for op in samples {
            assert_eq!(ParsingOperation::decode(op.encode()), Some(op));
        }
    }

    #[test]
    fn test_bundle_checks_never_merge_across_bundles() {
        let a = ParsingOperation::TypeCheckArgument {
            bundle: BundleId(1),
            argument: 1,
        };
        let b = ParsingOperation::TypeCheckArgument {
            bundle: BundleId(2),
            argument: 1,
        };
        assert_ne!(a.encode(), b.encode());
        // Bundle-independent steps do merge.
        assert_eq!(
            ParsingOperation::ParseArgument.encode(),
            ParsingOperation::ParseArgument.encode()
        );
    }
}
