//! # Error Types
//!
//! Error types and diagnostics for grammar construction, table building and
//! parsing.
//!
//! ## Overview
//!
//! - [`GrammarError`]: problems in the grammar itself (undefined symbols,
//!   duplicate terminals, surface-syntax errors)
//! - [`TableError`]: unresolved conflicts found while building deterministic
//!   parse tables; carries per-conflict [`Conflict`] diagnostics
//! - [`ParseError`]: runtime failures (no viable token, lexical ambiguity,
//!   cancellation), with position, line/column, the expected terminal set and
//!   a short context snippet
//!
//! Grammar and table errors are fatal at build time. Parse errors can be
//! intercepted by the recovery hook; if the hook declines they propagate to
//! the caller.
//!
//! When the `diagnostics` feature is enabled, errors integrate with [`miette`]
//! for rich reporting.

use compact_str::CompactString;
use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// Errors raised while assembling or validating a grammar.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum GrammarError {
    #[error("unknown symbol '{name}' referenced from production '{production}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::undefined_symbol)))]
    UndefinedSymbol {
        name: CompactString,
        production: String,
    },

    #[error("terminal '{name}' is defined more than once")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::duplicate_terminal)))]
    DuplicateTerminal { name: CompactString },

    #[error("literal '{literal}' used in production '{production}' already exists by the name '{terminal}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::literal_collision)))]
    LiteralCollision {
        literal: CompactString,
        terminal: CompactString,
        production: String,
    },

    #[error("no start symbol given")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::no_start_symbol)))]
    NoStartSymbol,

    #[error("start symbol '{name}' is not a defined non-terminal")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::unknown_start)))]
    UnknownStartSymbol { name: CompactString },

    #[error("terminal '{name}' has no recognizer defined")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::no_recognizer)))]
    NoRecognizer { name: CompactString },

    #[error("invalid regular expression for terminal '{name}': {message}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::bad_regex)))]
    InvalidRegex {
        name: CompactString,
        message: String,
    },

    #[error("separator modifier is not allowed on optional (?) for symbol '{symbol}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::separator_on_optional)))]
    SeparatorOnOptional { symbol: CompactString },

    #[error("syntax error in grammar at {line}:{column}: {message}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::syntax)))]
    Syntax {
        position: usize,
        line: usize,
        column: usize,
        message: String,
    },
}

/// The two conflict shapes a deterministic table build can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    ShiftReduce,
    ReduceReduce,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShiftReduce => f.write_str("shift/reduce"),
            Self::ReduceReduce => f.write_str("reduce/reduce"),
        }
    }
}

/// One unresolved conflict: the state it occurs in, the lookahead terminal,
/// and the rendered items that collide.
#[derive(Debug, Clone)]
pub struct Conflict {
    pub state: u32,
    pub kind: ConflictKind,
    pub lookahead: CompactString,
    pub items: Vec<String>,
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} conflict in state {} on lookahead '{}':",
            self.kind, self.state, self.lookahead
        )?;
        for item in &self.items {
            writeln!(f, "    {item}")?;
        }
        Ok(())
    }
}

/// Table construction failure listing every unresolved conflict.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
#[error("{} unresolved conflict(s) while building LR tables", conflicts.len())]
#[cfg_attr(feature = "diagnostics", diagnostic(code(table::conflicts)))]
pub struct TableError {
    pub conflicts: Vec<Conflict>,
}

impl TableError {
    /// Render every conflict with its items, for diagnostics output.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut out = String::new();
        for conflict in &self.conflicts {
            use std::fmt::Write;
            let _ = write!(out, "{conflict}");
        }
        out
    }
}

/// Errors raised while parsing input.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ParseError {
    #[error("no viable token at {line}:{column}, expected one of: {}", expected.join(", "))]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parse::no_viable_token)))]
    NoViableToken {
        position: usize,
        line: usize,
        column: usize,
        expected: Vec<String>,
        context: String,
    },

    #[error("ambiguous token at {line}:{column}: {}", candidates.join(", "))]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parse::disambiguation)))]
    Disambiguation {
        position: usize,
        line: usize,
        column: usize,
        candidates: Vec<String>,
    },

    #[error("unresolved dynamic conflict at {line}:{column}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parse::dynamic_conflict)))]
    DynamicConflict {
        position: usize,
        line: usize,
        column: usize,
    },

    #[error("parse cancelled")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parse::cancelled)))]
    Cancelled,
}

impl ParseError {
    /// Byte offset the error anchors to, when it has one.
    #[must_use]
    pub const fn position(&self) -> Option<usize> {
        match self {
            Self::NoViableToken { position, .. }
            | Self::Disambiguation { position, .. }
            | Self::DynamicConflict { position, .. } => Some(*position),
            Self::Cancelled => None,
        }
    }
}

/// Umbrella error for every fallible entry point of the crate.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum Error {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Map a byte offset to 1-based (line, column).
///
/// Columns count Unicode scalar values, not bytes.
#[must_use]
pub fn line_col(input: &str, position: usize) -> (usize, usize) {
    let position = position.min(input.len());
    let mut line = 1;
    let mut line_start = 0;
    for (idx, ch) in input.char_indices() {
        if idx >= position {
            break;
        }
        if ch == '\n' {
            line += 1;
            line_start = idx + 1;
        }
    }
    let column = input[line_start..position].chars().count() + 1;
    (line, column)
}

/// A short excerpt of the input around `position`, with a marker on the
/// offending spot. Used by [`ParseError::NoViableToken`].
#[must_use]
pub(crate) fn context_snippet(input: &str, position: usize) -> String {
    const WINDOW: usize = 24;
    let position = position.min(input.len());
    let mut start = position.saturating_sub(WINDOW);
    while !input.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (position + WINDOW).min(input.len());
    while !input.is_char_boundary(end) {
        end += 1;
    }
    let before = input[start..position].replace(['\n', '\t'], " ");
    let after = input[position..end].replace(['\n', '\t'], " ");
    format!("{before}>*<{after}")
}
