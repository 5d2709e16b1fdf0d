//! # Silva
//!
//! A scannerless parser generator and runtime for context-free grammars.
//! From a grammar description silva constructs a deterministic LR(1) parsing
//! automaton (with conflict-preserving LALR state merging) and runs either a
//! deterministic LR driver or a Generalized LR (GLR) driver that explores all
//! viable parses simultaneously and returns a shared packed parse forest.
//!
//! ## Overview
//!
//! - **Scannerless**: there is no lexer phase. At every position the drivers
//!   query, for exactly the terminals legal in the live parser state(s),
//!   their recognizers (string literals, regexes, end-of-input, user
//!   callables), and disambiguate by priority, preference, match length and
//!   literal-over-regex. Keywords never fight identifiers.
//! - **Deterministic or generalized**: [`Parser`] fails at build time on
//!   unresolved conflicts; [`GlrParser`] retains them and forks a
//!   graph-structured stack, packing local ambiguities into shared forest
//!   nodes.
//! - **Declarative disambiguation**: per-production priorities and
//!   associativities, per-terminal priorities, `prefer`, `finish`, and
//!   dynamic (runtime-callback) resolution.
//!
//! ## Quick start
//!
//! ```
//! use silva::{Grammar, Parser, ParserConfig};
//! use std::sync::Arc;
//!
//! let grammar = Arc::new(Grammar::from_string(
//!     "E: E '+' E {left, 1}
//!       | E '*' E {left, 2}
//!       | number;
//!      number: /\\d+/;",
//! ).unwrap());
//!
//! let mut parser = Parser::new(grammar.clone(), ParserConfig::default()).unwrap();
//! let result = parser.parse("1 + 2 * 3").unwrap();
//!
//! // One unambiguous tree: '*' binds tighter than '+'.
//! assert_eq!(result.tree_count(), 1);
//! assert_eq!(result.forest.span(result.root()), (0, 9));
//! ```
//!
//! Ambiguous grammars go through [`GlrParser`] and come back as a forest:
//!
//! ```
//! use silva::{Grammar, GlrParser, ParserConfig};
//! use std::sync::Arc;
//!
//! let grammar = Arc::new(Grammar::from_string(
//!     "E: E '+' E | number; number: /\\d+/;",
//! ).unwrap());
//! let mut parser = GlrParser::new(grammar, ParserConfig::default()).unwrap();
//!
//! let result = parser.parse("1 + 2 + 3").unwrap();
//! // Two groupings of the two '+' operators.
//! assert_eq!(result.tree_count(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`grammar`] - the grammar IR, builder, analysis and textual front-end
//! - [`scanner`] - recognizers and scannerless token selection
//! - [`table`] - item sets, the LR automaton and ACTION/GOTO tables
//! - [`parser`] - the LR and GLR drivers, recovery and cancellation
//! - [`forest`] - the shared packed parse forest
//! - [`error`] - error types and source locations

pub mod error;
pub mod forest;
pub mod grammar;
pub mod parser;
pub mod scanner;
pub mod table;

pub use error::{Conflict, ConflictKind, Error, GrammarError, ParseError, TableError};
pub use forest::{ActionDispatcher, CollectTrees, Forest, NodeHandle, PackedAlt, Tree, TreeIter};
pub use grammar::{
    Associativity, Grammar, GrammarAnalysis, GrammarBuilder, NonTermId, ProdId, SymbolId,
    SymbolRef, TermId,
};
pub use parser::{
    CancelToken, DynamicContext, DynamicResolver, GlrParser, ParseMetrics, ParseResult, Parser,
    ParserConfig, Recovery, RecoveryContext, RecoveryHook, skip_char_recovery,
};
pub use scanner::{Recognize, Recognizer, Token};
pub use table::{Action, ParseTables, StateId, TableKind, TableOptions};
