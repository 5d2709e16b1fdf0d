//! # Parser Module
//!
//! The deterministic LR driver and the GLR driver, their configuration,
//! error recovery and cooperative cancellation.
//!
//! ## Overview
//!
//! [`Parser`] runs the single-stack deterministic driver over tables built
//! with the configured conflict policy; the build fails on unresolved
//! conflicts. [`GlrParser`] builds generalized tables that keep every
//! unresolved action and explores them all over a graph-structured stack,
//! returning a shared packed forest with every derivation.
//!
//! Both drivers are scannerless: at each position they query recognizers for
//! exactly the terminals that are legal in the live state(s), after skipping
//! layout (a whitespace set by default, or a secondary parser for the
//! grammar's `LAYOUT` non-terminal).
//!
//! A parser instance is not re-entrant: parsing takes `&mut self`, one
//! in-flight parse per instance. Grammars and tables are `Arc`-shared and may
//! back any number of instances.

mod glr;
mod gss;
mod lr;

use crate::error::{Error, GrammarError, ParseError};
use crate::forest::{ActionDispatcher, Forest, NodeHandle, TreeIter};
use crate::grammar::{Grammar, SymbolId, TermId};
use crate::scanner::{self, Token};
use crate::table::{Action, ParseTables, StateId, TableKind, TableOptions};
use compact_str::CompactString;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Configuration for [`Parser`] and [`GlrParser`].
///
/// The original interface's `build_tree` switch is the choice between
/// [`Parser::parse`] (forest) and [`Parser::parse_with_actions`] (inline
/// reducers), so it is not a runtime flag here.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Parse from this non-terminal instead of the grammar's start symbol.
    pub start_symbol: Option<CompactString>,
    /// Whitespace characters skipped before each token attempt when no
    /// layout grammar applies; `None` disables implicit layout.
    pub ws: Option<CompactString>,
    /// An explicit layout grammar consumed between tokens. Defaults to the
    /// grammar's own `LAYOUT` non-terminal when it defines one.
    pub layout: Option<Arc<Grammar>>,
    /// Table construction to use.
    pub tables: TableKind,
    /// Resolve remaining shift/reduce conflicts in favor of shift
    /// (deterministic driver only).
    pub prefer_shifts: bool,
    /// Dump states and tables through `log` at build time.
    pub debug: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            start_symbol: None,
            ws: Some("\t\n ".into()),
            layout: None,
            tables: TableKind::default(),
            prefer_shifts: false,
            debug: false,
        }
    }
}

/// Cooperative cancellation flag, checked between frontiers and between
/// reductions. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What the recovery hook sees when the driver is stuck.
pub struct RecoveryContext<'a> {
    pub input: &'a str,
    pub position: usize,
    /// Terminals with an action in the stuck state(s).
    pub expected: Vec<TermId>,
    /// The stuck state; `None` in GLR mode, where recovery runs only once
    /// the whole frontier is empty.
    pub state: Option<StateId>,
}

/// A recovery decision: resume at `position`, optionally feeding `tokens`
/// to the driver before scanning resumes.
pub struct Recovery {
    pub position: usize,
    pub tokens: Vec<Token>,
}

/// The recovery hook contract. Returning `None` gives up and propagates the
/// parse error.
pub type RecoveryHook = Box<dyn FnMut(&RecoveryContext<'_>) -> Option<Recovery> + Send>;

/// The builtin recovery: skip one code point and reattempt.
#[must_use]
pub fn skip_char_recovery() -> RecoveryHook {
    Box::new(|ctx: &RecoveryContext<'_>| {
        let rest = ctx.input.get(ctx.position..)?;
        let ch = rest.chars().next()?;
        Some(Recovery {
            position: ctx.position + ch.len_utf8(),
            tokens: Vec::new(),
        })
    })
}

/// Context handed to the dynamic-disambiguation callback when a retained
/// conflict cell is hit at parse time.
pub struct DynamicContext<'a> {
    pub input: &'a str,
    pub token: Token,
    pub state: StateId,
    pub actions: &'a [Action],
}

/// Picks the index of the action to take; `None` falls back to the static
/// behavior (error in LR mode, fork in GLR mode).
pub type DynamicResolver = Box<dyn FnMut(&DynamicContext<'_>) -> Option<usize> + Send>;

/// Counters and timing for one parse.
#[derive(Debug, Clone, Default)]
pub struct ParseMetrics {
    pub shifts: usize,
    pub reductions: usize,
    pub gss_nodes: usize,
    pub forest_nodes: usize,
    pub errors_recovered: usize,
    pub parse_time: std::time::Duration,
}

/// A successful parse: the forest, its root(s), recovered errors and
/// metrics. The deterministic driver produces exactly one root; the GLR
/// driver usually one, packed with every derivation.
#[derive(Debug)]
pub struct ParseResult {
    pub forest: Forest,
    pub roots: SmallVec<[NodeHandle; 1]>,
    pub errors: Vec<ParseError>,
    pub metrics: ParseMetrics,
}

impl ParseResult {
    /// The first (for LR, the only) root.
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.roots[0]
    }

    /// Total trees over all roots.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.roots
            .iter()
            .map(|root| self.forest.tree_count(*root))
            .fold(0usize, usize::saturating_add)
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.tree_count() > 1
    }

    /// Trees of the first root.
    #[must_use]
    pub fn trees(&self) -> TreeIter<'_> {
        self.forest.enumerate_trees(self.root())
    }
}

/// The secondary parser consuming inter-token layout.
struct LayoutParser {
    grammar: Arc<Grammar>,
    tables: Arc<ParseTables>,
}

impl LayoutParser {
    /// The longest layout prefix starting at `pos`, as a new position.
    fn consume(&self, input: &str, pos: usize) -> usize {
        lr::parse_prefix(&self.grammar, &self.tables, input, pos).unwrap_or(pos)
    }
}

/// Everything the drivers need, resolved once at construction.
struct Engine {
    grammar: Arc<Grammar>,
    tables: Arc<ParseTables>,
    layout: Option<LayoutParser>,
    ws: Option<CompactString>,
    recovery: Option<RecoveryHook>,
    dynamic: Option<DynamicResolver>,
    cancel: CancelToken,
}

impl Engine {
    fn new(grammar: Arc<Grammar>, config: &ParserConfig, generalized: bool) -> Result<Self, Error> {
        let grammar = match &config.start_symbol {
            Some(name) => {
                let id = grammar
                    .symbol(name)
                    .and_then(SymbolId::as_nonterm)
                    .ok_or_else(|| GrammarError::UnknownStartSymbol { name: name.clone() })?;
                if id == grammar.start() {
                    grammar
                } else {
                    Arc::new(grammar.for_start(id))
                }
            }
            None => grammar,
        };

        let tables = Arc::new(ParseTables::build(
            &grammar,
            TableOptions {
                kind: config.tables,
                generalized,
                // The safe default: prefer_shifts only steers the
                // deterministic tables.
                prefer_shifts: config.prefer_shifts && !generalized,
            },
        )?);
        if config.debug {
            tables.dump(&grammar);
        }

        let layout_grammar = config.layout.clone().or_else(|| {
            grammar
                .layout()
                .filter(|nt| *nt != grammar.start())
                .map(|nt| Arc::new(grammar.for_start(nt)))
        });
        let layout = match layout_grammar {
            Some(layout_grammar) => {
                let layout_tables = Arc::new(ParseTables::build(
                    &layout_grammar,
                    TableOptions {
                        kind: config.tables,
                        generalized: false,
                        prefer_shifts: true,
                    },
                )?);
                Some(LayoutParser {
                    grammar: layout_grammar,
                    tables: layout_tables,
                })
            }
            None => None,
        };

        // The default whitespace skipper applies only without a LAYOUT
        // grammar.
        let ws = if layout.is_some() {
            None
        } else {
            config.ws.clone()
        };

        Ok(Self {
            grammar,
            tables,
            layout,
            ws,
            recovery: None,
            dynamic: None,
            cancel: CancelToken::new(),
        })
    }

    fn skip_layout(&self, input: &str, pos: usize) -> usize {
        if let Some(layout) = &self.layout {
            layout.consume(input, pos)
        } else if let Some(ws) = &self.ws {
            scanner::skip_whitespace(input, pos, ws)
        } else {
            pos
        }
    }

    fn check_cancelled(&self) -> Result<(), ParseError> {
        if self.cancel.is_cancelled() {
            Err(ParseError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn no_viable_token(&self, input: &str, position: usize, expected: Vec<String>) -> ParseError {
        let (line, column) = crate::error::line_col(input, position);
        ParseError::NoViableToken {
            position,
            line,
            column,
            expected,
            context: crate::error::context_snippet(input, position),
        }
    }
}

/// The deterministic LR parser.
///
/// # Examples
///
/// ```
/// use silva::{Grammar, Parser, ParserConfig};
/// use std::sync::Arc;
///
/// let grammar = Arc::new(Grammar::from_string("S: 'a' S | 'a';").unwrap());
/// let mut parser = Parser::new(grammar, ParserConfig::default()).unwrap();
/// let result = parser.parse("a a a").unwrap();
/// assert_eq!(result.forest.span(result.root()), (0, 5));
/// ```
pub struct Parser {
    engine: Engine,
}

impl Parser {
    /// Build the deterministic tables for `grammar` and wrap a driver around
    /// them.
    ///
    /// # Errors
    ///
    /// Table conflicts that the resolution policy leaves unresolved fail the
    /// construction with [`Error::Table`].
    pub fn new(grammar: Arc<Grammar>, config: ParserConfig) -> Result<Self, Error> {
        Ok(Self {
            engine: Engine::new(grammar, &config, false)?,
        })
    }

    /// Install an error-recovery hook.
    #[must_use]
    pub fn with_recovery(mut self, hook: RecoveryHook) -> Self {
        self.engine.recovery = Some(hook);
        self
    }

    /// Install the dynamic-disambiguation callback.
    #[must_use]
    pub fn with_dynamic_resolver(mut self, resolver: DynamicResolver) -> Self {
        self.engine.dynamic = Some(resolver);
        self
    }

    /// A handle that cancels an in-flight parse from another thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.engine.cancel.clone()
    }

    /// Parse `input` into a forest with a single root.
    ///
    /// # Errors
    ///
    /// [`ParseError`] when no viable token exists and recovery declines, on
    /// lexical ambiguity, or on cancellation.
    pub fn parse(&mut self, input: &str) -> Result<ParseResult, Error> {
        lr::parse_to_forest(&mut self.engine, input)
    }

    /// Parse a file, as [`Parser::parse`].
    ///
    /// # Errors
    ///
    /// Additionally [`Error::Io`] when the file cannot be read.
    pub fn parse_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<ParseResult, Error> {
        let input = std::fs::read_to_string(path)?;
        self.parse(&input)
    }

    /// Parse `input`, invoking `dispatcher` inline at each shift and
    /// reduction instead of building a forest.
    ///
    /// # Errors
    ///
    /// As [`Parser::parse`].
    pub fn parse_with_actions<D: ActionDispatcher>(
        &mut self,
        input: &str,
        dispatcher: &mut D,
    ) -> Result<D::Value, Error> {
        lr::parse_with_dispatcher(&mut self.engine, input, dispatcher)
    }
}

/// The generalized (GLR) parser.
///
/// Unresolved conflicts fork the graph-structured stack; every surviving
/// derivation is packed into the shared forest.
pub struct GlrParser {
    engine: Engine,
}

impl GlrParser {
    /// Build generalized tables for `grammar` and wrap the GSS driver around
    /// them.
    ///
    /// # Errors
    ///
    /// Only grammar-level failures: generalized table builds retain
    /// conflicts instead of failing.
    pub fn new(grammar: Arc<Grammar>, config: ParserConfig) -> Result<Self, Error> {
        Ok(Self {
            engine: Engine::new(grammar, &config, true)?,
        })
    }

    /// Install an error-recovery hook; in GLR mode it runs only when the
    /// entire frontier is empty.
    #[must_use]
    pub fn with_recovery(mut self, hook: RecoveryHook) -> Self {
        self.engine.recovery = Some(hook);
        self
    }

    /// Install the dynamic-disambiguation callback.
    #[must_use]
    pub fn with_dynamic_resolver(mut self, resolver: DynamicResolver) -> Self {
        self.engine.dynamic = Some(resolver);
        self
    }

    /// A handle that cancels an in-flight parse from another thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.engine.cancel.clone()
    }

    /// Parse `input` into a forest with every viable derivation.
    ///
    /// # Errors
    ///
    /// [`ParseError`] when no derivation survives and recovery declines, or
    /// on cancellation.
    pub fn parse(&mut self, input: &str) -> Result<ParseResult, Error> {
        glr::parse(&mut self.engine, input)
    }

    /// Parse a file, as [`GlrParser::parse`].
    ///
    /// # Errors
    ///
    /// Additionally [`Error::Io`] when the file cannot be read.
    pub fn parse_file(&mut self, path: impl AsRef<std::path::Path>) -> Result<ParseResult, Error> {
        let input = std::fs::read_to_string(path)?;
        self.parse(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn skip_char_recovery_advances_one_char() {
        let mut hook = skip_char_recovery();
        let ctx = RecoveryContext {
            input: "äbc",
            position: 0,
            expected: vec![],
            state: None,
        };
        let recovery = hook(&ctx).unwrap();
        assert_eq!(recovery.position, 2);

        let at_end = RecoveryContext {
            input: "x",
            position: 1,
            expected: vec![],
            state: None,
        };
        assert!(hook(&at_end).is_none());
    }

    #[test]
    fn unknown_start_symbol_is_rejected() {
        let grammar = Arc::new(Grammar::from_string("S: 'a' S | 'a';").unwrap());
        let config = ParserConfig {
            start_symbol: Some("Missing".into()),
            ..ParserConfig::default()
        };
        assert!(matches!(
            Parser::new(grammar, config),
            Err(Error::Grammar(GrammarError::UnknownStartSymbol { .. }))
        ));
    }

    #[test]
    fn start_symbol_override() {
        let grammar = Arc::new(Grammar::from_string("S: A 'x'; A: a; a: 'a';").unwrap());
        let config = ParserConfig {
            start_symbol: Some("A".into()),
            ..ParserConfig::default()
        };
        let mut parser = Parser::new(grammar, config).unwrap();
        let result = parser.parse("a").unwrap();
        assert_eq!(result.forest.span(result.root()), (0, 1));
    }
}
