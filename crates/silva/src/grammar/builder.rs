//! Grammar assembly and freeze-time validation.
//!
//! A [`GrammarBuilder`] stages terminals, non-terminals and productions, and
//! [`GrammarBuilder::build`] resolves references, erases `EMPTY`, synthesizes
//! the augmented production and validates the result into a frozen
//! [`Grammar`].

use crate::error::GrammarError;
use crate::grammar::{
    Associativity, DEFAULT_PRIORITY, Grammar, NonTermId, NonTerminal, ProdId, Production,
    SymbolId, TermId, Terminal,
};
use crate::scanner::{Recognize, Recognizer};
use compact_str::CompactString;
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::sync::Arc;

/// A reference to a grammar symbol in a staged production right-hand side.
///
/// References by [`TermId`]/[`NonTermId`] are resolved immediately; names,
/// inline literals and inline regexes are resolved at build time, with inline
/// terminals auto-registered the way the textual grammar form does it.
#[derive(Debug, Clone)]
pub enum SymbolRef {
    Sym(SymbolId),
    Name(CompactString),
    Literal(CompactString),
    Regex(CompactString),
}

impl From<SymbolId> for SymbolRef {
    fn from(id: SymbolId) -> Self {
        Self::Sym(id)
    }
}

impl From<TermId> for SymbolRef {
    fn from(id: TermId) -> Self {
        Self::Sym(SymbolId::Term(id))
    }
}

impl From<NonTermId> for SymbolRef {
    fn from(id: NonTermId) -> Self {
        Self::Sym(SymbolId::NonTerm(id))
    }
}

impl From<&str> for SymbolRef {
    fn from(name: &str) -> Self {
        Self::Name(name.into())
    }
}

/// An inline string-literal terminal, e.g. `lit("+")`.
#[must_use]
pub fn lit(value: impl Into<CompactString>) -> SymbolRef {
    SymbolRef::Literal(value.into())
}

/// An inline regex terminal, e.g. `re(r"\d+")`.
#[must_use]
pub fn re(pattern: impl Into<CompactString>) -> SymbolRef {
    SymbolRef::Regex(pattern.into())
}

/// Lexical-disambiguation options of a terminal.
#[derive(Debug, Clone, Copy)]
pub struct TerminalOptions {
    pub priority: u32,
    pub prefer: bool,
    pub finish: bool,
    pub dynamic: bool,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            prefer: false,
            finish: false,
            dynamic: false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingProduction {
    pub(crate) lhs: NonTermId,
    pub(crate) rhs: Vec<SymbolRef>,
    pub(crate) priority: Option<u32>,
    pub(crate) assoc: Associativity,
    pub(crate) preferred: bool,
    pub(crate) dynamic: bool,
    pub(crate) nops: bool,
    pub(crate) nopse: bool,
}

/// Chained setters for the production just staged with
/// [`GrammarBuilder::production`].
pub struct ProductionMut<'a> {
    prod: &'a mut PendingProduction,
}

impl ProductionMut<'_> {
    pub fn priority(self, priority: u32) -> Self {
        self.prod.priority = Some(priority);
        self
    }

    pub fn assoc(self, assoc: Associativity) -> Self {
        self.prod.assoc = assoc;
        self
    }

    pub fn prefer(self) -> Self {
        self.prod.preferred = true;
        self
    }

    pub fn dynamic(self) -> Self {
        self.prod.dynamic = true;
        self
    }

    pub fn nops(self) -> Self {
        self.prod.nops = true;
        self
    }

    pub fn nopse(self) -> Self {
        self.prod.nopse = true;
        self
    }
}

/// Builder for a [`Grammar`].
///
/// # Examples
///
/// ```
/// use silva::grammar::{GrammarBuilder, Associativity, SymbolRef, builder::lit};
/// use silva::scanner::Recognizer;
///
/// let mut builder = GrammarBuilder::new();
/// let number = builder.terminal("number", Recognizer::regex(r"\d+").unwrap());
/// let e = builder.nonterminal("E");
/// builder
///     .production(e, [e.into(), lit("+"), e.into()])
///     .assoc(Associativity::Left);
/// builder.production(e, [SymbolRef::from(number)]);
/// builder.set_start(e);
/// let grammar = builder.build().unwrap();
/// assert_eq!(grammar.productions_of(e).count(), 2);
/// ```
pub struct GrammarBuilder {
    terminals: Vec<Terminal>,
    nonterminals: Vec<NonTerminal>,
    pending: Vec<PendingProduction>,
    start: Option<NonTermId>,
    by_name: HashMap<CompactString, SymbolId, ahash::RandomState>,
    overrides: HashMap<CompactString, Arc<dyn Recognize>, ahash::RandomState>,
    duplicates: Vec<CompactString>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            terminals: Vec::new(),
            nonterminals: Vec::new(),
            pending: Vec::new(),
            start: None,
            by_name: HashMap::with_hasher(ahash::RandomState::new()),
            overrides: HashMap::with_hasher(ahash::RandomState::new()),
            duplicates: Vec::new(),
        };
        // Reserved terminals occupy the first two slots.
        builder.register_terminal("EMPTY", Some(Recognizer::Empty), TerminalOptions::default());
        builder.register_terminal("EOF", Some(Recognizer::Eof), TerminalOptions::default());
        builder
    }

    /// Add a terminal with default options.
    pub fn terminal(&mut self, name: impl Into<CompactString>, recognizer: Recognizer) -> TermId {
        self.register_terminal(name, Some(recognizer), TerminalOptions::default())
    }

    /// Add a terminal with explicit lexical-disambiguation options.
    pub fn terminal_opts(
        &mut self,
        name: impl Into<CompactString>,
        recognizer: Recognizer,
        options: TerminalOptions,
    ) -> TermId {
        self.register_terminal(name, Some(recognizer), options)
    }

    /// Add a terminal whose recognizer will be supplied through
    /// [`GrammarBuilder::recognizer`] before [`GrammarBuilder::build`].
    pub fn external_terminal(
        &mut self,
        name: impl Into<CompactString>,
        options: TerminalOptions,
    ) -> TermId {
        self.register_terminal(name, None, options)
    }

    fn register_terminal(
        &mut self,
        name: impl Into<CompactString>,
        recognizer: Option<Recognizer>,
        options: TerminalOptions,
    ) -> TermId {
        let name = name.into();
        if let Some(existing) = self.by_name.get(&name) {
            self.duplicates.push(name);
            return match existing {
                SymbolId::Term(t) => *t,
                SymbolId::NonTerm(_) => TermId(0),
            };
        }
        let id = TermId(self.terminals.len() as u32);
        self.by_name.insert(name.clone(), SymbolId::Term(id));
        self.terminals.push(Terminal {
            name,
            recognizer,
            priority: options.priority,
            prefer: options.prefer,
            finish: options.finish,
            dynamic: options.dynamic,
        });
        id
    }

    /// Add a non-terminal, or return the existing id for the name.
    pub fn nonterminal(&mut self, name: impl Into<CompactString>) -> NonTermId {
        let name = name.into();
        if let Some(SymbolId::NonTerm(id)) = self.by_name.get(&name) {
            return *id;
        }
        let id = NonTermId(self.nonterminals.len() as u32);
        self.by_name.insert(name.clone(), SymbolId::NonTerm(id));
        self.nonterminals.push(NonTerminal {
            name,
            productions: SmallVec::new(),
        });
        id
    }

    /// Supply (or override) a recognizer for a terminal by name.
    pub fn recognizer(&mut self, name: impl Into<CompactString>, recognizer: Arc<dyn Recognize>) {
        self.overrides.insert(name.into(), recognizer);
    }

    /// Stage a production; the returned guard sets its metadata.
    pub fn production<I>(&mut self, lhs: NonTermId, rhs: I) -> ProductionMut<'_>
    where
        I: IntoIterator,
        I::Item: Into<SymbolRef>,
    {
        self.pending.push(PendingProduction {
            lhs,
            rhs: rhs.into_iter().map(Into::into).collect(),
            priority: None,
            assoc: Associativity::None,
            preferred: false,
            dynamic: false,
            nops: false,
            nopse: false,
        });
        ProductionMut {
            prod: self.pending.last_mut().unwrap_or_else(|| unreachable!()),
        }
    }

    pub fn set_start(&mut self, start: NonTermId) {
        self.start = Some(start);
    }

    /// Look up a staged symbol by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    fn render_pending(&self, prod: &PendingProduction) -> String {
        let mut out = String::new();
        out.push_str(&self.nonterminals[prod.lhs.index()].name);
        out.push_str(" =");
        if prod.rhs.is_empty() {
            out.push_str(" EMPTY");
        }
        for sym in &prod.rhs {
            out.push(' ');
            match sym {
                SymbolRef::Sym(SymbolId::Term(t)) => out.push_str(&self.terminals[t.index()].name),
                SymbolRef::Sym(SymbolId::NonTerm(n)) => {
                    out.push_str(&self.nonterminals[n.index()].name);
                }
                SymbolRef::Name(n) => out.push_str(n),
                SymbolRef::Literal(v) => {
                    out.push('\'');
                    out.push_str(v);
                    out.push('\'');
                }
                SymbolRef::Regex(p) => {
                    out.push('/');
                    out.push_str(p);
                    out.push('/');
                }
            }
        }
        out
    }

    fn resolve_literal(
        &mut self,
        value: &CompactString,
        production: &str,
    ) -> Result<SymbolId, GrammarError> {
        if let Some(existing) = self.by_name.get(value.as_str()) {
            return Ok(*existing);
        }
        // An inline literal that some named terminal already recognizes is a
        // collision: the keyword must be referenced by its name.
        for terminal in &self.terminals {
            if let Some(Recognizer::Literal(lit_value)) = &terminal.recognizer
                && lit_value == value
                && terminal.name != *value
            {
                return Err(GrammarError::LiteralCollision {
                    literal: value.clone(),
                    terminal: terminal.name.clone(),
                    production: production.to_string(),
                });
            }
        }
        let id = self.register_terminal(
            value.clone(),
            Some(Recognizer::literal(value.clone())),
            TerminalOptions::default(),
        );
        Ok(SymbolId::Term(id))
    }

    fn resolve_regex(&mut self, pattern: &CompactString) -> Result<SymbolId, GrammarError> {
        if let Some(existing) = self.by_name.get(pattern.as_str()) {
            return Ok(*existing);
        }
        let recognizer =
            Recognizer::regex(pattern).map_err(|message| GrammarError::InvalidRegex {
                name: pattern.clone(),
                message,
            })?;
        let id =
            self.register_terminal(pattern.clone(), Some(recognizer), TerminalOptions::default());
        Ok(SymbolId::Term(id))
    }

    /// Freeze the builder into a validated [`Grammar`].
    ///
    /// # Errors
    ///
    /// Returns the first [`GrammarError`] found: duplicate terminals,
    /// undefined symbols, inline-literal collisions, a missing start symbol,
    /// or terminals left without a recognizer.
    pub fn build(mut self) -> Result<Grammar, GrammarError> {
        if let Some(name) = self.duplicates.first() {
            return Err(GrammarError::DuplicateTerminal { name: name.clone() });
        }
        let start = self.start.ok_or(GrammarError::NoStartSymbol)?;

        // Resolve right-hand sides; inline terminals may register new symbols.
        let pending = std::mem::take(&mut self.pending);
        let mut resolved: Vec<(PendingProduction, SmallVec<[SymbolId; 4]>)> = Vec::new();
        for prod in pending {
            let rendered = self.render_pending(&prod);
            let mut rhs: SmallVec<[SymbolId; 4]> = SmallVec::new();
            for sym in &prod.rhs {
                let id = match sym {
                    SymbolRef::Sym(id) => *id,
                    SymbolRef::Name(name) => self.by_name.get(name.as_str()).copied().ok_or_else(
                        || GrammarError::UndefinedSymbol {
                            name: name.clone(),
                            production: rendered.clone(),
                        },
                    )?,
                    SymbolRef::Literal(value) => self.resolve_literal(value, &rendered)?,
                    SymbolRef::Regex(pattern) => self.resolve_regex(pattern)?,
                };
                // EMPTY is erased from right-hand sides.
                if id != SymbolId::Term(Grammar::EMPTY) {
                    rhs.push(id);
                }
            }
            resolved.push((prod, rhs));
        }

        // Recognizer overrides, then the no-recognizer check.
        for terminal in &mut self.terminals {
            if let Some(recognizer) = self.overrides.remove(terminal.name.as_str()) {
                terminal.recognizer = Some(Recognizer::external(recognizer));
            }
        }
        for terminal in &self.terminals {
            if terminal.recognizer.is_none() {
                return Err(GrammarError::NoRecognizer {
                    name: terminal.name.clone(),
                });
            }
        }

        // The augmented symbol and production 0.
        let augmented = NonTermId(self.nonterminals.len() as u32);
        self.nonterminals.push(NonTerminal {
            name: "S'".into(),
            productions: smallvec::smallvec![ProdId(0)],
        });
        self.by_name
            .insert("S'".into(), SymbolId::NonTerm(augmented));

        let mut productions = Vec::with_capacity(resolved.len() + 1);
        productions.push(Production {
            id: ProdId(0),
            lhs: augmented,
            rhs: smallvec::smallvec![SymbolId::NonTerm(start)],
            priority: DEFAULT_PRIORITY,
            assoc: Associativity::None,
            preferred: false,
            dynamic: false,
            nops: false,
            nopse: false,
            is_empty: false,
        });
        for (prod, rhs) in resolved {
            let id = ProdId(productions.len() as u32);
            let priority = prod.priority.unwrap_or_else(|| {
                rhs.iter()
                    .filter_map(|sym| sym.as_term())
                    .map(|t| self.terminals[t.index()].priority)
                    .max()
                    .unwrap_or(DEFAULT_PRIORITY)
            });
            self.nonterminals[prod.lhs.index()].productions.push(id);
            productions.push(Production {
                id,
                lhs: prod.lhs,
                is_empty: rhs.is_empty(),
                rhs,
                priority,
                assoc: prod.assoc,
                preferred: prod.preferred,
                dynamic: prod.dynamic,
                nops: prod.nops,
                nopse: prod.nopse,
            });
        }

        let layout = match self.by_name.get("LAYOUT") {
            Some(SymbolId::NonTerm(id)) => Some(*id),
            _ => None,
        };

        Ok(Grammar {
            terminals: self.terminals,
            nonterminals: self.nonterminals,
            productions,
            start,
            augmented,
            by_name: self.by_name,
            layout,
        })
    }
}
