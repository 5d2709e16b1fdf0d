//! # Grammar Module
//!
//! The grammar intermediate representation: terminals, non-terminals,
//! productions and their disambiguation metadata.
//!
//! ## Overview
//!
//! A [`Grammar`] is assembled through a [`GrammarBuilder`] (or parsed from the
//! textual form by [`Grammar::from_string`]) and frozen by
//! [`GrammarBuilder::build`]. Once frozen it is immutable and can be shared
//! across parser instances behind an `Arc`.
//!
//! Symbols are identified by stable integer ids: [`TermId`] and [`NonTermId`],
//! wrapped by the closed [`SymbolId`] variant. Two terminals are reserved for
//! every grammar: `EMPTY` (matches nothing, erased from right-hand sides at
//! freeze) and `EOF` (matches only at end of input). Production 0 is always
//! the augmented `S' -> S`, with acceptance recorded on `EOF`.

pub mod analysis;
pub mod builder;
pub mod parse;

pub use analysis::GrammarAnalysis;
pub use builder::{GrammarBuilder, ProductionMut, SymbolRef, TerminalOptions};

use crate::error::{Error, GrammarError};
use crate::scanner::Recognizer;
use compact_str::CompactString;
use hashbrown::HashMap;
use smallvec::SmallVec;

/// Default priority for terminals and productions without an explicit one.
pub const DEFAULT_PRIORITY: u32 = 10;

/// Identifier of a terminal symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct TermId(pub(crate) u32);

/// Identifier of a non-terminal symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NonTermId(pub(crate) u32);

/// Identifier of a production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ProdId(pub(crate) u32);

impl TermId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl NonTermId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl ProdId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A grammar symbol: either a terminal or a non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum SymbolId {
    Term(TermId),
    NonTerm(NonTermId),
}

impl SymbolId {
    #[must_use]
    pub const fn as_term(self) -> Option<TermId> {
        match self {
            Self::Term(t) => Some(t),
            Self::NonTerm(_) => None,
        }
    }

    #[must_use]
    pub const fn as_nonterm(self) -> Option<NonTermId> {
        match self {
            Self::NonTerm(n) => Some(n),
            Self::Term(_) => None,
        }
    }
}

impl From<TermId> for SymbolId {
    fn from(id: TermId) -> Self {
        Self::Term(id)
    }
}

impl From<NonTermId> for SymbolId {
    fn from(id: NonTermId) -> Self {
        Self::NonTerm(id)
    }
}

/// Associativity of a production, used for shift/reduce resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Associativity {
    #[default]
    None,
    Left,
    Right,
}

/// A terminal symbol with its recognizer and lexical-disambiguation metadata.
#[derive(Debug, Clone)]
pub struct Terminal {
    pub name: CompactString,
    pub(crate) recognizer: Option<Recognizer>,
    /// Priority used for lexical disambiguation.
    pub priority: u32,
    /// Prefer this terminal when several recognizers match at the same place
    /// with the same length.
    pub prefer: bool,
    /// Stop scanning other recognizers if this one succeeds.
    pub finish: bool,
    /// Route conflicts involving this terminal to the dynamic resolver.
    pub dynamic: bool,
}

/// A non-terminal symbol with the ordered list of its productions.
#[derive(Debug, Clone)]
pub struct NonTerminal {
    pub name: CompactString,
    pub(crate) productions: SmallVec<[ProdId; 4]>,
}

impl NonTerminal {
    /// Ids of this non-terminal's productions, in definition order.
    #[must_use]
    pub fn productions(&self) -> &[ProdId] {
        &self.productions
    }
}

/// A production rule with its disambiguation metadata.
///
/// `EMPTY` references are erased from `rhs` at freeze; a production whose
/// right-hand side erases to nothing has `is_empty` set.
#[derive(Debug, Clone)]
pub struct Production {
    pub id: ProdId,
    pub lhs: NonTermId,
    pub rhs: SmallVec<[SymbolId; 4]>,
    pub priority: u32,
    pub assoc: Associativity,
    /// Wins reduce/reduce ties of equal priority.
    pub preferred: bool,
    /// Route conflicts involving this production to the dynamic resolver.
    pub dynamic: bool,
    /// Opt out of `prefer_shifts` for this production.
    pub nops: bool,
    /// Opt out of `prefer_shifts` when the reduction spans no input.
    pub nopse: bool,
    pub is_empty: bool,
}

impl Production {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.rhs.len()
    }
}

/// A frozen, immutable grammar.
///
/// # Examples
///
/// ```
/// use silva::Grammar;
///
/// let grammar = Grammar::from_string("S: 'a' S | 'a';").unwrap();
/// assert_eq!(grammar.nonterminal(grammar.start()).name, "S");
/// ```
#[derive(Debug, Clone)]
pub struct Grammar {
    pub(crate) terminals: Vec<Terminal>,
    pub(crate) nonterminals: Vec<NonTerminal>,
    pub(crate) productions: Vec<Production>,
    pub(crate) start: NonTermId,
    pub(crate) augmented: NonTermId,
    pub(crate) by_name: HashMap<CompactString, SymbolId, ahash::RandomState>,
    pub(crate) layout: Option<NonTermId>,
}

impl Grammar {
    /// The reserved `EMPTY` terminal.
    pub const EMPTY: TermId = TermId(0);
    /// The reserved end-of-input terminal.
    pub const EOF: TermId = TermId(1);
    /// The augmented production `S' -> S`.
    pub const AUGMENTED: ProdId = ProdId(0);

    /// Parse a grammar from its textual form.
    ///
    /// # Errors
    ///
    /// Returns [`GrammarError`] for syntax errors in the grammar text and for
    /// validation failures (undefined symbols, duplicate terminals, missing
    /// recognizers).
    pub fn from_string(source: &str) -> Result<Self, GrammarError> {
        GrammarBuilder::from_string(source)?.build()
    }

    /// Parse a grammar from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the file cannot be read, otherwise as
    /// [`Grammar::from_string`].
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let source = std::fs::read_to_string(path)?;
        Ok(Self::from_string(&source)?)
    }

    #[must_use]
    pub fn terminal(&self, id: TermId) -> &Terminal {
        &self.terminals[id.index()]
    }

    #[must_use]
    pub fn nonterminal(&self, id: NonTermId) -> &NonTerminal {
        &self.nonterminals[id.index()]
    }

    #[must_use]
    pub fn production(&self, id: ProdId) -> &Production {
        &self.productions[id.index()]
    }

    /// The start symbol `S`.
    #[must_use]
    pub const fn start(&self) -> NonTermId {
        self.start
    }

    /// The augmented start symbol `S'`.
    #[must_use]
    pub const fn augmented(&self) -> NonTermId {
        self.augmented
    }

    /// The `LAYOUT` non-terminal, when the grammar defines one.
    #[must_use]
    pub const fn layout(&self) -> Option<NonTermId> {
        self.layout
    }

    pub fn terminals(&self) -> impl Iterator<Item = (TermId, &Terminal)> {
        self.terminals
            .iter()
            .enumerate()
            .map(|(i, t)| (TermId(i as u32), t))
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (NonTermId, &NonTerminal)> {
        self.nonterminals
            .iter()
            .enumerate()
            .map(|(i, n)| (NonTermId(i as u32), n))
    }

    pub fn productions(&self) -> impl Iterator<Item = &Production> {
        self.productions.iter()
    }

    /// Productions of `lhs`, in definition order.
    pub fn productions_of(&self, lhs: NonTermId) -> impl Iterator<Item = &Production> {
        self.nonterminal(lhs)
            .productions
            .iter()
            .map(|id| self.production(*id))
    }

    /// Look a symbol up by name.
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    /// Display name of a symbol.
    #[must_use]
    pub fn symbol_name(&self, id: SymbolId) -> &str {
        match id {
            SymbolId::Term(t) => &self.terminal(t).name,
            SymbolId::NonTerm(n) => &self.nonterminal(n).name,
        }
    }

    #[must_use]
    pub fn num_terminals(&self) -> usize {
        self.terminals.len()
    }

    #[must_use]
    pub fn num_nonterminals(&self) -> usize {
        self.nonterminals.len()
    }

    /// Render a production as `Lhs = rhs1 rhs2`, as used in diagnostics.
    #[must_use]
    pub fn production_str(&self, id: ProdId) -> String {
        let prod = self.production(id);
        let mut out = String::new();
        out.push_str(&self.nonterminal(prod.lhs).name);
        out.push_str(" =");
        if prod.rhs.is_empty() {
            out.push_str(" EMPTY");
        }
        for sym in &prod.rhs {
            out.push(' ');
            out.push_str(self.symbol_name(*sym));
        }
        out
    }

    /// A copy of this grammar re-rooted at `start`.
    ///
    /// Used for the secondary `LAYOUT` parser and for the `start_symbol`
    /// configuration override; the augmented production is re-pointed and
    /// everything else is shared structure.
    #[must_use]
    pub(crate) fn for_start(&self, start: NonTermId) -> Self {
        let mut grammar = self.clone();
        grammar.start = start;
        let augmented = &mut grammar.productions[Self::AUGMENTED.index()];
        augmented.rhs = smallvec::smallvec![SymbolId::NonTerm(start)];
        grammar
    }
}
