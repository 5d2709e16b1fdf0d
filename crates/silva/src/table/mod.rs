//! # Parse Tables
//!
//! LR(1)/LALR/SLR item-set construction and the ACTION/GOTO tables the
//! drivers run on.
//!
//! ## Overview
//!
//! [`ParseTables::build`] constructs the automaton for a frozen grammar:
//!
//! - `lalr` (the default): canonical LR(1) states are built first, then
//!   states with identical cores are merged with lookahead union, unless the
//!   merge would introduce a reduce/reduce conflict that no unmerged state
//!   had, in which case the affected states stay separate. This preserves
//!   LR(1) coverage: a grammar that is LR(1) always builds conflict-free.
//! - `slr`: LR(0) states; reductions use FOLLOW sets.
//!
//! ACTION and GOTO are total over (state, terminal) and (state, non-terminal):
//! an absent entry is the Error action, reported as an empty action slice or
//! `None`. A cell may hold several actions only when the tables are built for
//! the generalized driver; the deterministic build fails with a
//! [`TableError`](crate::error::TableError) listing every unresolved conflict.

mod build;

use crate::grammar::{Grammar, NonTermId, ProdId, TermId};
use hashbrown::HashMap;
use smallvec::SmallVec;

/// Identifier of an automaton state. State 0 is the start state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct StateId(pub(crate) u32);

impl StateId {
    /// The start state.
    pub const START: Self = Self(0);

    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One parse action. The Error action is the absence of any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shift(StateId),
    Reduce(ProdId),
    Accept,
}

/// Which table construction to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableKind {
    Slr,
    #[default]
    Lalr,
}

/// Options for [`ParseTables::build`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TableOptions {
    pub kind: TableKind,
    /// Keep every action of an unresolved conflict instead of failing; set by
    /// the GLR driver.
    pub generalized: bool,
    /// Resolve remaining shift/reduce conflicts in favor of shift
    /// (deterministic mode only; productions can opt out with `nops`/`nopse`).
    pub prefer_shifts: bool,
}

/// An LR item inside a state, kept for diagnostics and debug dumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Item {
    pub(crate) prod: ProdId,
    pub(crate) dot: u16,
}

#[derive(Debug)]
pub(crate) struct StateTable {
    pub(crate) actions: HashMap<TermId, SmallVec<[Action; 1]>, ahash::RandomState>,
    pub(crate) gotos: HashMap<NonTermId, StateId, ahash::RandomState>,
    /// Terminals with at least one action, sorted; the scanner's legal set.
    pub(crate) legal: Vec<TermId>,
    pub(crate) items: Vec<Item>,
}

/// The ACTION/GOTO tables for one grammar and one start symbol.
///
/// Immutable after construction and shareable across parser instances.
#[derive(Debug)]
pub struct ParseTables {
    states: Vec<StateTable>,
    kind: TableKind,
}

impl ParseTables {
    /// Build tables for `grammar`.
    ///
    /// # Errors
    ///
    /// Returns a [`TableError`](crate::error::TableError) listing every
    /// unresolved conflict when `options.generalized` is false.
    pub fn build(
        grammar: &Grammar,
        options: TableOptions,
    ) -> Result<Self, crate::error::TableError> {
        build::build(grammar, options)
    }

    /// Actions for (state, terminal); empty means Error.
    #[must_use]
    pub fn actions(&self, state: StateId, term: TermId) -> &[Action] {
        self.states[state.index()]
            .actions
            .get(&term)
            .map_or(&[], |cell| cell.as_slice())
    }

    /// GOTO for (state, non-terminal); `None` means Error.
    #[must_use]
    pub fn goto(&self, state: StateId, nt: NonTermId) -> Option<StateId> {
        self.states[state.index()].gotos.get(&nt).copied()
    }

    /// Terminals that have an action in `state`, sorted by id.
    #[must_use]
    pub fn legal_terminals(&self, state: StateId) -> &[TermId] {
        &self.states[state.index()].legal
    }

    #[must_use]
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub const fn kind(&self) -> TableKind {
        self.kind
    }

    /// Names of the terminals expected in `state`, for error reporting.
    #[must_use]
    pub fn expected(&self, state: StateId, grammar: &Grammar) -> Vec<String> {
        let mut names: Vec<String> = self
            .legal_terminals(state)
            .iter()
            .map(|t| grammar.terminal(*t).name.to_string())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn from_parts(states: Vec<StateTable>, kind: TableKind) -> Self {
        Self { states, kind }
    }

    /// Dump states, items and actions through `log::debug!`.
    pub fn dump(&self, grammar: &Grammar) {
        for (idx, state) in self.states.iter().enumerate() {
            log::debug!("state {idx}");
            for item in &state.items {
                log::debug!("    {}", item_str(grammar, *item));
            }
            let mut actions: Vec<_> = state.actions.iter().collect();
            actions.sort_by_key(|(t, _)| **t);
            for (term, cell) in actions {
                for action in cell {
                    let rendered = match action {
                        Action::Shift(s) => format!("shift {}", s.0),
                        Action::Reduce(p) => format!("reduce {}", grammar.production_str(*p)),
                        Action::Accept => "accept".to_string(),
                    };
                    log::debug!("    on '{}': {rendered}", grammar.terminal(*term).name);
                }
            }
            let mut gotos: Vec<_> = state.gotos.iter().collect();
            gotos.sort_by_key(|(n, _)| **n);
            for (nt, target) in gotos {
                log::debug!(
                    "    goto '{}': {}",
                    grammar.nonterminal(*nt).name,
                    target.0
                );
            }
        }
    }
}

/// Render an item as `E = E . '+' E`.
pub(crate) fn item_str(grammar: &Grammar, item: Item) -> String {
    let prod = grammar.production(item.prod);
    let mut out = String::new();
    out.push_str(&grammar.nonterminal(prod.lhs).name);
    out.push_str(" =");
    for (idx, sym) in prod.rhs.iter().enumerate() {
        if idx == item.dot as usize {
            out.push_str(" .");
        }
        out.push(' ');
        out.push_str(grammar.symbol_name(*sym));
    }
    if item.dot as usize == prod.rhs.len() {
        out.push_str(" .");
    }
    out
}
