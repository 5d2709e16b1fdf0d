//! # Parse Forest
//!
//! The shared packed parse forest: the result representation of both
//! drivers.
//!
//! ## Overview
//!
//! A [`Forest`] is an arena of nodes addressed by [`NodeHandle`]s. Terminal
//! nodes carry the matched text and span; non-terminal nodes carry one or
//! more *packed alternatives*, each naming the production used and the
//! ordered child handles. Sub-derivations of the same symbol over the same
//! span share one node (dedup by `(symbol, start, end)`), and a node never
//! holds two alternatives with the same `(production, children)`. This is
//! what keeps an exponential number of parses polynomial in space.
//!
//! Trees are extracted lazily with [`Forest::enumerate_trees`], and semantic
//! actions run over a chosen derivation with [`Forest::invoke_actions`].

mod actions;
mod enumerate;

pub use actions::{ActionDispatcher, CollectTrees};
pub use enumerate::TreeIter;

use crate::grammar::{Grammar, NonTermId, ProdId, SymbolId, TermId};
use compact_str::CompactString;
use hashbrown::HashMap;
use smallvec::SmallVec;

/// Handle of a forest node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeHandle(pub(crate) u32);

impl NodeHandle {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One way to derive a non-terminal node's span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedAlt {
    pub prod: ProdId,
    pub children: SmallVec<[NodeHandle; 4]>,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Terminal {
        term: TermId,
        start: usize,
        end: usize,
        text: CompactString,
    },
    NonTerminal {
        sym: NonTermId,
        start: usize,
        end: usize,
        alts: SmallVec<[PackedAlt; 1]>,
    },
}

/// Arena-owned shared packed parse forest.
#[derive(Debug, Default, Clone)]
pub struct Forest {
    pub(crate) nodes: Vec<NodeData>,
    term_index: HashMap<(TermId, usize, usize), NodeHandle, ahash::RandomState>,
    nt_index: HashMap<(NonTermId, usize, usize), NodeHandle, ahash::RandomState>,
}

impl Forest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Intern the terminal node for `(term, start, end)`.
    pub(crate) fn terminal(
        &mut self,
        term: TermId,
        start: usize,
        end: usize,
        text: &str,
    ) -> NodeHandle {
        if let Some(existing) = self.term_index.get(&(term, start, end)) {
            return *existing;
        }
        let handle = NodeHandle(self.nodes.len() as u32);
        self.nodes.push(NodeData::Terminal {
            term,
            start,
            end,
            text: text.into(),
        });
        self.term_index.insert((term, start, end), handle);
        handle
    }

    /// Intern the non-terminal node for `(sym, start, end)` and pack one
    /// alternative into it. Returns the handle and whether the alternative
    /// was new.
    pub(crate) fn pack(
        &mut self,
        sym: NonTermId,
        start: usize,
        end: usize,
        prod: ProdId,
        children: SmallVec<[NodeHandle; 4]>,
    ) -> (NodeHandle, bool) {
        let handle = match self.nt_index.get(&(sym, start, end)) {
            Some(existing) => *existing,
            None => {
                let handle = NodeHandle(self.nodes.len() as u32);
                self.nodes.push(NodeData::NonTerminal {
                    sym,
                    start,
                    end,
                    alts: SmallVec::new(),
                });
                self.nt_index.insert((sym, start, end), handle);
                handle
            }
        };
        // A node must not derive itself: that would encode an infinite family
        // of derivations, which tree enumeration cannot represent.
        if children.contains(&handle) {
            return (handle, false);
        }
        let NodeData::NonTerminal { alts, .. } = &mut self.nodes[handle.index()] else {
            unreachable!("non-terminal index points at a terminal node");
        };
        let alt = PackedAlt { prod, children };
        if alts.contains(&alt) {
            (handle, false)
        } else {
            alts.push(alt);
            (handle, true)
        }
    }

    /// The input span `(start, end)` a node covers.
    #[must_use]
    pub fn span(&self, node: NodeHandle) -> (usize, usize) {
        match &self.nodes[node.index()] {
            NodeData::Terminal { start, end, .. } | NodeData::NonTerminal { start, end, .. } => {
                (*start, *end)
            }
        }
    }

    /// The symbol a node derives.
    #[must_use]
    pub fn symbol(&self, node: NodeHandle) -> SymbolId {
        match &self.nodes[node.index()] {
            NodeData::Terminal { term, .. } => SymbolId::Term(*term),
            NodeData::NonTerminal { sym, .. } => SymbolId::NonTerm(*sym),
        }
    }

    #[must_use]
    pub fn is_terminal(&self, node: NodeHandle) -> bool {
        matches!(self.nodes[node.index()], NodeData::Terminal { .. })
    }

    /// Matched text of a terminal node.
    #[must_use]
    pub fn text(&self, node: NodeHandle) -> Option<&str> {
        match &self.nodes[node.index()] {
            NodeData::Terminal { text, .. } => Some(text),
            NodeData::NonTerminal { .. } => None,
        }
    }

    /// Packed alternatives of a non-terminal node; empty for terminals.
    #[must_use]
    pub fn alternatives(&self, node: NodeHandle) -> &[PackedAlt] {
        match &self.nodes[node.index()] {
            NodeData::Terminal { .. } => &[],
            NodeData::NonTerminal { alts, .. } => alts,
        }
    }

    /// Whether the subforest under `node` packs more than one derivation.
    #[must_use]
    pub fn is_ambiguous(&self, node: NodeHandle) -> bool {
        self.tree_count(node) > 1
    }

    /// Number of distinct trees under `node`, saturating at `usize::MAX`.
    #[must_use]
    pub fn tree_count(&self, node: NodeHandle) -> usize {
        let mut memo: HashMap<NodeHandle, usize, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        self.count_rec(node, &mut memo)
    }

    pub(crate) fn count_rec(
        &self,
        node: NodeHandle,
        memo: &mut HashMap<NodeHandle, usize, ahash::RandomState>,
    ) -> usize {
        if let Some(cached) = memo.get(&node) {
            return *cached;
        }
        let count = match &self.nodes[node.index()] {
            NodeData::Terminal { .. } => 1,
            NodeData::NonTerminal { alts, .. } => alts
                .iter()
                .map(|alt| {
                    alt.children
                        .iter()
                        .map(|child| self.count_rec(*child, memo))
                        .fold(1usize, usize::saturating_mul)
                })
                .fold(0usize, usize::saturating_add),
        };
        memo.insert(node, count);
        count
    }

    /// Lazily enumerate every tree under `node`.
    ///
    /// The iterator is restartable and has no side effects on the forest; for
    /// ambiguous inputs the number of trees can be exponential in the input
    /// length, so callers should bound their consumption.
    #[must_use]
    pub fn enumerate_trees(&self, node: NodeHandle) -> TreeIter<'_> {
        TreeIter::new(self, node)
    }

    /// Extract the `index`-th tree under `node`, if it exists.
    #[must_use]
    pub fn tree(&self, node: NodeHandle, index: usize) -> Option<Tree> {
        enumerate::decode(self, node, index)
    }

    /// Run `dispatcher` bottom-up over one derivation under `node`.
    ///
    /// For nodes packing several alternatives the dispatcher's
    /// [`resolve`](ActionDispatcher::resolve) picks which one is evaluated.
    pub fn invoke_actions<D: ActionDispatcher>(
        &self,
        node: NodeHandle,
        dispatcher: &mut D,
    ) -> D::Value {
        actions::invoke(self, node, dispatcher)
    }

    /// Concatenated leaf text of the first derivation under `node`.
    ///
    /// For an unambiguous parse this is the input that was consumed (layout
    /// excluded).
    #[must_use]
    pub fn leaf_text(&self, node: NodeHandle) -> String {
        let mut out = String::new();
        self.collect_leaves(node, &mut out);
        out
    }

    fn collect_leaves(&self, node: NodeHandle, out: &mut String) {
        match &self.nodes[node.index()] {
            NodeData::Terminal { text, .. } => out.push_str(text),
            NodeData::NonTerminal { alts, .. } => {
                if let Some(alt) = alts.first() {
                    for child in &alt.children {
                        self.collect_leaves(*child, out);
                    }
                }
            }
        }
    }
}

/// One concrete tree extracted from a forest.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Tree {
    Leaf {
        term: TermId,
        start: usize,
        end: usize,
        text: CompactString,
    },
    Node {
        sym: NonTermId,
        prod: ProdId,
        children: Vec<Tree>,
    },
}

impl Tree {
    /// The input span this tree covers; empty nodes report `None`.
    #[must_use]
    pub fn span(&self) -> Option<(usize, usize)> {
        match self {
            Self::Leaf { start, end, .. } => Some((*start, *end)),
            Self::Node { children, .. } => {
                let start = children.iter().find_map(Tree::span)?.0;
                let end = children.iter().rev().find_map(Tree::span)?.1;
                Some((start, end))
            }
        }
    }

    /// Concatenated leaf text, in order.
    #[must_use]
    pub fn leaf_text(&self) -> String {
        let mut out = String::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut String) {
        match self {
            Self::Leaf { text, .. } => out.push_str(text),
            Self::Node { children, .. } => {
                for child in children {
                    child.collect(out);
                }
            }
        }
    }

    /// Indented rendering of the tree, one node per line.
    #[must_use]
    pub fn tree_str(&self, grammar: &Grammar) -> String {
        let mut out = String::new();
        self.render(grammar, 0, &mut out);
        out
    }

    fn render(&self, grammar: &Grammar, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match self {
            Self::Leaf {
                term, start, end, text, ..
            } => {
                use std::fmt::Write;
                let _ = writeln!(
                    out,
                    "{}[{start}-{end}] '{text}'",
                    grammar.terminal(*term).name
                );
            }
            Self::Node { sym, children, .. } => {
                use std::fmt::Write;
                let _ = writeln!(out, "{}", grammar.nonterminal(*sym).name);
                for child in children {
                    child.render(grammar, depth + 1, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (NonTermId, ProdId, ProdId) {
        (NonTermId(0), ProdId(1), ProdId(2))
    }

    #[test]
    fn terminal_nodes_are_shared() {
        let mut forest = Forest::new();
        let a = forest.terminal(TermId(2), 0, 1, "a");
        let b = forest.terminal(TermId(2), 0, 1, "a");
        let c = forest.terminal(TermId(2), 1, 2, "a");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(forest.num_nodes(), 2);
    }

    #[test]
    fn packing_dedups_identical_alternatives() {
        let (sym, p1, p2) = ids();
        let mut forest = Forest::new();
        let leaf = forest.terminal(TermId(2), 0, 1, "a");
        let (node, added) = forest.pack(sym, 0, 1, p1, smallvec::smallvec![leaf]);
        assert!(added);
        let (same, added_again) = forest.pack(sym, 0, 1, p1, smallvec::smallvec![leaf]);
        assert_eq!(node, same);
        assert!(!added_again);
        let (_, second_alt) = forest.pack(sym, 0, 1, p2, smallvec::smallvec![leaf]);
        assert!(second_alt);
        assert_eq!(forest.alternatives(node).len(), 2);
        assert_eq!(forest.tree_count(node), 2);
    }

    #[test]
    fn self_referential_alternative_is_rejected() {
        let (sym, p1, _) = ids();
        let mut forest = Forest::new();
        let leaf = forest.terminal(TermId(2), 0, 0, "");
        let (node, _) = forest.pack(sym, 0, 0, p1, smallvec::smallvec![leaf]);
        let (_, added) = forest.pack(sym, 0, 0, p1, smallvec::smallvec![node]);
        assert!(!added);
        assert_eq!(forest.alternatives(node).len(), 1);
    }

    #[test]
    fn spans_and_text() {
        let mut forest = Forest::new();
        let leaf = forest.terminal(TermId(2), 3, 5, "ab");
        assert_eq!(forest.span(leaf), (3, 5));
        assert_eq!(forest.text(leaf), Some("ab"));
        assert!(forest.is_terminal(leaf));
    }

    #[test]
    fn tree_span_skips_empty_nodes() {
        let tree = Tree::Node {
            sym: NonTermId(0),
            prod: ProdId(1),
            children: vec![
                Tree::Node {
                    sym: NonTermId(1),
                    prod: ProdId(2),
                    children: vec![],
                },
                Tree::Leaf {
                    term: TermId(2),
                    start: 2,
                    end: 3,
                    text: "x".into(),
                },
            ],
        };
        assert_eq!(tree.span(), Some((2, 3)));
    }
}
