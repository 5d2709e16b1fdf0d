//! Semantic-action dispatch over a forest.
//!
//! The engine never introspects user actions: it holds an opaque dispatcher
//! indexed by production id and calls it bottom-up with the evaluated
//! children and the matched span.

use crate::forest::{Forest, NodeData, NodeHandle, Tree};
use crate::grammar::{NonTermId, ProdId, TermId};

/// A production-indexed reducer.
///
/// [`Forest::invoke_actions`] calls [`terminal`](Self::terminal) for every
/// leaf and [`reduce`](Self::reduce) for every chosen packed alternative, in
/// post-order. The deterministic driver calls the same methods inline when
/// tree building is disabled.
pub trait ActionDispatcher {
    type Value;

    /// Evaluate a matched terminal.
    fn terminal(&mut self, term: TermId, text: &str, span: (usize, usize)) -> Self::Value;

    /// Evaluate a reduction of `prod` over its children's results.
    fn reduce(
        &mut self,
        prod: ProdId,
        children: Vec<Self::Value>,
        span: (usize, usize),
    ) -> Self::Value;

    /// Choose which of `count` packed alternatives of an ambiguous node to
    /// evaluate. The default takes the first.
    fn resolve(&mut self, sym: NonTermId, span: (usize, usize), count: usize) -> usize {
        let _ = (sym, span, count);
        0
    }
}

pub(crate) fn invoke<D: ActionDispatcher>(
    forest: &Forest,
    node: NodeHandle,
    dispatcher: &mut D,
) -> D::Value {
    match &forest.nodes[node.index()] {
        NodeData::Terminal {
            term,
            start,
            end,
            text,
        } => dispatcher.terminal(*term, text, (*start, *end)),
        NodeData::NonTerminal {
            sym,
            start,
            end,
            alts,
        } => {
            let choice = if alts.len() > 1 {
                dispatcher.resolve(*sym, (*start, *end), alts.len()).min(alts.len() - 1)
            } else {
                0
            };
            let alt = &alts[choice];
            let children = alt
                .children
                .iter()
                .map(|child| invoke(forest, *child, dispatcher))
                .collect();
            dispatcher.reduce(alt.prod, children, (*start, *end))
        }
    }
}

/// A dispatcher that rebuilds the chosen derivation as a [`Tree`]; the
/// default action set when callers only want structure.
#[derive(Debug)]
pub struct CollectTrees<'g> {
    grammar: &'g crate::grammar::Grammar,
}

impl<'g> CollectTrees<'g> {
    #[must_use]
    pub const fn new(grammar: &'g crate::grammar::Grammar) -> Self {
        Self { grammar }
    }
}

impl ActionDispatcher for CollectTrees<'_> {
    type Value = Tree;

    fn terminal(&mut self, term: TermId, text: &str, span: (usize, usize)) -> Tree {
        Tree::Leaf {
            term,
            start: span.0,
            end: span.1,
            text: text.into(),
        }
    }

    fn reduce(&mut self, prod: ProdId, children: Vec<Tree>, _span: (usize, usize)) -> Tree {
        Tree::Node {
            sym: self.grammar.production(prod).lhs,
            prod,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    struct Sum;

    impl ActionDispatcher for Sum {
        type Value = i64;

        fn terminal(&mut self, _term: TermId, text: &str, _span: (usize, usize)) -> i64 {
            text.parse().unwrap_or(0)
        }

        fn reduce(&mut self, _prod: ProdId, children: Vec<i64>, _span: (usize, usize)) -> i64 {
            children.iter().sum()
        }
    }

    #[test]
    fn post_order_evaluation() {
        let mut forest = Forest::new();
        let one = forest.terminal(TermId(2), 0, 1, "1");
        let two = forest.terminal(TermId(2), 2, 3, "2");
        let (node, _) = forest.pack(NonTermId(0), 0, 3, ProdId(1), smallvec![one, two]);
        assert_eq!(forest.invoke_actions(node, &mut Sum), 3);
    }

    struct PickSecond;

    impl ActionDispatcher for PickSecond {
        type Value = ProdId;

        fn terminal(&mut self, _term: TermId, _text: &str, _span: (usize, usize)) -> ProdId {
            ProdId(0)
        }

        fn reduce(&mut self, prod: ProdId, _children: Vec<ProdId>, _span: (usize, usize)) -> ProdId {
            prod
        }

        fn resolve(&mut self, _sym: NonTermId, _span: (usize, usize), _count: usize) -> usize {
            1
        }
    }

    #[test]
    fn resolve_picks_the_alternative() {
        let mut forest = Forest::new();
        let a = forest.terminal(TermId(2), 0, 1, "a");
        let (node, _) = forest.pack(NonTermId(0), 0, 1, ProdId(1), smallvec![a]);
        forest.pack(NonTermId(0), 0, 1, ProdId(2), smallvec![a]);
        assert_eq!(forest.invoke_actions(node, &mut PickSecond), ProdId(2));
    }
}
