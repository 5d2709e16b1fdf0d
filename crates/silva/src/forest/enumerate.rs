//! Lazy tree enumeration over a packed forest.
//!
//! Every tree under a node has a stable index in `0..tree_count(node)`. The
//! iterator decodes index `i` into a tree by walking the packed choices in
//! mixed-radix order: alternatives of a node first, then each child's own
//! subtree count as a radix digit. Decoding is a pure function of the forest,
//! so the iterator is restartable and side-effect free.

use crate::forest::{Forest, NodeData, NodeHandle, Tree};
use hashbrown::HashMap;

/// Iterator over every tree under one forest node.
pub struct TreeIter<'f> {
    forest: &'f Forest,
    root: NodeHandle,
    next: usize,
    total: usize,
    memo: HashMap<NodeHandle, usize, ahash::RandomState>,
}

impl<'f> TreeIter<'f> {
    pub(crate) fn new(forest: &'f Forest, root: NodeHandle) -> Self {
        let mut memo = HashMap::with_hasher(ahash::RandomState::new());
        let total = forest.count_rec(root, &mut memo);
        Self {
            forest,
            root,
            next: 0,
            total,
            memo,
        }
    }

    /// Total number of trees this iterator will yield.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for TreeIter<'_> {
    type Item = Tree;

    fn next(&mut self) -> Option<Tree> {
        if self.next >= self.total {
            return None;
        }
        let tree = decode_memo(self.forest, self.root, self.next, &mut self.memo);
        self.next += 1;
        tree
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TreeIter<'_> {}

/// Decode the `index`-th tree under `node`.
pub(crate) fn decode(forest: &Forest, node: NodeHandle, index: usize) -> Option<Tree> {
    let mut memo = HashMap::with_hasher(ahash::RandomState::new());
    decode_memo(forest, node, index, &mut memo)
}

fn decode_memo(
    forest: &Forest,
    node: NodeHandle,
    index: usize,
    memo: &mut HashMap<NodeHandle, usize, ahash::RandomState>,
) -> Option<Tree> {
    match &forest.nodes[node.index()] {
        NodeData::Terminal {
            term,
            start,
            end,
            text,
        } => (index == 0).then(|| Tree::Leaf {
            term: *term,
            start: *start,
            end: *end,
            text: text.clone(),
        }),
        NodeData::NonTerminal { sym, alts, .. } => {
            let mut index = index;
            for alt in alts {
                let alt_total = alt
                    .children
                    .iter()
                    .map(|child| forest.count_rec(*child, memo))
                    .fold(1usize, usize::saturating_mul);
                if index >= alt_total {
                    index -= alt_total;
                    continue;
                }
                // Decode this alternative: children are radix digits, the
                // last child varying fastest.
                let mut children = Vec::with_capacity(alt.children.len());
                let mut remainder = index;
                let radixes: Vec<usize> = alt
                    .children
                    .iter()
                    .map(|child| forest.count_rec(*child, memo))
                    .collect();
                let mut digits = vec![0usize; radixes.len()];
                for (digit, radix) in digits.iter_mut().zip(&radixes).rev() {
                    *digit = remainder % *radix;
                    remainder /= *radix;
                }
                for (child, digit) in alt.children.iter().zip(digits) {
                    children.push(decode_memo(forest, *child, digit, memo)?);
                }
                return Some(Tree::Node {
                    sym: *sym,
                    prod: alt.prod,
                    children,
                });
            }
            None
        }
    }
}
