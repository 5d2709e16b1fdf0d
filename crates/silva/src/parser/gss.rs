//! Graph-structured stack for the GLR driver.
//!
//! The GSS is a DAG growing forward in input order; edges point from a
//! successor back to its predecessor and carry the forest node that labels
//! the transition. Nodes are arena-allocated and addressed by integer
//! handles; merging is mandatory, so no two live nodes share
//! `(state, position)`.

use crate::forest::NodeHandle;
use crate::table::StateId;
use hashbrown::HashMap;
use smallvec::SmallVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GssNodeId(u32);

impl GssNodeId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GssEdgeId(u32);

impl GssEdgeId {
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct GssNode {
    state: StateId,
    edges: SmallVec<[GssEdgeId; 2]>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GssEdge {
    /// The predecessor this edge points back to.
    pub(crate) target: GssNodeId,
    /// The forest node labelling the edge.
    pub(crate) node: NodeHandle,
}

/// One path of fixed length backwards through the GSS: the edge labels in
/// left-to-right (rhs) order plus the node the path ends on.
pub(crate) struct GssPath {
    pub(crate) children: SmallVec<[NodeHandle; 4]>,
    pub(crate) tail: GssNodeId,
}

#[derive(Debug, Default)]
pub(crate) struct GssArena {
    nodes: Vec<GssNode>,
    edges: Vec<GssEdge>,
    index: HashMap<(StateId, usize), GssNodeId, ahash::RandomState>,
}

impl GssArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The node for `(state, position)`, creating it if needed. The flag is
    /// true when the node is new. The position lives in the merge index: it
    /// is what makes merging by `(state, position)` mandatory.
    pub(crate) fn node(&mut self, state: StateId, position: usize) -> (GssNodeId, bool) {
        if let Some(existing) = self.index.get(&(state, position)) {
            return (*existing, false);
        }
        let id = GssNodeId(self.nodes.len() as u32);
        self.nodes.push(GssNode {
            state,
            edges: SmallVec::new(),
        });
        self.index.insert((state, position), id);
        (id, true)
    }

    pub(crate) fn find(&self, state: StateId, position: usize) -> Option<GssNodeId> {
        self.index.get(&(state, position)).copied()
    }

    pub(crate) fn state(&self, node: GssNodeId) -> StateId {
        self.nodes[node.index()].state
    }

    pub(crate) fn edges(&self, node: GssNodeId) -> impl Iterator<Item = (GssEdgeId, GssEdge)> + '_ {
        self.nodes[node.index()]
            .edges
            .iter()
            .map(|id| (*id, self.edges[id.index()]))
    }

    /// Whether `from` already has an edge to `to` carrying `node`.
    pub(crate) fn has_edge(&self, from: GssNodeId, to: GssNodeId, node: NodeHandle) -> bool {
        self.nodes[from.index()].edges.iter().any(|id| {
            let edge = &self.edges[id.index()];
            edge.target == to && edge.node == node
        })
    }

    pub(crate) fn add_edge(
        &mut self,
        from: GssNodeId,
        to: GssNodeId,
        node: NodeHandle,
    ) -> GssEdgeId {
        let id = GssEdgeId(self.edges.len() as u32);
        self.edges.push(GssEdge { target: to, node });
        self.nodes[from.index()].edges.push(id);
        id
    }

    /// All paths of exactly `len` edges backwards from `from`. When
    /// `first_edge` is given, only paths whose first step uses that edge are
    /// returned; that constraint re-runs reductions over an edge that
    /// appeared after the node was first processed.
    pub(crate) fn paths(
        &self,
        from: GssNodeId,
        len: usize,
        first_edge: Option<GssEdgeId>,
    ) -> Vec<GssPath> {
        let mut out = Vec::new();
        if len == 0 {
            if first_edge.is_none() {
                out.push(GssPath {
                    children: SmallVec::new(),
                    tail: from,
                });
            }
            return out;
        }
        let mut stack: SmallVec<[NodeHandle; 4]> = SmallVec::new();
        self.walk(from, len, first_edge, &mut stack, &mut out);
        out
    }

    fn walk(
        &self,
        node: GssNodeId,
        remaining: usize,
        first_edge: Option<GssEdgeId>,
        stack: &mut SmallVec<[NodeHandle; 4]>,
        out: &mut Vec<GssPath>,
    ) {
        if remaining == 0 {
            // Edges were collected walking backwards; reverse into rhs order.
            let children = stack.iter().rev().copied().collect();
            out.push(GssPath {
                children,
                tail: node,
            });
            return;
        }
        for (edge_id, edge) in self.edges(node) {
            if let Some(required) = first_edge
                && edge_id != required
            {
                continue;
            }
            stack.push(edge.node);
            self.walk(edge.target, remaining - 1, None, stack, out);
            stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(n: u32) -> NodeHandle {
        NodeHandle(n)
    }

    #[test]
    fn nodes_merge_by_state_and_position() {
        let mut gss = GssArena::new();
        let (a, created_a) = gss.node(StateId(1), 3);
        let (b, created_b) = gss.node(StateId(1), 3);
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
        assert_eq!(gss.num_nodes(), 1);
    }

    #[test]
    fn paths_follow_edges_backwards() {
        let mut gss = GssArena::new();
        let (v0, _) = gss.node(StateId(0), 0);
        let (v1, _) = gss.node(StateId(1), 1);
        let (v2, _) = gss.node(StateId(2), 2);
        gss.add_edge(v1, v0, handle(10));
        gss.add_edge(v2, v1, handle(11));

        let paths = gss.paths(v2, 2, None);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].tail, v0);
        // rhs order: the oldest edge first.
        assert_eq!(paths[0].children.as_slice(), &[handle(10), handle(11)]);
    }

    #[test]
    fn multiple_predecessors_multiply_paths() {
        let mut gss = GssArena::new();
        let (v0, _) = gss.node(StateId(0), 0);
        let (v1, _) = gss.node(StateId(1), 0);
        let (v2, _) = gss.node(StateId(2), 1);
        gss.add_edge(v2, v0, handle(10));
        gss.add_edge(v2, v1, handle(11));

        let paths = gss.paths(v2, 1, None);
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn first_edge_constrains_paths() {
        let mut gss = GssArena::new();
        let (v0, _) = gss.node(StateId(0), 0);
        let (v1, _) = gss.node(StateId(1), 0);
        let (v2, _) = gss.node(StateId(2), 1);
        gss.add_edge(v2, v0, handle(10));
        let second = gss.add_edge(v2, v1, handle(11));

        let paths = gss.paths(v2, 1, Some(second));
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].tail, v1);
    }

    #[test]
    fn zero_length_path_is_the_node_itself() {
        let mut gss = GssArena::new();
        let (v0, _) = gss.node(StateId(0), 0);
        let paths = gss.paths(v0, 0, None);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].tail, v0);
        assert!(paths[0].children.is_empty());
    }

    #[test]
    fn duplicate_edge_detection() {
        let mut gss = GssArena::new();
        let (v0, _) = gss.node(StateId(0), 0);
        let (v1, _) = gss.node(StateId(1), 1);
        gss.add_edge(v1, v0, handle(10));
        assert!(gss.has_edge(v1, v0, handle(10)));
        assert!(!gss.has_edge(v1, v0, handle(11)));
    }
}
