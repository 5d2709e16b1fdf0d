//! The GLR driver.
//!
//! A frontier of GSS heads moves through the input. Per position the driver
//! runs every reduction to a fixed point (Rekers-style: an edge added to an
//! already-processed node re-runs the node's reductions constrained to that
//! edge), then shifts every accepted token, grouping shifts so each distinct
//! token becomes one shared terminal node. Local ambiguities pack into the
//! forest nodes carried on GSS edges.

use crate::error::{Error, ParseError};
use crate::forest::{Forest, NodeHandle};
use crate::grammar::{Grammar, ProdId, TermId};
use crate::parser::gss::{GssArena, GssEdgeId, GssNodeId};
use crate::parser::{DynamicContext, Engine, ParseMetrics, ParseResult, RecoveryContext};
use crate::scanner::{self, Token};
use crate::table::{Action, StateId};
use hashbrown::HashSet;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// How many worklist entries are processed between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64;

type PendingReduction = (GssNodeId, ProdId, Option<GssEdgeId>);

pub(crate) fn parse(engine: &mut Engine, input: &str) -> Result<ParseResult, Error> {
    let start_time = std::time::Instant::now();
    let grammar = engine.grammar.clone();
    let tables = engine.tables.clone();

    let mut forest = Forest::new();
    let mut gss = GssArena::new();
    let mut metrics = ParseMetrics::default();
    let mut errors: Vec<ParseError> = Vec::new();

    let (initial, _) = gss.node(StateId::START, 0);
    let mut frontier: Vec<GssNodeId> = vec![initial];
    let mut pos = 0usize;
    let mut pending_tokens: VecDeque<Token> = VecDeque::new();

    let mut roots: SmallVec<[NodeHandle; 1]> = SmallVec::new();
    let mut root_set: HashSet<NodeHandle, ahash::RandomState> =
        HashSet::with_hasher(ahash::RandomState::new());

    loop {
        engine.check_cancelled()?;

        // Token selection for the whole frontier: the legal set is pooled
        // over every live head, so longest-match is global.
        let (tok_start, tokens) = if let Some(token) = pending_tokens.pop_front() {
            (token.start, smallvec::smallvec![token])
        } else {
            let tok_start = engine.skip_layout(input, pos);
            let legal = pooled_legal(engine, &gss, &frontier);
            let tokens: SmallVec<[Token; 1]> = scanner::scan(&grammar, &legal, input, tok_start);
            (tok_start, tokens)
        };

        if tokens.is_empty() {
            match recover_frontier(engine, &gss, &frontier, input, tok_start, &mut errors) {
                Some(recovery) => {
                    metrics.errors_recovered += 1;
                    pending_tokens.extend(recovery.tokens);
                    pos = recovery.position;
                    continue;
                }
                None => {
                    let legal = pooled_legal(engine, &gss, &frontier);
                    let expected = expected_names(&grammar, &legal);
                    return Err(engine.no_viable_token(input, tok_start, expected).into());
                }
            }
        }

        // Reduction phase: run every (head, production) pair sanctioned by
        // some accepted token to a fixed point before shifting.
        let mut worklist: VecDeque<PendingReduction> = VecDeque::new();
        let mut enqueued: HashSet<PendingReduction, ahash::RandomState> =
            HashSet::with_hasher(ahash::RandomState::new());
        let mut frontier_set: HashSet<GssNodeId, ahash::RandomState> =
            frontier.iter().copied().collect();
        for head in &frontier {
            enqueue_reductions(
                engine,
                &gss,
                *head,
                &tokens,
                input,
                None,
                &mut worklist,
                &mut enqueued,
            );
        }

        let mut processed = 0usize;
        while let Some((head, prod_id, first_edge)) = worklist.pop_front() {
            processed += 1;
            if processed % CANCEL_CHECK_INTERVAL == 0 {
                engine.check_cancelled()?;
            }

            let prod = grammar.production(prod_id);
            for path in gss.paths(head, prod.arity(), first_edge) {
                let tail_state = gss.state(path.tail);
                let Some(goto) = tables.goto(tail_state, prod.lhs) else {
                    continue;
                };
                let span = if path.children.is_empty() {
                    (tok_start, tok_start)
                } else {
                    let first = path.children[0];
                    let last = path.children[path.children.len() - 1];
                    (forest.span(first).0, forest.span(last).1)
                };
                let (node, _) = forest.pack(prod.lhs, span.0, span.1, prod_id, path.children);
                metrics.reductions += 1;

                match gss.find(goto, pos) {
                    Some(target) => {
                        // A node at (state, pos) left over from a zero-length
                        // shift belongs to this frontier as well.
                        if frontier_set.insert(target) {
                            frontier.push(target);
                            enqueue_reductions(
                                engine,
                                &gss,
                                target,
                                &tokens,
                                input,
                                None,
                                &mut worklist,
                                &mut enqueued,
                            );
                        }
                        if !gss.has_edge(target, path.tail, node) {
                            let edge = gss.add_edge(target, path.tail, node);
                            // The new history may enable further reductions
                            // of the target through this edge.
                            enqueue_reductions(
                                engine,
                                &gss,
                                target,
                                &tokens,
                                input,
                                Some(edge),
                                &mut worklist,
                                &mut enqueued,
                            );
                        }
                    }
                    None => {
                        let (target, _) = gss.node(goto, pos);
                        gss.add_edge(target, path.tail, node);
                        frontier_set.insert(target);
                        frontier.push(target);
                        enqueue_reductions(
                            engine,
                            &gss,
                            target,
                            &tokens,
                            input,
                            None,
                            &mut worklist,
                            &mut enqueued,
                        );
                    }
                }
            }
        }

        // Accept collection: roots are the start-symbol nodes on edges from
        // an accepting head back to the initial node.
        if tokens.iter().any(|t| t.term == Grammar::EOF) {
            for head in &frontier {
                let has_accept = tables
                    .actions(gss.state(*head), Grammar::EOF)
                    .contains(&Action::Accept);
                if !has_accept {
                    continue;
                }
                for (_, edge) in gss.edges(*head) {
                    if edge.target == initial && root_set.insert(edge.node) {
                        roots.push(edge.node);
                    }
                }
            }
        }

        // Shift phase: group by token, one shared terminal node per token,
        // one new frontier head per target state.
        let mut new_frontier: Vec<GssNodeId> = Vec::new();
        let mut new_frontier_set: HashSet<GssNodeId, ahash::RandomState> =
            HashSet::with_hasher(ahash::RandomState::new());
        for token in &tokens {
            let mut term_node: Option<NodeHandle> = None;
            for head in frontier.clone() {
                for action in actions_for(engine, &gss, head, *token, input) {
                    let Action::Shift(next) = action else {
                        continue;
                    };
                    let node = *term_node.get_or_insert_with(|| {
                        forest.terminal(token.term, token.start, token.end, token.value(input))
                    });
                    let (target, _) = gss.node(next, token.end);
                    if new_frontier_set.insert(target) {
                        new_frontier.push(target);
                    }
                    if !gss.has_edge(target, head, node) {
                        gss.add_edge(target, head, node);
                    }
                    metrics.shifts += 1;
                }
            }
        }

        if new_frontier.is_empty() {
            if !roots.is_empty() {
                break;
            }
            match recover_frontier(engine, &gss, &frontier, input, tok_start, &mut errors) {
                Some(recovery) => {
                    metrics.errors_recovered += 1;
                    pending_tokens.extend(recovery.tokens);
                    pos = recovery.position;
                    continue;
                }
                None => {
                    let legal = pooled_legal(engine, &gss, &frontier);
                    let expected = expected_names(&grammar, &legal);
                    return Err(engine.no_viable_token(input, tok_start, expected).into());
                }
            }
        }

        // Selection guarantees every shifted token has the same length.
        pos = tokens[0].end;
        frontier = new_frontier;
    }

    metrics.gss_nodes = gss.num_nodes();
    metrics.forest_nodes = forest.num_nodes();
    metrics.parse_time = start_time.elapsed();

    Ok(ParseResult {
        forest,
        roots,
        errors,
        metrics,
    })
}

/// The union of legal terminals over every frontier head, sorted.
fn pooled_legal(engine: &Engine, gss: &GssArena, frontier: &[GssNodeId]) -> Vec<TermId> {
    let mut legal: Vec<TermId> = frontier
        .iter()
        .flat_map(|head| engine.tables.legal_terminals(gss.state(*head)))
        .copied()
        .collect();
    legal.sort_unstable();
    legal.dedup();
    legal
}

fn expected_names(grammar: &Grammar, legal: &[TermId]) -> Vec<String> {
    let mut names: Vec<String> = legal
        .iter()
        .map(|t| grammar.terminal(*t).name.to_string())
        .collect();
    names.sort();
    names.dedup();
    names
}

/// The actions of `(head, token)`, with the dynamic resolver applied to
/// retained conflict cells.
fn actions_for(
    engine: &mut Engine,
    gss: &GssArena,
    head: GssNodeId,
    token: Token,
    input: &str,
) -> SmallVec<[Action; 1]> {
    let state = gss.state(head);
    let actions = engine.tables.actions(state, token.term);
    if actions.len() > 1
        && let Some(resolver) = engine.dynamic.as_mut()
    {
        let ctx = DynamicContext {
            input,
            token,
            state,
            actions,
        };
        if let Some(choice) = resolver(&ctx)
            && choice < actions.len()
        {
            return smallvec::smallvec![actions[choice]];
        }
    }
    actions.iter().copied().collect()
}

#[allow(clippy::too_many_arguments)]
fn enqueue_reductions(
    engine: &mut Engine,
    gss: &GssArena,
    head: GssNodeId,
    tokens: &[Token],
    input: &str,
    first_edge: Option<GssEdgeId>,
    worklist: &mut VecDeque<PendingReduction>,
    enqueued: &mut HashSet<PendingReduction, ahash::RandomState>,
) {
    for token in tokens {
        for action in actions_for(engine, gss, head, *token, input) {
            let Action::Reduce(prod) = action else {
                continue;
            };
            // A constrained re-run only matters for reductions that traverse
            // at least one edge.
            if first_edge.is_some() && engine.grammar.production(prod).arity() == 0 {
                continue;
            }
            let entry = (head, prod, first_edge);
            if enqueued.insert(entry) {
                worklist.push_back(entry);
            }
        }
    }
}

fn recover_frontier(
    engine: &mut Engine,
    gss: &GssArena,
    frontier: &[GssNodeId],
    input: &str,
    position: usize,
    errors: &mut Vec<ParseError>,
) -> Option<crate::parser::Recovery> {
    let expected: Vec<TermId> = pooled_legal(engine, gss, frontier);
    let hook = engine.recovery.as_mut()?;
    let ctx = RecoveryContext {
        input,
        position,
        expected: expected.clone(),
        state: None,
    };
    let recovery = hook(&ctx)?;
    let (line, column) = crate::error::line_col(input, position);
    errors.push(ParseError::NoViableToken {
        position,
        line,
        column,
        expected: expected_names(&engine.grammar, &expected),
        context: crate::error::context_snippet(input, position),
    });
    Some(recovery)
}
