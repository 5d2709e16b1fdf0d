//! The deterministic LR driver.
//!
//! A single stack of (state, value) pairs, driven by the ACTION/GOTO tables
//! with scannerless token selection. The driver is generic over a
//! [`ReduceSink`]: the forest sink interns nodes into a [`Forest`], the
//! dispatcher sink invokes user reducers inline.

use crate::error::{Error, ParseError};
use crate::forest::{ActionDispatcher, Forest, NodeHandle};
use crate::grammar::Grammar;
use crate::parser::{Engine, DynamicContext, ParseMetrics, ParseResult, Recovery, RecoveryContext};
use crate::scanner::{self, Token};
use crate::table::{Action, ParseTables, StateId};
use smallvec::{SmallVec, smallvec};
use std::collections::VecDeque;

/// Where shift and reduce results go.
pub(crate) trait ReduceSink {
    type Out;

    fn terminal(&mut self, term: crate::grammar::TermId, text: &str, span: (usize, usize))
    -> Self::Out;

    fn reduce(
        &mut self,
        prod: crate::grammar::ProdId,
        children: Vec<Self::Out>,
        span: (usize, usize),
    ) -> Self::Out;
}

struct ForestSink<'f> {
    forest: &'f mut Forest,
    grammar: &'f Grammar,
}

impl ReduceSink for ForestSink<'_> {
    type Out = NodeHandle;

    fn terminal(
        &mut self,
        term: crate::grammar::TermId,
        text: &str,
        span: (usize, usize),
    ) -> NodeHandle {
        self.forest.terminal(term, span.0, span.1, text)
    }

    fn reduce(
        &mut self,
        prod: crate::grammar::ProdId,
        children: Vec<NodeHandle>,
        span: (usize, usize),
    ) -> NodeHandle {
        let lhs = self.grammar.production(prod).lhs;
        self.forest
            .pack(lhs, span.0, span.1, prod, children.into_iter().collect())
            .0
    }
}

struct DispatcherSink<'d, D> {
    dispatcher: &'d mut D,
}

impl<D: ActionDispatcher> ReduceSink for DispatcherSink<'_, D> {
    type Out = D::Value;

    fn terminal(
        &mut self,
        term: crate::grammar::TermId,
        text: &str,
        span: (usize, usize),
    ) -> D::Value {
        self.dispatcher.terminal(term, text, span)
    }

    fn reduce(
        &mut self,
        prod: crate::grammar::ProdId,
        children: Vec<D::Value>,
        span: (usize, usize),
    ) -> D::Value {
        self.dispatcher.reduce(prod, children, span)
    }
}

struct StackEntry<V> {
    state: StateId,
    /// Value and span; `None` only for the bottom entry.
    value: Option<(V, (usize, usize))>,
}

pub(crate) fn parse_to_forest(engine: &mut Engine, input: &str) -> Result<ParseResult, Error> {
    let start_time = std::time::Instant::now();
    let mut forest = Forest::new();
    let grammar = engine.grammar.clone();
    let mut sink = ForestSink {
        forest: &mut forest,
        grammar: &grammar,
    };
    let (root, errors, mut metrics) = run(engine, input, &mut sink)?;
    metrics.parse_time = start_time.elapsed();
    metrics.forest_nodes = forest.num_nodes();
    Ok(ParseResult {
        forest,
        roots: smallvec![root],
        errors,
        metrics,
    })
}

pub(crate) fn parse_with_dispatcher<D: ActionDispatcher>(
    engine: &mut Engine,
    input: &str,
    dispatcher: &mut D,
) -> Result<D::Value, Error> {
    let mut sink = DispatcherSink { dispatcher };
    let (value, _errors, _metrics) = run(engine, input, &mut sink)?;
    Ok(value)
}

fn run<S: ReduceSink>(
    engine: &mut Engine,
    input: &str,
    sink: &mut S,
) -> Result<(S::Out, Vec<ParseError>, ParseMetrics), Error> {
    let grammar = engine.grammar.clone();
    let tables = engine.tables.clone();
    let mut stack: Vec<StackEntry<S::Out>> = vec![StackEntry {
        state: StateId::START,
        value: None,
    }];
    let mut pos = 0usize;
    let mut pending: VecDeque<Token> = VecDeque::new();
    let mut errors: Vec<ParseError> = Vec::new();
    let mut metrics = ParseMetrics::default();

    loop {
        engine.check_cancelled()?;
        let state = stack.last().map_or(StateId::START, |e| e.state);

        // Injected recovery tokens are only consumed by a shift; reductions
        // keep them as lookahead, exactly like a scanned token is re-scanned.
        let from_pending = !pending.is_empty();
        let token = match pending.front() {
            Some(token) => *token,
            None => {
                let tok_start = engine.skip_layout(input, pos);
                let legal = tables.legal_terminals(state);
                let tokens = scanner::scan(&grammar, legal, input, tok_start);
                match tokens.len() {
                    1 => tokens[0],
                    0 => {
                        match recover(engine, &tables, input, tok_start, state, &mut errors) {
                            Some(recovery) => {
                                metrics.errors_recovered += 1;
                                pending.extend(recovery.tokens);
                                pos = recovery.position;
                                continue;
                            }
                            None => {
                                let expected = tables.expected(state, &grammar);
                                return Err(engine
                                    .no_viable_token(input, tok_start, expected)
                                    .into());
                            }
                        }
                    }
                    _ => {
                        let (line, column) = crate::error::line_col(input, tok_start);
                        return Err(ParseError::Disambiguation {
                            position: tok_start,
                            line,
                            column,
                            candidates: tokens
                                .iter()
                                .map(|t| grammar.terminal(t.term).name.to_string())
                                .collect(),
                        }
                        .into());
                    }
                }
            }
        };

        let actions = tables.actions(state, token.term);
        let action = match actions.len() {
            1 => actions[0],
            0 => {
                // Injected recovery tokens can be illegal in the current
                // state; treat that like a scan failure.
                match recover(engine, &tables, input, token.start, state, &mut errors) {
                    Some(recovery) => {
                        metrics.errors_recovered += 1;
                        pending.clear();
                        pending.extend(recovery.tokens);
                        pos = recovery.position;
                        continue;
                    }
                    None => {
                        let expected = tables.expected(state, &grammar);
                        return Err(engine
                            .no_viable_token(input, token.start, expected)
                            .into());
                    }
                }
            }
            _ => {
                let ctx = DynamicContext {
                    input,
                    token,
                    state,
                    actions,
                };
                let choice = engine
                    .dynamic
                    .as_mut()
                    .and_then(|resolver| resolver(&ctx));
                match choice {
                    Some(idx) if idx < actions.len() => actions[idx],
                    _ => {
                        let (line, column) = crate::error::line_col(input, token.start);
                        return Err(ParseError::DynamicConflict {
                            position: token.start,
                            line,
                            column,
                        }
                        .into());
                    }
                }
            }
        };

        match action {
            Action::Shift(next) => {
                let value = sink.terminal(token.term, token.value(input), (token.start, token.end));
                stack.push(StackEntry {
                    state: next,
                    value: Some((value, (token.start, token.end))),
                });
                if from_pending {
                    pending.pop_front();
                }
                pos = token.end;
                metrics.shifts += 1;
            }
            Action::Reduce(prod_id) => {
                let prod = grammar.production(prod_id);
                let arity = prod.arity();
                let split = stack.len() - arity;
                let mut children = Vec::with_capacity(arity);
                let mut span = (token.start, token.start);
                for (idx, entry) in stack.drain(split..).enumerate() {
                    let (value, child_span) =
                        entry.value.unwrap_or_else(|| unreachable!("empty stack entry popped"));
                    if idx == 0 {
                        span.0 = child_span.0;
                    }
                    span.1 = child_span.1;
                    children.push(value);
                }
                let base = stack.last().map_or(StateId::START, |e| e.state);
                let Some(next) = tables.goto(base, prod.lhs) else {
                    unreachable!("GOTO missing after reduce; tables are inconsistent")
                };
                let value = sink.reduce(prod_id, children, span);
                stack.push(StackEntry {
                    state: next,
                    value: Some((value, span)),
                });
                metrics.reductions += 1;
            }
            Action::Accept => {
                let entry = stack
                    .pop()
                    .and_then(|e| e.value)
                    .unwrap_or_else(|| unreachable!("accept with an empty stack"));
                return Ok((entry.0, errors, metrics));
            }
        }
    }
}

fn recover(
    engine: &mut Engine,
    tables: &ParseTables,
    input: &str,
    position: usize,
    state: StateId,
    errors: &mut Vec<ParseError>,
) -> Option<Recovery> {
    let hook = engine.recovery.as_mut()?;
    let ctx = RecoveryContext {
        input,
        position,
        expected: tables.legal_terminals(state).to_vec(),
        state: Some(state),
    };
    let recovery = hook(&ctx)?;
    let expected = tables.expected(state, &engine.grammar);
    let (line, column) = crate::error::line_col(input, position);
    errors.push(ParseError::NoViableToken {
        position,
        line,
        column,
        expected,
        context: crate::error::context_snippet(input, position),
    });
    Some(recovery)
}

/// Prefix-mode deterministic parse for the layout grammar: parse from `start`
/// until no further token fits, then treat the stuck position as end of input
/// and unwind. Returns the consumed end position when the unwind accepts.
pub(crate) fn parse_prefix(
    grammar: &Grammar,
    tables: &ParseTables,
    input: &str,
    start: usize,
) -> Option<usize> {
    let mut stack: SmallVec<[StateId; 16]> = smallvec![StateId::START];
    let mut pos = start;
    let mut at_eof = false;

    // Guard against a layout grammar that loops without progress.
    let mut steps = 0usize;
    let max_steps = (input.len() - start + 2) * 64;

    loop {
        steps += 1;
        if steps > max_steps {
            return None;
        }
        let state = *stack.last()?;

        let token = if at_eof {
            Token {
                term: Grammar::EOF,
                start: pos,
                end: pos,
            }
        } else {
            let legal = tables.legal_terminals(state);
            let tokens = scanner::scan(grammar, legal, input, pos);
            match tokens.first() {
                Some(token) if token.term != Grammar::EOF || pos == input.len() => *token,
                _ => {
                    at_eof = true;
                    continue;
                }
            }
        };

        let action = match tables.actions(state, token.term).first() {
            Some(action) => *action,
            None if at_eof => return None,
            None => {
                at_eof = true;
                continue;
            }
        };

        match action {
            Action::Shift(next) => {
                // A fabricated EOF must not be shifted mid-input.
                if at_eof && token.term == Grammar::EOF {
                    return None;
                }
                stack.push(next);
                pos = token.end;
            }
            Action::Reduce(prod_id) => {
                let prod = grammar.production(prod_id);
                let new_len = stack.len().checked_sub(prod.arity())?;
                stack.truncate(new_len);
                let base = *stack.last()?;
                let next = tables.goto(base, prod.lhs)?;
                stack.push(next);
            }
            Action::Accept => return Some(pos),
        }
    }
}
