//! Automaton construction and conflict resolution.
//!
//! Canonical LR(1) states are built with a worklist; the LALR mode then
//! partitions states by item core and refines the partition until merging is
//! both transition-consistent and free of new reduce/reduce conflicts. The
//! SLR mode builds LR(0) states and reduces on FOLLOW.

use crate::error::{Conflict, ConflictKind, TableError};
use crate::grammar::{
    DEFAULT_PRIORITY, Grammar, GrammarAnalysis, Associativity, ProdId, SymbolId, TermId,
};
use crate::grammar::analysis::TermSet;
use crate::table::{
    Action, Item, ParseTables, StateId, StateTable, TableKind, TableOptions, item_str,
};
use hashbrown::HashMap;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

type ItemCore = (ProdId, u16);
type Lookaheads = BTreeSet<TermId>;
type ItemSet = BTreeMap<ItemCore, Lookaheads>;

struct RawState {
    kernel: ItemSet,
    closure: ItemSet,
    transitions: BTreeMap<SymbolId, usize>,
}

pub(super) fn build(grammar: &Grammar, options: TableOptions) -> Result<ParseTables, TableError> {
    let analysis = GrammarAnalysis::compute(grammar);
    let with_lookaheads = options.kind == TableKind::Lalr;

    let raw = build_automaton(grammar, &analysis, with_lookaheads);
    let (states, class_of) = match options.kind {
        TableKind::Lalr => merge_lalr(grammar, &raw),
        TableKind::Slr => (
            (0..raw.len()).map(|i| vec![i]).collect::<Vec<_>>(),
            (0..raw.len()).collect::<Vec<_>>(),
        ),
    };

    fill_tables(grammar, &analysis, &raw, &states, &class_of, options)
}

/// Closure of a kernel. With `with_lookaheads` the added items carry
/// FIRST(beta a); without it (LR(0)) lookaheads stay empty.
fn closure(
    grammar: &Grammar,
    analysis: &GrammarAnalysis,
    kernel: &ItemSet,
    with_lookaheads: bool,
) -> ItemSet {
    let mut items = kernel.clone();
    let mut changed = true;
    while changed {
        changed = false;
        let snapshot: Vec<(ItemCore, Lookaheads)> =
            items.iter().map(|(c, l)| (*c, l.clone())).collect();
        for ((prod_id, dot), las) in snapshot {
            let prod = grammar.production(prod_id);
            let Some(SymbolId::NonTerm(next)) = prod.rhs.get(dot as usize).copied() else {
                continue;
            };
            let new_las: Lookaheads = if with_lookaheads {
                let mut lookahead = TermSet::with_hasher(ahash::RandomState::new());
                lookahead.extend(las.iter().copied());
                analysis
                    .first_of_sequence(&prod.rhs[dot as usize + 1..], &lookahead)
                    .into_iter()
                    .collect()
            } else {
                Lookaheads::new()
            };
            for q in grammar.nonterminal(next).productions() {
                let core = (*q, 0);
                let is_new = !items.contains_key(&core);
                let entry = items.entry(core).or_default();
                let before = entry.len();
                entry.extend(new_las.iter().copied());
                if is_new || entry.len() != before {
                    changed = true;
                }
            }
        }
    }
    items
}

/// Kernels reachable from a closure, grouped by the transition symbol.
fn goto_kernels(grammar: &Grammar, closure: &ItemSet) -> BTreeMap<SymbolId, ItemSet> {
    let mut out: BTreeMap<SymbolId, ItemSet> = BTreeMap::new();
    for ((prod_id, dot), las) in closure {
        let prod = grammar.production(*prod_id);
        if let Some(sym) = prod.rhs.get(*dot as usize) {
            out.entry(*sym)
                .or_default()
                .entry((*prod_id, dot + 1))
                .or_default()
                .extend(las.iter().copied());
        }
    }
    out
}

fn build_automaton(
    grammar: &Grammar,
    analysis: &GrammarAnalysis,
    with_lookaheads: bool,
) -> Vec<RawState> {
    let mut initial: ItemSet = ItemSet::new();
    let mut eof_la = Lookaheads::new();
    if with_lookaheads {
        eof_la.insert(Grammar::EOF);
    }
    initial.insert((Grammar::AUGMENTED, 0), eof_la);

    let mut states: Vec<RawState> = Vec::new();
    let mut index: HashMap<ItemSet, usize, ahash::RandomState> =
        HashMap::with_hasher(ahash::RandomState::new());
    let mut worklist = vec![0usize];

    index.insert(initial.clone(), 0);
    let initial_closure = closure(grammar, analysis, &initial, with_lookaheads);
    states.push(RawState {
        kernel: initial,
        closure: initial_closure,
        transitions: BTreeMap::new(),
    });

    while let Some(current) = worklist.pop() {
        let kernels = goto_kernels(grammar, &states[current].closure);
        for (sym, kernel) in kernels {
            let target = if let Some(existing) = index.get(&kernel) {
                *existing
            } else {
                let id = states.len();
                index.insert(kernel.clone(), id);
                let closed = closure(grammar, analysis, &kernel, with_lookaheads);
                states.push(RawState {
                    kernel,
                    closure: closed,
                    transitions: BTreeMap::new(),
                });
                worklist.push(id);
                id
            };
            states[current].transitions.insert(sym, target);
        }
    }
    states
}

/// Reduce map of one canonical state: lookahead terminal -> reducible
/// productions (completed closure items).
fn reduce_map(state: &RawState, grammar: &Grammar) -> BTreeMap<TermId, BTreeSet<ProdId>> {
    let mut out: BTreeMap<TermId, BTreeSet<ProdId>> = BTreeMap::new();
    for ((prod_id, dot), las) in &state.closure {
        if *dot as usize == grammar.production(*prod_id).rhs.len() {
            for la in las {
                out.entry(*la).or_default().insert(*prod_id);
            }
        }
    }
    out
}

/// Partition canonical LR(1) states into merge classes.
///
/// Starts from the core partition and refines: a class is split back into
/// singleton states when merging it would either create a reduce/reduce
/// conflict no member state had, or make members disagree about the class of
/// a transition target. Refinement runs to a fixed point, so the result is at
/// worst the canonical automaton itself.
fn merge_lalr(grammar: &Grammar, raw: &[RawState]) -> (Vec<Vec<usize>>, Vec<usize>) {
    let mut class_of: Vec<usize> = vec![0; raw.len()];
    let mut classes: Vec<Vec<usize>> = Vec::new();
    {
        let mut by_core: HashMap<BTreeSet<ItemCore>, usize, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        for (idx, state) in raw.iter().enumerate() {
            let core: BTreeSet<ItemCore> = state.kernel.keys().copied().collect();
            let class = *by_core.entry(core).or_insert_with(|| {
                classes.push(Vec::new());
                classes.len() - 1
            });
            classes[class].push(idx);
            class_of[idx] = class;
        }
    }

    let reduce_maps: Vec<BTreeMap<TermId, BTreeSet<ProdId>>> =
        raw.iter().map(|s| reduce_map(s, grammar)).collect();

    loop {
        let mut split_target: Option<usize> = None;
        'scan: for (class_idx, members) in classes.iter().enumerate() {
            if members.len() < 2 {
                continue;
            }
            // Transition consistency: all members must agree on the class of
            // every transition target.
            for sym in raw[members[0]].transitions.keys() {
                let mut target_class = None;
                for member in members {
                    let target = class_of[raw[*member].transitions[sym]];
                    if *target_class.get_or_insert(target) != target {
                        split_target = Some(class_idx);
                        break 'scan;
                    }
                }
            }
            // No new reduce/reduce conflicts.
            let mut merged: BTreeMap<TermId, BTreeSet<ProdId>> = BTreeMap::new();
            for member in members {
                for (term, prods) in &reduce_maps[*member] {
                    merged.entry(*term).or_default().extend(prods.iter().copied());
                }
            }
            for (term, prods) in &merged {
                if prods.len() < 2 {
                    continue;
                }
                let preexisting = members.iter().any(|member| {
                    reduce_maps[*member]
                        .get(term)
                        .is_some_and(|own| own.len() >= 2)
                });
                if !preexisting {
                    split_target = Some(class_idx);
                    break 'scan;
                }
            }
        }

        let Some(class_idx) = split_target else {
            break;
        };
        let members = std::mem::take(&mut classes[class_idx]);
        for (pos, member) in members.into_iter().enumerate() {
            let class = if pos == 0 {
                class_idx
            } else {
                classes.push(Vec::new());
                classes.len() - 1
            };
            classes[class].push(member);
            class_of[member] = class;
        }
    }

    (classes, class_of)
}

/// Merged view of one class: closure items with unioned lookaheads.
fn merged_closure(raw: &[RawState], members: &[usize]) -> ItemSet {
    let mut out = ItemSet::new();
    for member in members {
        for (core, las) in &raw[*member].closure {
            out.entry(*core).or_default().extend(las.iter().copied());
        }
    }
    out
}

struct PendingCell {
    shift: Option<StateId>,
    reduces: SmallVec<[ProdId; 2]>,
    accept: bool,
}

fn fill_tables(
    grammar: &Grammar,
    analysis: &GrammarAnalysis,
    raw: &[RawState],
    classes: &[Vec<usize>],
    class_of: &[usize],
    options: TableOptions,
) -> Result<ParseTables, TableError> {
    // Classes may be sparse after refinement (empty entries never happen, but
    // keep ids dense and ordered by first member for stable state numbering).
    let mut order: Vec<usize> = (0..classes.len()).filter(|c| !classes[*c].is_empty()).collect();
    order.sort_by_key(|c| classes[*c][0]);
    let mut state_of_class: Vec<usize> = vec![usize::MAX; classes.len()];
    for (state_idx, class) in order.iter().enumerate() {
        state_of_class[*class] = state_idx;
    }
    // State 0 must stay the class containing canonical state 0.
    debug_assert_eq!(state_of_class[class_of[0]], 0);

    let mut conflicts: Vec<Conflict> = Vec::new();
    let mut tables: Vec<StateTable> = Vec::new();

    for class in &order {
        let members = &classes[*class];
        let closure = merged_closure(raw, members);
        let state_id = StateId(state_of_class[*class] as u32);

        let mut cells: BTreeMap<TermId, PendingCell> = BTreeMap::new();
        let mut gotos: HashMap<_, _, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());

        for (sym, target) in &raw[members[0]].transitions {
            let target_state = StateId(state_of_class[class_of[*target]] as u32);
            match sym {
                SymbolId::Term(t) => {
                    cells
                        .entry(*t)
                        .or_insert(PendingCell {
                            shift: None,
                            reduces: SmallVec::new(),
                            accept: false,
                        })
                        .shift = Some(target_state);
                }
                SymbolId::NonTerm(n) => {
                    gotos.insert(*n, target_state);
                }
            }
        }

        for ((prod_id, dot), las) in &closure {
            let prod = grammar.production(*prod_id);
            if *dot as usize != prod.rhs.len() {
                continue;
            }
            let lookaheads: Vec<TermId> = if options.kind == TableKind::Lalr {
                las.iter().copied().collect()
            } else if *prod_id == Grammar::AUGMENTED {
                vec![Grammar::EOF]
            } else {
                let mut follow: Vec<TermId> =
                    analysis.follow(prod.lhs).iter().copied().collect();
                follow.sort_unstable();
                follow
            };
            for la in lookaheads {
                let cell = cells.entry(la).or_insert(PendingCell {
                    shift: None,
                    reduces: SmallVec::new(),
                    accept: false,
                });
                if *prod_id == Grammar::AUGMENTED {
                    cell.accept = true;
                } else if !cell.reduces.contains(prod_id) {
                    cell.reduces.push(*prod_id);
                }
            }
        }

        let mut actions: HashMap<TermId, SmallVec<[Action; 1]>, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        for (term, cell) in cells {
            let resolved = resolve_cell(grammar, &closure, state_id, term, cell, options);
            match resolved {
                Ok(cell_actions) => {
                    if !cell_actions.is_empty() {
                        actions.insert(term, cell_actions);
                    }
                }
                Err(conflict) => conflicts.push(conflict),
            }
        }

        let mut legal: Vec<TermId> = actions.keys().copied().collect();
        legal.sort_unstable();

        let items: Vec<Item> = closure
            .keys()
            .map(|(prod, dot)| Item {
                prod: *prod,
                dot: *dot,
            })
            .collect();

        tables.push(StateTable {
            actions,
            gotos,
            legal,
            items,
        });
    }

    if conflicts.is_empty() {
        Ok(ParseTables::from_parts(tables, options.kind))
    } else {
        Err(TableError { conflicts })
    }
}

/// Priority of the shift side for terminal `t` in a state: the maximum
/// priority among the productions whose items shift `t`, overridden by an
/// explicitly prioritized terminal.
fn shift_priority(grammar: &Grammar, closure: &ItemSet, term: TermId) -> u32 {
    let terminal = grammar.terminal(term);
    if terminal.priority != DEFAULT_PRIORITY {
        return terminal.priority;
    }
    closure
        .keys()
        .filter(|(prod_id, dot)| {
            grammar.production(*prod_id).rhs.get(*dot as usize).copied()
                == Some(SymbolId::Term(term))
        })
        .map(|(prod_id, _)| grammar.production(*prod_id).priority)
        .max()
        .unwrap_or(DEFAULT_PRIORITY)
}

fn conflict(
    grammar: &Grammar,
    closure: &ItemSet,
    state: StateId,
    term: TermId,
    kind: ConflictKind,
    reduces: &[ProdId],
) -> Conflict {
    let mut items: Vec<String> = Vec::new();
    if kind == ConflictKind::ShiftReduce {
        for (prod_id, dot) in closure.keys() {
            if grammar.production(*prod_id).rhs.get(*dot as usize).copied()
                == Some(SymbolId::Term(term))
            {
                items.push(item_str(
                    grammar,
                    Item {
                        prod: *prod_id,
                        dot: *dot,
                    },
                ));
            }
        }
    }
    for prod_id in reduces {
        let dot = grammar.production(*prod_id).rhs.len() as u16;
        items.push(item_str(grammar, Item { prod: *prod_id, dot }));
    }
    Conflict {
        state: state.0,
        kind,
        lookahead: grammar.terminal(term).name.clone(),
        items,
    }
}

/// Apply the conflict-resolution policy to one cell.
#[allow(clippy::too_many_lines)]
fn resolve_cell(
    grammar: &Grammar,
    closure: &ItemSet,
    state: StateId,
    term: TermId,
    cell: PendingCell,
    options: TableOptions,
) -> Result<SmallVec<[Action; 1]>, Conflict> {
    let PendingCell {
        shift,
        mut reduces,
        accept,
    } = cell;

    // Accept never coexists with a shift (EOF is not shiftable). An
    // accept/reduce overlap on EOF is only viable under the generalized
    // driver, which needs both: a reduce at end of input can still lead to a
    // second accept of a longer derivation.
    if accept && !reduces.is_empty() && !options.generalized {
        return Err(conflict(
            grammar,
            closure,
            state,
            term,
            ConflictKind::ReduceReduce,
            &reduces,
        ));
    }
    if accept && reduces.is_empty() {
        match shift {
            None => return Ok(smallvec::smallvec![Action::Accept]),
            Some(target) if options.generalized => {
                return Ok(smallvec::smallvec![Action::Shift(target), Action::Accept]);
            }
            Some(_) => {
                return Err(conflict(
                    grammar,
                    closure,
                    state,
                    term,
                    ConflictKind::ShiftReduce,
                    &[Grammar::AUGMENTED],
                ));
            }
        }
    }

    // Reduce/reduce policy first, so at most one reduce faces the shift.
    let survivors = resolve_reduces(grammar, &mut reduces);
    if survivors.len() > 1 {
        let mut out: SmallVec<[Action; 1]> = SmallVec::new();
        if let Some(target) = shift {
            out.push(Action::Shift(target));
        }
        out.extend(survivors.iter().map(|p| Action::Reduce(*p)));
        if accept {
            out.push(Action::Accept);
        }
        if options.generalized {
            return Ok(out);
        }
        let all_dynamic = survivors.iter().all(|p| grammar.production(*p).dynamic);
        if all_dynamic {
            return Ok(out);
        }
        return Err(conflict(
            grammar,
            closure,
            state,
            term,
            ConflictKind::ReduceReduce,
            &survivors,
        ));
    }

    let reduce = survivors.first().copied();
    let resolved: Result<SmallVec<[Action; 1]>, Conflict> = match (shift, reduce) {
        (None, None) => Ok(SmallVec::new()),
        (Some(target), None) => Ok(smallvec::smallvec![Action::Shift(target)]),
        (None, Some(prod)) => Ok(smallvec::smallvec![Action::Reduce(prod)]),
        (Some(target), Some(prod_id)) => {
            let prod = grammar.production(prod_id);
            let shift_prior = shift_priority(grammar, closure, term);
            match shift_prior.cmp(&prod.priority) {
                std::cmp::Ordering::Greater => Ok(smallvec::smallvec![Action::Shift(target)]),
                std::cmp::Ordering::Less => Ok(smallvec::smallvec![Action::Reduce(prod_id)]),
                std::cmp::Ordering::Equal => match prod.assoc {
                    Associativity::Left => Ok(smallvec::smallvec![Action::Reduce(prod_id)]),
                    Associativity::Right => Ok(smallvec::smallvec![Action::Shift(target)]),
                    Associativity::None => {
                        if options.generalized
                            || (prod.dynamic && grammar.terminal(term).dynamic)
                        {
                            return finish_cell(
                                smallvec::smallvec![
                                    Action::Shift(target),
                                    Action::Reduce(prod_id)
                                ],
                                accept,
                            );
                        }
                        let shift_allowed = !prod.nops && !(prod.nopse && prod.is_empty);
                        if options.prefer_shifts && shift_allowed {
                            return finish_cell(
                                smallvec::smallvec![Action::Shift(target)],
                                accept,
                            );
                        }
                        Err(conflict(
                            grammar,
                            closure,
                            state,
                            term,
                            ConflictKind::ShiftReduce,
                            &[prod_id],
                        ))
                    }
                },
            }
        }
    };
    finish_cell(resolved?, accept)
}

fn finish_cell(
    mut actions: SmallVec<[Action; 1]>,
    accept: bool,
) -> Result<SmallVec<[Action; 1]>, Conflict> {
    if accept {
        actions.push(Action::Accept);
    }
    Ok(actions)
}

/// Reduce/reduce policy: highest priority wins; among equals a unique
/// `preferred` production wins; otherwise every survivor is returned.
fn resolve_reduces(grammar: &Grammar, reduces: &mut SmallVec<[ProdId; 2]>) -> SmallVec<[ProdId; 2]> {
    if reduces.len() <= 1 {
        return std::mem::take(reduces);
    }
    let max_prior = reduces
        .iter()
        .map(|p| grammar.production(*p).priority)
        .max()
        .unwrap_or(DEFAULT_PRIORITY);
    let mut survivors: SmallVec<[ProdId; 2]> = reduces
        .iter()
        .copied()
        .filter(|p| grammar.production(*p).priority == max_prior)
        .collect();
    if survivors.len() > 1 {
        let mut preferred = survivors
            .iter()
            .copied()
            .filter(|p| grammar.production(*p).preferred);
        if let (Some(winner), None) = (preferred.next(), preferred.next()) {
            survivors = smallvec::smallvec![winner];
        }
    }
    survivors
}
