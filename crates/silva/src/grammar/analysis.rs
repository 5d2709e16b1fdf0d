//! Nullable, FIRST and FOLLOW computation.
//!
//! Standard fixed points over the frozen grammar. FIRST sets contain only
//! terminals; nullability is tracked separately and FIRST of a sequence
//! propagates through nullable prefixes.

use crate::grammar::{Grammar, NonTermId, SymbolId, TermId};
use hashbrown::HashSet;

pub(crate) type TermSet = HashSet<TermId, ahash::RandomState>;

fn term_set() -> TermSet {
    HashSet::with_hasher(ahash::RandomState::new())
}

/// Precomputed nullable/FIRST/FOLLOW information for a grammar.
#[derive(Debug, Clone)]
pub struct GrammarAnalysis {
    nullable: Vec<bool>,
    first: Vec<TermSet>,
    follow: Vec<TermSet>,
}

impl GrammarAnalysis {
    /// Run the fixed points. FOLLOW of the start symbol is seeded with `EOF`.
    #[must_use]
    pub fn compute(grammar: &Grammar) -> Self {
        let n = grammar.num_nonterminals();
        let mut nullable = vec![false; n];
        let mut first: Vec<TermSet> = (0..n).map(|_| term_set()).collect();

        // Nullable and FIRST converge together.
        let mut changed = true;
        while changed {
            changed = false;
            for prod in grammar.productions() {
                let lhs = prod.lhs.index();
                let mut all_nullable = true;
                for sym in &prod.rhs {
                    match *sym {
                        SymbolId::Term(t) => {
                            if first[lhs].insert(t) {
                                changed = true;
                            }
                            all_nullable = false;
                        }
                        SymbolId::NonTerm(nt) => {
                            let (head, tail) = split_pair(&mut first, lhs, nt.index());
                            if let (Some(head), Some(tail)) = (head, tail) {
                                for t in tail.iter() {
                                    if head.insert(*t) {
                                        changed = true;
                                    }
                                }
                            }
                            if !nullable[nt.index()] {
                                all_nullable = false;
                            }
                        }
                    }
                    if !all_nullable {
                        break;
                    }
                }
                if all_nullable && !nullable[lhs] {
                    nullable[lhs] = true;
                    changed = true;
                }
            }
        }

        let mut follow: Vec<TermSet> = (0..n).map(|_| term_set()).collect();
        follow[grammar.start().index()].insert(Grammar::EOF);

        let mut changed = true;
        while changed {
            changed = false;
            for prod in grammar.productions() {
                for (idx, sym) in prod.rhs.iter().enumerate() {
                    let SymbolId::NonTerm(nt) = *sym else {
                        continue;
                    };
                    let mut additions = term_set();
                    let mut suffix_nullable = true;
                    for rest in &prod.rhs[idx + 1..] {
                        match *rest {
                            SymbolId::Term(t) => {
                                additions.insert(t);
                                suffix_nullable = false;
                            }
                            SymbolId::NonTerm(next) => {
                                additions.extend(first[next.index()].iter().copied());
                                suffix_nullable = nullable[next.index()];
                            }
                        }
                        if !suffix_nullable {
                            break;
                        }
                    }
                    if suffix_nullable {
                        let inherited: Vec<TermId> =
                            follow[prod.lhs.index()].iter().copied().collect();
                        additions.extend(inherited);
                    }
                    for t in additions {
                        if follow[nt.index()].insert(t) {
                            changed = true;
                        }
                    }
                }
            }
        }

        Self {
            nullable,
            first,
            follow,
        }
    }

    #[must_use]
    pub fn nullable(&self, nt: NonTermId) -> bool {
        self.nullable[nt.index()]
    }

    #[must_use]
    pub(crate) fn first(&self, nt: NonTermId) -> &TermSet {
        &self.first[nt.index()]
    }

    #[must_use]
    pub(crate) fn follow(&self, nt: NonTermId) -> &TermSet {
        &self.follow[nt.index()]
    }

    /// FIRST of the sequence `symbols` followed by the terminals in
    /// `lookahead`: the closure lookahead computation FIRST(beta a).
    pub(crate) fn first_of_sequence(
        &self,
        symbols: &[SymbolId],
        lookahead: &TermSet,
    ) -> TermSet {
        let mut out = term_set();
        for sym in symbols {
            match *sym {
                SymbolId::Term(t) => {
                    out.insert(t);
                    return out;
                }
                SymbolId::NonTerm(nt) => {
                    out.extend(self.first(nt).iter().copied());
                    if !self.nullable(nt) {
                        return out;
                    }
                }
            }
        }
        out.extend(lookahead.iter().copied());
        out
    }
}

/// Two disjoint mutable references into one slice, or `None` when `a == b`.
fn split_pair<T>(items: &mut [T], a: usize, b: usize) -> (Option<&mut T>, Option<&T>) {
    if a == b {
        return (None, None);
    }
    if a < b {
        let (head, tail) = items.split_at_mut(b);
        (Some(&mut head[a]), Some(&tail[0]))
    } else {
        let (head, tail) = items.split_at_mut(a);
        (Some(&mut tail[0]), Some(&head[b]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::SymbolId;

    fn nt(grammar: &Grammar, name: &str) -> NonTermId {
        grammar.symbol(name).and_then(SymbolId::as_nonterm).unwrap()
    }

    fn t(grammar: &Grammar, name: &str) -> TermId {
        grammar.symbol(name).and_then(SymbolId::as_term).unwrap()
    }

    #[test]
    fn nullable_propagates_through_chains() {
        let grammar = Grammar::from_string("S: A B; A: EMPTY; B: A | 'b';").unwrap();
        let analysis = GrammarAnalysis::compute(&grammar);
        assert!(analysis.nullable(nt(&grammar, "A")));
        assert!(analysis.nullable(nt(&grammar, "B")));
        assert!(analysis.nullable(nt(&grammar, "S")));
    }

    #[test]
    fn first_skips_nullable_prefixes() {
        let grammar = Grammar::from_string("S: A 'x'; A: 'a' | EMPTY;").unwrap();
        let analysis = GrammarAnalysis::compute(&grammar);
        let s = nt(&grammar, "S");
        assert!(analysis.first(s).contains(&t(&grammar, "a")));
        assert!(analysis.first(s).contains(&t(&grammar, "x")));
    }

    #[test]
    fn follow_seeds_eof_on_start() {
        let grammar = Grammar::from_string("S: A 'x'; A: a; a: 'a';").unwrap();
        let analysis = GrammarAnalysis::compute(&grammar);
        assert!(analysis.follow(nt(&grammar, "S")).contains(&Grammar::EOF));
        assert!(analysis.follow(nt(&grammar, "A")).contains(&t(&grammar, "x")));
    }

    #[test]
    fn follow_inherits_through_nullable_suffix() {
        let grammar = Grammar::from_string("S: A B 'x'; A: a; a: 'a'; B: EMPTY | 'b';").unwrap();
        let analysis = GrammarAnalysis::compute(&grammar);
        let a = nt(&grammar, "A");
        // B is nullable, so FOLLOW(A) sees both FIRST(B) and 'x'.
        assert!(analysis.follow(a).contains(&t(&grammar, "b")));
        assert!(analysis.follow(a).contains(&t(&grammar, "x")));
    }

    #[test]
    fn first_of_sequence_appends_lookahead() {
        let grammar = Grammar::from_string("S: A; A: EMPTY | 'a';").unwrap();
        let analysis = GrammarAnalysis::compute(&grammar);
        let a = grammar.symbol("A").unwrap();
        let mut lookahead = super::term_set();
        lookahead.insert(Grammar::EOF);
        let firsts = analysis.first_of_sequence(&[a], &lookahead);
        assert!(firsts.contains(&t(&grammar, "a")));
        assert!(firsts.contains(&Grammar::EOF));
    }
}
