//! Tests for the GLR driver and its shared packed forests

use silva::{
    Error, Grammar, GlrParser, ParseError, Parser, ParserConfig, Tree, skip_char_recovery,
};
use std::sync::Arc;

fn glr(grammar: &str) -> GlrParser {
    let grammar = Arc::new(Grammar::from_string(grammar).unwrap());
    GlrParser::new(grammar, ParserConfig::default()).unwrap()
}

const AMBIGUOUS_EXPR: &str = "E: E '+' E | E '*' E | number; number: /\\d+/;";

#[test]
fn ambiguous_expression_yields_catalan_many_trees() {
    // Three binary operators group in Catalan(3) = 5 ways.
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2*3+4").unwrap();

    assert_eq!(result.roots.len(), 1);
    assert_eq!(result.tree_count(), 5);
    assert_eq!(result.trees().count(), 5);

    // Every tree covers the whole input.
    for tree in result.trees() {
        assert_eq!(tree.leaf_text(), "1+2*3+4");
    }
}

#[test]
fn forest_trees_are_distinct() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2+3").unwrap();
    let trees: Vec<Tree> = result.trees().collect();
    assert_eq!(trees.len(), 2);
    assert_ne!(trees[0], trees[1]);
}

#[test]
fn annotations_disambiguate_under_glr() {
    // With priorities and associativity the same grammar is deterministic
    // even for the generalized driver.
    let mut parser = glr(
        "E: E '+' E {left, 1} | E '*' E {left, 2} | number; number: /\\d+/;",
    );
    let result = parser.parse("1+2*3+4").unwrap();
    assert_eq!(result.tree_count(), 1);
}

#[test]
fn lr_parse_is_contained_in_glr_forest() {
    let grammar_text =
        "E: E '+' E {left, 1} | E '*' E {left, 2} | number; number: /\\d+/;";
    let grammar = Arc::new(Grammar::from_string(grammar_text).unwrap());

    let mut lr = Parser::new(grammar.clone(), ParserConfig::default()).unwrap();
    let lr_result = lr.parse("1+2*3+4").unwrap();
    let lr_tree = lr_result.trees().next().unwrap();

    let mut glr = GlrParser::new(grammar, ParserConfig::default()).unwrap();
    let glr_result = glr.parse("1+2*3+4").unwrap();
    let glr_trees: Vec<Tree> = glr_result.trees().collect();

    assert_eq!(glr_trees.len(), 1);
    assert_eq!(glr_trees[0], lr_tree);
}

#[test]
fn dangling_else_packs_two_trees() {
    let mut parser = glr("S: 'i' S 'e' S | 'i' S | 'x';");
    let result = parser.parse("iixex").unwrap();
    assert_eq!(result.tree_count(), 2);

    for tree in result.trees() {
        assert_eq!(tree.leaf_text(), "iixex");
    }
}

#[test]
fn local_ambiguity_is_packed_not_duplicated() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2+3+4").unwrap();

    // Catalan(3) trees over a single packed root.
    assert_eq!(result.roots.len(), 1);
    assert_eq!(result.tree_count(), 5);

    // Shared packing keeps the forest polynomial: every (symbol, span) pair
    // is one node, so 5 trees need far fewer than 5 trees' worth of nodes.
    let root_alts = result.forest.alternatives(result.root());
    assert_eq!(root_alts.len(), 3);
}

#[test]
fn no_two_alternatives_are_identical() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2*3+4").unwrap();

    let mut stack = vec![result.root()];
    let mut seen = std::collections::HashSet::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        let alts = result.forest.alternatives(node);
        for (idx, alt) in alts.iter().enumerate() {
            for other in &alts[idx + 1..] {
                assert!(
                    alt.prod != other.prod || alt.children != other.children,
                    "duplicate packed alternative"
                );
            }
            stack.extend(alt.children.iter().copied());
        }
    }
}

#[test]
fn packed_alternative_children_cover_the_span() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2*3+4").unwrap();

    let mut stack = vec![result.root()];
    let mut seen = std::collections::HashSet::new();
    while let Some(node) = stack.pop() {
        if !seen.insert(node) {
            continue;
        }
        let (start, end) = result.forest.span(node);
        for alt in result.forest.alternatives(node) {
            let mut cursor = start;
            for child in &alt.children {
                let (child_start, child_end) = result.forest.span(*child);
                assert_eq!(child_start, cursor);
                cursor = child_end;
                stack.push(*child);
            }
            assert_eq!(cursor, end);
        }
    }
}

#[test]
fn empty_input_with_nullable_grammar() {
    let mut parser = glr("L: L E | EMPTY; E: 'a';");
    let result = parser.parse("").unwrap();
    assert_eq!(result.tree_count(), 1);
    assert_eq!(result.forest.span(result.root()), (0, 0));
}

#[test]
fn cyclic_derivations_do_not_hang() {
    // S: S | 'x' derives itself; the self-referential alternative is not
    // packed, so exactly one tree remains.
    let mut parser = glr("S: S | 'x';");
    let result = parser.parse("x").unwrap();
    assert_eq!(result.roots.len(), 1);
    assert!(result.tree_count() >= 1);
}

#[test]
fn glr_error_reports_pooled_expectations() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    let err = parser.parse("1+?").unwrap_err();
    match err {
        Error::Parse(ParseError::NoViableToken { position, expected, .. }) => {
            assert_eq!(position, 2);
            assert!(expected.iter().any(|name| name == "number"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn glr_recovery_runs_when_frontier_is_empty() {
    let grammar = Arc::new(Grammar::from_string(AMBIGUOUS_EXPR).unwrap());
    let mut parser = GlrParser::new(grammar, ParserConfig::default())
        .unwrap()
        .with_recovery(skip_char_recovery());

    let result = parser.parse("1+?2").unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.metrics.errors_recovered, 1);
    assert!(result.tree_count() >= 1);
}

#[test]
fn cancellation_between_frontiers() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    parser.cancel_token().cancel();
    assert!(matches!(
        parser.parse("1+2"),
        Err(Error::Parse(ParseError::Cancelled))
    ));
}

#[test]
fn lexical_ties_fork_instead_of_failing() {
    // Two identical regex terminals: the deterministic driver errors, the
    // generalized driver forks and keeps both derivations.
    let grammar_text = "S: A | B; A: /[a-z]+/; B: /[a-z]+/;";
    let grammar = Arc::new(Grammar::from_string(grammar_text).unwrap());

    let mut lr = Parser::new(grammar.clone(), ParserConfig::default()).unwrap();
    assert!(matches!(
        lr.parse("abc"),
        Err(Error::Parse(ParseError::Disambiguation { .. }))
    ));

    let mut glr = GlrParser::new(grammar, ParserConfig::default()).unwrap();
    let result = glr.parse("abc").unwrap();
    assert_eq!(result.tree_count(), 2);
}

#[test]
fn round_trip_every_tree_reparses() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2*3").unwrap();

    for tree in result.trees() {
        let text = tree.leaf_text();
        let mut reparser = glr(AMBIGUOUS_EXPR);
        let reparsed = reparser.parse(&text).unwrap();
        let found = reparsed.trees().any(|candidate| candidate == tree);
        assert!(found, "tree lost in round trip");
    }
}

#[test]
fn highly_ambiguous_input_stays_polynomial() {
    // Catalan(7) = 429 trees from a compact forest.
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2+3+4+5+6+7+8").unwrap();
    assert_eq!(result.tree_count(), 429);
    assert!(result.metrics.forest_nodes < 200);
}

#[test]
fn metrics_are_populated() {
    let mut parser = glr(AMBIGUOUS_EXPR);
    let result = parser.parse("1+2").unwrap();
    assert!(result.metrics.shifts >= 3);
    assert!(result.metrics.reductions >= 2);
    assert!(result.metrics.gss_nodes > 0);
    assert!(result.metrics.forest_nodes > 0);
}
