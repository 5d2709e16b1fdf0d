//! Tests for the deterministic LR driver

use silva::{
    ActionDispatcher, Error, Grammar, NodeHandle, ParseError, Parser, ParserConfig, ProdId,
    SymbolId, TermId, skip_char_recovery,
};
use std::sync::Arc;

fn parser(grammar: &str) -> Parser {
    let grammar = Arc::new(Grammar::from_string(grammar).unwrap());
    Parser::new(grammar, ParserConfig::default()).unwrap()
}

const EXPR_GRAMMAR: &str = "E: E '+' E {left, 1}
  | E '*' E {left, 2}
  | number;
number: /\\d+/;";

/// Evaluates the expression grammar's forests and inline actions.
struct Eval {
    plus: ProdId,
    times: ProdId,
}

impl Eval {
    fn for_grammar(grammar: &Grammar) -> Self {
        let e = grammar.symbol("E").and_then(SymbolId::as_nonterm).unwrap();
        let prods: Vec<ProdId> = grammar.productions_of(e).map(|p| p.id).collect();
        Self {
            plus: prods[0],
            times: prods[1],
        }
    }
}

impl ActionDispatcher for Eval {
    type Value = i64;

    fn terminal(&mut self, _term: TermId, text: &str, _span: (usize, usize)) -> i64 {
        text.parse().unwrap_or(0)
    }

    fn reduce(&mut self, prod: ProdId, children: Vec<i64>, _span: (usize, usize)) -> i64 {
        if prod == self.plus {
            children[0] + children[2]
        } else if prod == self.times {
            children[0] * children[2]
        } else {
            children[0]
        }
    }
}

#[test]
fn expression_grammar_respects_priorities() {
    let grammar = Arc::new(Grammar::from_string(EXPR_GRAMMAR).unwrap());
    let mut parser = Parser::new(grammar.clone(), ParserConfig::default()).unwrap();

    let result = parser.parse("1+2*3+4").unwrap();
    assert_eq!(result.tree_count(), 1);

    let mut eval = Eval::for_grammar(&grammar);
    let value = result.forest.invoke_actions(result.root(), &mut eval);
    assert_eq!(value, 11);
}

#[test]
fn inline_actions_match_forest_evaluation() {
    let grammar = Arc::new(Grammar::from_string(EXPR_GRAMMAR).unwrap());
    let mut parser = Parser::new(grammar.clone(), ParserConfig::default()).unwrap();

    let mut eval = Eval::for_grammar(&grammar);
    let value = parser.parse_with_actions("1+2*3+4", &mut eval).unwrap();
    assert_eq!(value, 11);

    let mut eval = Eval::for_grammar(&grammar);
    let value = parser.parse_with_actions("2 * 3 * 4", &mut eval).unwrap();
    assert_eq!(value, 24);
}

#[test]
fn associativity_controls_grouping() {
    let left = "E: E '-' E {left}| number; number: /\\d+/;";
    let right = "E: E '-' E {right}| number; number: /\\d+/;";

    let grammar = Arc::new(Grammar::from_string(left).unwrap());
    let mut parser = Parser::new(grammar.clone(), ParserConfig::default()).unwrap();
    let result = parser.parse("1-2-3").unwrap();
    let value = eval_minus(&grammar, &result.forest, result.root());
    assert_eq!(value, (1 - 2) - 3);

    let grammar = Arc::new(Grammar::from_string(right).unwrap());
    let mut parser = Parser::new(grammar.clone(), ParserConfig::default()).unwrap();
    let result = parser.parse("1-2-3").unwrap();
    let value = eval_minus(&grammar, &result.forest, result.root());
    assert_eq!(value, 1 - (2 - 3));
}

fn eval_minus(grammar: &Grammar, forest: &silva::Forest, root: NodeHandle) -> i64 {
    struct Minus {
        minus: ProdId,
    }
    impl ActionDispatcher for Minus {
        type Value = i64;
        fn terminal(&mut self, _term: TermId, text: &str, _span: (usize, usize)) -> i64 {
            text.parse().unwrap_or(0)
        }
        fn reduce(&mut self, prod: ProdId, children: Vec<i64>, _span: (usize, usize)) -> i64 {
            if prod == self.minus {
                children[0] - children[2]
            } else {
                children[0]
            }
        }
    }
    let e = grammar.symbol("E").and_then(SymbolId::as_nonterm).unwrap();
    let minus = grammar.productions_of(e).next().unwrap().id;
    forest.invoke_actions(root, &mut Minus { minus })
}

#[test]
fn keyword_beats_identifier_at_equal_length() {
    // Scannerless keyword/identifier overlap: literal wins ties.
    let mut parser = parser("S: IF ID | ID ID; IF: 'if'; ID: /[a-z]+/;");
    let result = parser.parse("if x").unwrap();

    let tree = result.trees().next().unwrap();
    let silva::Tree::Node { children, .. } = &tree else {
        panic!("expected a node at the root");
    };
    let silva::Tree::Leaf { text, .. } = &children[0] else {
        panic!("expected a leaf");
    };
    assert_eq!(text, "if");
}

#[test]
fn longest_match_swallows_the_keyword() {
    // "ifx" matches ID for 3 characters, so the IF-branch never starts and
    // a single ID cannot complete `S: ID ID`.
    let mut parser = parser("S: IF ID | ID ID; IF: 'if'; ID: /[a-z]+/;");
    let err = parser.parse("ifx").unwrap_err();
    match err {
        Error::Parse(ParseError::NoViableToken { expected, position, .. }) => {
            assert_eq!(position, 3);
            assert!(expected.iter().any(|name| name == "ID"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn empty_production_parses_empty_input() {
    let mut parser = parser("L: L E | EMPTY; E: 'a';");
    let result = parser.parse("").unwrap();
    assert_eq!(result.tree_count(), 1);
    let tree = result.trees().next().unwrap();
    let silva::Tree::Node { children, .. } = &tree else {
        panic!("expected the empty L at the root");
    };
    assert!(children.is_empty());
}

#[test]
fn empty_production_anchors_left_recursion() {
    let mut parser = parser("L: L E | EMPTY; E: 'a';");
    let result = parser.parse("aa").unwrap();

    // L(L(L(), a), a): two nested L nodes above the empty one.
    let tree = result.trees().next().unwrap();
    let silva::Tree::Node { children, .. } = &tree else {
        panic!("expected L at the root");
    };
    assert_eq!(children.len(), 2);
    let silva::Tree::Node { children: inner, .. } = &children[0] else {
        panic!("expected a nested L");
    };
    assert_eq!(inner.len(), 2);
    let silva::Tree::Node { children: innermost, .. } = &inner[0] else {
        panic!("expected the empty L");
    };
    assert!(innermost.is_empty());
}

#[test]
fn prefer_shifts_binds_else_to_inner_if() {
    let grammar = Arc::new(Grammar::from_string("S: 'i' S 'e' S | 'i' S | 'x';").unwrap());
    let config = ParserConfig {
        prefer_shifts: true,
        ..ParserConfig::default()
    };
    let mut parser = Parser::new(grammar, config).unwrap();
    let result = parser.parse("iixex").unwrap();
    assert_eq!(result.tree_count(), 1);

    // The root uses S -> 'i' S: the else went to the inner 'i'.
    let tree = result.trees().next().unwrap();
    let silva::Tree::Node { children, .. } = &tree else {
        panic!("expected a node");
    };
    assert_eq!(children.len(), 2);
}

#[test]
fn spans_exclude_layout() {
    // Layout is trimmed from every span: "   1 + 2  " puts the sum at 3..8.
    let mut parser = parser("Result: E; E: E '+' E {left} | number; number: /\\d+(\\.\\d+)?/;");
    let result = parser.parse("   1 + 2  ").unwrap();
    assert_eq!(result.forest.span(result.root()), (3, 8));

    struct Spans(Vec<(usize, usize)>);
    impl ActionDispatcher for Spans {
        type Value = ();
        fn terminal(&mut self, _term: TermId, _text: &str, span: (usize, usize)) {
            self.0.push(span);
        }
        fn reduce(&mut self, _prod: ProdId, _children: Vec<()>, span: (usize, usize)) {
            self.0.push(span);
        }
    }
    let mut spans = Spans(Vec::new());
    result.forest.invoke_actions(result.root(), &mut spans);
    assert!(spans.0.contains(&(3, 4)));
    assert!(spans.0.contains(&(7, 8)));
    assert!(spans.0.contains(&(3, 8)));
}

#[test]
fn explicit_eof_in_rule_body() {
    let mut parser = parser("Result: E EOF; E: E '+' E {left} | number; number: /\\d+/;");
    let result = parser.parse("1 + 2").unwrap();
    assert_eq!(result.forest.span(result.root()), (0, 5));
}

#[test]
fn parse_error_carries_location_and_expected() {
    let mut parser = parser(EXPR_GRAMMAR);
    let err = parser.parse("1 +\n+ 2").unwrap_err();
    match err {
        Error::Parse(ParseError::NoViableToken {
            line,
            column,
            expected,
            context,
            ..
        }) => {
            assert_eq!(line, 2);
            assert_eq!(column, 1);
            assert!(expected.iter().any(|name| name == "number"));
            assert!(context.contains(">*<"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn lexical_ambiguity_is_a_disambiguation_error() {
    let mut parser = parser("S: A | B; A: /[a-z]+/; B: /[a-z]+/;");
    let err = parser.parse("abc").unwrap_err();
    assert!(matches!(
        err,
        Error::Parse(ParseError::Disambiguation { .. })
    ));
}

#[test]
fn skip_char_recovery_resumes_the_parse() {
    let grammar = Arc::new(Grammar::from_string("S: 'a' S | 'a';").unwrap());
    let mut parser = Parser::new(grammar, ParserConfig::default())
        .unwrap()
        .with_recovery(skip_char_recovery());

    let result = parser.parse("a ? a").unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.metrics.errors_recovered, 1);
    assert_eq!(result.forest.span(result.root()).1, 5);
}

#[test]
fn recovery_declined_propagates_the_error() {
    let grammar = Arc::new(Grammar::from_string("S: 'a' S | 'a';").unwrap());
    let mut parser = Parser::new(grammar, ParserConfig::default())
        .unwrap()
        .with_recovery(Box::new(|_ctx| None));
    assert!(parser.parse("a ?").is_err());
}

#[test]
fn layout_grammar_replaces_whitespace_skipping() {
    // Comments become layout through the LAYOUT non-terminal.
    let mut parser = parser(
        "S: 'a' S | 'a';
         LAYOUT: item_1 | EMPTY;
         item_1: item_1 item | item;
         item: ws | comment;
         ws: /\\s+/;
         comment: /#[^\\n]*/;",
    );
    let result = parser.parse("a # comment\n a a").unwrap();
    assert_eq!(result.forest.span(result.root()), (0, 16));
}

#[test]
fn explicit_layout_grammar_in_config() {
    let layout = Arc::new(Grammar::from_string("LAYOUT: ws | EMPTY; ws: /\\s+/;").unwrap());
    let grammar = Arc::new(Grammar::from_string("S: 'a' S | 'a';").unwrap());
    let config = ParserConfig {
        layout: Some(layout),
        ..ParserConfig::default()
    };
    let mut parser = Parser::new(grammar, config).unwrap();
    let result = parser.parse("a \t a").unwrap();
    assert_eq!(result.forest.span(result.root()), (0, 5));
}

#[test]
fn disabled_whitespace_rejects_spaced_input() {
    let grammar = Arc::new(Grammar::from_string("S: 'a' S | 'a';").unwrap());
    let config = ParserConfig {
        ws: None,
        ..ParserConfig::default()
    };
    let mut parser = Parser::new(grammar, config).unwrap();
    assert!(parser.parse("aa").is_ok());
    assert!(parser.parse("a a").is_err());
}

#[test]
fn cancellation_stops_the_parse() {
    let mut parser = parser(EXPR_GRAMMAR);
    parser.cancel_token().cancel();
    assert!(matches!(
        parser.parse("1+2"),
        Err(Error::Parse(ParseError::Cancelled))
    ));
}

#[test]
fn parse_file_round_trip() {
    let dir = std::env::temp_dir().join("silva_lr_parse_file_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("input.txt");
    std::fs::write(&path, "1+2*3+4").unwrap();

    let mut parser = parser(EXPR_GRAMMAR);
    let result = parser.parse_file(&path).unwrap();
    assert_eq!(result.forest.span(result.root()), (0, 7));
    std::fs::remove_file(&path).ok();
}

#[test]
fn rhapsody_style_model() {
    // A header line followed by one object with two properties.
    let mut parser = parser(
        "Model: Header Object;
         Object: '{' name Property_list '}';
         Property_list: Property*[semicolon];
         Property: '-' name '=' Value;
         Value: number | string;
         Header: /[^\\n{]+/;
         name: /[a-zA-Z_][a-zA-Z_0-9]*/;
         number: /\\d+/;
         string: /\"[^\"]*\"/;
         semicolon: ';';",
    );
    let result = parser
        .parse("Header line\n{ id -prop = 1 ; -prop2 = \"x\" }")
        .unwrap();
    assert_eq!(result.tree_count(), 1);

    struct CountProperties {
        property: ProdId,
        count: usize,
    }
    impl ActionDispatcher for CountProperties {
        type Value = ();
        fn terminal(&mut self, _term: TermId, _text: &str, _span: (usize, usize)) {}
        fn reduce(&mut self, prod: ProdId, _children: Vec<()>, _span: (usize, usize)) {
            if prod == self.property {
                self.count += 1;
            }
        }
    }

    let grammar = Grammar::from_string(
        "Model: Header Object;
         Object: '{' name Property_list '}';
         Property_list: Property*[semicolon];
         Property: '-' name '=' Value;
         Value: number | string;
         Header: /[^\\n{]+/;
         name: /[a-zA-Z_][a-zA-Z_0-9]*/;
         number: /\\d+/;
         string: /\"[^\"]*\"/;
         semicolon: ';';",
    )
    .unwrap();
    let property = grammar
        .symbol("Property")
        .and_then(SymbolId::as_nonterm)
        .unwrap();
    let property = grammar.productions_of(property).next().unwrap().id;
    let mut counter = CountProperties { property, count: 0 };
    result.forest.invoke_actions(result.root(), &mut counter);
    assert_eq!(counter.count, 2);
}
