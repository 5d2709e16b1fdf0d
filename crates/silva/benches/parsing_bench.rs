//! Parsing benchmarks: deterministic LR against GLR over the same inputs.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use silva::{Grammar, GlrParser, Parser, ParserConfig};
use std::sync::Arc;

const ANNOTATED_EXPR: &str =
    "E: E '+' E {left, 1} | E '*' E {left, 2} | number; number: /\\d+/;";
const AMBIGUOUS_EXPR: &str = "E: E '+' E | E '*' E | number; number: /\\d+/;";

fn expression_input(terms: usize) -> String {
    let mut out = String::from("1");
    for i in 0..terms {
        out.push(if i % 2 == 0 { '+' } else { '*' });
        out.push_str("23");
    }
    out
}

fn bench_table_build(c: &mut Criterion) {
    c.bench_function("table_build/annotated_expr", |b| {
        b.iter(|| {
            let grammar = Arc::new(Grammar::from_string(black_box(ANNOTATED_EXPR)).unwrap());
            Parser::new(grammar, ParserConfig::default()).unwrap()
        });
    });
}

fn bench_lr_parse(c: &mut Criterion) {
    let grammar = Arc::new(Grammar::from_string(ANNOTATED_EXPR).unwrap());
    let mut parser = Parser::new(grammar, ParserConfig::default()).unwrap();
    let input = expression_input(64);

    c.bench_function("lr_parse/expr_64_ops", |b| {
        b.iter(|| parser.parse(black_box(&input)).unwrap());
    });
}

fn bench_glr_parse(c: &mut Criterion) {
    let grammar = Arc::new(Grammar::from_string(ANNOTATED_EXPR).unwrap());
    let mut parser = GlrParser::new(grammar, ParserConfig::default()).unwrap();
    let input = expression_input(64);

    c.bench_function("glr_parse/annotated_expr_64_ops", |b| {
        b.iter(|| parser.parse(black_box(&input)).unwrap());
    });

    let grammar = Arc::new(Grammar::from_string(AMBIGUOUS_EXPR).unwrap());
    let mut parser = GlrParser::new(grammar, ParserConfig::default()).unwrap();
    let input = expression_input(12);

    c.bench_function("glr_parse/ambiguous_expr_12_ops", |b| {
        b.iter(|| parser.parse(black_box(&input)).unwrap());
    });
}

criterion_group!(benches, bench_table_build, bench_lr_parse, bench_glr_parse);
criterion_main!(benches);
