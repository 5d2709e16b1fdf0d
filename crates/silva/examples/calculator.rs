//! A four-operation calculator over the scannerless LR driver.
//!
//! Run with: `cargo run --example calculator -- "2 * (3 + 4) - 5"`

use silva::{ActionDispatcher, Grammar, Parser, ParserConfig, ProdId, SymbolId, TermId};
use std::sync::Arc;

const GRAMMAR: &str = r"
E: E '+' E {left, 1}
 | E '-' E {left, 1}
 | E '*' E {left, 2}
 | E '/' E {left, 2}
 | '(' E ')'
 | number;
number: /\d+(\.\d+)?/;
";

struct Calculator {
    plus: ProdId,
    minus: ProdId,
    times: ProdId,
    divide: ProdId,
    parens: ProdId,
}

impl Calculator {
    fn new(grammar: &Grammar) -> Self {
        let e = grammar.symbol("E").and_then(SymbolId::as_nonterm).unwrap();
        let prods: Vec<ProdId> = grammar.productions_of(e).map(|p| p.id).collect();
        Self {
            plus: prods[0],
            minus: prods[1],
            times: prods[2],
            divide: prods[3],
            parens: prods[4],
        }
    }
}

impl ActionDispatcher for Calculator {
    type Value = f64;

    fn terminal(&mut self, _term: TermId, text: &str, _span: (usize, usize)) -> f64 {
        text.parse().unwrap_or(0.0)
    }

    fn reduce(&mut self, prod: ProdId, children: Vec<f64>, _span: (usize, usize)) -> f64 {
        if prod == self.plus {
            children[0] + children[2]
        } else if prod == self.minus {
            children[0] - children[2]
        } else if prod == self.times {
            children[0] * children[2]
        } else if prod == self.divide {
            children[0] / children[2]
        } else if prod == self.parens {
            children[1]
        } else {
            children[0]
        }
    }
}

fn main() {
    let input = std::env::args().nth(1).unwrap_or_else(|| "1 + 2 * 3".to_string());

    let grammar = Arc::new(Grammar::from_string(GRAMMAR).expect("grammar is well-formed"));
    let mut parser = Parser::new(grammar.clone(), ParserConfig::default())
        .expect("grammar is deterministic");

    let mut calculator = Calculator::new(&grammar);
    match parser.parse_with_actions(&input, &mut calculator) {
        Ok(value) => println!("{input} = {value}"),
        Err(err) => eprintln!("error: {err}"),
    }
}
