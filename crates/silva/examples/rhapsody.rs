//! Parsing a Rhapsody-style model file: a free-form header line followed by
//! nested objects with `-property = value` pairs.
//!
//! Run with: `cargo run --example rhapsody`

use silva::{Grammar, Parser, ParserConfig};
use std::sync::Arc;

const GRAMMAR: &str = r#"
Model: Header Object;
Object: '{' name Property_list '}';
Property_list: Property*[semicolon];
Property: '-' name '=' Value;
Value: number | string | Object;
Header: /[^\n{]+/;
name: /[a-zA-Z_][a-zA-Z_0-9]*/;
number: /\d+(\.\d+)?/;
string: /"[^"]*"/;
semicolon: ';';
"#;

const INPUT: &str = r#"Rhapsody model header
{ LightSwitch
  -state = "off" ;
  -pin = 13 ;
  -timer = { Timer -interval = 500 }
}"#;

fn main() {
    let grammar = Arc::new(Grammar::from_string(GRAMMAR).expect("grammar is well-formed"));
    let mut parser =
        Parser::new(grammar.clone(), ParserConfig::default()).expect("grammar is deterministic");

    match parser.parse(INPUT) {
        Ok(result) => {
            let tree = result.trees().next().expect("a successful parse has a tree");
            print!("{}", tree.tree_str(&grammar));
        }
        Err(err) => eprintln!("error: {err}"),
    }
}
