//! Command-line harness around the silva parser library.
//!
//! Exit codes: 0 success, 1 parse error, 2 grammar or table error, 3 usage
//! error.

pub mod cli;

use cli::{Cli, Commands};
use silva::{Error, Grammar, GlrParser, Parser, ParserConfig, TableOptions};
use std::path::Path;
use std::sync::Arc;

/// Exit code for a successful run.
pub const EXIT_OK: i32 = 0;
/// Exit code when the input fails to parse.
pub const EXIT_PARSE_ERROR: i32 = 1;
/// Exit code when the grammar or its tables are invalid.
pub const EXIT_GRAMMAR_ERROR: i32 = 2;
/// Exit code for usage problems (unreadable files, bad flags).
pub const EXIT_USAGE_ERROR: i32 = 3;

/// Run a parsed command line, returning the process exit code.
#[must_use]
pub fn run(cli: Cli) -> i32 {
    match cli.command {
        Commands::Parse {
            grammar,
            input,
            glr,
            table,
            prefer_shifts,
            debug,
            max_trees,
        } => run_parse(
            &grammar,
            &input,
            glr,
            table.into(),
            prefer_shifts,
            debug,
            max_trees,
        ),
        Commands::Check { grammar, table } => run_check(&grammar, table.into()),
    }
}

fn load_grammar(path: &Path) -> Result<Arc<Grammar>, i32> {
    match Grammar::from_file(path) {
        Ok(grammar) => Ok(Arc::new(grammar)),
        Err(Error::Io(err)) => {
            eprintln!("cannot read {}: {err}", path.display());
            Err(EXIT_USAGE_ERROR)
        }
        Err(err) => {
            eprintln!("grammar error: {err}");
            Err(EXIT_GRAMMAR_ERROR)
        }
    }
}

fn run_parse(
    grammar_path: &Path,
    input_path: &Path,
    glr: bool,
    table: silva::TableKind,
    prefer_shifts: bool,
    debug: bool,
    max_trees: usize,
) -> i32 {
    let grammar = match load_grammar(grammar_path) {
        Ok(grammar) => grammar,
        Err(code) => return code,
    };
    let input = match std::fs::read_to_string(input_path) {
        Ok(input) => input,
        Err(err) => {
            eprintln!("cannot read {}: {err}", input_path.display());
            return EXIT_USAGE_ERROR;
        }
    };

    let config = ParserConfig {
        tables: table,
        prefer_shifts,
        debug,
        ..ParserConfig::default()
    };

    let result = if glr {
        GlrParser::new(grammar.clone(), config).map_err(classify_build_error)
            .and_then(|mut parser| parser.parse(&input).map_err(|err| report_parse_error(&err)))
    } else {
        Parser::new(grammar.clone(), config).map_err(classify_build_error)
            .and_then(|mut parser| parser.parse(&input).map_err(|err| report_parse_error(&err)))
    };

    match result {
        Ok(result) => {
            let total = result.tree_count();
            if total > 1 {
                println!("{total} derivations");
            }
            for (idx, tree) in result.trees().take(max_trees).enumerate() {
                if total > 1 {
                    println!("--- tree {idx}");
                }
                print!("{}", tree.tree_str(&grammar));
            }
            if total > max_trees {
                println!("... {} more", total - max_trees);
            }
            EXIT_OK
        }
        Err(code) => code,
    }
}

fn run_check(grammar_path: &Path, table: silva::TableKind) -> i32 {
    let grammar = match load_grammar(grammar_path) {
        Ok(grammar) => grammar,
        Err(code) => return code,
    };

    match silva::ParseTables::build(
        &grammar,
        TableOptions {
            kind: table,
            ..TableOptions::default()
        },
    ) {
        Ok(tables) => {
            println!(
                "{} terminals, {} non-terminals, {} productions, {} states",
                grammar.num_terminals(),
                grammar.num_nonterminals(),
                grammar.productions().count(),
                tables.num_states()
            );
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{err}");
            eprint!("{}", err.detail());
            EXIT_GRAMMAR_ERROR
        }
    }
}

fn classify_build_error(err: Error) -> i32 {
    eprintln!("grammar error: {err}");
    if let Error::Table(table_err) = &err {
        eprint!("{}", table_err.detail());
    }
    EXIT_GRAMMAR_ERROR
}

fn report_parse_error(err: &Error) -> i32 {
    eprintln!("parse error: {err}");
    EXIT_PARSE_ERROR
}
