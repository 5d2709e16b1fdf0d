//! CLI interface for silva-tools

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "silva")]
#[command(about = "Scannerless LR/GLR parsing from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse an input file with a textual grammar and print the tree(s)
    Parse {
        /// The grammar file
        grammar: PathBuf,

        /// The input file to parse
        input: PathBuf,

        /// Use the generalized (GLR) driver and print every derivation
        #[arg(long)]
        glr: bool,

        /// Table construction to use
        #[arg(long, value_enum, default_value_t = TableChoice::Lalr)]
        table: TableChoice,

        /// Resolve remaining shift/reduce conflicts in favor of shift
        #[arg(long)]
        prefer_shifts: bool,

        /// Dump states and tables through the logger
        #[arg(long)]
        debug: bool,

        /// Cap the number of printed trees in GLR mode
        #[arg(long, default_value_t = 8)]
        max_trees: usize,
    },

    /// Check a grammar: report conflicts or print a summary
    Check {
        /// The grammar file
        grammar: PathBuf,

        /// Table construction to use
        #[arg(long, value_enum, default_value_t = TableChoice::Lalr)]
        table: TableChoice,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TableChoice {
    Slr,
    Lalr,
}

impl From<TableChoice> for silva::TableKind {
    fn from(choice: TableChoice) -> Self {
        match choice {
            TableChoice::Slr => Self::Slr,
            TableChoice::Lalr => Self::Lalr,
        }
    }
}
