//! Silva CLI
//!
//! Parse inputs with textual grammars from the command line.

use clap::Parser;
use silva_tools::cli::Cli;

fn main() {
    let cli = Cli::parse();
    std::process::exit(silva_tools::run(cli));
}
