//! Sheaf CLI binary.

use std::io::Write;
use std::process;

use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use sheaf::cli::args::*;
use sheaf::cli::commands::*;

fn main() {
    let args = SheafArgs::parse();

    // --quiet keeps only errors, no flag shows warnings, -v adds per-stage
    // progress and -vv or more also logs cache lookups and training steps.
    let log_level = match args.verbosity() {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
