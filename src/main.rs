use anyhow::Result;
use clap::Parser;

use puzzle_gate::cli::Args;
use puzzle_gate::commands;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    commands::run_command(args)
}
