use clap::Parser;
use dcalab::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
