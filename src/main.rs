//! Telar CLI — Rust-native dataflow graph execution.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "telar",
    version,
    about = "Rust-native dataflow graph execution — control-flow frames, write-once values, provenance tracing"
)]
struct Cli {
    #[command(subcommand)]
    command: telar::cli::Commands,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = telar::cli::dispatch(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
