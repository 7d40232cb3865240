mod args;
mod commands;
mod util;

use args::{Cli, SubCommands};
use commands::{dot, emit, frame, viterbi};

use clap::Parser;
use log::debug;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    debug!("Start");

    match cli.command {
        SubCommands::Frame(args) => frame(&args)?,
        SubCommands::Emit(args) => emit(&args)?,
        SubCommands::Viterbi(args) => viterbi(&args)?,
        SubCommands::Dot(args) => dot(&args)?,
    }
    Ok(())
}
