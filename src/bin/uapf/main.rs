//! uapf CLI - exchange process packages between git repositories

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use uapf::core::TransferError;
use uapf::util::diagnostic::emit;

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli) {
        report(&e, color);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("uapf=debug")
    } else {
        EnvFilter::new("uapf=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // Execute command
    match cli.command {
        Commands::Export(args) => commands::export::execute(args),
        Commands::Import(args) => commands::import::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Transfer errors get a full diagnostic; anything else prints its chain.
fn report(err: &anyhow::Error, color: bool) {
    match err.chain().find_map(|cause| cause.downcast_ref::<TransferError>()) {
        Some(transfer) => {
            let mut diag = transfer.to_diagnostic();
            let outer = err.to_string();
            if outer != transfer.to_string() {
                diag = diag.with_context(outer);
            }
            emit(&diag, color);
        }
        None => eprintln!("error: {:#}", err),
    }
}
