mod cli;
mod commands;
mod config;
mod console;

use std::process;

use clap::Parser;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::cli::Args;
use crate::commands::CommandExecutor;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match run(args).await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Application error: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(2);
        }
    }
}

/// Returns whether the operation succeeded
async fn run(args: Args) -> anyhow::Result<bool> {
    init_logging(args.verbose, args.quiet);

    let config = config::load(args.config.as_deref(), args.client_id, args.domain).await?;
    let executor = CommandExecutor::new(config, args.storage, args.callback).await?;

    let notice = executor.execute(args.command).await;
    if notice.is_failure() {
        eprintln!("{}", notice);
    } else {
        println!("{}", notice);
    }

    Ok(!notice.is_failure())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
