// SPDX-FileCopyrightText: 2026 Doorstep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Doorstep - calls delivery customers, records their instructions, and
//! notifies the assigned agent.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use doorstep_config::DoorstepConfig;

/// Doorstep - delivery-call pipeline.
#[derive(Parser, Debug)]
#[command(name = "doorstep", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to the standard search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway and the pipeline workers.
    Serve,
    /// Print job counters per queue.
    QueueStats {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Re-run transcription and analysis for a recording, filling gaps only.
    Reprocess {
        /// Recording id.
        recording_id: String,
    },
}

fn load_config(path: Option<&std::path::Path>) -> DoorstepConfig {
    let loaded = match path {
        Some(path) => doorstep_config::load_and_validate_path(path),
        None => doorstep_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            doorstep_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::QueueStats { json }) => serve::run_queue_stats(config, json).await,
        Some(Commands::Reprocess { recording_id }) => {
            serve::run_reprocess(config, &recording_id).await
        }
        None => {
            println!("doorstep: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
