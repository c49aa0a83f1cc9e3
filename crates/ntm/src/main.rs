// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use ntm::command::Commands;
use ntm::config::Config;

#[derive(Parser)]
#[command(name = "ntm", version, about = "Multi-agent terminal-session orchestrator.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    subcommand: Option<Commands>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.config.validate() {
        eprintln!("error: {e}");
        std::process::exit(4);
    }

    match cli.subcommand {
        Some(command) => {
            std::process::exit(ntm::command::run(&cli.config, command));
        }
        None => {
            ntm::run::init_tracing(&cli.config);
            if let Err(e) = ntm::run::run(cli.config).await {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        }
    }
}
