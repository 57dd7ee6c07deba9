// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use unireport::config::Config;

#[derive(Parser)]
#[command(name = "unireport", version, about = "Scheduled UniFi controller report service.")]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Validate configuration and probe the controller, then exit.
    #[arg(long)]
    test: bool,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    if config.log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.config);

    let result = if cli.test {
        unireport::probe(&cli.config).await
    } else {
        unireport::run(cli.config).await
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            error!("fatal: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
