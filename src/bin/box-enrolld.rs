// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Box enrollment daemon.
//!
//! Bootstraps the box (profile, root authority, server identity) and serves
//! `REGCL` requests until interrupted.
//!
//! # Usage
//!
//! ```text
//! box-enrolld [OPTIONS] [COMMAND]
//!
//! Commands:
//!   serve   Bootstrap the box and serve enrollment requests (default)
//!   init    Bootstrap the box and exit
//!   config  Validate and print the effective configuration
//!
//! Options:
//!   -c, --config <PATH>    Path to configuration file
//!       --secret <SECRET>  Shared enrollment secret [env: BOX_SECRET]
//!   -l, --listen <ADDR>    Override the listen address
//!   -v, --verbose          Enable verbose output
//!   -q, --quiet            Suppress non-error output
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use box_pki::certs::DirectoryStore;
use box_pki::logging::{self, LogLevel, LoggingConfig};
use box_pki::protocol::serve;
use box_pki::{BoxConfig, BoxController};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Box enrollment daemon
#[derive(Parser)]
#[command(name = "box-enrolld")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Private CA and enrollment server for a box", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Shared enrollment secret
    #[arg(long, global = true, env = "BOX_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Override the listen address
    #[arg(short, long, global = true, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Bootstrap the box and serve enrollment requests
    Serve,
    /// Bootstrap the box and exit
    Init,
    /// Validate and print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = if cli.quiet {
        LogLevel::Error
    } else if cli.verbose {
        config.logging.level.more_verbose()
    } else {
        config.logging.level
    };
    logging::init(&LoggingConfig { level });

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(cli, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "box-enrolld failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> box_pki::Result<BoxConfig> {
    let mut config = match &cli.config {
        Some(path) => BoxConfig::load(path)?,
        None => BoxConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    Ok(config)
}

async fn run_command(cli: Cli, config: BoxConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Config => {
            config.validate()?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Init => {
            let controller = bootstrap(&cli, &config).await?;
            println!("box id: {}", controller.profile().id);
            println!("root serial: {}", controller.profile().serial);
            Ok(())
        }
        Commands::Serve => {
            let controller = bootstrap(&cli, &config).await?;
            let context = Arc::new(controller.enrollment_context()?);
            let listener = TcpListener::bind(config.server.listen).await?;

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested");
                }
                signal.cancel();
            });

            serve(listener, context, config.server.max_message_bytes, shutdown).await?;
            Ok(())
        }
    }
}

async fn bootstrap(cli: &Cli, config: &BoxConfig) -> Result<BoxController, Box<dyn std::error::Error>> {
    let store = Arc::new(DirectoryStore::new(config.identity.store_path.clone()));
    let mut controller = BoxController::new(
        cli.secret.clone().unwrap_or_default(),
        config.identity.company.clone(),
        config.identity.server_name.clone(),
        store,
    )
    .with_issuance(config.issuance.clone());

    // Key generation takes seconds at 4096 bits.
    let controller = tokio::task::spawn_blocking(move || {
        controller.load_configuration().map(|()| controller)
    })
    .await??;

    info!(
        box_id = %controller.profile().id,
        store = %config.identity.store_path.display(),
        "Box ready"
    );
    Ok(controller)
}
