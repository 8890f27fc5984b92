// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reference binary wiring the library to a minimal in-memory editor.
//! A real editor integration supplies its own [`linebreak_agent::editor::Editor`]
//! and drives [`linebreak_agent::client::Client`] the same way.

use anyhow::{Context, Result};
use clap::Parser;
use linebreak_agent::client::Client;
use linebreak_agent::config::{self, AppConfig};
use linebreak_agent::editor::NullEditor;
use linebreak_agent::logging;
use linebreak_agent::transport::{self, Address};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Transport address: a bare port, `host:port`, or a Unix socket path.
    #[arg(long)]
    address: Option<String>,
    /// Display name sent in the initial negotiation.
    #[arg(long)]
    display_name: Option<String>,
    /// Working directory the agent's log file and optional config live in.
    /// Defaults to the current directory.
    #[arg(long)]
    directory: Option<PathBuf>,
    /// Raise the log level from info to debug.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let directory = cli
        .directory
        .unwrap_or_else(|| std::env::current_dir().expect("could not access current directory"));
    std::fs::create_dir_all(&directory).context("failed to create working directory")?;

    logging::initialize(&directory, cli.debug).context("failed to initialize logging")?;

    let cli_config = AppConfig { address: cli.address, display_name: cli.display_name };
    let file_config = AppConfig::from_config_file(&directory);
    let app_config = cli_config.merge(file_config);

    let address_spec = app_config
        .address
        .context("no --address given and none found in .linebreak/config")?;
    let display_name = app_config.display_name.unwrap_or_else(|| "linebreak-agent".to_string());

    let address = Address::parse(&address_spec).context("failed to parse --address")?;
    info!(%address, %display_name, "connecting");

    let (transport, events) = transport::spawn(address, display_name);
    let mut client = Client::new(NullEditor::new(), 0, transport, events);

    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    tokio::select! {
        result = pump_forever(&mut client, &mut ticker) => {
            if let Err(err) = result {
                warn!(%err, "agent stopped");
                return Err(err).context("agent loop failed");
            }
        }
        () = wait_for_shutdown() => {
            debug!("shutting down");
        }
    }

    Ok(())
}

async fn pump_forever(client: &mut Client<NullEditor>, ticker: &mut tokio::time::Interval) -> Result<(), linebreak_agent::error::AgentError> {
    loop {
        ticker.tick().await;
        client.pump()?;
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut signal_terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("should have been able to create terminate signal stream");
        tokio::select! {
            _ = signal::ctrl_c() => {
                debug!("got SIGINT (Ctrl+C), shutting down");
            }
            _ = signal_terminate.recv() => {
                debug!("got SIGTERM, shutting down");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        debug!("got Ctrl+C, shutting down");
    }
}
