// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spellboard Daemon (sbd) entry point.

use sb_daemon::{Config, Server};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("sbd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("sbd {}", env!("CARGO_PKG_VERSION"));
                println!("Spellboard Daemon - HTTP execution dispatch server for cast spells");
                println!();
                println!("USAGE:");
                println!("    sbd");
                println!();
                println!("Configuration is taken from SB_* environment variables");
                println!("(SB_PORT, SB_SPELL_HOME, SB_REGISTRY_PATH, SB_AUTH_TOKENS,");
                println!(" SB_AUTH_KEYS, SB_RUNTIME_INTERPRETER, SB_RUNTIME_CLI, ...).");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: sbd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    setup_logging();

    let config = Config::from_env();
    info!(
        spell_home = %config.spell_home.display(),
        port = config.port,
        "starting sbd"
    );

    let server = match Server::start(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("failed to start sbd: {e}");
            eprintln!("failed to start sbd: {e}");
            std::process::exit(1);
        }
    };

    println!("sbd listening on {}", server.addr());

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    server.close().await;
    Ok(())
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
