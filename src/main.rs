//! dubroker - Entry Point
//!
//! Serves one protocol per process on top of a remote Dufs server.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};
use tokio::task::JoinHandle;

use dubroker::adapter::AdapterFilesystem;
use dubroker::config::{BrokerConfig, Protocol};
use dubroker::error::BrokerError;
use dubroker::remote::{DufsClient, tls::load_trusted_certs};
use dubroker::{ftp, nfs, sftp};

#[derive(Debug, Parser)]
#[command(name = "dubroker", version, about = "Serve a Dufs file store over FTP, NFS or SFTP")]
struct Cli {
    /// Configuration file, replaces the default dubroker.toml lookup
    #[arg(short, long, env = "DUBROKER_CONFIG")]
    config: Option<PathBuf>,

    /// Protocol to serve
    #[arg(value_enum)]
    protocol: Protocol,

    /// Dufs server URL, overrides every other source
    dufs_server: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(signal) => {
            info!("Exiting with {signal}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<&'static str, BrokerError> {
    let config = BrokerConfig::load(cli.protocol, cli.config.as_deref(), cli.dufs_server.as_deref())?;
    config.log_summary();

    let roots = load_trusted_certs(&config.trusted_certs)?;
    let remote = DufsClient::new(&config.dufs_server, roots)?;
    let fs = AdapterFilesystem::new(Arc::new(remote));

    info!("Launching {} server...", config.protocol);
    let servers: Vec<JoinHandle<()>> = match config.protocol {
        Protocol::Ftp => ftp::start(&config, fs)?,
        Protocol::Nfs => nfs::start(&config, fs).await?,
        Protocol::Sftp => sftp::start(&config, fs).await?,
    };

    let signal = wait_for_signal().await?;
    for server in servers {
        server.abort();
    }
    Ok(signal)
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT")
}
