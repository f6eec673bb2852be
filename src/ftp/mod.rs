//! FTP engine
//!
//! Serves the filesystem adapter over FTP, with optional mandatory TLS
//! (`AUTH TLS` and `PROT P`). One listener runs per resolved bind address
//! and every control connection gets its own task.

pub mod commands;
pub mod handlers;
pub mod listing;
pub mod passive;
pub mod server;
pub mod session;
pub mod tls;

use std::sync::Arc;

use log::info;
use tokio::task::JoinHandle;

use crate::adapter::AdapterFilesystem;
use crate::auth::Credentials;
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use crate::net::describe_address;

pub use server::{FtpServer, ServerContext};

/// Resolve the listen address and start one server task per address.
pub fn start(config: &BrokerConfig, fs: AdapterFilesystem) -> Result<Vec<JoinHandle<()>>, BrokerError> {
    let tls = match &config.tls {
        Some(files) => Some(tls::load_acceptor(files)?),
        None => None,
    };

    let ctx = Arc::new(ServerContext::new(
        fs,
        Credentials::from_url(&config.dufs_server),
        config.ftp_transfer_port_range,
        tls,
        config.data_timeout,
    ));

    let addrs = describe_address(&config.address)?;
    for addr in &addrs {
        info!("FTP listen address: {addr}");
    }
    Ok(server::start_all(addrs, ctx))
}
