//! SFTP engine
//!
//! SSH with password authentication, serving the `sftp` subsystem over the
//! filesystem adapter. Built only with the `sftp` feature; the handle table
//! is always available.

pub mod handles;
#[cfg(feature = "sftp")]
pub mod server;
#[cfg(feature = "sftp")]
pub mod session;

pub use handles::{HandleTable, OpenEntry};

use tokio::task::JoinHandle;

use crate::adapter::AdapterFilesystem;
use crate::config::BrokerConfig;
use crate::error::BrokerError;

/// Load the host key, resolve the listen address and start one SSH listener
/// per address.
#[cfg(feature = "sftp")]
pub async fn start(
    config: &BrokerConfig,
    fs: AdapterFilesystem,
) -> Result<Vec<JoinHandle<()>>, BrokerError> {
    use std::sync::Arc;

    use log::info;

    use crate::auth::Credentials;
    use crate::error::ConfigError;

    let key_path = config
        .sftp_host_key
        .as_deref()
        .ok_or_else(|| ConfigError::Missing("sftp_host_key is required to serve SFTP".into()))?;
    let ssh_config = Arc::new(server::ssh_config(server::load_host_key(key_path)?));
    let credentials = Arc::new(Credentials::from_url(&config.dufs_server));

    let addrs = crate::net::describe_address(&config.address)?;
    for addr in &addrs {
        info!("SFTP listen address: {addr}");
    }
    Ok(server::start_all(addrs, ssh_config, fs, credentials))
}

/// Without the `sftp` feature the protocol cannot be served.
#[cfg(not(feature = "sftp"))]
pub async fn start(
    _config: &BrokerConfig,
    _fs: AdapterFilesystem,
) -> Result<Vec<JoinHandle<()>>, BrokerError> {
    Err(BrokerError::Unsupported("sftp"))
}
