//! NFS engine
//!
//! Serves the filesystem adapter as an NFSv3 export through `nfsserve`.
//! Built only with the `nfs` feature; the file id table is always available.

#[cfg(feature = "nfs")]
pub mod fs;
pub mod ids;

#[cfg(feature = "nfs")]
pub use fs::NfsFilesystem;
pub use ids::FileIdTable;

#[cfg(feature = "nfs")]
use crate::{adapter::AdapterFilesystem, config::BrokerConfig, error::BrokerError};

/// Resolve the listen address and run one NFS listener per address.
#[cfg(feature = "nfs")]
pub async fn start(
    config: &BrokerConfig,
    fs: AdapterFilesystem,
) -> Result<Vec<tokio::task::JoinHandle<()>>, BrokerError> {
    use log::{error, info};
    use nfsserve::tcp::{NFSTcp, NFSTcpListener};

    let addrs = crate::net::describe_address(&config.address)?;
    let handles = addrs
        .into_iter()
        .map(|addr| {
            let exported = NfsFilesystem::new(fs.clone());
            tokio::spawn(async move {
                match NFSTcpListener::bind(&addr, exported).await {
                    Ok(listener) => {
                        info!("NFS server started on {addr}");
                        if let Err(e) = listener.handle_forever().await {
                            error!("NFS server error on {addr}: {e}");
                        }
                    }
                    Err(e) => error!("NFS server error on {addr}: {e}"),
                }
            })
        })
        .collect();
    Ok(handles)
}

/// Without the `nfs` feature the protocol cannot be served.
#[cfg(not(feature = "nfs"))]
pub async fn start(
    _config: &crate::config::BrokerConfig,
    _fs: crate::adapter::AdapterFilesystem,
) -> Result<Vec<tokio::task::JoinHandle<()>>, crate::error::BrokerError> {
    Err(crate::error::BrokerError::Unsupported("nfs"))
}
