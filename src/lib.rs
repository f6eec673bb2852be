//! dubroker
//!
//! Serves a remote Dufs file store over FTP, NFS and SFTP. The protocol
//! engines share one `AdapterFilesystem`, which turns the store's HTTP API
//! into the handle-based filesystem those engines expect.

pub mod adapter;
pub mod auth;
pub mod config;
pub mod error;
pub mod ftp;
pub mod net;
pub mod nfs;
pub mod remote;
pub mod sftp;

pub use adapter::{AdapterFileInfo, AdapterFilesystem, AdapterHandle, OpenFlags};
pub use config::{BrokerConfig, Protocol};
pub use error::{BrokerError, FsError};
pub use net::{PortRange, describe_address};
