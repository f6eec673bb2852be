//! Error types
//!
//! Defines domain-specific error types for each module of the broker.

use std::io;

use thiserror::Error;

/// The only error a port range can produce. Callers learn that the text was
/// malformed, never why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid port range")]
pub struct InvalidPortRange;

/// Bind resolver errors
#[derive(Debug, Error)]
pub enum BindError {
    /// Local interfaces could not be listed at all
    #[error("failed to get interfaces: {0}")]
    Interfaces(#[source] io::Error),
}

/// Errors reported by the remote filesystem client
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("remote returned {status} for {path}")]
    Status { status: u16, path: String },
    #[error("malformed listing for {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid seek to a negative position")]
    InvalidSeek,
    #[error("invalid remote path {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Errors surfaced by the filesystem adapter.
///
/// Everything the remote client reports is carried verbatim in `Remote`;
/// the other variants are the adapter's own invariants.
#[derive(Debug, Error)]
pub enum FsError {
    /// The remote store cannot express this operation
    #[error("not implemented")]
    NotImplemented,
    /// Write-open or directory listing aimed at the wrong kind of entry
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// Data read attempted on a directory handle
    #[error("is a directory: {0}")]
    IsADirectory(String),
    /// The handle was used after it was closed
    #[error("handle already closed: {0}")]
    Closed(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl FsError {
    /// Engines skip the feature on this error instead of failing the session.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, FsError::NotImplemented)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::Remote(e) if e.is_not_found())
    }
}

/// Login failures. Both variants carry the rejected user name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("unknown user {0}")]
    UnknownUser(String),
    #[error("invalid password for {0}")]
    InvalidPassword(String),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),
    #[error("failed to parse dufs server url {url}: {source}")]
    ServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("ftp transfer port range {0:?}: invalid port range")]
    PortRange(String),
    #[error("failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("no usable certificate in {0}")]
    Certificate(String),
    #[error("invalid tls configuration: {0}")]
    Tls(String),
    #[error("failed to load host key {path}: {reason}")]
    HostKey { path: String, reason: String },
    #[error("{0}")]
    Missing(String),
}

/// Top level error that encompasses all error types
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("bind error: {0}")]
    Bind(#[from] BindError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("filesystem error: {0}")]
    Fs(#[from] FsError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The protocol engine was left out of this build
    #[error("{0} support is not compiled in (rebuild with --features {0})")]
    Unsupported(&'static str),
}
