//! Configuration management for dubroker
//!
//! Layers built-in defaults, an optional `dubroker.toml` and `DUBROKER_*`
//! environment variables, then validates everything once before any listener
//! starts. The result is passed by reference to whatever needs it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use config::{Config, Environment, File};
use log::info;
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;
use crate::net::PortRange;

pub const DEFAULT_CONFIG_FILE: &str = "dubroker";
pub const DEFAULT_DUFS_SERVER: &str = "http://localhost:5000";
pub const DEFAULT_TRANSFER_PORT_RANGE: &str = "50000-50100";
pub const DEFAULT_DATA_TIMEOUT_SECS: u64 = 30;

/// Protocol served by one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Protocol {
    Ftp,
    Nfs,
    Sftp,
}

impl Protocol {
    pub fn default_address(&self) -> &'static str {
        match self {
            Protocol::Ftp => "127.0.0.1:2021",
            Protocol::Sftp => "127.0.0.1:2022",
            Protocol::Nfs => "127.0.0.1:2049",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Ftp => write!(f, "FTP"),
            Protocol::Nfs => write!(f, "NFS"),
            Protocol::Sftp => write!(f, "SFTP"),
        }
    }
}

/// Values exactly as the config sources provide them
#[derive(Debug, Deserialize)]
struct RawConfig {
    dufs_server: String,
    trusted_certs: String,
    address: Option<String>,
    tls_cert_crt: Option<String>,
    tls_cert_key: Option<String>,
    ftp_transfer_port_range: String,
    data_timeout_secs: u64,
    sftp_host_key: Option<String>,
}

/// Certificate chain and private key for FTP over TLS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub protocol: Protocol,
    pub dufs_server: Url,
    pub trusted_certs: String,
    pub address: String,
    pub tls: Option<TlsFiles>,
    pub ftp_transfer_port_range: PortRange,
    pub data_timeout: Duration,
    pub sftp_host_key: Option<PathBuf>,
}

impl BrokerConfig {
    /// Load and validate. `file` replaces the default `dubroker.toml` lookup and
    /// must then exist; `dufs_server` wins over every other source.
    pub fn load(
        protocol: Protocol,
        file: Option<&Path>,
        dufs_server: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut builder = Config::builder()
            .set_default("dufs_server", DEFAULT_DUFS_SERVER)?
            .set_default("trusted_certs", "")?
            .set_default("ftp_transfer_port_range", DEFAULT_TRANSFER_PORT_RANGE)?
            .set_default("data_timeout_secs", DEFAULT_DATA_TIMEOUT_SECS as i64)?
            .add_source(file_source)
            .add_source(Environment::with_prefix("DUBROKER"));
        if let Some(server) = dufs_server {
            builder = builder.set_override("dufs_server", server)?;
        }

        let raw: RawConfig = builder.build()?.try_deserialize()?;
        Self::validate(protocol, raw)
    }

    fn validate(protocol: Protocol, raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.dufs_server.trim().is_empty() {
            return Err(ConfigError::Missing("Dufs Server Address is required".into()));
        }
        let dufs_server = Url::parse(&raw.dufs_server).map_err(|source| ConfigError::ServerUrl {
            url: raw.dufs_server.clone(),
            source,
        })?;

        let ftp_transfer_port_range = raw
            .ftp_transfer_port_range
            .parse::<PortRange>()
            .map_err(|_| ConfigError::PortRange(raw.ftp_transfer_port_range.clone()))?;

        let tls = match (non_empty(raw.tls_cert_crt), non_empty(raw.tls_cert_key)) {
            (Some(cert), Some(key)) => Some(TlsFiles {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::Missing(
                    "tls_cert_key is required when tls_cert_crt is set".into(),
                ));
            }
            (None, Some(_)) => {
                return Err(ConfigError::Missing(
                    "tls_cert_crt is required when tls_cert_key is set".into(),
                ));
            }
        };

        if raw.data_timeout_secs == 0 {
            return Err(ConfigError::Missing(
                "data_timeout_secs must be greater than 0".into(),
            ));
        }

        let address = non_empty(raw.address).unwrap_or_else(|| protocol.default_address().to_string());

        Ok(Self {
            protocol,
            dufs_server,
            trusted_certs: raw.trusted_certs,
            address,
            tls,
            ftp_transfer_port_range,
            data_timeout: Duration::from_secs(raw.data_timeout_secs),
            sftp_host_key: non_empty(raw.sftp_host_key).map(PathBuf::from),
        })
    }

    /// Remote URL safe for logs
    pub fn redacted_server(&self) -> String {
        let mut url = self.dufs_server.clone();
        if url.password().is_some() {
            // Only fails for URLs that cannot carry credentials at all
            let _ = url.set_password(Some("***"));
        }
        url.to_string()
    }

    pub fn log_summary(&self) {
        info!("Protocol: {}", self.protocol);
        info!("Dufs server: {}", self.redacted_server());
        info!("Listen address: {}", self.address);
        if self.protocol == Protocol::Ftp {
            info!("Passive port range: {}", self.ftp_transfer_port_range);
            info!("TLS: {}", if self.tls.is_some() { "required" } else { "disabled" });
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
