//! Trusted certificates for the remote store connection.

use std::fs;

use log::info;

use crate::error::ConfigError;

/// Split the comma-separated certificate list, dropping blank entries.
pub fn cert_paths(trusted_certs: &str) -> Vec<&str> {
    trusted_certs
        .split(',')
        .map(str::trim)
        .filter(|cert| !cert.is_empty())
        .collect()
}

/// Read every PEM file of the list into root certificates.
pub fn load_trusted_certs(trusted_certs: &str) -> Result<Vec<reqwest::Certificate>, ConfigError> {
    info!("TrustedCerts: {trusted_certs}");

    let mut roots = Vec::new();
    for path in cert_paths(trusted_certs) {
        let pem = fs::read(path).map_err(|source| ConfigError::File {
            path: path.to_string(),
            source,
        })?;
        let certs = reqwest::Certificate::from_pem_bundle(&pem)
            .map_err(|_| ConfigError::Certificate(path.to_string()))?;
        if certs.is_empty() {
            return Err(ConfigError::Certificate(path.to_string()));
        }
        roots.extend(certs);
    }
    Ok(roots)
}
