//! Error handlers
//!
//! Converts adapter errors into protocol reply codes.

use crate::error::types::{FsError, RemoteError};
use log::error;

/// Log a session-level filesystem failure
pub fn handle_error(context: &str, err: &FsError) {
    if err.is_not_implemented() {
        return;
    }
    error!("{context}: {err}");
}

/// Convert error to FTP response code
pub fn error_to_ftp_code(err: &FsError) -> u16 {
    match err {
        FsError::NotImplemented => 502,
        FsError::InvalidTarget(_) => 550,
        FsError::IsADirectory(_) => 550,
        FsError::Closed(_) => 451,
        FsError::Remote(RemoteError::NotFound(_)) => 550,
        FsError::Remote(RemoteError::PermissionDenied(_)) => 550,
        FsError::Remote(RemoteError::InvalidPath(_)) => 553,
        FsError::Remote(_) => 451,
    }
}
