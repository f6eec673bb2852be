//! Module `session`
//!
//! Per-connection FTP state: login progress, working directory, pending
//! rename and restart offset, the prepared data channel and TLS settings.

use std::net::{IpAddr, SocketAddr};

use super::passive::DataChannel;
use crate::adapter::path;

/// State of one control connection.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    local: SocketAddr,
    username: Option<String>,
    is_logged_in: bool,
    cwd: String,
    rename_from: Option<String>,
    restart_offset: u64,
    data_channel: DataChannel,
    is_tls: bool,
    protect_data: bool,
}

impl Session {
    pub fn new(peer: SocketAddr, local: SocketAddr) -> Self {
        Self {
            peer,
            local,
            username: None,
            is_logged_in: false,
            cwd: "/".to_string(),
            rename_from: None,
            restart_offset: 0,
            data_channel: DataChannel::None,
            is_tls: false,
            protect_data: false,
        }
    }

    // --------------------
    // Getter methods
    // --------------------

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn peer_ip(&self) -> IpAddr {
        self.peer.ip()
    }

    /// Address of the listener the client reached
    pub fn local(&self) -> SocketAddr {
        self.local
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in
    }

    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn is_tls(&self) -> bool {
        self.is_tls
    }

    pub fn protect_data(&self) -> bool {
        self.protect_data
    }

    pub fn has_data_channel(&self) -> bool {
        !self.data_channel.is_none()
    }

    // --------------------
    // Setter methods
    // --------------------

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
        self.is_logged_in = false;
    }

    pub fn set_logged_in(&mut self, logged_in: bool) {
        self.is_logged_in = logged_in;
    }

    pub fn set_cwd(&mut self, cwd: String) {
        self.cwd = cwd;
    }

    pub fn set_tls(&mut self, is_tls: bool) {
        self.is_tls = is_tls;
    }

    pub fn set_protect_data(&mut self, protect: bool) {
        self.protect_data = protect;
    }

    pub fn set_data_channel(&mut self, channel: DataChannel) {
        self.data_channel = channel;
    }

    /// The prepared channel; each transfer uses it once.
    pub fn take_data_channel(&mut self) -> DataChannel {
        std::mem::take(&mut self.data_channel)
    }

    pub fn set_rename_from(&mut self, path: Option<String>) {
        self.rename_from = path;
    }

    pub fn take_rename_from(&mut self) -> Option<String> {
        self.rename_from.take()
    }

    pub fn set_restart_offset(&mut self, offset: u64) {
        self.restart_offset = offset;
    }

    /// The REST offset applies to the next transfer only.
    pub fn take_restart_offset(&mut self) -> u64 {
        std::mem::take(&mut self.restart_offset)
    }

    /// Absolute remote path for a command argument.
    pub fn resolve(&self, arg: &str) -> String {
        let base = if arg.starts_with('/') { "/" } else { self.cwd.as_str() };
        path::join(&["/", base, arg.trim_end_matches('/')])
    }
}
