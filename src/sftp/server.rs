//! SSH server carrying the SFTP subsystem
//!
//! Each accepted connection runs its own `russh` session. Password logins are
//! checked against the remote store credentials and an `sftp` subsystem
//! request hands the channel to an `SftpSession`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use russh::server::{Auth, Config, Handler, Msg, Session};
use russh::{Channel, ChannelId, MethodSet};
use russh_keys::key::KeyPair;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::session::SftpSession;
use crate::adapter::AdapterFilesystem;
use crate::auth::Credentials;
use crate::error::ConfigError;

/// Read the server's private host key
pub fn load_host_key(path: &Path) -> Result<KeyPair, ConfigError> {
    russh_keys::load_secret_key(path, None).map_err(|e| ConfigError::HostKey {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// SSH settings shared by every connection
pub fn ssh_config(host_key: KeyPair) -> Config {
    Config {
        methods: MethodSet::PASSWORD,
        auth_rejection_time: Duration::from_secs(3),
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        inactivity_timeout: Some(Duration::from_secs(3600)),
        keys: vec![host_key],
        ..Default::default()
    }
}

/// One SSH connection
pub struct SshSession {
    peer: SocketAddr,
    fs: AdapterFilesystem,
    credentials: Arc<Credentials>,
    user: Option<String>,
    channels: HashMap<ChannelId, Channel<Msg>>,
}

impl SshSession {
    pub fn new(peer: SocketAddr, fs: AdapterFilesystem, credentials: Arc<Credentials>) -> Self {
        Self {
            peer,
            fs,
            credentials,
            user: None,
            channels: HashMap::new(),
        }
    }
}

#[async_trait]
impl Handler for SshSession {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        match self.credentials.validate(user, password) {
            Ok(()) => {
                info!("[{}] User {user} logged in", self.peer);
                self.user = Some(user.to_string());
                Ok(Auth::Accept)
            }
            Err(e) => {
                warn!("[{}] Login rejected: {e}", self.peer);
                Ok(Auth::Reject {
                    proceed_with_methods: Some(MethodSet::PASSWORD),
                })
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        session.close(channel);
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let channel = match (name, self.channels.remove(&channel_id)) {
            ("sftp", Some(channel)) => channel,
            _ => {
                warn!("[{}] Unsupported subsystem {name}", self.peer);
                session.channel_failure(channel_id);
                return Ok(());
            }
        };

        let user = self.user.as_deref().unwrap_or("anonymous");
        let sftp = SftpSession::new(self.fs.clone(), user);
        session.channel_success(channel_id);
        russh_sftp::server::run(channel.into_stream(), sftp).await;
        Ok(())
    }
}

/// Accept SSH connections on `addr` until the listener fails.
pub struct SftpServer {
    listener: TcpListener,
    config: Arc<Config>,
    fs: AdapterFilesystem,
    credentials: Arc<Credentials>,
}

impl SftpServer {
    pub async fn bind(
        addr: &str,
        config: Arc<Config>,
        fs: AdapterFilesystem,
        credentials: Arc<Credentials>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config,
            fs,
            credentials,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn start(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Failed to accept SSH connection: {e}");
                    continue;
                }
            };
            info!("New SSH client connected: {peer}");

            let handler = SshSession::new(peer, self.fs.clone(), Arc::clone(&self.credentials));
            let config = Arc::clone(&self.config);
            tokio::spawn(async move {
                let result = match russh::server::run_stream(config, stream, handler).await {
                    Ok(running) => running.await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => info!("SSH client {peer} disconnected"),
                    Err(e) => warn!("SSH session with {peer} ended: {e}"),
                }
            });
        }
    }
}

/// Bind and serve every resolved address, each in its own task.
///
/// A failing address is logged and skipped without affecting the others.
pub fn start_all(
    addrs: Vec<String>,
    config: Arc<Config>,
    fs: AdapterFilesystem,
    credentials: Arc<Credentials>,
) -> Vec<JoinHandle<()>> {
    addrs
        .into_iter()
        .map(|addr| {
            let (config, fs, credentials) = (Arc::clone(&config), fs.clone(), Arc::clone(&credentials));
            tokio::spawn(async move {
                match SftpServer::bind(&addr, config, fs, credentials).await {
                    Ok(server) => {
                        info!("SFTP server started on {addr}");
                        server.start().await;
                    }
                    Err(e) => error!("SFTP server error on {addr}: {e}"),
                }
            })
        })
        .collect()
}
