//! FTP listeners and the per-connection control loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use super::commands::{Command, CommandStatus, format_reply, parse_command};
use super::handlers::handle_command;
use super::passive::PassivePorts;
use super::session::Session;
use super::tls::FtpStream;
use crate::adapter::AdapterFilesystem;
use crate::auth::Credentials;
use crate::net::PortRange;

pub const SERVER_NAME: &str = "DUFS FTP Server";
const MAX_COMMAND_LENGTH: usize = 4096;

/// Everything sessions of one listener share.
#[derive(Clone)]
pub struct ServerContext {
    pub fs: AdapterFilesystem,
    pub credentials: Credentials,
    pub passive: PassivePorts,
    /// Present when TLS is mandatory
    pub tls: Option<TlsAcceptor>,
    pub data_timeout: Duration,
}

impl ServerContext {
    pub fn new(
        fs: AdapterFilesystem,
        credentials: Credentials,
        port_range: PortRange,
        tls: Option<TlsAcceptor>,
        data_timeout: Duration,
    ) -> Self {
        Self {
            fs,
            credentials,
            passive: PassivePorts::new(port_range),
            tls,
            data_timeout,
        }
    }
}

/// One listener bound to a concrete address.
pub struct FtpServer {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl FtpServer {
    pub async fn bind(addr: &str, ctx: Arc<ServerContext>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, ctx })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept forever, one task per control connection.
    pub async fn start(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, peer, ctx).await {
                            warn!("Session with {peer} ended with error: {e}");
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }
    }
}

/// Bind and serve every resolved address, each in its own task.
///
/// A failing address is logged and skipped without affecting the others.
pub fn start_all(addrs: Vec<String>, ctx: Arc<ServerContext>) -> Vec<JoinHandle<()>> {
    addrs
        .into_iter()
        .map(|addr| {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                match FtpServer::bind(&addr, ctx).await {
                    Ok(server) => {
                        info!("FTP server started on {addr}");
                        server.start().await;
                    }
                    Err(e) => error!("FTP server error on {addr}: {e}"),
                }
            })
        })
        .collect()
}

/// One line read from the control connection
#[derive(Debug, PartialEq, Eq)]
enum ControlLine {
    Command(String),
    TooLong,
    Closed,
}

/// Read one command line, holding at most `MAX_COMMAND_LENGTH` bytes of it.
/// The remainder of an overlong line is consumed and dropped.
async fn read_command<R>(reader: &mut R) -> io::Result<ControlLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(MAX_COMMAND_LENGTH as u64 + 1)
        .read_until(b'\n', &mut line)
        .await?;
    if n == 0 {
        return Ok(ControlLine::Closed);
    }
    if n <= MAX_COMMAND_LENGTH {
        return Ok(ControlLine::Command(String::from_utf8_lossy(&line).into_owned()));
    }
    if line.last() != Some(&b'\n') {
        loop {
            let buf = reader.fill_buf().await?;
            if buf.is_empty() {
                break;
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    reader.consume(i + 1);
                    break;
                }
                None => {
                    let len = buf.len();
                    reader.consume(len);
                }
            }
        }
    }
    Ok(ControlLine::TooLong)
}

/// Run one control connection until QUIT or disconnect.
pub async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
) -> io::Result<()> {
    let local = stream.local_addr()?;
    let mut session = Session::new(peer, local);
    let mut reader = BufReader::new(FtpStream::Plain(stream));

    debug!("Client connected {peer}");
    reader
        .get_mut()
        .write_all(format_reply(220, SERVER_NAME).as_bytes())
        .await?;
    reader.get_mut().flush().await?;

    loop {
        let line = match read_command(&mut reader).await? {
            ControlLine::Command(line) => line,
            ControlLine::Closed => break,
            ControlLine::TooLong => {
                reader
                    .get_mut()
                    .write_all(format_reply(500, "Command too long").as_bytes())
                    .await?;
                reader.get_mut().flush().await?;
                continue;
            }
        };

        let command = parse_command(&line);
        match &command {
            Command::PASS(_) => debug!("Received from {peer}: PASS ****"),
            other => debug!("Received from {peer}: {other:?}"),
        }

        let result = handle_command(&mut session, command, &ctx, reader.get_mut()).await;
        if let Some(msg) = &result.message {
            reader.get_mut().write_all(msg.as_bytes()).await?;
            reader.get_mut().flush().await?;
        }

        match result.status {
            CommandStatus::CloseConnection => break,
            CommandStatus::UpgradeTls => {
                let Some(acceptor) = ctx.tls.as_ref() else {
                    break;
                };
                let stream = reader.into_inner().upgrade(acceptor).await?;
                session.set_tls(stream.is_tls());
                reader = BufReader::new(stream);
            }
            CommandStatus::Success | CommandStatus::Failure(_) => {}
        }
    }

    debug!("Client disconnected {peer}");
    Ok(())
}
