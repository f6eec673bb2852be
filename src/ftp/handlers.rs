//! Command handlers
//!
//! One function per FTP command. Each returns the final reply; transfer
//! commands also write their preliminary `150` reply to the control stream.

use std::io::{self, SeekFrom};
use std::net::IpAddr;

use chrono::Utc;
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::commands::{Command, CommandResult, CommandStatus, format_reply};
use super::listing::{format_list_line, format_mdtm, parse_mdtm};
use super::passive::{DataChannel, format_pasv, parse_port_arg};
use super::server::ServerContext;
use super::session::Session;
use super::tls::FtpStream;
use crate::adapter::{AdapterFileInfo, AdapterHandle, OpenFlags};
use crate::error::FsError;
use crate::error::handlers::{error_to_ftp_code, handle_error};

const TRANSFER_BUFFER_SIZE: usize = 64 * 1024;

/// Dispatch one parsed command.
pub async fn handle_command<W>(
    session: &mut Session,
    command: Command,
    ctx: &ServerContext,
    control: &mut W,
) -> CommandResult
where
    W: AsyncWrite + Unpin + Send,
{
    if !session.is_logged_in() && !command.allowed_before_login() {
        return CommandResult::failure(530, "Please login with USER and PASS");
    }

    match command {
        Command::USER(user) => handle_user(session, ctx, user),
        Command::PASS(pass) => handle_pass(session, ctx, &pass),
        Command::QUIT => CommandResult::with_status(CommandStatus::CloseConnection, 221, "Goodbye"),
        Command::SYST => CommandResult::success(215, "UNIX Type: L8"),
        Command::NOOP => CommandResult::success(200, "NOOP ok"),
        Command::FEAT => handle_feat(ctx),
        Command::OPTS(arg) => handle_opts(&arg),
        Command::TYPE(arg) => handle_type(&arg),
        Command::MODE(arg) if arg.trim().eq_ignore_ascii_case("S") => {
            CommandResult::success(200, "Mode set to S")
        }
        Command::MODE(_) => CommandResult::failure(504, "Only stream mode is supported"),
        Command::STRU(arg) if arg.trim().eq_ignore_ascii_case("F") => {
            CommandResult::success(200, "Structure set to F")
        }
        Command::STRU(_) => CommandResult::failure(504, "Only file structure is supported"),
        Command::PWD => CommandResult::success(
            257,
            &format!("\"{}\" is the current directory", session.cwd()),
        ),
        Command::CWD(arg) => handle_cwd(session, ctx, &arg).await,
        Command::CDUP => handle_cwd(session, ctx, "..").await,
        Command::LIST(arg) => handle_list(session, ctx, control, arg.as_deref(), false).await,
        Command::NLST(arg) => handle_list(session, ctx, control, arg.as_deref(), true).await,
        Command::RETR(arg) => handle_retr(session, ctx, control, &arg).await,
        Command::STOR(arg) => handle_stor(session, ctx, control, &arg).await,
        Command::DELE(arg) => {
            let path = session.resolve(&arg);
            match ctx.fs.remove(&path).await {
                Ok(()) => CommandResult::success(250, "File deleted"),
                Err(e) => fs_failure("DELE", &e),
            }
        }
        Command::MKD(arg) => {
            let path = session.resolve(&arg);
            match ctx.fs.mkdir(&path, 0o755).await {
                Ok(()) => CommandResult::success(257, &format!("\"{path}\" created")),
                Err(e) => fs_failure("MKD", &e),
            }
        }
        Command::RMD(arg) => {
            let path = session.resolve(&arg);
            match ctx.fs.remove_all(&path).await {
                Ok(()) => CommandResult::success(250, "Directory removed"),
                Err(e) => fs_failure("RMD", &e),
            }
        }
        Command::RNFR(arg) => {
            let path = session.resolve(&arg);
            match ctx.fs.stat(&path).await {
                Ok(_) => {
                    session.set_rename_from(Some(path));
                    CommandResult::success(350, "Ready for RNTO")
                }
                Err(e) => fs_failure("RNFR", &e),
            }
        }
        Command::RNTO(arg) => {
            let Some(from) = session.take_rename_from() else {
                return CommandResult::failure(503, "Bad sequence of commands, use RNFR first");
            };
            let to = session.resolve(&arg);
            match ctx.fs.rename(&from, &to).await {
                Ok(()) => CommandResult::success(250, "Rename successful"),
                Err(e) => fs_failure("RNTO", &e),
            }
        }
        Command::SIZE(arg) => match ctx.fs.stat(&session.resolve(&arg)).await {
            Ok(info) if info.is_dir() => CommandResult::failure(550, "Not a regular file"),
            Ok(info) => CommandResult::success(213, &info.size().to_string()),
            Err(e) => fs_failure("SIZE", &e),
        },
        Command::MDTM(arg) => match ctx.fs.stat(&session.resolve(&arg)).await {
            Ok(info) => CommandResult::success(213, &format_mdtm(info.modified())),
            Err(e) => fs_failure("MDTM", &e),
        },
        Command::MFMT(arg) => handle_mfmt(session, ctx, &arg),
        Command::SITE(arg) => handle_site(session, ctx, &arg),
        Command::REST(arg) => match arg.parse::<u64>() {
            Ok(offset) => {
                session.set_restart_offset(offset);
                CommandResult::success(350, &format!("Restarting at {offset}"))
            }
            Err(_) => CommandResult::failure(501, "Invalid restart offset"),
        },
        Command::PASV => handle_pasv(session, ctx).await,
        Command::EPSV => handle_epsv(session, ctx).await,
        Command::PORT(arg) => handle_port(session, &arg),
        Command::AUTH(arg) => handle_auth(session, ctx, &arg),
        Command::PBSZ(_) if session.is_tls() => CommandResult::success(200, "PBSZ=0"),
        Command::PBSZ(_) => CommandResult::failure(503, "Use AUTH TLS first"),
        Command::PROT(level) => handle_prot(session, &level),
        Command::UNKNOWN(cmd) => {
            debug!("Unknown command {cmd:?} from {}", session.peer());
            CommandResult::failure(500, "Unknown command")
        }
    }
}

/// Reply for an adapter error. "Not implemented" degrades to 502 quietly.
fn fs_failure(context: &str, err: &FsError) -> CommandResult {
    handle_error(context, err);
    let code = error_to_ftp_code(err);
    if err.is_not_implemented() {
        return CommandResult::failure(code, "Command not implemented");
    }
    CommandResult::failure(code, &err.to_string())
}

fn handle_user(session: &mut Session, ctx: &ServerContext, user: String) -> CommandResult {
    if ctx.tls.is_some() && !session.is_tls() {
        return CommandResult::failure(534, "TLS is required, use AUTH TLS");
    }
    session.set_username(Some(user));
    CommandResult::success(331, "Password required")
}

fn handle_pass(session: &mut Session, ctx: &ServerContext, pass: &str) -> CommandResult {
    let Some(user) = session.username().map(str::to_string) else {
        return CommandResult::failure(503, "Login with USER first");
    };
    match ctx.credentials.validate(&user, pass) {
        Ok(()) => {
            session.set_logged_in(true);
            info!("User {user} logged in from {}", session.peer());
            CommandResult::success(230, "Login successful")
        }
        Err(e) => {
            warn!("Login failed from {}: {e}", session.peer());
            session.set_username(None);
            CommandResult::failure(530, "Login incorrect")
        }
    }
}

fn handle_feat(ctx: &ServerContext) -> CommandResult {
    let mut features = vec!["UTF8", "SIZE", "MDTM", "MFMT", "REST STREAM", "PASV", "EPSV"];
    if ctx.tls.is_some() {
        features.extend(["AUTH TLS", "PBSZ", "PROT"]);
    }
    let mut reply = String::from("211-Features:\r\n");
    for feature in features {
        reply.push_str(&format!(" {feature}\r\n"));
    }
    reply.push_str("211 End\r\n");
    CommandResult::raw(reply)
}

fn handle_opts(arg: &str) -> CommandResult {
    let mut words = arg.split_whitespace();
    match (words.next().map(str::to_ascii_uppercase).as_deref(), words.next()) {
        (Some("UTF8"), None) => CommandResult::success(200, "Always in UTF8 mode"),
        (Some("UTF8"), Some(state)) if state.eq_ignore_ascii_case("ON") => {
            CommandResult::success(200, "Always in UTF8 mode")
        }
        _ => CommandResult::failure(501, "Option not understood"),
    }
}

fn handle_type(arg: &str) -> CommandResult {
    let upper = arg.trim().to_ascii_uppercase();
    match upper.as_str() {
        "A" | "A N" => CommandResult::success(200, "Type set to A"),
        "I" | "L 8" => CommandResult::success(200, "Type set to I"),
        _ => CommandResult::failure(504, "Type not supported"),
    }
}

async fn handle_cwd(session: &mut Session, ctx: &ServerContext, arg: &str) -> CommandResult {
    let path = session.resolve(arg);
    match ctx.fs.stat(&path).await {
        Ok(info) if info.is_dir() => {
            session.set_cwd(path);
            CommandResult::success(250, "Directory successfully changed")
        }
        Ok(_) => CommandResult::failure(550, "Not a directory"),
        Err(e) => fs_failure("CWD", &e),
    }
}

/// Open the prepared data connection after sending `preliminary`.
async fn open_data<W>(
    session: &mut Session,
    ctx: &ServerContext,
    control: &mut W,
    preliminary: &str,
) -> Result<FtpStream, CommandResult>
where
    W: AsyncWrite + Unpin + Send,
{
    if ctx.tls.is_some() && !session.protect_data() {
        return Err(CommandResult::failure(521, "Data connections must be protected, use PROT P"));
    }
    let channel = session.take_data_channel();
    if channel.is_none() {
        return Err(CommandResult::failure(425, "Use PORT or PASV first"));
    }

    let announced = match control.write_all(format_reply(150, preliminary).as_bytes()).await {
        Ok(()) => control.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = announced {
        warn!("Could not announce transfer to {}: {e}", session.peer());
        return Err(CommandResult::failure(426, "Connection closed; transfer aborted"));
    }

    let stream = match channel.connect(session.peer_ip(), ctx.data_timeout).await {
        Ok(stream) => FtpStream::Plain(stream),
        Err(e) => {
            warn!("Data connection for {} failed: {e}", session.peer());
            return Err(CommandResult::failure(425, "Can't open data connection"));
        }
    };

    match (&ctx.tls, session.protect_data()) {
        (Some(acceptor), true) => stream.upgrade(acceptor).await.map_err(|e| {
            warn!("TLS on data connection for {} failed: {e}", session.peer());
            CommandResult::failure(425, "Can't open data connection")
        }),
        _ => Ok(stream),
    }
}

async fn handle_list<W>(
    session: &mut Session,
    ctx: &ServerContext,
    control: &mut W,
    arg: Option<&str>,
    names_only: bool,
) -> CommandResult
where
    W: AsyncWrite + Unpin + Send,
{
    // `ls` style flags such as `-la` are accepted and ignored
    let target = match arg.map(str::trim) {
        Some(arg) if !arg.is_empty() && !arg.starts_with('-') => session.resolve(arg),
        _ => session.cwd().to_string(),
    };

    let entries = match list_entries(ctx, &target).await {
        Ok(entries) => entries,
        Err(e) => return fs_failure("LIST", &e),
    };

    let now = Utc::now();
    let body: String = entries
        .iter()
        .map(|entry| {
            if names_only {
                format!("{}\r\n", entry.name())
            } else {
                format!("{}\r\n", format_list_line(entry, now))
            }
        })
        .collect();

    let mut data = match open_data(session, ctx, control, "Here comes the directory listing").await {
        Ok(data) => data,
        Err(result) => return result,
    };
    let sent = data.write_all(body.as_bytes()).await;
    let _ = data.shutdown().await;

    match sent {
        Ok(()) => CommandResult::success(226, "Directory send OK"),
        Err(e) => {
            warn!("Listing transfer to {} failed: {e}", session.peer());
            CommandResult::failure(426, "Connection closed; transfer aborted")
        }
    }
}

/// A directory's entries, or the single entry of a file.
async fn list_entries(ctx: &ServerContext, path: &str) -> Result<Vec<AdapterFileInfo>, FsError> {
    let mut handle = ctx.fs.open(path).await?;
    let listed = match handle.stat().await {
        Ok(info) if info.is_dir() => handle.read_dir(0).await,
        Ok(info) => Ok(vec![info]),
        Err(e) => Err(e),
    };
    handle.close().await?;
    listed
}

enum TransferError {
    Fs(FsError),
    Data(io::Error),
}

impl TransferError {
    fn into_result(self, context: &str) -> CommandResult {
        match self {
            TransferError::Fs(e) => fs_failure(context, &e),
            TransferError::Data(e) => {
                warn!("{context} data connection failed: {e}");
                CommandResult::failure(426, "Connection closed; transfer aborted")
            }
        }
    }
}

async fn handle_retr<W>(
    session: &mut Session,
    ctx: &ServerContext,
    control: &mut W,
    arg: &str,
) -> CommandResult
where
    W: AsyncWrite + Unpin + Send,
{
    let path = session.resolve(arg);
    let offset = session.take_restart_offset();

    let mut handle = match ctx.fs.open_file(&path, OpenFlags::READ, 0).await {
        Ok(handle) => handle,
        Err(e) => return fs_failure("RETR", &e),
    };
    match handle.stat().await {
        Ok(info) if info.is_dir() => {
            let _ = handle.close().await;
            return CommandResult::failure(550, "Not a regular file");
        }
        Ok(_) => {}
        Err(e) => {
            let _ = handle.close().await;
            return fs_failure("RETR", &e);
        }
    }
    if offset > 0 {
        if let Err(e) = handle.seek(SeekFrom::Start(offset)).await {
            let _ = handle.close().await;
            return fs_failure("RETR", &e);
        }
    }

    let mut data = match open_data(session, ctx, control, "Opening data connection").await {
        Ok(data) => data,
        Err(result) => {
            let _ = handle.close().await;
            return result;
        }
    };

    let copied = send_file(&mut handle, &mut data).await;
    let _ = data.shutdown().await;
    let closed = handle.close().await;

    match (copied, closed) {
        (Ok(bytes), Ok(())) => {
            debug!("Sent {bytes} bytes of {path} to {}", session.peer());
            CommandResult::success(226, "Transfer complete")
        }
        (Err(e), _) => e.into_result("RETR"),
        (_, Err(e)) => fs_failure("RETR", &e),
    }
}

async fn send_file(handle: &mut AdapterHandle, data: &mut FtpStream) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = handle.read(&mut buf).await.map_err(TransferError::Fs)?;
        if n == 0 {
            return Ok(total);
        }
        data.write_all(&buf[..n]).await.map_err(TransferError::Data)?;
        total += n as u64;
    }
}

async fn handle_stor<W>(
    session: &mut Session,
    ctx: &ServerContext,
    control: &mut W,
    arg: &str,
) -> CommandResult
where
    W: AsyncWrite + Unpin + Send,
{
    let path = session.resolve(arg);
    let offset = session.take_restart_offset();

    // A restarted upload continues the existing file instead of replacing it
    let flags = if offset > 0 {
        OpenFlags {
            truncate: false,
            ..OpenFlags::WRITE
        }
    } else {
        OpenFlags::WRITE
    };
    let mut handle = match ctx.fs.open_file(&path, flags, 0o644).await {
        Ok(handle) => handle,
        Err(e) => return fs_failure("STOR", &e),
    };

    let mut data = match open_data(session, ctx, control, "Ok to send data").await {
        Ok(data) => data,
        Err(result) => {
            let _ = handle.close().await;
            return result;
        }
    };

    let received = receive_file(&mut handle, &mut data, offset).await;
    let _ = data.shutdown().await;

    // The handle is closed on every path
    let finished = match received {
        Ok(bytes) => match handle.sync().await {
            Ok(()) => Ok(bytes),
            Err(e) => Err(TransferError::Fs(e)),
        },
        Err(e) => Err(e),
    };
    let closed = handle.close().await;

    match (finished, closed) {
        (Ok(bytes), Ok(())) => {
            debug!("Stored {bytes} bytes to {path} from {}", session.peer());
            CommandResult::success(226, "Transfer complete")
        }
        (Err(e), _) => e.into_result("STOR"),
        (_, Err(e)) => fs_failure("STOR", &e),
    }
}

async fn receive_file(
    handle: &mut AdapterHandle,
    data: &mut FtpStream,
    offset: u64,
) -> Result<u64, TransferError> {
    let mut buf = vec![0u8; TRANSFER_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = data.read(&mut buf).await.map_err(TransferError::Data)?;
        if n == 0 {
            break;
        }
        handle
            .write_at(&buf[..n], offset.saturating_add(total))
            .await
            .map_err(TransferError::Fs)?;
        total += n as u64;
    }
    if total == 0 {
        // An empty upload still creates the file
        handle.write_at(&[], offset).await.map_err(TransferError::Fs)?;
    }
    Ok(total)
}

fn handle_mfmt(session: &Session, ctx: &ServerContext, arg: &str) -> CommandResult {
    let Some((time, target)) = arg.split_once(' ') else {
        return CommandResult::failure(501, "Usage: MFMT <time> <path>");
    };
    let Some(modified) = parse_mdtm(time) else {
        return CommandResult::failure(501, "Invalid time value");
    };
    let path = session.resolve(target);
    match ctx.fs.chtimes(&path, modified, modified) {
        Ok(()) => CommandResult::success(213, &format!("Modify={time}; {target}")),
        Err(e) => fs_failure("MFMT", &e),
    }
}

fn handle_site(session: &Session, ctx: &ServerContext, arg: &str) -> CommandResult {
    let mut parts = arg.splitn(3, ' ');
    let sub = parts.next().unwrap_or("").to_ascii_uppercase();
    match (sub.as_str(), parts.next(), parts.next()) {
        ("CHMOD", Some(mode), Some(target)) => {
            let Ok(mode) = u32::from_str_radix(mode, 8) else {
                return CommandResult::failure(501, "Invalid mode");
            };
            match ctx.fs.chmod(&session.resolve(target), mode) {
                Ok(()) => CommandResult::success(200, "SITE CHMOD command ok"),
                Err(e) => fs_failure("SITE CHMOD", &e),
            }
        }
        ("CHMOD", _, _) => CommandResult::failure(501, "Usage: SITE CHMOD <mode> <path>"),
        _ => CommandResult::failure(502, "SITE command not implemented"),
    }
}

async fn handle_pasv(session: &mut Session, ctx: &ServerContext) -> CommandResult {
    let ip = session.local().ip();
    if ip.is_ipv6() {
        return CommandResult::failure(522, "PASV is IPv4 only, use EPSV");
    }
    let listener = match ctx.passive.bind(ip).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Passive listener for {} failed: {e}", session.peer());
            return CommandResult::failure(425, "Can't open passive connection");
        }
    };
    let reply = listener.local_addr().ok().and_then(format_pasv);
    session.set_data_channel(DataChannel::Passive(listener));
    match reply {
        Some(address) => CommandResult::success(227, &format!("Entering Passive Mode ({address})")),
        None => CommandResult::failure(425, "Can't open passive connection"),
    }
}

async fn handle_epsv(session: &mut Session, ctx: &ServerContext) -> CommandResult {
    let listener = match ctx.passive.bind(session.local().ip()).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("Passive listener for {} failed: {e}", session.peer());
            return CommandResult::failure(425, "Can't open passive connection");
        }
    };
    let port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(_) => return CommandResult::failure(425, "Can't open passive connection"),
    };
    session.set_data_channel(DataChannel::Passive(listener));
    CommandResult::success(229, &format!("Entering Extended Passive Mode (|||{port}|)"))
}

fn handle_port(session: &mut Session, arg: &str) -> CommandResult {
    let peer_ip: IpAddr = session.peer_ip();
    if peer_ip.is_ipv6() {
        return CommandResult::failure(522, "PORT is IPv4 only, use EPSV");
    }
    match parse_port_arg(arg) {
        Some(addr) if addr.ip() == peer_ip => {
            session.set_data_channel(DataChannel::Active(addr));
            CommandResult::success(200, "PORT command successful")
        }
        Some(addr) => {
            warn!("Refused PORT to {addr} from {}", session.peer());
            CommandResult::failure(501, "PORT address does not match the client")
        }
        None => CommandResult::failure(501, "Invalid PORT argument"),
    }
}

fn handle_auth(session: &Session, ctx: &ServerContext, mechanism: &str) -> CommandResult {
    if ctx.tls.is_none() {
        return CommandResult::failure(502, "TLS is not configured");
    }
    if session.is_tls() {
        return CommandResult::failure(503, "TLS already active");
    }
    match mechanism {
        "TLS" | "TLS-C" | "SSL" => {
            CommandResult::with_status(CommandStatus::UpgradeTls, 234, "AUTH TLS successful")
        }
        _ => CommandResult::failure(504, "Unsupported security mechanism"),
    }
}

fn handle_prot(session: &mut Session, level: &str) -> CommandResult {
    if !session.is_tls() {
        return CommandResult::failure(503, "Use AUTH TLS first");
    }
    match level {
        "P" => {
            session.set_protect_data(true);
            CommandResult::success(200, "Protection level set to P")
        }
        "C" => {
            session.set_protect_data(false);
            CommandResult::success(200, "Protection level set to C")
        }
        _ => CommandResult::failure(504, "Protection level not supported"),
    }
}
