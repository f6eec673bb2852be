use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use dubroker::adapter::path;
use dubroker::auth::Credentials;
use dubroker::error::RemoteError;
use dubroker::ftp::{FtpServer, ServerContext};
use dubroker::remote::{RemoteFile, RemoteFs, RemoteInfo, WriteMode};
use dubroker::{AdapterFilesystem, PortRange, describe_address};

const README: &[u8] = b"served from a read-only store\n";

/// A store holding `/README` and an empty `/pub` directory, rejecting writes.
#[derive(Debug)]
struct ReadOnlyFs;

fn info(path: &str) -> Result<RemoteInfo, RemoteError> {
    let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    match path.trim_end_matches('/') {
        "" => Ok(RemoteInfo {
            name: "/".into(),
            size: 4096,
            mode: 0o755,
            modified,
            is_dir: true,
        }),
        "/pub" => Ok(RemoteInfo {
            name: "pub".into(),
            size: 4096,
            mode: 0o755,
            modified,
            is_dir: true,
        }),
        "/README" => Ok(RemoteInfo {
            name: "README".into(),
            size: README.len() as u64,
            mode: 0o644,
            modified,
            is_dir: false,
        }),
        other => Err(RemoteError::NotFound(other.to_string())),
    }
}

#[async_trait]
impl RemoteFs for ReadOnlyFs {
    async fn open(&self, path: &str, _mode: WriteMode) -> Result<Box<dyn RemoteFile>, RemoteError> {
        Ok(Box::new(ReadOnlyFile {
            path: path.to_string(),
            pos: 0,
        }))
    }

    async fn stat(&self, path: &str) -> Result<RemoteInfo, RemoteError> {
        info(path)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteInfo>, RemoteError> {
        match path.trim_end_matches('/') {
            "" => Ok(vec![info("/README")?, info("/pub")?]),
            "/pub" => Ok(Vec::new()),
            other => Err(RemoteError::NotFound(other.to_string())),
        }
    }

    async fn mkdir(&self, path: &str, _perm: u32) -> Result<(), RemoteError> {
        Err(RemoteError::PermissionDenied(path.to_string()))
    }

    async fn remove(&self, path: &str) -> Result<(), RemoteError> {
        Err(RemoteError::PermissionDenied(path.to_string()))
    }

    async fn rename(&self, from: &str, _to: &str) -> Result<(), RemoteError> {
        Err(RemoteError::PermissionDenied(from.to_string()))
    }

    fn root(&self) -> &str {
        "/"
    }
}

struct ReadOnlyFile {
    path: String,
    pos: u64,
}

#[async_trait]
impl RemoteFile for ReadOnlyFile {
    fn name(&self) -> &str {
        &self.path
    }

    async fn stat(&mut self) -> Result<RemoteInfo, RemoteError> {
        info(&self.path)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RemoteError> {
        let n = self.read_at(buf, self.pos).await?;
        self.pos += n as u64;
        Ok(n)
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, RemoteError> {
        if self.path != "/README" {
            return Err(RemoteError::NotFound(self.path.clone()));
        }
        let start = (offset as usize).min(README.len());
        let n = buf.len().min(README.len() - start);
        buf[..n].copy_from_slice(&README[start..start + n]);
        Ok(n)
    }

    async fn write(&mut self, _buf: &[u8]) -> Result<usize, RemoteError> {
        Err(RemoteError::PermissionDenied(self.path.clone()))
    }

    async fn write_at(&mut self, _buf: &[u8], _offset: u64) -> Result<usize, RemoteError> {
        Err(RemoteError::PermissionDenied(self.path.clone()))
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, RemoteError> {
        self.pos = match pos {
            SeekFrom::Start(offset) => offset,
            _ => return Err(RemoteError::InvalidSeek),
        };
        Ok(self.pos)
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        Ok(())
    }
}

async fn start_server() -> SocketAddr {
    let ctx = ServerContext::new(
        AdapterFilesystem::new(Arc::new(ReadOnlyFs)),
        Credentials::default(),
        PortRange::parse("0-1").unwrap(),
        None,
        Duration::from_secs(5),
    );
    let addrs = describe_address("127.0.0.1:0").unwrap();
    let server = FtpServer::bind(&addrs[0], Arc::new(ctx)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.start());
    addr
}

async fn reply<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> String {
    let mut reply = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await.unwrap() == 0 {
            return reply;
        }
        reply.push_str(&line);
        if line.len() >= 4 && line.as_bytes()[3] == b' ' {
            return reply;
        }
    }
}

async fn command<R, W>(reader: &mut R, writer: &mut W, line: &str) -> String
where
    R: AsyncBufReadExt + Unpin,
    W: AsyncWriteExt + Unpin,
{
    writer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    reply(reader).await
}

fn epsv_port(reply: &str) -> u16 {
    reply
        .split("|||")
        .nth(1)
        .and_then(|rest| rest.split('|').next())
        .unwrap()
        .parse()
        .unwrap()
}

#[tokio::test]
async fn test_anonymous_download_over_ftp() {
    let addr = start_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);

    assert!(reply(&mut reader).await.starts_with("220 "));
    assert!(command(&mut reader, &mut writer, "USER anyone").await.starts_with("331"));
    assert!(command(&mut reader, &mut writer, "PASS whatever").await.starts_with("230"));
    assert!(command(&mut reader, &mut writer, "TYPE I").await.starts_with("200"));

    let size = command(&mut reader, &mut writer, "SIZE /README").await;
    assert_eq!(size.trim_end(), format!("213 {}", README.len()));

    let port = epsv_port(&command(&mut reader, &mut writer, "EPSV").await);
    let mut data = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    assert!(command(&mut reader, &mut writer, "RETR /README").await.starts_with("150"));
    let mut body = Vec::new();
    data.read_to_end(&mut body).await.unwrap();
    assert_eq!(body, README);
    assert!(reply(&mut reader).await.starts_with("226"));

    assert!(command(&mut reader, &mut writer, "QUIT").await.starts_with("221"));
}

#[tokio::test]
async fn test_read_only_store_refuses_changes() {
    let addr = start_server().await;
    let stream = TcpStream::connect(addr).await.unwrap();
    let (read, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read);

    reply(&mut reader).await;
    command(&mut reader, &mut writer, "USER anyone").await;
    command(&mut reader, &mut writer, "PASS whatever").await;

    assert!(command(&mut reader, &mut writer, "MKD /new").await.starts_with("550"));
    assert!(command(&mut reader, &mut writer, "DELE /README").await.starts_with("550"));
    assert!(command(&mut reader, &mut writer, "SITE CHMOD 600 /README").await.starts_with("502"));
    assert!(command(&mut reader, &mut writer, "CWD /pub").await.starts_with("250"));
    assert_eq!(
        command(&mut reader, &mut writer, "PWD").await.trim_end(),
        "257 \"/pub\" is the current directory"
    );
}

#[test]
fn test_port_range_public_surface() {
    let range: PortRange = "50000-50100".parse().unwrap();
    assert_eq!(range.start(), 50000);
    assert_eq!(range.end(), 50100);
    assert_eq!(range.len(), 101);
    assert_eq!(range.to_string(), "50000-50100");

    for bad in ["", "50000", "50100-50000", "0-70000", "a-b", "1-2-3"] {
        assert!(PortRange::parse(bad).is_err(), "{bad:?} should be rejected");
    }
}

#[test]
fn test_concrete_bind_address_passes_through() {
    assert_eq!(
        describe_address("192.0.2.10:2021").unwrap(),
        vec!["192.0.2.10:2021".to_string()]
    );
}

#[test]
fn test_path_join() {
    assert_eq!(path::join(&["/", "pub", "..", "README"]), "/README");
    assert_eq!(path::join(&["a", "b/"]), "a/b/");
    assert_eq!(path::join(&["..", "a"]), "a");
    assert_eq!(path::join(&["a", ".."]), "");
}
