//! SFTP subsystem handler
//!
//! Answers `russh_sftp` requests from the adapter. One handler runs per
//! `sftp` subsystem and owns that session's handle table.

use std::collections::HashMap;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags as SftpOpenFlags, Status,
    StatusCode, Version,
};

use super::handles::{HandleTable, OpenEntry};
use crate::adapter::{AdapterFileInfo, AdapterFilesystem, OpenFlags, path};
use crate::error::{FsError, RemoteError};
use crate::ftp::listing::format_list_line;

const NEW_DIR_MODE: u32 = 0o755;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;

/// Translate an adapter error into an SFTP status code
pub fn fs_error_to_status(error: &FsError) -> StatusCode {
    match error {
        FsError::NotImplemented => StatusCode::OpUnsupported,
        FsError::Remote(RemoteError::NotFound(_)) => StatusCode::NoSuchFile,
        FsError::Remote(RemoteError::PermissionDenied(_)) => StatusCode::PermissionDenied,
        FsError::Closed(_) => StatusCode::BadMessage,
        _ => StatusCode::Failure,
    }
}

fn failed(op: &str, path: &str, error: FsError) -> StatusCode {
    if error.is_not_implemented() || error.is_not_found() {
        debug!("SFTP {op} {path}: {error}");
    } else {
        warn!("SFTP {op} {path} failed: {error}");
    }
    fs_error_to_status(&error)
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

fn to_attributes(info: &AdapterFileInfo) -> FileAttributes {
    let kind = if info.is_dir() { S_IFDIR } else { S_IFREG };
    let mtime = info
        .modified()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default();
    FileAttributes {
        size: Some(info.size()),
        permissions: Some(kind | (info.mode() & 0o7777)),
        atime: Some(mtime),
        mtime: Some(mtime),
        ..Default::default()
    }
}

fn to_file(info: &AdapterFileInfo) -> File {
    File {
        filename: info.name().to_string(),
        longname: format_list_line(info, Utc::now()),
        attrs: to_attributes(info),
    }
}

fn open_flags(pflags: SftpOpenFlags) -> OpenFlags {
    OpenFlags {
        read: pflags.contains(SftpOpenFlags::READ),
        write: pflags.contains(SftpOpenFlags::WRITE),
        append: pflags.contains(SftpOpenFlags::APPEND),
        create: pflags.contains(SftpOpenFlags::CREATE),
        truncate: pflags.contains(SftpOpenFlags::TRUNCATE),
    }
}

/// Absolute form of a client path
fn absolute(raw: &str) -> String {
    path::join(&["/", raw.trim_end_matches('/')])
}

pub struct SftpSession {
    fs: AdapterFilesystem,
    handles: HandleTable,
    user: String,
}

impl SftpSession {
    pub fn new(fs: AdapterFilesystem, user: &str) -> Self {
        Self {
            fs,
            handles: HandleTable::new(),
            user: user.to_string(),
        }
    }

    /// Route attribute changes to the adapter. An empty change set succeeds.
    fn apply_attrs(&self, path: &str, attrs: &FileAttributes) -> Result<(), FsError> {
        if let Some(mode) = attrs.permissions {
            self.fs.chmod(path, mode & 0o7777)?;
        }
        if let (Some(uid), Some(gid)) = (attrs.uid, attrs.gid) {
            self.fs.chown(path, uid, gid)?;
        }
        if let (Some(atime), Some(mtime)) = (attrs.atime, attrs.mtime) {
            let at = UNIX_EPOCH + std::time::Duration::from_secs(u64::from(atime));
            let mt = UNIX_EPOCH + std::time::Duration::from_secs(u64::from(mtime));
            self.fs.chtimes(path, at, mt)?;
        }
        if attrs.size.is_some() {
            return Err(FsError::NotImplemented);
        }
        Ok(())
    }

    fn handle_path(&mut self, handle: &str) -> Option<String> {
        match self.handles.get_mut(handle)? {
            OpenEntry::File(file) => Some(file.path().to_string()),
            OpenEntry::Dir { path, .. } => Some(path.clone()),
        }
    }
}

#[async_trait]
impl russh_sftp::server::Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        info!("SFTP session for {} started (client version {version})", self.user);
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: SftpOpenFlags,
        _attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let path = absolute(&filename);
        let flags = open_flags(pflags);
        debug!("SFTP OPEN {path} {flags:?}");

        let mut file = self
            .fs
            .open_file(&path, flags, 0o644)
            .await
            .map_err(|e| failed("OPEN", &path, e))?;

        // A create or truncate must leave a file behind even if nothing is written
        if flags.write && (flags.truncate || flags.create) && !flags.append {
            let exists = match file.stat().await {
                Ok(_) => true,
                Err(e) if e.is_not_found() => false,
                Err(e) => return Err(failed("OPEN", &path, e)),
            };
            if flags.truncate || !exists {
                file.write_at(&[], 0)
                    .await
                    .map_err(|e| failed("OPEN", &path, e))?;
            }
        }

        let handle = self.handles.insert(OpenEntry::File(file));
        Ok(Handle { id, handle })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(OpenEntry::File(mut file)) => {
                let path = file.path().to_string();
                file.sync().await.map_err(|e| failed("CLOSE", &path, e))?;
                file.close().await.map_err(|e| failed("CLOSE", &path, e))?;
                Ok(ok(id))
            }
            Some(OpenEntry::Dir { .. }) => Ok(ok(id)),
            None => Err(StatusCode::BadMessage),
        }
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let Some(OpenEntry::File(file)) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::BadMessage);
        };
        let mut data = vec![0u8; len as usize];
        let n = match file.read_at(&mut data, offset).await {
            Ok(n) => n,
            Err(e) => {
                let path = file.path().to_string();
                return Err(failed("READ", &path, e));
            }
        };
        if n == 0 && len > 0 {
            return Err(StatusCode::Eof);
        }
        data.truncate(n);
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let Some(OpenEntry::File(file)) = self.handles.get_mut(&handle) else {
            return Err(StatusCode::BadMessage);
        };
        match file.write_at(&data, offset).await {
            Ok(_) => Ok(ok(id)),
            Err(e) => {
                let path = file.path().to_string();
                Err(failed("WRITE", &path, e))
            }
        }
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let path = absolute(&path);
        let info = self
            .fs
            .lstat(&path)
            .await
            .map_err(|e| failed("LSTAT", &path, e))?;
        Ok(Attrs {
            id,
            attrs: to_attributes(&info),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let info = match self.handles.get_mut(&handle) {
            Some(OpenEntry::File(file)) => match file.stat().await {
                Ok(info) => info,
                Err(e) => {
                    let path = file.path().to_string();
                    return Err(failed("FSTAT", &path, e));
                }
            },
            Some(OpenEntry::Dir { path, .. }) => {
                let path = path.clone();
                self.fs
                    .stat(&path)
                    .await
                    .map_err(|e| failed("FSTAT", &path, e))?
            }
            None => return Err(StatusCode::BadMessage),
        };
        Ok(Attrs {
            id,
            attrs: to_attributes(&info),
        })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = absolute(&path);
        self.apply_attrs(&path, &attrs)
            .map_err(|e| failed("SETSTAT", &path, e))?;
        Ok(ok(id))
    }

    async fn fsetstat(
        &mut self,
        id: u32,
        handle: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = self.handle_path(&handle).ok_or(StatusCode::BadMessage)?;
        self.apply_attrs(&path, &attrs)
            .map_err(|e| failed("FSETSTAT", &path, e))?;
        Ok(ok(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let path = absolute(&path);
        let info = self
            .fs
            .stat(&path)
            .await
            .map_err(|e| failed("OPENDIR", &path, e))?;
        if !info.is_dir() {
            return Err(StatusCode::NoSuchFile);
        }
        let handle = self.handles.insert(OpenEntry::dir(&path));
        Ok(Handle { id, handle })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let path = match self.handles.get_mut(&handle) {
            Some(OpenEntry::Dir { listed: true, .. }) => return Err(StatusCode::Eof),
            Some(OpenEntry::Dir { path, listed }) => {
                *listed = true;
                path.clone()
            }
            Some(OpenEntry::File(_)) | None => return Err(StatusCode::BadMessage),
        };

        let listed = self
            .fs
            .read_dir(&path)
            .await
            .map_err(|e| failed("READDIR", &path, e))?;
        if listed.is_empty() {
            return Err(StatusCode::Eof);
        }
        Ok(Name {
            id,
            files: listed.iter().map(to_file).collect(),
        })
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        let path = absolute(&filename);
        self.fs
            .remove(&path)
            .await
            .map_err(|e| failed("REMOVE", &path, e))?;
        Ok(ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        let path = absolute(&path);
        self.fs
            .mkdir(&path, NEW_DIR_MODE)
            .await
            .map_err(|e| failed("MKDIR", &path, e))?;
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        let path = absolute(&path);
        self.fs
            .remove_all(&path)
            .await
            .map_err(|e| failed("RMDIR", &path, e))?;
        Ok(ok(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let resolved = absolute(&path);
        Ok(Name {
            id,
            files: vec![File {
                filename: resolved.clone(),
                longname: resolved,
                attrs: FileAttributes::default(),
            }],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let path = absolute(&path);
        let info = self
            .fs
            .stat(&path)
            .await
            .map_err(|e| failed("STAT", &path, e))?;
        Ok(Attrs {
            id,
            attrs: to_attributes(&info),
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        let (from, to) = (absolute(&oldpath), absolute(&newpath));
        self.fs
            .rename(&from, &to)
            .await
            .map_err(|e| failed("RENAME", &from, e))?;
        Ok(ok(id))
    }

    async fn readlink(&mut self, _id: u32, path: String) -> Result<Name, Self::Error> {
        let path = absolute(&path);
        match self.fs.readlink(&path) {
            Ok(_) => Err(StatusCode::OpUnsupported),
            Err(e) => Err(failed("READLINK", &path, e)),
        }
    }

    async fn symlink(
        &mut self,
        _id: u32,
        linkpath: String,
        targetpath: String,
    ) -> Result<Status, Self::Error> {
        let link = absolute(&linkpath);
        self.fs
            .symlink(&targetpath, &link)
            .map_err(|e| failed("SYMLINK", &link, e))?;
        Err(StatusCode::OpUnsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryFs;
    use pretty_assertions::assert_eq;
    use russh_sftp::server::Handler;
    use std::sync::Arc;

    fn session(memory: MemoryFs) -> (SftpSession, Arc<MemoryFs>) {
        let memory = Arc::new(memory);
        (
            SftpSession::new(AdapterFilesystem::new(memory.clone()), "alice"),
            memory,
        )
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let (mut sftp, memory) = session(MemoryFs::new());

        let write = SftpOpenFlags::WRITE | SftpOpenFlags::CREATE | SftpOpenFlags::TRUNCATE;
        let handle = sftp
            .open(1, "/up.txt".into(), write, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        sftp.write(2, handle.clone(), 0, b"hello ".to_vec()).await.unwrap();
        sftp.write(3, handle.clone(), 6, b"world".to_vec()).await.unwrap();
        sftp.close(4, handle).await.unwrap();
        assert_eq!(memory.contents("/up.txt").unwrap(), b"hello world");

        let handle = sftp
            .open(5, "up.txt".into(), SftpOpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = sftp.read(6, handle.clone(), 6, 100).await.unwrap();
        assert_eq!(data.data, b"world");
        assert!(matches!(
            sftp.read(7, handle.clone(), 11, 100).await,
            Err(StatusCode::Eof)
        ));
        sftp.close(8, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_without_truncate_overwrites_in_place() {
        let (mut sftp, memory) = session(MemoryFs::new().with_file("/a.txt", b"hello world"));
        let handle = sftp
            .open(1, "/a.txt".into(), SftpOpenFlags::WRITE, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        sftp.write(2, handle.clone(), 0, b"J".to_vec()).await.unwrap();
        sftp.close(3, handle).await.unwrap();
        assert_eq!(memory.contents("/a.txt").unwrap(), b"Jello world");
    }

    #[tokio::test]
    async fn test_empty_upload_creates_file() {
        let (mut sftp, memory) = session(MemoryFs::new());
        let write = SftpOpenFlags::WRITE | SftpOpenFlags::CREATE | SftpOpenFlags::TRUNCATE;
        let handle = sftp
            .open(1, "/empty".into(), write, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        sftp.close(2, handle).await.unwrap();
        assert_eq!(memory.contents("/empty").unwrap(), b"");
    }

    #[tokio::test]
    async fn test_open_directory_for_write_fails() {
        let (mut sftp, _) = session(MemoryFs::new().with_dir("/docs", 4096));
        let write = SftpOpenFlags::WRITE | SftpOpenFlags::CREATE;
        assert!(matches!(
            sftp.open(1, "/docs".into(), write, FileAttributes::default()).await,
            Err(StatusCode::Failure)
        ));
    }

    #[tokio::test]
    async fn test_readdir_then_eof() {
        let (mut sftp, _) = session(
            MemoryFs::new()
                .with_dir("/docs", 4096)
                .with_file("/docs/a.txt", b"abc")
                .with_dir("/docs/sub", 4096),
        );

        let handle = sftp.opendir(1, "/docs".into()).await.unwrap().handle;
        let name = sftp.readdir(2, handle.clone()).await.unwrap();
        let names: Vec<&str> = name.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "sub"]);
        assert_eq!(name.files[1].attrs.size, Some(0));
        assert!(name.files[1].longname.starts_with('d'));

        assert!(matches!(sftp.readdir(3, handle.clone()).await, Err(StatusCode::Eof)));
        sftp.close(4, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_stat_missing_file() {
        let (mut sftp, _) = session(MemoryFs::new());
        assert!(matches!(
            sftp.stat(1, "/missing".into()).await,
            Err(StatusCode::NoSuchFile)
        ));
    }

    #[tokio::test]
    async fn test_namespace_operations() {
        let (mut sftp, memory) = session(MemoryFs::new().with_file("/a.txt", b"x"));

        sftp.mkdir(1, "/dir".into(), FileAttributes::default()).await.unwrap();
        sftp.rename(2, "/a.txt".into(), "/dir/b.txt".into()).await.unwrap();
        assert!(memory.exists("/dir/b.txt"));

        sftp.remove(3, "/dir/b.txt".into()).await.unwrap();
        sftp.rmdir(4, "/dir".into()).await.unwrap();
        assert!(!memory.exists("/dir"));
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let (mut sftp, _) = session(MemoryFs::new().with_file("/a.txt", b"x"));
        let chmod = FileAttributes {
            permissions: Some(0o600),
            ..Default::default()
        };
        assert!(matches!(
            sftp.setstat(1, "/a.txt".into(), chmod).await,
            Err(StatusCode::OpUnsupported)
        ));
        assert!(matches!(
            sftp.readlink(2, "/a.txt".into()).await,
            Err(StatusCode::OpUnsupported)
        ));
        assert!(matches!(
            sftp.symlink(3, "/l".into(), "/a.txt".into()).await,
            Err(StatusCode::OpUnsupported)
        ));
        assert!(sftp
            .setstat(4, "/a.txt".into(), FileAttributes::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_realpath_normalizes() {
        let (mut sftp, _) = session(MemoryFs::new());
        let name = sftp.realpath(1, "docs/../a/./b/".into()).await.unwrap();
        assert_eq!(name.files[0].filename, "/a/b");
        let root = sftp.realpath(2, ".".into()).await.unwrap();
        assert_eq!(root.files[0].filename, "/");
    }
}
