//! Shared filesystem surface
//!
//! One `AdapterFilesystem` is built at startup and shared by every session of
//! every protocol engine. It keeps no per-session state; each call goes
//! straight to the remote client.

use std::sync::Arc;
use std::time::SystemTime;

use log::debug;

use super::handle::AdapterHandle;
use super::info::AdapterFileInfo;
use super::path;
use crate::error::FsError;
use crate::remote::{RemoteFs, WriteMode};

/// Open intent passed by engines that distinguish read and write opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenFlags {
    pub const READ: Self = Self {
        read: true,
        write: false,
        append: false,
        create: false,
        truncate: false,
    };

    pub const WRITE: Self = Self {
        read: false,
        write: true,
        append: false,
        create: true,
        truncate: true,
    };

    pub const APPEND: Self = Self {
        read: false,
        write: true,
        append: true,
        create: true,
        truncate: false,
    };

    pub fn has_write_intent(&self) -> bool {
        self.write || self.append || self.create || self.truncate
    }
}

#[derive(Debug, Clone)]
pub struct AdapterFilesystem {
    remote: Arc<dyn RemoteFs>,
}

impl AdapterFilesystem {
    pub fn new(remote: Arc<dyn RemoteFs>) -> Self {
        Self { remote }
    }

    /// Base path of the remote store
    pub fn root(&self) -> &str {
        self.remote.root()
    }

    pub fn join<S: AsRef<str>>(&self, parts: &[S]) -> String {
        path::join(parts)
    }

    /// Open for reading, or for writing over existing content in place.
    pub async fn open(&self, path: &str) -> Result<AdapterHandle, FsError> {
        self.open_with(path, WriteMode::InPlace).await
    }

    /// Open a handle whose first upload replaces whatever the path held.
    pub async fn create(&self, path: &str) -> Result<AdapterHandle, FsError> {
        self.open_with(path, WriteMode::Replace).await
    }

    async fn open_with(&self, path: &str, mode: WriteMode) -> Result<AdapterHandle, FsError> {
        let file = self.remote.open(path, mode).await?;
        Ok(AdapterHandle::new(Arc::clone(&self.remote), path, file))
    }

    /// Open with explicit intent. A write intent aimed at a directory fails
    /// with `InvalidTarget`; a missing target is fine since writing creates it.
    /// Only truncating opens and new files replace content; other writes land
    /// in place.
    pub async fn open_file(
        &self,
        path: &str,
        flags: OpenFlags,
        _perm: u32,
    ) -> Result<AdapterHandle, FsError> {
        if !flags.has_write_intent() {
            return self.open(path).await;
        }

        let mode = match self.remote.stat(path).await {
            Ok(info) if info.is_dir => return Err(FsError::InvalidTarget(path.to_string())),
            Ok(_) if flags.truncate => WriteMode::Replace,
            Ok(_) => WriteMode::InPlace,
            Err(e) if e.is_not_found() => {
                debug!("Opening new file {path} for writing");
                WriteMode::Replace
            }
            Err(e) => return Err(e.into()),
        };
        self.open_with(path, mode).await
    }

    pub async fn mkdir(&self, path: &str, perm: u32) -> Result<(), FsError> {
        Ok(self.remote.mkdir(path, perm).await?)
    }

    /// Same remote call as `mkdir`; the store creates missing parents.
    pub async fn mkdir_all(&self, path: &str, perm: u32) -> Result<(), FsError> {
        self.mkdir(path, perm).await
    }

    pub async fn remove(&self, path: &str) -> Result<(), FsError> {
        Ok(self.remote.remove(path).await?)
    }

    /// Same remote call as `remove`; the store deletes directories whole.
    pub async fn remove_all(&self, path: &str) -> Result<(), FsError> {
        self.remove(path).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        Ok(self.remote.rename(from, to).await?)
    }

    pub async fn stat(&self, path: &str) -> Result<AdapterFileInfo, FsError> {
        Ok(self.remote.stat(path).await?.into())
    }

    /// There are no symlinks, so this is `stat`.
    pub async fn lstat(&self, path: &str) -> Result<AdapterFileInfo, FsError> {
        self.stat(path).await
    }

    /// List a directory by path without keeping a handle around.
    pub async fn read_dir(&self, path: &str) -> Result<Vec<AdapterFileInfo>, FsError> {
        let mut handle = self.open(path).await?;
        let listed = handle.read_dir(0).await;
        handle.close().await?;
        listed
    }

    pub fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn chmod(&self, _path: &str, _mode: u32) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn chtimes(&self, _path: &str, _atime: SystemTime, _mtime: SystemTime) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn symlink(&self, _target: &str, _link: &str) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn readlink(&self, _path: &str) -> Result<String, FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn chroot(&self, _path: &str) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn temp_file(&self, _dir: &str, _prefix: &str) -> Result<AdapterHandle, FsError> {
        Err(FsError::NotImplemented)
    }
}
