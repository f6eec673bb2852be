//! Open adapter handles
//!
//! Wraps one remote handle together with its cached metadata snapshot. The
//! snapshot is filled on the first stat and replaced only by an explicit
//! refresh or a sync, never by reads or writes.

use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use log::debug;

use super::info::AdapterFileInfo;
use crate::error::FsError;
use crate::remote::{RemoteFile, RemoteFs, RemoteInfo};

pub struct AdapterHandle {
    remote_fs: Arc<dyn RemoteFs>,
    path: String,
    file: Box<dyn RemoteFile>,
    cache: Option<RemoteInfo>,
    closed: bool,
}

impl fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("path", &self.path)
            .field("cached", &self.cache.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl AdapterHandle {
    pub(crate) fn new(remote_fs: Arc<dyn RemoteFs>, path: &str, file: Box<dyn RemoteFile>) -> Self {
        Self {
            remote_fs,
            path: path.to_string(),
            file,
            cache: None,
            closed: false,
        }
    }

    /// Path the handle was opened with
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Name reported by the remote handle
    pub fn name(&self) -> &str {
        self.file.name()
    }

    fn ensure_open(&self) -> Result<(), FsError> {
        if self.closed {
            return Err(FsError::Closed(self.path.clone()));
        }
        Ok(())
    }

    async fn cached(&mut self) -> Result<&RemoteInfo, FsError> {
        self.ensure_open()?;
        if self.cache.is_none() {
            let info = self.file.stat().await?;
            self.cache = Some(info);
        }
        self.cache
            .as_ref()
            .ok_or_else(|| FsError::Closed(self.path.clone()))
    }

    /// Cached metadata; only the first call reaches the remote store.
    pub async fn stat(&mut self) -> Result<AdapterFileInfo, FsError> {
        Ok(self.cached().await?.clone().into())
    }

    /// Replace the snapshot with a fresh one.
    pub async fn refresh_stat(&mut self) -> Result<AdapterFileInfo, FsError> {
        self.ensure_open()?;
        let info = self.file.stat().await?;
        self.cache = Some(info.clone());
        Ok(info.into())
    }

    /// One forced stat round trip; only its success matters.
    pub async fn sync(&mut self) -> Result<(), FsError> {
        self.refresh_stat().await.map(|_| ())
    }

    /// List up to `limit` entries; 0 lists everything.
    pub async fn read_dir(&mut self, limit: usize) -> Result<Vec<AdapterFileInfo>, FsError> {
        if !self.cached().await?.is_dir {
            return Err(FsError::InvalidTarget(self.path.clone()));
        }

        let mut entries = self.remote_fs.read_dir(&self.path).await?;
        if limit > 0 {
            entries.truncate(limit);
        }
        debug!("Listed {} entries of {}", entries.len(), self.path);
        Ok(entries.into_iter().map(AdapterFileInfo::from).collect())
    }

    pub async fn read_dir_names(&mut self, limit: usize) -> Result<Vec<String>, FsError> {
        let entries = self.read_dir(limit).await?;
        Ok(entries.iter().map(|entry| entry.name().to_string()).collect())
    }

    /// Read at the current position. Directory handles fail before any
    /// data is requested.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        if self.cached().await?.is_dir {
            return Err(FsError::IsADirectory(self.path.clone()));
        }
        Ok(self.file.read(buf).await?)
    }

    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        self.ensure_open()?;
        Ok(self.file.read_at(buf, offset).await?)
    }

    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        self.ensure_open()?;
        Ok(self.file.write(buf).await?)
    }

    pub async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        self.ensure_open()?;
        Ok(self.file.write_at(buf, offset).await?)
    }

    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        self.ensure_open()?;
        Ok(self.file.seek(pos).await?)
    }

    /// Release the remote handle. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), FsError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.file.close().await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn lock(&mut self) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn unlock(&mut self) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }

    pub fn truncate(&mut self, _size: u64) -> Result<(), FsError> {
        Err(FsError::NotImplemented)
    }
}
