//! Remote filesystem client
//!
//! The contract the adapter consumes from the HTTP-addressed store, plus the
//! Dufs implementation used by the binary.

pub mod dufs;
#[cfg(test)]
pub mod memory;
pub mod tls;

use std::fmt;
use std::io::SeekFrom;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::RemoteError;

pub use dufs::DufsClient;

/// Metadata of one remote entry as the store reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub modified: SystemTime,
    pub is_dir: bool,
}

/// What the first upload of a handle does to content already on the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Overwrite the written ranges and keep everything else.
    #[default]
    InPlace,
    /// Start the file over; used for truncating opens and new files.
    Replace,
}

/// The remote store. Must tolerate concurrent calls from many sessions.
#[async_trait]
pub trait RemoteFs: Send + Sync + fmt::Debug {
    async fn open(&self, path: &str, mode: WriteMode) -> Result<Box<dyn RemoteFile>, RemoteError>;
    async fn stat(&self, path: &str) -> Result<RemoteInfo, RemoteError>;
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteInfo>, RemoteError>;
    async fn mkdir(&self, path: &str, perm: u32) -> Result<(), RemoteError>;
    async fn remove(&self, path: &str) -> Result<(), RemoteError>;
    async fn rename(&self, from: &str, to: &str) -> Result<(), RemoteError>;
    fn root(&self) -> &str;
}

/// An open reference to one remote path. Used sequentially by its owner.
#[async_trait]
pub trait RemoteFile: Send + Sync {
    fn name(&self) -> &str;
    /// Always a fresh round trip.
    async fn stat(&mut self) -> Result<RemoteInfo, RemoteError>;
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RemoteError>;
    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, RemoteError>;
    async fn write(&mut self, buf: &[u8]) -> Result<usize, RemoteError>;
    async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, RemoteError>;
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, RemoteError>;
    async fn close(&mut self) -> Result<(), RemoteError>;
}

/// Apply a seek to `current` given the file length, rejecting negative results.
pub(crate) fn resolve_seek(current: u64, len: u64, pos: SeekFrom) -> Result<u64, RemoteError> {
    let target = match pos {
        SeekFrom::Start(offset) => return Ok(offset),
        SeekFrom::Current(delta) => i128::from(current) + i128::from(delta),
        SeekFrom::End(delta) => i128::from(len) + i128::from(delta),
    };
    u64::try_from(target).map_err(|_| RemoteError::InvalidSeek)
}
