//! Read-only entry metadata handed to protocol engines.

use std::time::SystemTime;

use crate::remote::RemoteInfo;

/// Projection of remote metadata. Directories always report size 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFileInfo {
    info: RemoteInfo,
}

impl AdapterFileInfo {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn size(&self) -> u64 {
        if self.info.is_dir { 0 } else { self.info.size }
    }

    /// Permission bits as the remote store reports them
    pub fn mode(&self) -> u32 {
        self.info.mode
    }

    pub fn modified(&self) -> SystemTime {
        self.info.modified
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir
    }
}

impl From<RemoteInfo> for AdapterFileInfo {
    fn from(info: RemoteInfo) -> Self {
        Self { info }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(is_dir: bool, size: u64) -> RemoteInfo {
        RemoteInfo {
            name: "entry".into(),
            size,
            mode: 0o755,
            modified: SystemTime::UNIX_EPOCH,
            is_dir,
        }
    }

    #[test]
    fn test_directory_size_is_zero() {
        assert_eq!(AdapterFileInfo::from(remote(true, 4096)).size(), 0);
        assert_eq!(AdapterFileInfo::from(remote(false, 4096)).size(), 4096);
    }

    #[test]
    fn test_other_fields_pass_through() {
        let info = AdapterFileInfo::from(remote(true, 1));
        assert_eq!(info.name(), "entry");
        assert_eq!(info.mode(), 0o755);
        assert!(info.is_dir());
    }
}
