//! Per-session SFTP handle table
//!
//! SFTP clients refer to open files and directories by opaque handle
//! strings. Each session owns one table; handles are never shared.

use std::collections::HashMap;

use crate::adapter::AdapterHandle;

/// What an SFTP handle refers to
#[derive(Debug)]
pub enum OpenEntry {
    File(AdapterHandle),
    /// A directory opened for listing. `listed` flips once its entries have
    /// been sent, after which the client is told it reached the end.
    Dir { path: String, listed: bool },
}

impl OpenEntry {
    pub fn dir(path: &str) -> Self {
        OpenEntry::Dir {
            path: path.to_string(),
            listed: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct HandleTable {
    next: u64,
    entries: HashMap<String, OpenEntry>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` and return the handle string for it.
    pub fn insert(&mut self, entry: OpenEntry) -> String {
        self.next += 1;
        let handle = self.next.to_string();
        self.entries.insert(handle.clone(), entry);
        handle
    }

    pub fn get_mut(&mut self, handle: &str) -> Option<&mut OpenEntry> {
        self.entries.get_mut(handle)
    }

    pub fn remove(&mut self, handle: &str) -> Option<OpenEntry> {
        self.entries.remove(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
