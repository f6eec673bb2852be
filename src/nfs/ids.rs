//! File id table
//!
//! NFS clients address everything by a 64-bit file id, while the adapter only
//! knows paths. Ids are handed out the first time a path is seen and stay
//! stable for the life of the process. The root is always id 1.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::adapter::path;

pub const ROOT_ID: u64 = 1;
pub const ROOT_PATH: &str = "/";

#[derive(Debug)]
struct Tables {
    next_id: u64,
    by_id: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
}

#[derive(Debug)]
pub struct FileIdTable {
    tables: Mutex<Tables>,
}

impl Default for FileIdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIdTable {
    pub fn new() -> Self {
        let mut tables = Tables {
            next_id: ROOT_ID + 1,
            by_id: HashMap::new(),
            by_path: HashMap::new(),
        };
        tables.by_id.insert(ROOT_ID, ROOT_PATH.to_string());
        tables.by_path.insert(ROOT_PATH.to_string(), ROOT_ID);
        Self {
            tables: Mutex::new(tables),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Path of `parent` joined with `name`
    pub fn child_path(parent: &str, name: &str) -> String {
        path::join(&[parent, name])
    }

    /// Id of `path`, allocating one on first sight.
    pub fn id_for(&self, path: &str) -> u64 {
        let mut tables = self.lock();
        if let Some(&id) = tables.by_path.get(path) {
            return id;
        }
        let id = tables.next_id;
        tables.next_id += 1;
        tables.by_id.insert(id, path.to_string());
        tables.by_path.insert(path.to_string(), id);
        id
    }

    pub fn path_of(&self, id: u64) -> Option<String> {
        self.lock().by_id.get(&id).cloned()
    }

    /// Move `from` and everything below it to `to`, keeping their ids. Any id
    /// previously known at the destination is dropped.
    pub fn rename(&self, from: &str, to: &str) {
        let mut tables = self.lock();
        forget_locked(&mut tables, to);

        let prefix = format!("{}/", from.trim_end_matches('/'));
        let moved: Vec<(String, u64)> = tables
            .by_path
            .iter()
            .filter(|(known, _)| known.as_str() == from || known.starts_with(&prefix))
            .map(|(known, &id)| (known.clone(), id))
            .collect();

        for (old_path, id) in moved {
            let new_path = format!("{}{}", to, &old_path[from.len()..]);
            tables.by_path.remove(&old_path);
            tables.by_path.insert(new_path.clone(), id);
            tables.by_id.insert(id, new_path);
        }
    }

    /// Drop `path` and everything below it.
    pub fn forget(&self, path: &str) {
        let mut tables = self.lock();
        forget_locked(&mut tables, path);
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn forget_locked(tables: &mut Tables, path: &str) {
    if path == ROOT_PATH {
        return;
    }
    let prefix = format!("{}/", path.trim_end_matches('/'));
    let gone: Vec<(String, u64)> = tables
        .by_path
        .iter()
        .filter(|(known, _)| known.as_str() == path || known.starts_with(&prefix))
        .map(|(known, &id)| (known.clone(), id))
        .collect();
    for (known, id) in gone {
        tables.by_path.remove(&known);
        tables.by_id.remove(&id);
    }
}
