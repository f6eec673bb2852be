//! In-memory remote store that counts round trips, for tests.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use super::{RemoteFile, RemoteFs, RemoteInfo, WriteMode, resolve_seek};
use crate::error::RemoteError;

#[derive(Debug, Clone)]
enum Node {
    Dir { reported_size: u64 },
    File(Vec<u8>),
}

/// Round trips observed by the store
#[derive(Debug, Default)]
pub struct Counters {
    pub open: AtomicUsize,
    pub stat: AtomicUsize,
    pub read: AtomicUsize,
    pub write: AtomicUsize,
    pub read_dir: AtomicUsize,
    pub mkdir: AtomicUsize,
    pub remove: AtomicUsize,
    pub rename: AtomicUsize,
    pub close: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    pub counters: Arc<Counters>,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parent_of(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn base_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn info_of(path: &str, node: &Node) -> RemoteInfo {
    let modified = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    match node {
        Node::Dir { reported_size } => RemoteInfo {
            name: base_name(path),
            size: *reported_size,
            mode: 0o755,
            modified,
            is_dir: true,
        },
        Node::File(data) => RemoteInfo {
            name: base_name(path),
            size: data.len() as u64,
            mode: 0o644,
            modified,
            is_dir: false,
        },
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.nodes
            .lock()
            .unwrap()
            .insert("/".into(), Node::Dir { reported_size: 4096 });
        fs
    }

    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.nodes
            .lock()
            .unwrap()
            .insert(normalize(path), Node::File(data.to_vec()));
        self
    }

    /// A directory whose metadata claims a nonzero size
    pub fn with_dir(self, path: &str, reported_size: u64) -> Self {
        self.nodes
            .lock()
            .unwrap()
            .insert(normalize(path), Node::Dir { reported_size });
        self
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        match self.nodes.lock().unwrap().get(&normalize(path)) {
            Some(Node::File(data)) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.nodes.lock().unwrap().contains_key(&normalize(path))
    }
}

#[async_trait]
impl RemoteFs for MemoryFs {
    async fn open(&self, path: &str, mode: WriteMode) -> Result<Box<dyn RemoteFile>, RemoteError> {
        bump(&self.counters.open);
        Ok(Box::new(MemoryFile {
            path: normalize(path),
            nodes: Arc::clone(&self.nodes),
            counters: Arc::clone(&self.counters),
            pos: 0,
            replace: mode == WriteMode::Replace,
        }))
    }

    async fn stat(&self, path: &str) -> Result<RemoteInfo, RemoteError> {
        bump(&self.counters.stat);
        let path = normalize(path);
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(&path)
            .map(|node| info_of(&path, node))
            .ok_or(RemoteError::NotFound(path))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteInfo>, RemoteError> {
        bump(&self.counters.read_dir);
        let path = normalize(path);
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&path) {
            Some(Node::Dir { .. }) => {}
            Some(Node::File(_)) => return Err(RemoteError::Status { status: 400, path }),
            None => return Err(RemoteError::NotFound(path)),
        }
        Ok(nodes
            .iter()
            .filter(|(child, _)| child.as_str() != "/" && parent_of(child) == path)
            .map(|(child, node)| info_of(child, node))
            .collect())
    }

    async fn mkdir(&self, path: &str, _perm: u32) -> Result<(), RemoteError> {
        bump(&self.counters.mkdir);
        self.nodes
            .lock()
            .unwrap()
            .insert(normalize(path), Node::Dir { reported_size: 4096 });
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), RemoteError> {
        bump(&self.counters.remove);
        let path = normalize(path);
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.remove(&path).is_none() {
            return Err(RemoteError::NotFound(path));
        }
        let prefix = format!("{path}/");
        nodes.retain(|child, _| !child.starts_with(&prefix));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        bump(&self.counters.rename);
        let (from, to) = (normalize(from), normalize(to));
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .remove(&from)
            .ok_or_else(|| RemoteError::NotFound(from.clone()))?;
        nodes.insert(to, node);
        Ok(())
    }

    fn root(&self) -> &str {
        "/"
    }
}

struct MemoryFile {
    path: String,
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
    counters: Arc<Counters>,
    pos: u64,
    /// The next write starts the file over
    replace: bool,
}

impl MemoryFile {
    fn read_from(&self, buf: &mut [u8], offset: u64) -> Result<usize, RemoteError> {
        bump(&self.counters.read);
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&self.path) {
            Some(Node::File(data)) => {
                let start = (offset as usize).min(data.len());
                let n = buf.len().min(data.len() - start);
                buf[..n].copy_from_slice(&data[start..start + n]);
                Ok(n)
            }
            Some(Node::Dir { .. }) => Ok(0),
            None => Err(RemoteError::NotFound(self.path.clone())),
        }
    }

    fn write_to(&mut self, buf: &[u8], offset: u64) -> Result<usize, RemoteError> {
        bump(&self.counters.write);
        let replace = std::mem::take(&mut self.replace);
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .entry(self.path.clone())
            .or_insert_with(|| Node::File(Vec::new()));
        match node {
            Node::File(data) => {
                if replace {
                    data.clear();
                }
                let end = offset as usize + buf.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[offset as usize..end].copy_from_slice(buf);
                Ok(buf.len())
            }
            Node::Dir { .. } => Err(RemoteError::Status {
                status: 405,
                path: self.path.clone(),
            }),
        }
    }
}

#[async_trait]
impl RemoteFile for MemoryFile {
    fn name(&self) -> &str {
        &self.path
    }

    async fn stat(&mut self) -> Result<RemoteInfo, RemoteError> {
        bump(&self.counters.stat);
        let nodes = self.nodes.lock().unwrap();
        nodes
            .get(&self.path)
            .map(|node| info_of(&self.path, node))
            .ok_or_else(|| RemoteError::NotFound(self.path.clone()))
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, RemoteError> {
        let n = self.read_from(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, RemoteError> {
        self.read_from(buf, offset)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, RemoteError> {
        let n = self.write_to(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }

    async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, RemoteError> {
        self.write_to(buf, offset)
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64, RemoteError> {
        let len = match self.nodes.lock().unwrap().get(&self.path) {
            Some(Node::File(data)) => data.len() as u64,
            _ => 0,
        };
        self.pos = resolve_seek(self.pos, len, pos)?;
        Ok(self.pos)
    }

    async fn close(&mut self) -> Result<(), RemoteError> {
        bump(&self.counters.close);
        Ok(())
    }
}
