//! NFSv3 filesystem over the adapter
//!
//! Maps the `nfsserve` virtual filesystem calls onto `AdapterFilesystem`.
//! File ids come from a `FileIdTable`; every call resolves its id to a path
//! first and answers `NFS3ERR_STALE` when the id is unknown.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use log::{debug, warn};
use nfsserve::nfs::{
    fattr3, fileid3, filename3, ftype3, nfspath3, nfsstat3, nfsstring, nfstime3, sattr3,
    set_atime, set_gid3, set_mode3, set_mtime, set_size3, set_uid3, specdata3,
};
use nfsserve::vfs::{self, NFSFileSystem, VFSCapabilities};

use super::ids::{FileIdTable, ROOT_ID};
use crate::adapter::{AdapterFileInfo, AdapterFilesystem, OpenFlags};
use crate::error::{FsError, RemoteError};

const NEW_FILE_MODE: u32 = 0o644;
const NEW_DIR_MODE: u32 = 0o755;

/// Open intent for NFS writes: data lands at the given offset, nothing is
/// truncated up front.
const WRITE_IN_PLACE: OpenFlags = OpenFlags {
    read: false,
    write: true,
    append: false,
    create: true,
    truncate: false,
};

/// Translate an adapter error into the closest NFSv3 status
pub fn fs_error_to_nfsstat(error: &FsError) -> nfsstat3 {
    match error {
        FsError::NotImplemented => nfsstat3::NFS3ERR_NOTSUPP,
        FsError::InvalidTarget(_) => nfsstat3::NFS3ERR_INVAL,
        FsError::IsADirectory(_) => nfsstat3::NFS3ERR_ISDIR,
        FsError::Closed(_) => nfsstat3::NFS3ERR_STALE,
        FsError::Remote(RemoteError::NotFound(_)) => nfsstat3::NFS3ERR_NOENT,
        FsError::Remote(RemoteError::PermissionDenied(_)) => nfsstat3::NFS3ERR_ACCES,
        FsError::Remote(RemoteError::InvalidPath(_)) => nfsstat3::NFS3ERR_INVAL,
        FsError::Remote(_) => nfsstat3::NFS3ERR_IO,
    }
}

fn status(op: &str, path: &str, error: FsError) -> nfsstat3 {
    if error.is_not_implemented() || error.is_not_found() {
        debug!("NFS {op} {path}: {error}");
    } else {
        warn!("NFS {op} {path} failed: {error}");
    }
    fs_error_to_nfsstat(&error)
}

fn to_nfstime(time: SystemTime) -> nfstime3 {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    nfstime3 {
        seconds: since_epoch.as_secs() as u32,
        nseconds: since_epoch.subsec_nanos(),
    }
}

fn to_fattr(id: fileid3, info: &AdapterFileInfo) -> fattr3 {
    let (ftype, nlink) = if info.is_dir() {
        (ftype3::NF3DIR, 2)
    } else {
        (ftype3::NF3REG, 1)
    };
    let mtime = to_nfstime(info.modified());
    fattr3 {
        ftype,
        mode: info.mode() & 0o7777,
        nlink,
        uid: 0,
        gid: 0,
        size: info.size(),
        used: info.size(),
        rdev: specdata3 {
            specdata1: 0,
            specdata2: 0,
        },
        fsid: 0,
        fileid: id,
        atime: mtime,
        mtime,
        ctime: mtime,
    }
}

fn file_name(name: &filename3) -> Result<&str, nfsstat3> {
    let name = std::str::from_utf8(name).map_err(|_| nfsstat3::NFS3ERR_INVAL)?;
    if name.is_empty() || name.contains('/') {
        return Err(nfsstat3::NFS3ERR_INVAL);
    }
    Ok(name)
}

fn changes_nothing(attr: &sattr3) -> bool {
    matches!(attr.mode, set_mode3::Void)
        && matches!(attr.uid, set_uid3::Void)
        && matches!(attr.gid, set_gid3::Void)
        && matches!(attr.size, set_size3::Void)
        && matches!(attr.atime, set_atime::DONT_CHANGE)
        && matches!(attr.mtime, set_mtime::DONT_CHANGE)
}

pub struct NfsFilesystem {
    fs: AdapterFilesystem,
    ids: FileIdTable,
}

impl NfsFilesystem {
    pub fn new(fs: AdapterFilesystem) -> Self {
        Self {
            fs,
            ids: FileIdTable::new(),
        }
    }

    fn path_of(&self, id: fileid3) -> Result<String, nfsstat3> {
        self.ids.path_of(id).ok_or(nfsstat3::NFS3ERR_STALE)
    }

    fn child_of(&self, dirid: fileid3, name: &filename3) -> Result<String, nfsstat3> {
        let parent = self.path_of(dirid)?;
        Ok(FileIdTable::child_path(&parent, file_name(name)?))
    }

    async fn attr_of(&self, id: fileid3, path: &str) -> Result<fattr3, nfsstat3> {
        let info = self
            .fs
            .stat(path)
            .await
            .map_err(|e| status("GETATTR", path, e))?;
        Ok(to_fattr(id, &info))
    }

    /// Create an empty file at `path` and return its id and attributes.
    async fn create_empty(&self, path: &str) -> Result<(fileid3, fattr3), nfsstat3> {
        let mut handle = self
            .fs
            .open_file(path, OpenFlags::WRITE, NEW_FILE_MODE)
            .await
            .map_err(|e| status("CREATE", path, e))?;
        let written = handle.write_at(&[], 0).await;
        let closed = handle.close().await;
        written.map_err(|e| status("CREATE", path, e))?;
        closed.map_err(|e| status("CREATE", path, e))?;

        let id = self.ids.id_for(path);
        Ok((id, self.attr_of(id, path).await?))
    }
}

#[async_trait]
impl NFSFileSystem for NfsFilesystem {
    fn root_dir(&self) -> fileid3 {
        ROOT_ID
    }

    fn capabilities(&self) -> VFSCapabilities {
        VFSCapabilities::ReadWrite
    }

    async fn lookup(&self, dirid: fileid3, filename: &filename3) -> Result<fileid3, nfsstat3> {
        let path = self.child_of(dirid, filename)?;
        debug!("NFS LOOKUP {path}");
        self.fs
            .stat(&path)
            .await
            .map_err(|e| status("LOOKUP", &path, e))?;
        Ok(self.ids.id_for(&path))
    }

    async fn getattr(&self, id: fileid3) -> Result<fattr3, nfsstat3> {
        let path = self.path_of(id)?;
        self.attr_of(id, &path).await
    }

    async fn setattr(&self, id: fileid3, setattr: sattr3) -> Result<fattr3, nfsstat3> {
        let path = self.path_of(id)?;
        if !changes_nothing(&setattr) {
            debug!("NFS SETATTR {path}: attribute changes are not supported");
            return Err(nfsstat3::NFS3ERR_NOTSUPP);
        }
        self.attr_of(id, &path).await
    }

    async fn read(&self, id: fileid3, offset: u64, count: u32) -> Result<(Vec<u8>, bool), nfsstat3> {
        let path = self.path_of(id)?;
        debug!("NFS READ {path} offset={offset} count={count}");

        let mut handle = self.fs.open(&path).await.map_err(|e| status("READ", &path, e))?;
        let mut buf = vec![0u8; count as usize];
        let read = handle.read_at(&mut buf, offset).await;
        let closed = handle.close().await;
        let n = read.map_err(|e| status("READ", &path, e))?;
        closed.map_err(|e| status("READ", &path, e))?;

        buf.truncate(n);
        Ok((buf, n < count as usize))
    }

    async fn write(&self, id: fileid3, offset: u64, data: &[u8]) -> Result<fattr3, nfsstat3> {
        let path = self.path_of(id)?;
        debug!("NFS WRITE {path} offset={offset} len={}", data.len());

        let mut handle = self
            .fs
            .open_file(&path, WRITE_IN_PLACE, NEW_FILE_MODE)
            .await
            .map_err(|e| match e {
                FsError::InvalidTarget(_) => nfsstat3::NFS3ERR_ISDIR,
                e => status("WRITE", &path, e),
            })?;
        let written = handle.write_at(data, offset).await;
        let closed = handle.close().await;
        written.map_err(|e| status("WRITE", &path, e))?;
        closed.map_err(|e| status("WRITE", &path, e))?;

        self.attr_of(id, &path).await
    }

    async fn create(
        &self,
        dirid: fileid3,
        filename: &filename3,
        _attr: sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        let path = self.child_of(dirid, filename)?;
        debug!("NFS CREATE {path}");
        self.create_empty(&path).await
    }

    async fn create_exclusive(&self, dirid: fileid3, filename: &filename3) -> Result<fileid3, nfsstat3> {
        let path = self.child_of(dirid, filename)?;
        debug!("NFS CREATE EXCLUSIVE {path}");
        match self.fs.stat(&path).await {
            Ok(_) => return Err(nfsstat3::NFS3ERR_EXIST),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(status("CREATE", &path, e)),
        }
        let (id, _) = self.create_empty(&path).await?;
        Ok(id)
    }

    async fn mkdir(&self, dirid: fileid3, dirname: &filename3) -> Result<(fileid3, fattr3), nfsstat3> {
        let path = self.child_of(dirid, dirname)?;
        debug!("NFS MKDIR {path}");
        self.fs
            .mkdir(&path, NEW_DIR_MODE)
            .await
            .map_err(|e| status("MKDIR", &path, e))?;
        let id = self.ids.id_for(&path);
        Ok((id, self.attr_of(id, &path).await?))
    }

    async fn remove(&self, dirid: fileid3, filename: &filename3) -> Result<(), nfsstat3> {
        let path = self.child_of(dirid, filename)?;
        debug!("NFS REMOVE {path}");
        self.fs
            .remove(&path)
            .await
            .map_err(|e| status("REMOVE", &path, e))?;
        self.ids.forget(&path);
        Ok(())
    }

    async fn rename(
        &self,
        from_dirid: fileid3,
        from_filename: &filename3,
        to_dirid: fileid3,
        to_filename: &filename3,
    ) -> Result<(), nfsstat3> {
        let from = self.child_of(from_dirid, from_filename)?;
        let to = self.child_of(to_dirid, to_filename)?;
        debug!("NFS RENAME {from} -> {to}");
        self.fs
            .rename(&from, &to)
            .await
            .map_err(|e| status("RENAME", &from, e))?;
        self.ids.rename(&from, &to);
        Ok(())
    }

    async fn readdir(
        &self,
        dirid: fileid3,
        start_after: fileid3,
        max_entries: usize,
    ) -> Result<vfs::ReadDirResult, nfsstat3> {
        let dir = self.path_of(dirid)?;
        debug!("NFS READDIR {dir} start_after={start_after} max={max_entries}");

        let listed = self.fs.read_dir(&dir).await.map_err(|e| match e {
            FsError::InvalidTarget(_) => nfsstat3::NFS3ERR_NOTDIR,
            e => status("READDIR", &dir, e),
        })?;

        let mut entries: Vec<(fileid3, AdapterFileInfo)> = listed
            .into_iter()
            .map(|info| (self.ids.id_for(&FileIdTable::child_path(&dir, info.name())), info))
            .collect();

        if start_after != 0 {
            let resume = entries
                .iter()
                .position(|(id, _)| *id == start_after)
                .ok_or(nfsstat3::NFS3ERR_BAD_COOKIE)?;
            entries.drain(..=resume);
        }

        let end = entries.len() <= max_entries;
        let entries = entries
            .into_iter()
            .take(max_entries)
            .map(|(fileid, info)| vfs::DirEntry {
                fileid,
                name: nfsstring::from(info.name().as_bytes()),
                attr: to_fattr(fileid, &info),
            })
            .collect();

        Ok(vfs::ReadDirResult { entries, end })
    }

    async fn symlink(
        &self,
        _dirid: fileid3,
        _linkname: &filename3,
        _symlink: &nfspath3,
        _attr: &sattr3,
    ) -> Result<(fileid3, fattr3), nfsstat3> {
        Err(fs_error_to_nfsstat(&FsError::NotImplemented))
    }

    async fn readlink(&self, id: fileid3) -> Result<nfspath3, nfsstat3> {
        let path = self.path_of(id)?;
        match self.fs.readlink(&path) {
            Ok(target) => Ok(nfsstring::from(target.as_bytes())),
            Err(e) => Err(status("READLINK", &path, e)),
        }
    }
}
