//! Filesystem adapter
//!
//! Presents the remote store as the handle-based filesystem the protocol
//! engines expect. Remote errors pass through untouched; the adapter adds only
//! its own invariants on top (directory writes and reads are rejected,
//! directories report size 0, unsupported operations fail with
//! `FsError::NotImplemented`).

pub mod filesystem;
pub mod handle;
pub mod info;
pub mod path;

pub use filesystem::{AdapterFilesystem, OpenFlags};
pub use handle::AdapterHandle;
pub use info::AdapterFileInfo;
