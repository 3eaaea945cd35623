//! The filesystem node graph.
//!
//! Everything here is transport-independent: [`Vfs`] implements the VFS
//! operations as async methods returning `Result<_, i32>` with POSIX
//! error codes, and the closed [`Node`] enum names every node kind the
//! tree can contain. The kernel binding lives in [`crate::fuse`].

mod classes;
mod events;
mod node;
mod resolve;
mod threads;
mod vfs;

pub use node::{Attr, DirEntry, MemberAttr, Node, NodeType};
pub use resolve::{resolve_target, ResolveError};
pub use vfs::Vfs;

/// Operation outcome carrying a POSIX error code on failure.
pub type VfsResult<T> = std::result::Result<T, i32>;

pub(crate) fn jdwp_errno(err: jvmfs_jdwp::JdwpError, errno: i32, what: &str) -> i32 {
    tracing::warn!(target: "jvmfs.fs", error = %err, "{} failed", what);
    errno
}
