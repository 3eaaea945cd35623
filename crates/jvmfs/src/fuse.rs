//! Kernel binding: adapts the async [`Vfs`] to `fuser`'s callback
//! interface.
//!
//! The adapter owns a bidirectional node ↔ inode table (the root is
//! `FUSE_ROOT_ID`) and drives each callback to completion on the shared
//! tokio runtime. All real behavior lives in [`crate::fs`]; this layer
//! only translates identifiers, attributes, and error codes.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow, FUSE_ROOT_ID,
};
use tokio::runtime::Handle;

use crate::fs::{Attr, Node, NodeType, Vfs};

const TTL: Duration = Duration::from_secs(1);

struct InodeTable {
    next: u64,
    by_node: HashMap<Node, u64>,
    by_ino: HashMap<u64, Node>,
}

impl InodeTable {
    fn new() -> Self {
        let mut table = Self {
            next: FUSE_ROOT_ID + 1,
            by_node: HashMap::new(),
            by_ino: HashMap::new(),
        };
        table.by_node.insert(Node::Root, FUSE_ROOT_ID);
        table.by_ino.insert(FUSE_ROOT_ID, Node::Root);
        table
    }

    fn get_or_insert(&mut self, node: Node) -> u64 {
        if let Some(ino) = self.by_node.get(&node) {
            return *ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_node.insert(node.clone(), ino);
        self.by_ino.insert(ino, node);
        ino
    }

    fn node(&self, ino: u64) -> Option<Node> {
        self.by_ino.get(&ino).cloned()
    }
}

pub struct JvmFuse {
    vfs: Arc<Vfs>,
    runtime: Handle,
    inodes: InodeTable,
    uid: u32,
    gid: u32,
}

impl JvmFuse {
    pub fn new(vfs: Arc<Vfs>, runtime: Handle) -> Self {
        Self {
            vfs,
            runtime,
            inodes: InodeTable::new(),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    fn file_attr(&self, ino: u64, attr: Attr) -> FileAttr {
        let kind = match attr.node_type {
            NodeType::Directory => FileType::Directory,
            NodeType::File => FileType::RegularFile,
            NodeType::Symlink => FileType::Symlink,
        };
        FileAttr {
            ino,
            size: 0,
            blocks: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind,
            perm: attr.perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    fn entry_for(&mut self, node: Node, reply: ReplyEntry) {
        let attr = Attr::of(&node);
        let ino = self.inodes.get_or_insert(node);
        reply.entry(&TTL, &self.file_attr(ino, attr), 0);
    }
}

impl Filesystem for JvmFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(dir) = self.inodes.node(parent) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name.to_str() else {
            return reply.error(libc::ENOENT);
        };

        match self.runtime.block_on(self.vfs.lookup(&dir, name)) {
            Ok(node) => self.entry_for(node, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(node) = self.inodes.node(ino) else {
            return reply.error(libc::ENOENT);
        };
        match self.runtime.block_on(self.vfs.getattr(&node)) {
            Ok(attr) => reply.attr(&TTL, &self.file_attr(ino, attr)),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(node) = self.inodes.node(ino) else {
            return reply.error(libc::ENOENT);
        };

        if let Some(size) = size {
            if let Err(errno) = self.runtime.block_on(self.vfs.setattr_size(&node, size)) {
                return reply.error(errno);
            }
        }
        // Mode and timestamp changes are accepted but not stored; the tree
        // has no persistent attributes.
        reply.attr(&TTL, &self.file_attr(ino, Attr::of(&node)));
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let Some(node) = self.inodes.node(ino) else {
            return reply.error(libc::ENOENT);
        };
        match self.runtime.block_on(self.vfs.readlink(&node)) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(dir) = self.inodes.node(parent) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name.to_str() else {
            return reply.error(libc::EINVAL);
        };

        match self.runtime.block_on(self.vfs.mkdir(&dir, name)) {
            Ok(node) => self.entry_for(node, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(dir) = self.inodes.node(parent) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name.to_str() else {
            return reply.error(libc::ENOENT);
        };

        match self.runtime.block_on(self.vfs.unlink(&dir, name)) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(dir) = self.inodes.node(parent) else {
            return reply.error(libc::ENOENT);
        };
        let Some(name) = name.to_str() else {
            return reply.error(libc::ENOENT);
        };

        match self.runtime.block_on(self.vfs.rmdir(&dir, name)) {
            Ok(()) => reply.ok(),
            Err(errno) => reply.error(errno),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let Some(dir) = self.inodes.node(parent) else {
            return reply.error(libc::ENOENT);
        };
        let (Some(name), Some(target)) = (link_name.to_str(), target.to_str()) else {
            return reply.error(libc::EINVAL);
        };

        match self.runtime.block_on(self.vfs.symlink(&dir, name, target)) {
            Ok(node) => self.entry_for(node, reply),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(node) = self.inodes.node(ino) else {
            return reply.error(libc::ENOENT);
        };
        match self.runtime.block_on(self.vfs.open(&node, flags)) {
            Ok(()) => reply.opened(0, fuser::consts::FOPEN_DIRECT_IO),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(node) = self.inodes.node(ino) else {
            return reply.error(libc::ENOENT);
        };
        if offset < 0 {
            return reply.error(libc::EINVAL);
        }

        match self.runtime.block_on(self.vfs.read(&node, offset as u64)) {
            Ok(mut data) => {
                data.truncate(size as usize);
                reply.data(&data);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(node) = self.inodes.node(ino) else {
            return reply.error(libc::ENOENT);
        };

        match self.runtime.block_on(self.vfs.write(&node, data)) {
            Ok(written) => reply.written(written),
            Err(errno) => reply.error(errno),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(dir) = self.inodes.node(ino) else {
            return reply.error(libc::ENOENT);
        };

        let entries = match self.runtime.block_on(self.vfs.readdir(&dir)) {
            Ok(entries) => entries,
            Err(errno) => return reply.error(errno),
        };

        // Entry inodes here are advisory; the kernel resolves real inodes
        // through lookup. The parent's is reused so none read as zero.
        let mut listing: Vec<(FileType, String)> = vec![
            (FileType::Directory, ".".to_string()),
            (FileType::Directory, "..".to_string()),
        ];
        listing.extend(entries.into_iter().map(|entry| {
            let kind = match entry.node_type {
                NodeType::Directory => FileType::Directory,
                NodeType::File => FileType::RegularFile,
                NodeType::Symlink => FileType::Symlink,
            };
            (kind, entry.name)
        }));

        for (index, (kind, name)) in listing.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (index + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }
}
