use std::path::{Path, PathBuf};
use std::sync::Arc;

use jvmfs_jdwp::JdwpClient;

use crate::debug::EventManager;

use super::node::{Attr, DirEntry, MemberAttr, Node, NodeType};
use super::VfsResult;

/// The filesystem core: every VFS operation over every [`Node`] kind.
///
/// Directories that project JVM state (`threads/`, `classes/`, and their
/// by-name twins) consult the client on each call; directories under
/// `events/` consult the event registry. Nothing is cached between
/// operations, so a stale node is just a lookup miss.
pub struct Vfs {
    pub(crate) client: JdwpClient,
    pub(crate) events: Arc<EventManager>,
    pub(crate) mount_root: PathBuf,
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl Vfs {
    pub fn new(client: JdwpClient, host: impl Into<String>, port: u16, mount_root: PathBuf) -> Self {
        let events = Arc::new(EventManager::new(client.clone()));
        Self {
            client,
            events,
            mount_root,
            host: host.into(),
            port,
        }
    }

    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub async fn getattr(&self, node: &Node) -> VfsResult<Attr> {
        Ok(Attr::of(node))
    }

    pub async fn lookup(&self, dir: &Node, name: &str) -> VfsResult<Node> {
        match dir {
            Node::Root => match name {
                "host" => Ok(Node::HostFile),
                "port" => Ok(Node::PortFile),
                "threads" => Ok(Node::ThreadsDir),
                "threads_by_name" => Ok(Node::ThreadsByNameDir),
                "classes" => Ok(Node::ClassesDir),
                "classes_by_signature" => Ok(Node::ClassesBySignatureDir),
                "events" => Ok(Node::EventsDir),
                _ => Err(libc::ENOENT),
            },
            Node::ThreadsDir => self.lookup_threads(name).await,
            Node::ThreadDir { tid } => Self::lookup_thread_dir(*tid, name),
            Node::ThreadsByNameDir => self.lookup_thread_by_name(name).await,
            Node::ClassesDir => self.lookup_classes(name).await,
            Node::ClassDir { cid } => Self::lookup_class_dir(*cid, name),
            Node::MethodsDir { cid } => self.lookup_methods(*cid, name).await,
            Node::MethodDir { cid, mid } => match MemberAttr::from_file_name(name) {
                Some(attr) => Ok(Node::MethodAttrFile {
                    cid: *cid,
                    mid: *mid,
                    attr,
                }),
                None => Err(libc::ENOENT),
            },
            Node::FieldsDir { cid } => self.lookup_fields(*cid, name).await,
            Node::FieldDir { cid, fid } => match MemberAttr::from_file_name(name) {
                Some(attr) => Ok(Node::FieldAttrFile {
                    cid: *cid,
                    fid: *fid,
                    attr,
                }),
                None => Err(libc::ENOENT),
            },
            Node::ClassesBySignatureDir => self.lookup_class_by_signature(name).await,
            Node::EventsDir => self.lookup_events(name).await,
            Node::EventDir { event } => self.lookup_event_dir(event, name).await,
            Node::LocationDir { event } => self.lookup_location(event, name).await,
            Node::HooksDir { event } => self.lookup_hooks(event, name).await,
            _ => Err(libc::ENOTDIR),
        }
    }

    pub async fn readdir(&self, dir: &Node) -> VfsResult<Vec<DirEntry>> {
        match dir {
            Node::Root => Ok(vec![
                DirEntry::new("host", NodeType::File),
                DirEntry::new("port", NodeType::File),
                DirEntry::new("threads", NodeType::Directory),
                DirEntry::new("threads_by_name", NodeType::Directory),
                DirEntry::new("classes", NodeType::Directory),
                DirEntry::new("classes_by_signature", NodeType::Directory),
                DirEntry::new("events", NodeType::Directory),
            ]),
            Node::ThreadsDir => self.readdir_threads().await,
            Node::ThreadDir { .. } => Ok(vec![
                DirEntry::new("name", NodeType::File),
                DirEntry::new("threadStatus", NodeType::File),
                DirEntry::new("suspendStatus", NodeType::File),
                DirEntry::new("control", NodeType::File),
            ]),
            Node::ThreadsByNameDir => self.readdir_threads_by_name().await,
            Node::ClassesDir => self.readdir_classes().await,
            Node::ClassDir { .. } => Ok(vec![
                DirEntry::new("methodInfo", NodeType::File),
                DirEntry::new("fieldInfo", NodeType::File),
                DirEntry::new("methods", NodeType::Directory),
                DirEntry::new("fields", NodeType::Directory),
            ]),
            Node::MethodsDir { cid } => self.readdir_methods(*cid).await,
            Node::FieldsDir { cid } => self.readdir_fields(*cid).await,
            Node::MethodDir { .. } | Node::FieldDir { .. } => Ok(MemberAttr::ALL
                .into_iter()
                .map(|attr| DirEntry::new(attr.file_name(), NodeType::File))
                .collect()),
            Node::ClassesBySignatureDir => self.readdir_classes_by_signature().await,
            Node::EventsDir => self.readdir_events().await,
            Node::EventDir { event } => self.readdir_event_dir(event).await,
            Node::LocationDir { event } => self.readdir_location(event).await,
            Node::HooksDir { event } => self.readdir_hooks(event).await,
            _ => Err(libc::ENOTDIR),
        }
    }

    /// Open a file node. Control files refuse flag combinations the
    /// textual protocol cannot honor; every open is direct-I/O so the
    /// kernel never caches generated content.
    pub async fn open(&self, node: &Node, flags: i32) -> VfsResult<()> {
        if node.node_type() != NodeType::File {
            return Err(libc::EINVAL);
        }
        if node.is_control_file()
            && flags & (libc::O_APPEND | libc::O_CLOEXEC | libc::O_EXCL | libc::O_NOCTTY) != 0
        {
            return Err(libc::EBADR);
        }
        Ok(())
    }

    pub async fn read(&self, node: &Node, offset: u64) -> VfsResult<Vec<u8>> {
        let content = self.read_content(node).await?;
        if offset > content.len() as u64 {
            return Err(libc::EBADR);
        }
        Ok(content[offset as usize..].to_vec())
    }

    async fn read_content(&self, node: &Node) -> VfsResult<Vec<u8>> {
        match node {
            Node::HostFile => Ok(self.host.clone().into_bytes()),
            Node::PortFile => Ok(self.port.to_string().into_bytes()),
            Node::ThreadNameFile { tid } => self.read_thread_name(*tid).await,
            Node::ThreadStatusFile { tid } => self.read_thread_status(*tid).await,
            Node::ThreadSuspendFile { tid } => self.read_thread_suspend(*tid).await,
            Node::ThreadControl { tid } => self.read_thread_control(*tid).await,
            Node::AllThreadsControl => Ok(Vec::new()),
            Node::MethodInfoFile { cid } => self.method_info_content(*cid).await,
            Node::FieldInfoFile { cid } => self.field_info_content(*cid).await,
            Node::MethodAttrFile { cid, mid, attr } => {
                self.method_attr_content(*cid, *mid, *attr).await
            }
            Node::FieldAttrFile { cid, fid, attr } => {
                self.field_attr_content(*cid, *fid, *attr).await
            }
            Node::EventControl { event } => self.read_event_control(event).await,
            Node::EventKindFile { event } => self.read_event_kind(event).await,
            Node::EventPolicyFile { event } => self.read_event_policy(event).await,
            _ => match node.node_type() {
                NodeType::Directory => Err(libc::EISDIR),
                _ => Err(libc::EINVAL),
            },
        }
    }

    pub async fn write(&self, node: &Node, data: &[u8]) -> VfsResult<u32> {
        match node {
            Node::ThreadControl { tid } => self.write_thread_control(*tid, data).await,
            Node::AllThreadsControl => self.write_all_threads_control(data).await,
            Node::EventControl { event } => self.write_event_control(event, data).await,
            Node::EventKindFile { event } => self.write_event_kind(event, data).await,
            Node::EventPolicyFile { event } => self.write_event_policy(event, data).await,
            _ => match node.node_type() {
                NodeType::Directory => Err(libc::EISDIR),
                _ => Err(libc::EROFS),
            },
        }
    }

    /// Size-changing `setattr`. Truncation of control files is not a
    /// meaningful operation for command protocols; only the zero-size
    /// truncate issued by `O_TRUNC`-style writers is tolerated.
    pub async fn setattr_size(&self, node: &Node, size: u64) -> VfsResult<()> {
        if node.is_control_file() {
            if size != 0 {
                return Err(libc::EBADR);
            }
            Ok(())
        } else {
            Err(libc::EROFS)
        }
    }

    pub async fn mkdir(&self, dir: &Node, name: &str) -> VfsResult<Node> {
        match dir {
            Node::EventsDir => self.mkdir_events(name).await,
            node if node.node_type() == NodeType::Directory => Err(libc::EROFS),
            _ => Err(libc::ENOTDIR),
        }
    }

    pub async fn rmdir(&self, dir: &Node, name: &str) -> VfsResult<()> {
        match dir {
            Node::EventsDir => self.rmdir_events(name).await,
            node if node.node_type() == NodeType::Directory => Err(libc::EROFS),
            _ => Err(libc::ENOTDIR),
        }
    }

    pub async fn unlink(&self, dir: &Node, name: &str) -> VfsResult<()> {
        match dir {
            Node::LocationDir { event } => self.unlink_location(event, name).await,
            Node::HooksDir { event } => self.unlink_hooks(event, name).await,
            node if node.node_type() == NodeType::Directory => Err(libc::EROFS),
            _ => Err(libc::ENOTDIR),
        }
    }

    pub async fn symlink(&self, dir: &Node, name: &str, target: &str) -> VfsResult<Node> {
        match dir {
            Node::LocationDir { event } => self.symlink_location(event, name, target).await,
            Node::HooksDir { event } => self.symlink_hooks(event, name, target).await,
            node if node.node_type() == NodeType::Directory => Err(libc::EROFS),
            _ => Err(libc::ENOTDIR),
        }
    }

    pub async fn readlink(&self, node: &Node) -> VfsResult<String> {
        match node {
            Node::ThreadLink { name } => self.readlink_thread(name).await,
            Node::ClassLink { signature } => self.readlink_class(signature).await,
            Node::LocationLink { event, name } => self.readlink_location(event, name).await,
            Node::HookLink { event, name } => self.readlink_hook(event, name).await,
            _ => Err(libc::EINVAL),
        }
    }
}
