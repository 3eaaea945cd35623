//! `threads/` and `threads_by_name/`: per-thread views and suspend
//! control. Every listing and lookup queries the JVM afresh.

use jvmfs_jdwp::ThreadId;

use super::jdwp_errno;
use super::node::{DirEntry, Node, NodeType};
use super::vfs::Vfs;
use super::VfsResult;

/// The state a control-file write asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WrittenState {
    Running,
    Suspended,
}

/// Control vocabulary: `1` and `running` resume, `0` and `suspend`
/// suspend. Anything else is a bad value.
fn parse_control(data: &[u8]) -> VfsResult<WrittenState> {
    let text = String::from_utf8_lossy(data);
    match text.trim() {
        "running" | "1" => Ok(WrittenState::Running),
        "suspend" | "0" => Ok(WrittenState::Suspended),
        _ => Err(libc::EBADMSG),
    }
}

impl Vfs {
    pub(crate) async fn readdir_threads(&self) -> VfsResult<Vec<DirEntry>> {
        let tids = self
            .client
            .all_threads()
            .await
            .map_err(|err| jdwp_errno(err, libc::EADDRNOTAVAIL, "thread listing"))?;

        let mut entries: Vec<DirEntry> = tids
            .iter()
            .map(|tid| DirEntry::new(tid.to_string(), NodeType::Directory))
            .collect();
        entries.push(DirEntry::new("control", NodeType::File));
        Ok(entries)
    }

    pub(crate) async fn lookup_threads(&self, name: &str) -> VfsResult<Node> {
        if name == "control" {
            return Ok(Node::AllThreadsControl);
        }

        let tid: ThreadId = name.parse().map_err(|_| libc::ENOENT)?;
        let tids = self
            .client
            .all_threads()
            .await
            .map_err(|err| jdwp_errno(err, libc::EADDRNOTAVAIL, "thread listing"))?;
        if tids.contains(&tid) {
            Ok(Node::ThreadDir { tid })
        } else {
            Err(libc::ENOENT)
        }
    }

    pub(crate) fn lookup_thread_dir(tid: ThreadId, name: &str) -> VfsResult<Node> {
        match name {
            "name" => Ok(Node::ThreadNameFile { tid }),
            "threadStatus" => Ok(Node::ThreadStatusFile { tid }),
            "suspendStatus" => Ok(Node::ThreadSuspendFile { tid }),
            "control" => Ok(Node::ThreadControl { tid }),
            _ => Err(libc::ENOENT),
        }
    }

    pub(crate) async fn read_thread_name(&self, tid: ThreadId) -> VfsResult<Vec<u8>> {
        let name = self
            .client
            .thread_name(tid)
            .await
            .map_err(|err| jdwp_errno(err, libc::EBADF, "thread name query"))?;
        Ok(name.into_bytes())
    }

    pub(crate) async fn read_thread_status(&self, tid: ThreadId) -> VfsResult<Vec<u8>> {
        let (thread_status, _) = self
            .client
            .thread_status(tid)
            .await
            .map_err(|err| jdwp_errno(err, libc::EBADF, "thread status query"))?;
        Ok(thread_status.to_string().into_bytes())
    }

    pub(crate) async fn read_thread_suspend(&self, tid: ThreadId) -> VfsResult<Vec<u8>> {
        let (_, suspend_status) = self
            .client
            .thread_status(tid)
            .await
            .map_err(|err| jdwp_errno(err, libc::EBADF, "thread status query"))?;
        Ok(suspend_status.to_string().into_bytes())
    }

    pub(crate) async fn read_thread_control(&self, tid: ThreadId) -> VfsResult<Vec<u8>> {
        let (_, suspend_status) = self
            .client
            .thread_status(tid)
            .await
            .map_err(|err| jdwp_errno(err, libc::EACCES, "thread status query"))?;

        let contents = match suspend_status.0 {
            0 => "running",
            1 => "suspended",
            _ => "not implemented",
        };
        Ok(contents.as_bytes().to_vec())
    }

    pub(crate) async fn write_thread_control(
        &self,
        tid: ThreadId,
        data: &[u8],
    ) -> VfsResult<u32> {
        let desired = parse_control(data)?;
        let (_, suspend_status) = self
            .client
            .thread_status(tid)
            .await
            .map_err(|err| jdwp_errno(err, libc::EACCES, "thread status query"))?;

        // Writing the current state is a no-op.
        let action = match desired {
            WrittenState::Running if suspend_status.is_suspended() => {
                Some(self.client.resume_thread(tid).await)
            }
            WrittenState::Suspended if suspend_status.is_running() => {
                Some(self.client.suspend_thread(tid).await)
            }
            _ => None,
        };

        if let Some(Err(err)) = action {
            return Err(jdwp_errno(err, libc::EFAULT, "thread state change"));
        }
        Ok(data.len() as u32)
    }

    pub(crate) async fn write_all_threads_control(&self, data: &[u8]) -> VfsResult<u32> {
        let result = match parse_control(data)? {
            WrittenState::Running => self.client.resume_all().await,
            WrittenState::Suspended => self.client.suspend_all().await,
        };

        result.map_err(|err| jdwp_errno(err, libc::EFAULT, "VM-wide state change"))?;
        Ok(data.len() as u32)
    }

    pub(crate) async fn readdir_threads_by_name(&self) -> VfsResult<Vec<DirEntry>> {
        let tids = self
            .client
            .all_threads()
            .await
            .map_err(|err| jdwp_errno(err, libc::EADDRNOTAVAIL, "thread listing"))?;

        let mut entries = Vec::with_capacity(tids.len());
        for tid in tids {
            let name = self
                .client
                .thread_name(tid)
                .await
                .map_err(|err| jdwp_errno(err, libc::EBADF, "thread name query"))?;
            entries.push(DirEntry::new(name, NodeType::Symlink));
        }
        Ok(entries)
    }

    pub(crate) async fn lookup_thread_by_name(&self, name: &str) -> VfsResult<Node> {
        match self.find_thread_by_name(name).await? {
            Some(_) => Ok(Node::ThreadLink {
                name: name.to_string(),
            }),
            None => Err(libc::ENOENT),
        }
    }

    pub(crate) async fn readlink_thread(&self, name: &str) -> VfsResult<String> {
        match self.find_thread_by_name(name).await? {
            Some(tid) => Ok(self
                .mount_root
                .join("threads")
                .join(tid.to_string())
                .display()
                .to_string()),
            None => Err(libc::ENOENT),
        }
    }

    async fn find_thread_by_name(&self, name: &str) -> VfsResult<Option<ThreadId>> {
        let tids = self
            .client
            .all_threads()
            .await
            .map_err(|err| jdwp_errno(err, libc::EADDRNOTAVAIL, "thread listing"))?;

        for tid in tids {
            let thread_name = self
                .client
                .thread_name(tid)
                .await
                .map_err(|err| jdwp_errno(err, libc::EBADF, "thread name query"))?;
            if thread_name == name {
                return Ok(Some(tid));
            }
        }
        Ok(None)
    }
}
