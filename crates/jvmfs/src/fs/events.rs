//! `events/`: the mutable half of the tree.
//!
//! `mkdir` declares an event, the `control`/`kind`/`suspendPolicy` files
//! configure and drive it, and the `location/` and `hooks/` directories
//! accept symlinks that become modifiers and hook descriptors. Every
//! operation resolves the event by name through the registry, so a node
//! for a deleted event degrades into ENOENT.

use std::str::FromStr;
use std::sync::Arc;

use jvmfs_jdwp::{EventKind, SuspendPolicy};

use crate::debug::{DebugEvent, ModifierEntry};

use super::node::{DirEntry, Node, NodeType};
use super::resolve::resolve_target;
use super::vfs::Vfs;
use super::VfsResult;

impl Vfs {
    async fn event(&self, name: &str) -> VfsResult<Arc<DebugEvent>> {
        self.events.get(name).await.map_err(|err| err.errno())
    }

    pub(crate) async fn readdir_events(&self) -> VfsResult<Vec<DirEntry>> {
        let events = self.events.list().await;
        Ok(events
            .iter()
            .map(|event| DirEntry::new(event.name(), NodeType::Directory))
            .collect())
    }

    pub(crate) async fn lookup_events(&self, name: &str) -> VfsResult<Node> {
        let event = self.event(name).await?;
        Ok(Node::EventDir {
            event: event.name().to_string(),
        })
    }

    pub(crate) async fn mkdir_events(&self, name: &str) -> VfsResult<Node> {
        let event = self
            .events
            .create(name)
            .await
            .map_err(|err| err.errno())?;
        tracing::info!(target: "jvmfs.fs", event = %event.name(), "event created");
        Ok(Node::EventDir {
            event: event.name().to_string(),
        })
    }

    pub(crate) async fn rmdir_events(&self, name: &str) -> VfsResult<()> {
        self.events.remove(name).await.map_err(|err| err.errno())?;
        tracing::info!(target: "jvmfs.fs", event = %name, "event removed");
        Ok(())
    }

    pub(crate) async fn readdir_event_dir(&self, name: &str) -> VfsResult<Vec<DirEntry>> {
        let _ = self.event(name).await?;
        Ok(vec![
            DirEntry::new("control", NodeType::File),
            DirEntry::new("kind", NodeType::File),
            DirEntry::new("suspendPolicy", NodeType::File),
            DirEntry::new("location", NodeType::Directory),
            DirEntry::new("hooks", NodeType::Directory),
        ])
    }

    pub(crate) async fn lookup_event_dir(&self, event: &str, name: &str) -> VfsResult<Node> {
        let _ = self.event(event).await?;
        let event = event.to_string();
        match name {
            "control" => Ok(Node::EventControl { event }),
            "kind" => Ok(Node::EventKindFile { event }),
            "suspendPolicy" => Ok(Node::EventPolicyFile { event }),
            "location" => Ok(Node::LocationDir { event }),
            "hooks" => Ok(Node::HooksDir { event }),
            _ => Err(libc::ENOENT),
        }
    }

    pub(crate) async fn read_event_control(&self, name: &str) -> VfsResult<Vec<u8>> {
        let event = self.event(name).await?;
        let contents = if event.is_active().await {
            "running"
        } else {
            "idle"
        };
        Ok(contents.as_bytes().to_vec())
    }

    pub(crate) async fn write_event_control(&self, name: &str, data: &[u8]) -> VfsResult<u32> {
        let text = String::from_utf8_lossy(data);
        match text.trim() {
            "run" | "1" => {
                self.events.run(name).await.map_err(|err| {
                    tracing::warn!(target: "jvmfs.fs", event = %name, error = %err, "event activation failed");
                    err.errno()
                })?;
            }
            "cancel" | "0" => {
                self.events.cancel(name).await.map_err(|err| {
                    tracing::warn!(target: "jvmfs.fs", event = %name, error = %err, "event cancellation failed");
                    err.errno()
                })?;
            }
            _ => return Err(libc::EBADMSG),
        }
        Ok(data.len() as u32)
    }

    pub(crate) async fn read_event_kind(&self, name: &str) -> VfsResult<Vec<u8>> {
        let event = self.event(name).await?;
        Ok(event.kind().await.as_str().as_bytes().to_vec())
    }

    pub(crate) async fn write_event_kind(&self, name: &str, data: &[u8]) -> VfsResult<u32> {
        let event = self.event(name).await?;
        let text = String::from_utf8_lossy(data);
        let kind = EventKind::from_str(text.trim()).map_err(|_| libc::EAFNOSUPPORT)?;
        event.set_kind(kind).await;
        Ok(data.len() as u32)
    }

    pub(crate) async fn read_event_policy(&self, name: &str) -> VfsResult<Vec<u8>> {
        let event = self.event(name).await?;
        Ok(event.suspend_policy().await.as_str().as_bytes().to_vec())
    }

    pub(crate) async fn write_event_policy(&self, name: &str, data: &[u8]) -> VfsResult<u32> {
        let event = self.event(name).await?;
        let text = String::from_utf8_lossy(data);
        let policy = SuspendPolicy::from_str(text.trim()).map_err(|_| libc::EAFNOSUPPORT)?;
        event.set_suspend_policy(policy).await;
        Ok(data.len() as u32)
    }

    pub(crate) async fn readdir_location(&self, name: &str) -> VfsResult<Vec<DirEntry>> {
        let event = self.event(name).await?;
        let snapshot = event.snapshot().await;
        Ok(snapshot
            .modifiers
            .keys()
            .map(|modifier| DirEntry::new(modifier.clone(), NodeType::Symlink))
            .collect())
    }

    pub(crate) async fn lookup_location(&self, event: &str, name: &str) -> VfsResult<Node> {
        let snapshot = self.event(event).await?.snapshot().await;
        if snapshot.modifiers.contains_key(name) {
            Ok(Node::LocationLink {
                event: event.to_string(),
                name: name.to_string(),
            })
        } else {
            Err(libc::ENOENT)
        }
    }

    pub(crate) async fn symlink_location(
        &self,
        event: &str,
        name: &str,
        target: &str,
    ) -> VfsResult<Node> {
        let event_obj = self.event(event).await?;
        let spec = resolve_target(&self.client, &self.mount_root, target)
            .await
            .map_err(|err| {
                tracing::warn!(
                    target: "jvmfs.fs",
                    event = %event,
                    link_target = %target,
                    error = %err,
                    "rejecting location symlink"
                );
                err.errno()
            })?;

        event_obj
            .add_modifier(
                name,
                ModifierEntry {
                    target: target.to_string(),
                    spec,
                },
            )
            .await;

        Ok(Node::LocationLink {
            event: event.to_string(),
            name: name.to_string(),
        })
    }

    pub(crate) async fn unlink_location(&self, event: &str, name: &str) -> VfsResult<()> {
        let event = self.event(event).await?;
        event.remove_modifier(name).await.map_err(|err| err.errno())
    }

    pub(crate) async fn readlink_location(&self, event: &str, name: &str) -> VfsResult<String> {
        let snapshot = self.event(event).await?.snapshot().await;
        snapshot
            .modifiers
            .get(name)
            .map(|entry| entry.target.clone())
            .ok_or(libc::ENOENT)
    }

    pub(crate) async fn readdir_hooks(&self, name: &str) -> VfsResult<Vec<DirEntry>> {
        let event = self.event(name).await?;
        let snapshot = event.snapshot().await;
        Ok(snapshot
            .hooks
            .keys()
            .map(|hook| DirEntry::new(hook.clone(), NodeType::Symlink))
            .collect())
    }

    pub(crate) async fn lookup_hooks(&self, event: &str, name: &str) -> VfsResult<Node> {
        let snapshot = self.event(event).await?.snapshot().await;
        if snapshot.hooks.contains_key(name) {
            Ok(Node::HookLink {
                event: event.to_string(),
                name: name.to_string(),
            })
        } else {
            Err(libc::ENOENT)
        }
    }

    pub(crate) async fn symlink_hooks(
        &self,
        event: &str,
        name: &str,
        target: &str,
    ) -> VfsResult<Node> {
        let event_obj = self.event(event).await?;
        // The reference is validated against the filesystem at activation,
        // not here.
        event_obj
            .add_hook(name, target)
            .await
            .map_err(|err| err.errno())?;

        Ok(Node::HookLink {
            event: event.to_string(),
            name: name.to_string(),
        })
    }

    pub(crate) async fn unlink_hooks(&self, event: &str, name: &str) -> VfsResult<()> {
        let event = self.event(event).await?;
        event.remove_hook(name).await.map_err(|err| err.errno())
    }

    pub(crate) async fn readlink_hook(&self, event: &str, name: &str) -> VfsResult<String> {
        let snapshot = self.event(event).await?.snapshot().await;
        snapshot.hooks.get(name).cloned().ok_or(libc::ENOENT)
    }
}
