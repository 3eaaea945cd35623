use jvmfs_jdwp::{FieldId, MethodId, ReferenceTypeId, ThreadId};

/// The attribute files inside a method or field directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberAttr {
    Name,
    Signature,
    Modifiers,
}

impl MemberAttr {
    pub const ALL: [MemberAttr; 3] = [
        MemberAttr::Name,
        MemberAttr::Signature,
        MemberAttr::Modifiers,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            MemberAttr::Name => "name",
            MemberAttr::Signature => "signature",
            MemberAttr::Modifiers => "modifiers",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|attr| attr.file_name() == name)
    }
}

/// Every kind of node the tree can contain.
///
/// Nodes are values, not objects: they carry the identifiers needed to
/// re-query the JVM or the event registry on each operation, never cached
/// state. Identity is structural, which lets the FUSE adapter key its
/// inode table on the node itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Node {
    Root,
    HostFile,
    PortFile,

    ThreadsDir,
    AllThreadsControl,
    ThreadDir { tid: ThreadId },
    ThreadNameFile { tid: ThreadId },
    ThreadStatusFile { tid: ThreadId },
    ThreadSuspendFile { tid: ThreadId },
    ThreadControl { tid: ThreadId },

    ThreadsByNameDir,
    ThreadLink { name: String },

    ClassesDir,
    ClassDir { cid: ReferenceTypeId },
    MethodInfoFile { cid: ReferenceTypeId },
    FieldInfoFile { cid: ReferenceTypeId },
    MethodsDir { cid: ReferenceTypeId },
    MethodDir { cid: ReferenceTypeId, mid: MethodId },
    MethodAttrFile { cid: ReferenceTypeId, mid: MethodId, attr: MemberAttr },
    FieldsDir { cid: ReferenceTypeId },
    FieldDir { cid: ReferenceTypeId, fid: FieldId },
    FieldAttrFile { cid: ReferenceTypeId, fid: FieldId, attr: MemberAttr },

    ClassesBySignatureDir,
    ClassLink { signature: String },

    EventsDir,
    EventDir { event: String },
    EventControl { event: String },
    EventKindFile { event: String },
    EventPolicyFile { event: String },
    LocationDir { event: String },
    HooksDir { event: String },
    LocationLink { event: String, name: String },
    HookLink { event: String, name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Directory,
    File,
    Symlink,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Root
            | Node::ThreadsDir
            | Node::ThreadDir { .. }
            | Node::ThreadsByNameDir
            | Node::ClassesDir
            | Node::ClassDir { .. }
            | Node::MethodsDir { .. }
            | Node::MethodDir { .. }
            | Node::FieldsDir { .. }
            | Node::FieldDir { .. }
            | Node::ClassesBySignatureDir
            | Node::EventsDir
            | Node::EventDir { .. }
            | Node::LocationDir { .. }
            | Node::HooksDir { .. } => NodeType::Directory,

            Node::HostFile
            | Node::PortFile
            | Node::AllThreadsControl
            | Node::ThreadNameFile { .. }
            | Node::ThreadStatusFile { .. }
            | Node::ThreadSuspendFile { .. }
            | Node::ThreadControl { .. }
            | Node::MethodInfoFile { .. }
            | Node::FieldInfoFile { .. }
            | Node::MethodAttrFile { .. }
            | Node::FieldAttrFile { .. }
            | Node::EventControl { .. }
            | Node::EventKindFile { .. }
            | Node::EventPolicyFile { .. } => NodeType::File,

            Node::ThreadLink { .. }
            | Node::ClassLink { .. }
            | Node::LocationLink { .. }
            | Node::HookLink { .. } => NodeType::Symlink,
        }
    }

    /// Control files are the writable surface; everything else is a
    /// read-only projection.
    pub(crate) fn is_control_file(&self) -> bool {
        matches!(
            self,
            Node::AllThreadsControl
                | Node::ThreadControl { .. }
                | Node::EventControl { .. }
                | Node::EventKindFile { .. }
                | Node::EventPolicyFile { .. }
        )
    }

    pub fn perm(&self) -> u16 {
        match self.node_type() {
            NodeType::Directory => 0o755,
            NodeType::Symlink => 0o444,
            NodeType::File => {
                if self.is_control_file() {
                    0o660
                } else {
                    0o444
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub node_type: NodeType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub node_type: NodeType,
    pub perm: u16,
}

impl Attr {
    pub fn of(node: &Node) -> Self {
        Self {
            node_type: node.node_type(),
            perm: node.perm(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_files_are_group_writable() {
        assert_eq!(Node::ThreadControl { tid: 1 }.perm(), 0o660);
        assert_eq!(
            Node::EventKindFile {
                event: "e".to_string()
            }
            .perm(),
            0o660
        );
        assert_eq!(Node::HostFile.perm(), 0o444);
        assert_eq!(Node::Root.perm(), 0o755);
    }

    #[test]
    fn structural_identity_is_stable() {
        use std::collections::HashMap;

        let mut inodes = HashMap::new();
        inodes.insert(Node::ThreadDir { tid: 100 }, 2u64);
        assert_eq!(inodes.get(&Node::ThreadDir { tid: 100 }), Some(&2));
        assert_eq!(inodes.get(&Node::ThreadDir { tid: 101 }), None);
    }
}
