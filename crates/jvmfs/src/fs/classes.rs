//! `classes/` and `classes_by_signature/`: loaded-class metadata.
//!
//! Method and field directories are keyed by id rather than name because
//! Java methods can be overloaded; the tabular `methodInfo`/`fieldInfo`
//! files map ids to names and signatures.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use jvmfs_jdwp::{ClassInfo, FieldId, FieldInfo, MethodId, MethodInfo, ReferenceTypeId};

use super::jdwp_errno;
use super::node::{DirEntry, MemberAttr, Node, NodeType};
use super::vfs::Vfs;
use super::VfsResult;

/// JVM type signatures contain `/`, `;`, `$` and friends, none of which
/// can appear verbatim in a directory entry. Everything outside the
/// URL-unreserved set is escaped.
const SIGNATURE_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub(crate) fn escape_signature(signature: &str) -> String {
    utf8_percent_encode(signature, SIGNATURE_ESCAPE).to_string()
}

pub(crate) fn unescape_signature(name: &str) -> Option<String> {
    percent_decode_str(name)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

impl Vfs {
    async fn all_classes(&self) -> VfsResult<Vec<ClassInfo>> {
        self.client
            .all_classes()
            .await
            .map_err(|err| jdwp_errno(err, libc::EADDRNOTAVAIL, "class listing"))
    }

    async fn class_methods(&self, cid: ReferenceTypeId) -> VfsResult<Vec<MethodInfo>> {
        self.client
            .methods(cid)
            .await
            .map_err(|err| jdwp_errno(err, libc::EBADF, "method listing"))
    }

    async fn class_fields(&self, cid: ReferenceTypeId) -> VfsResult<Vec<FieldInfo>> {
        self.client
            .fields(cid)
            .await
            .map_err(|err| jdwp_errno(err, libc::EBADF, "field listing"))
    }

    pub(crate) async fn readdir_classes(&self) -> VfsResult<Vec<DirEntry>> {
        let classes = self.all_classes().await?;
        Ok(classes
            .iter()
            .map(|class| DirEntry::new(class.type_id.to_string(), NodeType::Directory))
            .collect())
    }

    pub(crate) async fn lookup_classes(&self, name: &str) -> VfsResult<Node> {
        let cid: ReferenceTypeId = name.parse().map_err(|_| libc::ENOENT)?;
        let classes = self.all_classes().await?;
        if classes.iter().any(|class| class.type_id == cid) {
            Ok(Node::ClassDir { cid })
        } else {
            Err(libc::ENOENT)
        }
    }

    pub(crate) fn lookup_class_dir(cid: ReferenceTypeId, name: &str) -> VfsResult<Node> {
        match name {
            "methodInfo" => Ok(Node::MethodInfoFile { cid }),
            "fieldInfo" => Ok(Node::FieldInfoFile { cid }),
            "methods" => Ok(Node::MethodsDir { cid }),
            "fields" => Ok(Node::FieldsDir { cid }),
            _ => Err(libc::ENOENT),
        }
    }

    pub(crate) async fn method_info_content(&self, cid: ReferenceTypeId) -> VfsResult<Vec<u8>> {
        let mut methods = self.class_methods(cid).await?;
        methods.sort_by_key(|method| method.method_id);

        let mut content = String::new();
        for method in &methods {
            content.push_str(&format!(
                "{}\t{}\t{}\n",
                method.method_id, method.name, method.signature
            ));
        }
        Ok(content.into_bytes())
    }

    pub(crate) async fn field_info_content(&self, cid: ReferenceTypeId) -> VfsResult<Vec<u8>> {
        let mut fields = self.class_fields(cid).await?;
        fields.sort_by_key(|field| field.field_id);

        let mut content = String::new();
        for field in &fields {
            content.push_str(&format!(
                "{}\t{}\t{}\n",
                field.field_id, field.name, field.signature
            ));
        }
        Ok(content.into_bytes())
    }

    pub(crate) async fn readdir_methods(&self, cid: ReferenceTypeId) -> VfsResult<Vec<DirEntry>> {
        let methods = self.class_methods(cid).await?;
        Ok(methods
            .iter()
            .map(|method| DirEntry::new(method.method_id.to_string(), NodeType::Directory))
            .collect())
    }

    pub(crate) async fn lookup_methods(&self, cid: ReferenceTypeId, name: &str) -> VfsResult<Node> {
        let mid: MethodId = name.parse().map_err(|_| libc::ENOENT)?;
        let methods = self.class_methods(cid).await?;
        if methods.iter().any(|method| method.method_id == mid) {
            Ok(Node::MethodDir { cid, mid })
        } else {
            Err(libc::ENOENT)
        }
    }

    pub(crate) async fn readdir_fields(&self, cid: ReferenceTypeId) -> VfsResult<Vec<DirEntry>> {
        let fields = self.class_fields(cid).await?;
        Ok(fields
            .iter()
            .map(|field| DirEntry::new(field.field_id.to_string(), NodeType::Directory))
            .collect())
    }

    pub(crate) async fn lookup_fields(&self, cid: ReferenceTypeId, name: &str) -> VfsResult<Node> {
        let fid: FieldId = name.parse().map_err(|_| libc::ENOENT)?;
        let fields = self.class_fields(cid).await?;
        if fields.iter().any(|field| field.field_id == fid) {
            Ok(Node::FieldDir { cid, fid })
        } else {
            Err(libc::ENOENT)
        }
    }

    pub(crate) async fn method_attr_content(
        &self,
        cid: ReferenceTypeId,
        mid: MethodId,
        attr: MemberAttr,
    ) -> VfsResult<Vec<u8>> {
        let methods = self.class_methods(cid).await?;
        let method = methods
            .iter()
            .find(|method| method.method_id == mid)
            .ok_or(libc::ENOENT)?;

        let content = match attr {
            MemberAttr::Name => method.name.clone(),
            MemberAttr::Signature => method.signature.clone(),
            MemberAttr::Modifiers => method.mod_bits.to_string(),
        };
        Ok(content.into_bytes())
    }

    pub(crate) async fn field_attr_content(
        &self,
        cid: ReferenceTypeId,
        fid: FieldId,
        attr: MemberAttr,
    ) -> VfsResult<Vec<u8>> {
        let fields = self.class_fields(cid).await?;
        let field = fields
            .iter()
            .find(|field| field.field_id == fid)
            .ok_or(libc::ENOENT)?;

        let content = match attr {
            MemberAttr::Name => field.name.clone(),
            MemberAttr::Signature => field.signature.clone(),
            MemberAttr::Modifiers => field.mod_bits.to_string(),
        };
        Ok(content.into_bytes())
    }

    pub(crate) async fn readdir_classes_by_signature(&self) -> VfsResult<Vec<DirEntry>> {
        let classes = self.all_classes().await?;
        Ok(classes
            .iter()
            .map(|class| DirEntry::new(escape_signature(&class.signature), NodeType::Symlink))
            .collect())
    }

    pub(crate) async fn lookup_class_by_signature(&self, name: &str) -> VfsResult<Node> {
        let signature = unescape_signature(name).ok_or(libc::EFAULT)?;
        let classes = self.all_classes().await?;
        if classes.iter().any(|class| class.signature == signature) {
            Ok(Node::ClassLink { signature })
        } else {
            Err(libc::ENOENT)
        }
    }

    pub(crate) async fn readlink_class(&self, signature: &str) -> VfsResult<String> {
        let classes = self.all_classes().await?;
        let class = classes
            .iter()
            .find(|class| class.signature == signature)
            .ok_or(libc::ENOENT)?;

        Ok(self
            .mount_root
            .join("classes")
            .join(class.type_id.to_string())
            .display()
            .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_escape_and_unescape() {
        let signature = "Ljava/lang/String;";
        let escaped = escape_signature(signature);
        assert!(!escaped.contains('/'));
        assert_eq!(escaped, "Ljava%2Flang%2FString%3B");
        assert_eq!(unescape_signature(&escaped).as_deref(), Some(signature));
    }

    #[test]
    fn array_signatures_round_trip() {
        let signature = "[Lcom/example/Outer$Inner;";
        let escaped = escape_signature(signature);
        assert!(!escaped.contains('/'));
        assert!(!escaped.contains('$'));
        assert_eq!(unescape_signature(&escaped).as_deref(), Some(signature));
    }
}
