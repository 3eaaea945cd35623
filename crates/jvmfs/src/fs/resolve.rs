//! Symlink-target resolution for `location/` modifiers.
//!
//! A user binds a modifier by symlinking a class member from inside the
//! mount, e.g. `ln -s /mnt/classes/42/methods/7 …/location/m0`. The
//! resolver reverses that path into a typed modifier at symlink-creation
//! time; it never mutates the event itself.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use jvmfs_jdwp::{JdwpClient, JdwpError, ReferenceTypeId};

use crate::debug::ModifierSpec;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("target {0:?} is not an absolute path")]
    NotAbsolute(String),

    #[error("target {0:?} is outside the mount")]
    OutsideMount(String),

    #[error("target {0:?} does not name a class member")]
    BadShape(String),

    #[error("target {0:?} has an unparsable id")]
    BadId(String),

    #[error("class {0} is not loaded")]
    ClassNotFound(ReferenceTypeId),

    #[error("class {class} has no member {member}")]
    MemberNotFound {
        class: ReferenceTypeId,
        member: u64,
    },

    #[error(transparent)]
    Jdwp(#[from] JdwpError),
}

impl ResolveError {
    pub fn errno(&self) -> i32 {
        match self {
            ResolveError::NotAbsolute(_)
            | ResolveError::OutsideMount(_)
            | ResolveError::BadShape(_)
            | ResolveError::BadId(_) => libc::EBADE,
            ResolveError::ClassNotFound(_) | ResolveError::MemberNotFound { .. } => libc::ENOENT,
            ResolveError::Jdwp(_) => libc::EADDRNOTAVAIL,
        }
    }
}

/// Lexically normalise an absolute path: strip `.`, fold `..`.
///
/// Symlink chasing through the live mount is deliberately avoided here:
/// the resolver runs inside a filesystem callback, and a `stat` on our
/// own mountpoint would re-enter the filesystem being served.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => normalized.push("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
            Component::Prefix(_) => {}
        }
    }
    normalized
}

/// Translate a symlink target inside the mount into an event modifier.
///
/// The target must have the shape `<mount>/classes/<cid>/methods/<mid>`
/// or `<mount>/classes/<cid>/fields/<fid>`, and both ids must exist in
/// the JVM right now.
pub async fn resolve_target(
    client: &JdwpClient,
    mount_root: &Path,
    target: &str,
) -> Result<ModifierSpec, ResolveError> {
    let path = Path::new(target);
    if !path.is_absolute() {
        return Err(ResolveError::NotAbsolute(target.to_string()));
    }

    let normalized = normalize(path);
    let relative = normalized
        .strip_prefix(mount_root)
        .map_err(|_| ResolveError::OutsideMount(target.to_string()))?;

    let components: Vec<&str> = relative
        .components()
        .map(|component| {
            component
                .as_os_str()
                .to_str()
                .ok_or_else(|| ResolveError::BadShape(target.to_string()))
        })
        .collect::<Result<_, _>>()?;

    let [first, class_id, member_kind, member_id] = components.as_slice() else {
        return Err(ResolveError::BadShape(target.to_string()));
    };
    if *first != "classes" || !matches!(*member_kind, "methods" | "fields") {
        return Err(ResolveError::BadShape(target.to_string()));
    }

    let class_id: ReferenceTypeId = class_id
        .parse()
        .map_err(|_| ResolveError::BadId(target.to_string()))?;
    let member_id: u64 = member_id
        .parse()
        .map_err(|_| ResolveError::BadId(target.to_string()))?;

    let classes = client.all_classes().await?;
    let class = classes
        .iter()
        .find(|class| class.type_id == class_id)
        .ok_or(ResolveError::ClassNotFound(class_id))?;

    match *member_kind {
        "fields" => {
            let fields = client.fields(class_id).await?;
            fields
                .iter()
                .find(|field| field.field_id == member_id)
                .ok_or(ResolveError::MemberNotFound {
                    class: class_id,
                    member: member_id,
                })?;

            Ok(ModifierSpec::FieldOnly {
                class_id,
                field_id: member_id,
            })
        }
        _ => {
            let methods = client.methods(class_id).await?;
            methods
                .iter()
                .find(|method| method.method_id == member_id)
                .ok_or(ResolveError::MemberNotFound {
                    class: class_id,
                    member: member_id,
                })?;

            Ok(ModifierSpec::LocationOnly {
                type_tag: class.ref_type_tag,
                class_id,
                method_id: member_id,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_is_lexical() {
        assert_eq!(
            normalize(Path::new("/mnt/./classes/../classes/42")),
            PathBuf::from("/mnt/classes/42")
        );
        assert_eq!(normalize(Path::new("/a/../../b")), PathBuf::from("/b"));
    }
}
