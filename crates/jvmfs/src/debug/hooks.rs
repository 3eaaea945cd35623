//! Hook loading and dispatch.
//!
//! A hook is a dynamic library exporting [`HOOK_ENTRYPOINT`] with the
//! [`HookEntry`] signature. Hooks are loaded when an event is activated;
//! any load failure fails the whole activation. At delivery time every
//! hook runs and failures are aggregated rather than short-circuiting,
//! so one misbehaving hook cannot starve the others.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use libloading::Library;
use thiserror::Error;

use jvmfs_jdwp::JdwpEvent;

/// Symbol every hook library must export.
pub const HOOK_ENTRYPOINT: &[u8] = b"jvmfs_hook_entry";

/// Entrypoint signature: `(hook name, delivered event)`. A returned
/// message is logged and aggregated; it does not stop the subscription.
pub type HookEntry = fn(&str, &JdwpEvent) -> Result<(), String>;

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook library {path} is not accessible: {source}")]
    Missing {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to open hook library {path}: {source}")]
    Open {
        path: PathBuf,
        source: libloading::Error,
    },

    #[error("hook library {path} does not export the entrypoint: {source}")]
    Entrypoint {
        path: PathBuf,
        source: libloading::Error,
    },
}

/// One failed hook invocation within a delivery.
#[derive(Debug)]
pub struct HookFailure {
    pub hook: String,
    pub message: String,
}

/// Every per-hook failure from a single event delivery.
#[derive(Debug, Error)]
pub struct HookErrors {
    pub failures: Vec<HookFailure>,
}

impl fmt::Display for HookErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hook(s) failed:", self.failures.len())?;
        for failure in &self.failures {
            write!(f, " [{}: {}]", failure.hook, failure.message)?;
        }
        Ok(())
    }
}

struct LoadedHook {
    name: String,
    entry: HookEntry,
    // Keeps the library mapped for as long as `entry` may be called.
    _library: Library,
}

/// The set of loaded hooks attached to one active subscription.
pub struct HookRunner {
    hooks: Vec<LoadedHook>,
}

impl HookRunner {
    /// Load every hook in `descriptors` (name → library path). Fails as a
    /// whole: a single bad descriptor discards everything loaded so far.
    pub fn load(descriptors: &BTreeMap<String, String>) -> Result<Self, HookError> {
        let mut hooks = Vec::with_capacity(descriptors.len());

        for (name, reference) in descriptors {
            let path = PathBuf::from(reference);
            std::fs::metadata(&path).map_err(|source| HookError::Missing {
                path: path.clone(),
                source,
            })?;

            let library = unsafe { Library::new(&path) }.map_err(|source| HookError::Open {
                path: path.clone(),
                source,
            })?;

            // Function pointers are plain data; copy the entrypoint out so
            // the symbol does not borrow the library.
            let entry: HookEntry = unsafe {
                *library
                    .get::<HookEntry>(HOOK_ENTRYPOINT)
                    .map_err(|source| HookError::Entrypoint {
                        path: path.clone(),
                        source,
                    })?
            };

            hooks.push(LoadedHook {
                name: name.clone(),
                entry,
                _library: library,
            });
        }

        Ok(Self { hooks })
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Invoke every hook for `event`, collecting failures.
    pub fn dispatch(&self, event: &JdwpEvent) -> Result<(), HookErrors> {
        let mut failures = Vec::new();

        for hook in &self.hooks {
            if let Err(message) = (hook.entry)(&hook.name, event) {
                failures.push(HookFailure {
                    hook: hook.name.clone(),
                    message,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HookErrors { failures })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_descriptor_set_loads() {
        let runner = HookRunner::load(&BTreeMap::new()).unwrap();
        assert!(runner.is_empty());
        let event = JdwpEvent::VmDeath { request_id: 0 };
        assert!(runner.dispatch(&event).is_ok());
    }

    #[test]
    fn missing_library_fails_the_build() {
        let mut descriptors = BTreeMap::new();
        descriptors.insert(
            "h0".to_string(),
            "/nonexistent/path/libhook.so".to_string(),
        );
        match HookRunner::load(&descriptors) {
            Err(HookError::Missing { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/path/libhook.so"));
            }
            Err(other) => panic!("expected missing-library error, got {other:?}"),
            Ok(_) => panic!("expected missing-library error"),
        }
    }

    #[test]
    fn non_library_file_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-library.so");
        std::fs::write(&path, b"plain text").unwrap();

        let mut descriptors = BTreeMap::new();
        descriptors.insert("h0".to_string(), path.display().to_string());
        assert!(matches!(
            HookRunner::load(&descriptors),
            Err(HookError::Open { .. })
        ));
    }
}
