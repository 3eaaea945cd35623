//! Debugging events: mutable subscription specifications, their
//! process-wide registry, and the hook libraries run on each delivery.

mod event;
mod hooks;
mod manager;

pub use event::{DebugEvent, EventSnapshot, ModifierEntry, ModifierSpec};
pub use hooks::{HookError, HookErrors, HookRunner, HOOK_ENTRYPOINT};
pub use manager::EventManager;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("event {0:?} already exists")]
    DuplicateEvent(String),

    #[error("no event named {0:?}")]
    UnknownEvent(String),

    #[error("event {0:?} is running")]
    EventActive(String),

    #[error("event {0:?} is already running")]
    AlreadyActive(String),

    #[error("event {0:?} is not running")]
    NotActive(String),

    #[error("hook {0:?} already exists")]
    DuplicateHook(String),

    #[error("no hook named {0:?}")]
    UnknownHook(String),

    #[error("no modifier named {0:?}")]
    UnknownModifier(String),

    #[error(transparent)]
    Hook(#[from] HookError),
}

impl EventError {
    /// The POSIX code this error surfaces as on the triggering syscall.
    pub fn errno(&self) -> i32 {
        match self {
            EventError::DuplicateEvent(_) | EventError::DuplicateHook(_) => libc::EEXIST,
            EventError::UnknownEvent(_)
            | EventError::UnknownHook(_)
            | EventError::UnknownModifier(_) => libc::ENOENT,
            EventError::EventActive(_) => libc::EBUSY,
            EventError::AlreadyActive(_) | EventError::NotActive(_) => libc::ENAVAIL,
            EventError::Hook(_) => libc::EBADE,
        }
    }
}
