//! Java Debug Wire Protocol (JDWP) client for jvmfs.
//!
//! This crate speaks the JDWP binary protocol over TCP. It is async
//! (`tokio`) and cancellation-aware: one background read loop per
//! connection demultiplexes command replies and asynchronous composite
//! event packets, and every subscription is torn down through a
//! [`tokio_util::sync::CancellationToken`].
//!
//! The surface is intentionally the slice of JDWP that a filesystem view
//! of a JVM needs: thread and class enumeration, suspend/resume, and
//! event request management. Value inspection, stack frames and stepping
//! are out of scope here.

mod client;
mod codec;
pub mod types;

pub use client::{EventModifier, JdwpClient, JdwpClientConfig};
pub use types::{
    ClassInfo, EventKind, FieldId, FieldInfo, JdwpError, JdwpEvent, JdwpIdSizes, JdwpValue,
    Location, MethodId, MethodInfo, ObjectId, ReferenceTypeId, Result, SuspendPolicy,
    SuspendStatus, ThreadId, ThreadStatus,
};

// The mock JVM is only needed for tests and downstream integration suites.
// Compile it for jvmfs-jdwp's own unit tests unconditionally (via `cfg(test)`),
// while keeping it behind the `wire-test-support` feature for normal builds.
#[cfg(any(test, feature = "wire-test-support"))]
pub mod mock;
