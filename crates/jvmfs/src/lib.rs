//! jvmfs exposes a live JVM's debug surface as a filesystem.
//!
//! Reading files observes JVM state (threads, classes, methods, fields),
//! writing small textual commands to control files suspends and resumes
//! execution, and `mkdir`/`symlink` under `events/` declare debug-event
//! subscriptions whose deliveries run user-supplied hook libraries.
//!
//! The crate splits into:
//! - [`debug`]: debugging-event objects, their registry, and the hook
//!   loader/runner;
//! - [`fs`]: the transport-independent node graph with POSIX-style
//!   results;
//! - [`fuse`]: the adapter binding the node graph to the kernel.

pub mod debug;
pub mod fs;
pub mod fuse;
