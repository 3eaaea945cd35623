use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub type ObjectId = u64;
pub type ThreadId = u64;
pub type ReferenceTypeId = u64;
pub type MethodId = u64;
pub type FieldId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JdwpIdSizes {
    pub field_id: usize,
    pub method_id: usize,
    pub object_id: usize,
    pub reference_type_id: usize,
    pub frame_id: usize,
}

impl Default for JdwpIdSizes {
    fn default() -> Self {
        // Most modern JVMs use 8 byte IDs. We query the real sizes during
        // connect and overwrite these.
        Self {
            field_id: 8,
            method_id: 8,
            object_id: 8,
            reference_type_id: 8,
            frame_id: 8,
        }
    }
}

/// A code location inside a loaded class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub type_tag: u8,
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub ref_type_tag: u8,
    pub type_id: ReferenceTypeId,
    pub signature: String,
    pub status: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub method_id: MethodId,
    pub name: String,
    pub signature: String,
    pub mod_bits: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub field_id: FieldId,
    pub name: String,
    pub signature: String,
    pub mod_bits: u32,
}

/// `ThreadReference.Status` run state. Values outside the five states the
/// JDWP spec names are preserved and rendered in decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadStatus(pub i32);

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "Zombie"),
            1 => write!(f, "Running"),
            2 => write!(f, "Sleeping"),
            3 => write!(f, "Monitor"),
            4 => write!(f, "Wait"),
            other => write!(f, "{other}"),
        }
    }
}

/// `ThreadReference.Status` suspend state: 0 running, 1 suspended. Other
/// values pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendStatus(pub i32);

impl SuspendStatus {
    pub fn is_running(self) -> bool {
        self.0 == 0
    }

    pub fn is_suspended(self) -> bool {
        self.0 == 1
    }
}

impl fmt::Display for SuspendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "running"),
            1 => write!(f, "suspended"),
            other => write!(f, "{other}"),
        }
    }
}

/// The event kinds a JVM can be asked to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SingleStep,
    Breakpoint,
    FramePop,
    Exception,
    UserDefined,
    ThreadStart,
    ThreadDeath,
    ClassPrepare,
    ClassUnload,
    ClassLoad,
    FieldAccess,
    FieldModification,
    ExceptionCatch,
    MethodEntry,
    MethodExit,
    VmStart,
    VmDeath,
}

impl EventKind {
    pub const ALL: [EventKind; 17] = [
        EventKind::SingleStep,
        EventKind::Breakpoint,
        EventKind::FramePop,
        EventKind::Exception,
        EventKind::UserDefined,
        EventKind::ThreadStart,
        EventKind::ThreadDeath,
        EventKind::ClassPrepare,
        EventKind::ClassUnload,
        EventKind::ClassLoad,
        EventKind::FieldAccess,
        EventKind::FieldModification,
        EventKind::ExceptionCatch,
        EventKind::MethodEntry,
        EventKind::MethodExit,
        EventKind::VmStart,
        EventKind::VmDeath,
    ];

    pub fn wire_value(self) -> u8 {
        match self {
            EventKind::SingleStep => 1,
            EventKind::Breakpoint => 2,
            EventKind::FramePop => 3,
            EventKind::Exception => 4,
            EventKind::UserDefined => 5,
            EventKind::ThreadStart => 6,
            EventKind::ThreadDeath => 7,
            EventKind::ClassPrepare => 8,
            EventKind::ClassUnload => 9,
            EventKind::ClassLoad => 10,
            EventKind::FieldAccess => 20,
            EventKind::FieldModification => 21,
            EventKind::ExceptionCatch => 30,
            EventKind::MethodEntry => 40,
            EventKind::MethodExit => 41,
            EventKind::VmStart => 90,
            EventKind::VmDeath => 99,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_value() == value)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SingleStep => "SingleStep",
            EventKind::Breakpoint => "Breakpoint",
            EventKind::FramePop => "FramePop",
            EventKind::Exception => "Exception",
            EventKind::UserDefined => "UserDefined",
            EventKind::ThreadStart => "ThreadStart",
            EventKind::ThreadDeath => "ThreadDeath",
            EventKind::ClassPrepare => "ClassPrepare",
            EventKind::ClassUnload => "ClassUnload",
            EventKind::ClassLoad => "ClassLoad",
            EventKind::FieldAccess => "FieldAccess",
            EventKind::FieldModification => "FieldModification",
            EventKind::ExceptionCatch => "ExceptionCatch",
            EventKind::MethodEntry => "MethodEntry",
            EventKind::MethodExit => "MethodExit",
            EventKind::VmStart => "VMStart",
            EventKind::VmDeath => "VMDeath",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown event kind {0:?}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// What the JVM does with its threads when an event is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspendPolicy {
    None,
    EventThread,
    All,
}

impl SuspendPolicy {
    pub const ALL: [SuspendPolicy; 3] = [
        SuspendPolicy::None,
        SuspendPolicy::EventThread,
        SuspendPolicy::All,
    ];

    pub fn wire_value(self) -> u8 {
        match self {
            SuspendPolicy::None => 0,
            SuspendPolicy::EventThread => 1,
            SuspendPolicy::All => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuspendPolicy::None => "SuspendNone",
            SuspendPolicy::EventThread => "SuspendEventThread",
            SuspendPolicy::All => "SuspendAll",
        }
    }
}

impl fmt::Display for SuspendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown suspend policy {0:?}")]
pub struct UnknownSuspendPolicy(pub String);

impl FromStr for SuspendPolicy {
    type Err = UnknownSuspendPolicy;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == s)
            .ok_or_else(|| UnknownSuspendPolicy(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JdwpValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object { tag: u8, id: ObjectId },
    Void,
}

impl fmt::Display for JdwpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JdwpValue::Boolean(v) => write!(f, "{v}"),
            JdwpValue::Byte(v) => write!(f, "{v}"),
            JdwpValue::Char(v) => write!(f, "{v}"),
            JdwpValue::Short(v) => write!(f, "{v}"),
            JdwpValue::Int(v) => write!(f, "{v}"),
            JdwpValue::Long(v) => write!(f, "{v}"),
            JdwpValue::Float(v) => write!(f, "{v}"),
            JdwpValue::Double(v) => write!(f, "{v}"),
            JdwpValue::Object { tag, id } => write!(f, "{tag}@{id:#x}"),
            JdwpValue::Void => write!(f, "void"),
        }
    }
}

/// One decoded entry of an `Event.Composite` packet.
#[derive(Debug, Clone, PartialEq)]
pub enum JdwpEvent {
    VmStart {
        request_id: i32,
        thread: ThreadId,
    },
    SingleStep {
        request_id: i32,
        thread: ThreadId,
        location: Location,
    },
    Breakpoint {
        request_id: i32,
        thread: ThreadId,
        location: Location,
    },
    MethodEntry {
        request_id: i32,
        thread: ThreadId,
        location: Location,
    },
    MethodExit {
        request_id: i32,
        thread: ThreadId,
        location: Location,
    },
    Exception {
        request_id: i32,
        thread: ThreadId,
        location: Location,
        exception: ObjectId,
        catch_location: Option<Location>,
    },
    ThreadStart {
        request_id: i32,
        thread: ThreadId,
    },
    ThreadDeath {
        request_id: i32,
        thread: ThreadId,
    },
    ClassPrepare {
        request_id: i32,
        thread: ThreadId,
        ref_type_tag: u8,
        type_id: ReferenceTypeId,
        signature: String,
        status: u32,
    },
    ClassUnload {
        request_id: i32,
        signature: String,
    },
    FieldAccess {
        request_id: i32,
        thread: ThreadId,
        location: Location,
        ref_type_tag: u8,
        type_id: ReferenceTypeId,
        field_id: FieldId,
        object: ObjectId,
    },
    FieldModification {
        request_id: i32,
        thread: ThreadId,
        location: Location,
        ref_type_tag: u8,
        type_id: ReferenceTypeId,
        field_id: FieldId,
        object: ObjectId,
        value: JdwpValue,
    },
    VmDeath {
        request_id: i32,
    },
}

impl JdwpEvent {
    pub fn request_id(&self) -> i32 {
        match self {
            JdwpEvent::VmStart { request_id, .. }
            | JdwpEvent::SingleStep { request_id, .. }
            | JdwpEvent::Breakpoint { request_id, .. }
            | JdwpEvent::MethodEntry { request_id, .. }
            | JdwpEvent::MethodExit { request_id, .. }
            | JdwpEvent::Exception { request_id, .. }
            | JdwpEvent::ThreadStart { request_id, .. }
            | JdwpEvent::ThreadDeath { request_id, .. }
            | JdwpEvent::ClassPrepare { request_id, .. }
            | JdwpEvent::ClassUnload { request_id, .. }
            | JdwpEvent::FieldAccess { request_id, .. }
            | JdwpEvent::FieldModification { request_id, .. }
            | JdwpEvent::VmDeath { request_id } => *request_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            JdwpEvent::VmStart { .. } => EventKind::VmStart,
            JdwpEvent::SingleStep { .. } => EventKind::SingleStep,
            JdwpEvent::Breakpoint { .. } => EventKind::Breakpoint,
            JdwpEvent::MethodEntry { .. } => EventKind::MethodEntry,
            JdwpEvent::MethodExit { .. } => EventKind::MethodExit,
            JdwpEvent::Exception { .. } => EventKind::Exception,
            JdwpEvent::ThreadStart { .. } => EventKind::ThreadStart,
            JdwpEvent::ThreadDeath { .. } => EventKind::ThreadDeath,
            JdwpEvent::ClassPrepare { .. } => EventKind::ClassPrepare,
            JdwpEvent::ClassUnload { .. } => EventKind::ClassUnload,
            JdwpEvent::FieldAccess { .. } => EventKind::FieldAccess,
            JdwpEvent::FieldModification { .. } => EventKind::FieldModification,
            JdwpEvent::VmDeath { .. } => EventKind::VmDeath,
        }
    }
}

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("VM returned error code {0}")]
    VmError(u16),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, JdwpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_names_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("xyz".parse::<EventKind>().is_err());
        assert!("methodentry".parse::<EventKind>().is_err());
    }

    #[test]
    fn suspend_policy_names_round_trip() {
        for policy in SuspendPolicy::ALL {
            assert_eq!(policy.as_str().parse::<SuspendPolicy>().unwrap(), policy);
        }
        assert!("Suspend".parse::<SuspendPolicy>().is_err());
    }

    #[test]
    fn event_kind_wire_values_round_trip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_wire(kind.wire_value()), Some(kind));
        }
        assert_eq!(EventKind::from_wire(42), None);
    }

    #[test]
    fn suspend_status_rendering() {
        assert_eq!(SuspendStatus(0).to_string(), "running");
        assert_eq!(SuspendStatus(1).to_string(), "suspended");
        assert_eq!(SuspendStatus(7).to_string(), "7");
    }
}
