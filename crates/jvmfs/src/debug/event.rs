use std::collections::BTreeMap;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use jvmfs_jdwp::{
    EventKind, EventModifier, FieldId, JdwpClient, Location, MethodId, ReferenceTypeId,
    SuspendPolicy,
};

use super::hooks::HookRunner;
use super::EventError;

/// A delivery filter for one subscription, decoded from a symlink target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierSpec {
    /// Restrict delivery to accesses of one field.
    FieldOnly {
        class_id: ReferenceTypeId,
        field_id: FieldId,
    },
    /// Restrict delivery to entry of one method.
    LocationOnly {
        type_tag: u8,
        class_id: ReferenceTypeId,
        method_id: MethodId,
    },
}

impl ModifierSpec {
    pub fn to_wire(self) -> EventModifier {
        match self {
            ModifierSpec::FieldOnly { class_id, field_id } => EventModifier::FieldOnly {
                declaring: class_id,
                field: field_id,
            },
            ModifierSpec::LocationOnly {
                type_tag,
                class_id,
                method_id,
            } => EventModifier::LocationOnly {
                location: Location {
                    type_tag,
                    class_id,
                    method_id,
                    index: 0,
                },
            },
        }
    }
}

/// A named modifier plus the raw symlink target it was created from. The
/// target is what `readlink(2)` reports.
#[derive(Debug, Clone)]
pub struct ModifierEntry {
    pub target: String,
    pub spec: ModifierSpec,
}

/// Copy of an event's configuration, taken under its lock.
#[derive(Debug, Clone)]
pub struct EventSnapshot {
    pub kind: EventKind,
    pub suspend_policy: SuspendPolicy,
    pub modifiers: BTreeMap<String, ModifierEntry>,
    pub hooks: BTreeMap<String, String>,
}

struct RuntimeHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct EventState {
    kind: EventKind,
    suspend_policy: SuspendPolicy,
    modifiers: BTreeMap<String, ModifierEntry>,
    hooks: BTreeMap<String, String>,
    // Present iff the event is active.
    runtime: Option<RuntimeHandle>,
}

/// One user-declared debugging event.
///
/// The configuration (kind, policy, modifiers, hooks) is mutable at any
/// time, but an already-dispatched subscription keeps the snapshot it was
/// activated with; rebinding requires cancel + activate.
pub struct DebugEvent {
    name: String,
    state: RwLock<EventState>,
}

impl DebugEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: RwLock::new(EventState {
                kind: EventKind::VmDeath,
                suspend_policy: SuspendPolicy::None,
                modifiers: BTreeMap::new(),
                hooks: BTreeMap::new(),
                runtime: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn kind(&self) -> EventKind {
        self.state.read().await.kind
    }

    pub async fn set_kind(&self, kind: EventKind) {
        self.state.write().await.kind = kind;
    }

    pub async fn suspend_policy(&self) -> SuspendPolicy {
        self.state.read().await.suspend_policy
    }

    pub async fn set_suspend_policy(&self, policy: SuspendPolicy) {
        self.state.write().await.suspend_policy = policy;
    }

    /// Register a hook. The reference is not validated against the
    /// filesystem until activation.
    pub async fn add_hook(&self, name: &str, reference: &str) -> Result<(), EventError> {
        let mut state = self.state.write().await;
        if state.hooks.contains_key(name) {
            return Err(EventError::DuplicateHook(name.to_string()));
        }
        state.hooks.insert(name.to_string(), reference.to_string());
        Ok(())
    }

    pub async fn remove_hook(&self, name: &str) -> Result<(), EventError> {
        let mut state = self.state.write().await;
        if state.hooks.remove(name).is_none() {
            return Err(EventError::UnknownHook(name.to_string()));
        }
        Ok(())
    }

    /// Bind a modifier under `name`, replacing any previous binding.
    pub async fn add_modifier(&self, name: &str, entry: ModifierEntry) {
        let mut state = self.state.write().await;
        state.modifiers.insert(name.to_string(), entry);
    }

    pub async fn remove_modifier(&self, name: &str) -> Result<(), EventError> {
        let mut state = self.state.write().await;
        if state.modifiers.remove(name).is_none() {
            return Err(EventError::UnknownModifier(name.to_string()));
        }
        Ok(())
    }

    pub async fn is_active(&self) -> bool {
        self.state.read().await.runtime.is_some()
    }

    pub async fn snapshot(&self) -> EventSnapshot {
        let state = self.state.read().await;
        EventSnapshot {
            kind: state.kind,
            suspend_policy: state.suspend_policy,
            modifiers: state.modifiers.clone(),
            hooks: state.hooks.clone(),
        }
    }

    /// Freeze the current configuration and spawn the background
    /// subscription task.
    ///
    /// Hook loading happens before any side effect; a load failure aborts
    /// the activation. Adapter failures inside the spawned task are
    /// logged and end the task, but the event stays active until
    /// [`DebugEvent::cancel`]; activity is defined by the runtime handle
    /// alone.
    pub async fn activate(&self, client: &JdwpClient) -> Result<(), EventError> {
        let mut state = self.state.write().await;
        if state.runtime.is_some() {
            return Err(EventError::AlreadyActive(self.name.clone()));
        }

        let runner = HookRunner::load(&state.hooks)?;

        let kind = state.kind;
        let suspend_policy = state.suspend_policy;
        let modifiers: Vec<EventModifier> = state
            .modifiers
            .values()
            .map(|entry| entry.spec.to_wire())
            .collect();

        let cancel = CancellationToken::new();
        let task = {
            let client = client.clone();
            let cancel = cancel.clone();
            let event_name = self.name.clone();
            tokio::spawn(async move {
                let hook_event_name = event_name.clone();
                let result = client
                    .watch_events(cancel, kind, suspend_policy, modifiers, move |event| {
                        if let Err(errors) = runner.dispatch(event) {
                            tracing::warn!(
                                target: "jvmfs.hook",
                                event = %hook_event_name,
                                %errors,
                                "hook dispatch reported failures"
                            );
                        }
                    })
                    .await;

                match result {
                    Ok(()) => tracing::info!(
                        target: "jvmfs.event",
                        event = %event_name,
                        "subscription finished"
                    ),
                    Err(err) => tracing::warn!(
                        target: "jvmfs.event",
                        event = %event_name,
                        error = %err,
                        "subscription ended with error"
                    ),
                }
            })
        };

        state.runtime = Some(RuntimeHandle { cancel, task });
        Ok(())
    }

    /// Signal the subscription to stop and wait for the background task
    /// to wind down.
    pub async fn cancel(&self) -> Result<(), EventError> {
        let mut state = self.state.write().await;
        let Some(runtime) = state.runtime.take() else {
            return Err(EventError::NotActive(self.name.clone()));
        };

        runtime.cancel.cancel();
        if let Err(err) = runtime.task.await {
            // A panicking hook still counts as a completed cancellation.
            tracing::warn!(
                target: "jvmfs.event",
                event = %self.name,
                error = %err,
                "subscription task join failed"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_are_vm_death_and_suspend_none() {
        let event = DebugEvent::new("watch1");
        assert_eq!(event.kind().await, EventKind::VmDeath);
        assert_eq!(event.suspend_policy().await, SuspendPolicy::None);
        assert!(!event.is_active().await);
    }

    #[tokio::test]
    async fn duplicate_hook_names_are_rejected() {
        let event = DebugEvent::new("watch1");
        event.add_hook("h0", "/tmp/a.so").await.unwrap();
        assert!(matches!(
            event.add_hook("h0", "/tmp/b.so").await,
            Err(EventError::DuplicateHook(_))
        ));
        event.remove_hook("h0").await.unwrap();
        assert!(matches!(
            event.remove_hook("h0").await,
            Err(EventError::UnknownHook(_))
        ));
    }

    #[tokio::test]
    async fn modifier_binding_is_idempotent() {
        let event = DebugEvent::new("watch1");
        let first = ModifierEntry {
            target: "/mnt/classes/42/methods/7".to_string(),
            spec: ModifierSpec::LocationOnly {
                type_tag: 1,
                class_id: 42,
                method_id: 7,
            },
        };
        let second = ModifierEntry {
            target: "/mnt/classes/42/fields/3".to_string(),
            spec: ModifierSpec::FieldOnly {
                class_id: 42,
                field_id: 3,
            },
        };
        event.add_modifier("m0", first).await;
        event.add_modifier("m0", second.clone()).await;

        let snapshot = event.snapshot().await;
        assert_eq!(snapshot.modifiers.len(), 1);
        assert_eq!(snapshot.modifiers["m0"].spec, second.spec);

        event.remove_modifier("m0").await.unwrap();
        assert!(matches!(
            event.remove_modifier("m0").await,
            Err(EventError::UnknownModifier(_))
        ));
    }

    #[tokio::test]
    async fn cancel_requires_active() {
        let event = DebugEvent::new("watch1");
        assert!(matches!(
            event.cancel().await,
            Err(EventError::NotActive(_))
        ));
    }

    #[test]
    fn modifier_specs_encode_to_the_matching_wire_modifier() {
        let field = ModifierSpec::FieldOnly {
            class_id: 42,
            field_id: 3,
        };
        assert_eq!(
            field.to_wire(),
            EventModifier::FieldOnly {
                declaring: 42,
                field: 3
            }
        );

        let location = ModifierSpec::LocationOnly {
            type_tag: 1,
            class_id: 42,
            method_id: 7,
        };
        assert_eq!(
            location.to_wire(),
            EventModifier::LocationOnly {
                location: Location {
                    type_tag: 1,
                    class_id: 42,
                    method_id: 7,
                    index: 0
                }
            }
        );
    }
}
