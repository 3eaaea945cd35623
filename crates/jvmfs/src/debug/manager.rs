use std::sync::Arc;

use tokio::sync::RwLock;

use jvmfs_jdwp::JdwpClient;

use super::event::DebugEvent;
use super::EventError;

/// Process-wide registry of debugging events, keyed by user-chosen name.
///
/// The manager is the sole owner of event objects; filesystem nodes hold
/// only the name and re-resolve it on every callback, so a stale node is
/// just a lookup miss.
pub struct EventManager {
    client: JdwpClient,
    // Creation order is the readdir order.
    events: RwLock<Vec<Arc<DebugEvent>>>,
}

impl EventManager {
    pub fn new(client: JdwpClient) -> Self {
        Self {
            client,
            events: RwLock::new(Vec::new()),
        }
    }

    pub async fn create(&self, name: &str) -> Result<Arc<DebugEvent>, EventError> {
        let mut events = self.events.write().await;
        if events.iter().any(|event| event.name() == name) {
            return Err(EventError::DuplicateEvent(name.to_string()));
        }

        let event = Arc::new(DebugEvent::new(name));
        events.push(event.clone());
        Ok(event)
    }

    pub async fn get(&self, name: &str) -> Result<Arc<DebugEvent>, EventError> {
        let events = self.events.read().await;
        events
            .iter()
            .find(|event| event.name() == name)
            .cloned()
            .ok_or_else(|| EventError::UnknownEvent(name.to_string()))
    }

    pub async fn list(&self) -> Vec<Arc<DebugEvent>> {
        self.events.read().await.clone()
    }

    /// Remove an idle event. The activity check and the erasure happen
    /// under one write guard so a concurrent activation cannot slip in
    /// between them.
    pub async fn remove(&self, name: &str) -> Result<(), EventError> {
        let mut events = self.events.write().await;
        let index = events
            .iter()
            .position(|event| event.name() == name)
            .ok_or_else(|| EventError::UnknownEvent(name.to_string()))?;

        if events[index].is_active().await {
            return Err(EventError::EventActive(name.to_string()));
        }

        events.remove(index);
        Ok(())
    }

    pub async fn run(&self, name: &str) -> Result<(), EventError> {
        let event = self.get(name).await?;
        event.activate(&self.client).await
    }

    pub async fn cancel(&self, name: &str) -> Result<(), EventError> {
        let event = self.get(name).await?;
        event.cancel().await
    }

    /// Cancel every active event. Used at unmount.
    pub async fn shutdown(&self) {
        let events = self.list().await;
        for event in events {
            if event.is_active().await {
                if let Err(err) = event.cancel().await {
                    tracing::warn!(
                        target: "jvmfs.event",
                        event = %event.name(),
                        error = %err,
                        "failed to cancel event during shutdown"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jvmfs_jdwp::mock::MockJvm;

    async fn manager() -> (MockJvm, EventManager) {
        let jvm = MockJvm::spawn().await;
        let client = JdwpClient::connect(jvm.addr()).await.unwrap();
        (jvm, EventManager::new(client))
    }

    #[tokio::test]
    async fn names_are_unique() {
        let (jvm, manager) = manager().await;

        manager.create("watch1").await.unwrap();
        assert!(matches!(
            manager.create("watch1").await,
            Err(EventError::DuplicateEvent(_))
        ));

        jvm.shutdown();
    }

    #[tokio::test]
    async fn list_preserves_creation_order() {
        let (jvm, manager) = manager().await;

        manager.create("b").await.unwrap();
        manager.create("a").await.unwrap();
        manager.create("c").await.unwrap();

        let names: Vec<_> = manager
            .list()
            .await
            .iter()
            .map(|event| event.name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);

        jvm.shutdown();
    }

    #[tokio::test]
    async fn remove_refuses_active_events() {
        let (jvm, manager) = manager().await;

        manager.create("watch1").await.unwrap();
        manager.run("watch1").await.unwrap();

        assert!(matches!(
            manager.remove("watch1").await,
            Err(EventError::EventActive(_))
        ));

        manager.cancel("watch1").await.unwrap();
        manager.remove("watch1").await.unwrap();
        assert!(matches!(
            manager.get("watch1").await,
            Err(EventError::UnknownEvent(_))
        ));

        jvm.shutdown();
    }

    #[tokio::test]
    async fn run_and_cancel_round_trip() {
        let (jvm, manager) = manager().await;

        manager.create("watch1").await.unwrap();
        let event = manager.get("watch1").await.unwrap();

        manager.run("watch1").await.unwrap();
        assert!(event.is_active().await);
        assert!(matches!(
            manager.run("watch1").await,
            Err(EventError::AlreadyActive(_))
        ));

        manager.cancel("watch1").await.unwrap();
        assert!(!event.is_active().await);
        assert!(matches!(
            manager.cancel("watch1").await,
            Err(EventError::NotActive(_))
        ));

        jvm.shutdown();
    }
}
