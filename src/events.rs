//! Engine event bus.
//!
//! The engine only emits; it never knows who is listening. Subscribers
//! hold a broadcast receiver and drop events if they lag.

use crate::model::signature::EntityCounts;
use tokio::sync::broadcast;

/// Notifications surfaced to callers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Any dataset mutation was persisted.
    DataUpdated,
    /// The active project was switched, created, deleted, or renamed.
    ProjectChanged { project_id: String },
    /// Local and remote master documents diverged.
    MasterSyncConflict {
        local: EntityCounts,
        remote: EntityCounts,
    },
    /// One batch item finished (successfully or not).
    SyncProgress {
        /// 1-based index of the item just processed.
        index: usize,
        total: usize,
        percent: u8,
        current: String,
        succeeded: usize,
        failed: usize,
    },
    /// A batch run finished.
    SyncBatchComplete {
        direction: crate::sync::batch::Direction,
        succeeded: usize,
        failed: usize,
    },
}

/// Emit-only wrapper around a broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }

    /// Send an event. Having no subscribers is not an error.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::new();
        bus.emit(EngineEvent::DataUpdated);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.emit(EngineEvent::ProjectChanged {
            project_id: "p1".into(),
        });
        match rx.recv().await.unwrap() {
            EngineEvent::ProjectChanged { project_id } => assert_eq!(project_id, "p1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
