use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notifications emitted after a store mutation has been persisted.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Event {
    Created { project_id: Uuid, id: Uuid },
    Updated { project_id: Uuid, id: Uuid },
    Moved { project_id: Uuid, id: Uuid },
    Deleted { project_id: Uuid, ids: Vec<Uuid> },
}

impl Event {
    pub fn project_id(&self) -> Uuid {
        match self {
            Event::Created { project_id, .. }
            | Event::Updated { project_id, .. }
            | Event::Moved { project_id, .. }
            | Event::Deleted { project_id, .. } => *project_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
