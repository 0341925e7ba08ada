//! Per-project aggregate metadata kept current from store events.

use chrono::{DateTime, Utc};
use codepad_core::events::EventBus;
use codepad_core::storage::{NodeStore, NodeType, ProjectId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ProjectStats {
    pub project_id: ProjectId,
    pub file_count: usize,
    pub folder_count: usize,
    pub total_size: u64,
    pub updated_at: DateTime<Utc>,
}

impl ProjectStats {
    pub fn compute(store: &NodeStore, project_id: ProjectId) -> Self {
        let mut stats = Self {
            project_id,
            file_count: 0,
            folder_count: 0,
            total_size: 0,
            updated_at: Utc::now(),
        };
        for node in store.list_project(project_id) {
            match node.node_type {
                NodeType::File => {
                    stats.file_count += 1;
                    stats.total_size += node.size;
                }
                NodeType::Folder => stats.folder_count += 1,
            }
        }
        stats
    }

    pub fn summary(&self) -> String {
        format!(
            "{} files, {} folders, {}",
            self.file_count,
            self.folder_count,
            format_size(self.total_size)
        )
    }
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

type StatsMap = Arc<RwLock<HashMap<ProjectId, ProjectStats>>>;
type PendingMap = Arc<Mutex<HashMap<ProjectId, (u64, JoinHandle<()>)>>>;

/// Debounced recomputation of [`ProjectStats`].
///
/// A burst of changes to one project collapses into a single recompute that
/// runs `debounce` after the last change. A project with no nodes left is
/// dropped from the cache rather than stored as zeroes, so events that trail
/// a project deletion leave nothing behind.
pub struct StatsTracker {
    store: Arc<RwLock<NodeStore>>,
    stats: StatsMap,
    pending: PendingMap,
    generation: AtomicU64,
    debounce: Duration,
}

impl StatsTracker {
    pub fn new(store: Arc<RwLock<NodeStore>>, debounce: Duration) -> Self {
        Self {
            store,
            stats: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            debounce,
        }
    }

    /// Follow `events` until the bus closes.
    pub fn spawn(self: &Arc<Self>, events: &EventBus) -> JoinHandle<()> {
        let tracker = self.clone();
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => tracker.schedule_update(event.project_id()).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "stats tracker lagged; dropping cached stats");
                        tracker.stats.write().await.clear();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn recompute(
        store: Arc<RwLock<NodeStore>>,
        stats: StatsMap,
        pending: PendingMap,
        project_id: ProjectId,
        generation: u64,
        delay: Duration,
    ) {
        sleep(delay).await;
        let fresh = {
            let store = store.read().await;
            ProjectStats::compute(&store, project_id)
        };
        if fresh.file_count + fresh.folder_count == 0 {
            debug!(project = %project_id, "project has no nodes; dropping stats");
            stats.write().await.remove(&project_id);
        } else {
            debug!(project = %project_id, summary = %fresh.summary(), "recomputed project stats");
            stats.write().await.insert(project_id, fresh);
        }
        let mut pending = pending.lock().await;
        // a newer update may already own the slot
        if pending.get(&project_id).map(|(g, _)| *g) == Some(generation) {
            pending.remove(&project_id);
        }
    }

    pub async fn schedule_update(&self, project_id: ProjectId) {
        let mut pending = self.pending.lock().await;
        if let Some((_, handle)) = pending.remove(&project_id) {
            handle.abort();
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(Self::recompute(
            self.store.clone(),
            self.stats.clone(),
            self.pending.clone(),
            project_id,
            generation,
            self.debounce,
        ));
        pending.insert(project_id, (generation, handle));
    }

    /// Cached stats, computed on the spot when the project has none yet.
    pub async fn get(&self, project_id: ProjectId) -> ProjectStats {
        if let Some(stats) = self.stats.read().await.get(&project_id) {
            return stats.clone();
        }
        let fresh = {
            let store = self.store.read().await;
            ProjectStats::compute(&store, project_id)
        };
        self.stats.write().await.insert(project_id, fresh.clone());
        fresh
    }

    pub async fn forget(&self, project_id: ProjectId) {
        if let Some((_, handle)) = self.pending.lock().await.remove(&project_id) {
            handle.abort();
        }
        self.stats.write().await.remove(&project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepad_core::storage::NewNode;
    use uuid::Uuid;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[tokio::test]
    async fn counts_files_folders_and_bytes() {
        let mut store = NodeStore::in_memory();
        let project = Uuid::new_v4();
        let src = store
            .create_node(NewNode::folder(project, None, "src"))
            .await
            .unwrap();
        store
            .create_node(NewNode::file(project, Some(src.id), "a.js").with_content("12345"))
            .await
            .unwrap();
        store
            .create_node(NewNode::file(project, None, "b.js").with_content("123"))
            .await
            .unwrap();

        let stats = ProjectStats::compute(&store, project);
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.folder_count, 1);
        assert_eq!(stats.total_size, 8);
        assert_eq!(stats.summary(), "2 files, 1 folders, 8 B");
    }

    #[tokio::test]
    async fn tracker_follows_store_events() {
        let store = Arc::new(RwLock::new(NodeStore::in_memory()));
        let events = store.read().await.events().clone();
        let tracker = Arc::new(StatsTracker::new(store.clone(), Duration::from_millis(10)));
        let project = Uuid::new_v4();
        assert_eq!(tracker.get(project).await.file_count, 0);

        let _task = tracker.spawn(&events);
        store
            .write()
            .await
            .create_node(NewNode::file(project, None, "main.rs").with_content("fn main() {}"))
            .await
            .unwrap();

        let mut stats = tracker.get(project).await;
        for _ in 0..100 {
            if stats.file_count == 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
            stats = tracker.get(project).await;
        }
        assert_eq!(stats.file_count, 1);
        assert_eq!(stats.total_size, 12);

        tracker.forget(project).await;
        assert!(tracker.stats.read().await.get(&project).is_none());
    }

    #[tokio::test]
    async fn deleted_project_leaves_no_trace() {
        let store = Arc::new(RwLock::new(NodeStore::in_memory()));
        let events = store.read().await.events().clone();
        let tracker = Arc::new(StatsTracker::new(store.clone(), Duration::from_millis(5)));
        let _task = tracker.spawn(&events);
        let project = Uuid::new_v4();

        let src = store
            .write()
            .await
            .create_node(NewNode::folder(project, None, "src"))
            .await
            .unwrap();
        store
            .write()
            .await
            .create_node(NewNode::file(project, Some(src.id), "lib.rs").with_content("pub fn x() {}"))
            .await
            .unwrap();
        store.write().await.delete_project(project).await.unwrap();
        tracker.forget(project).await;

        // trailing delete events still reach the tracker after forget
        sleep(Duration::from_millis(50)).await;
        for _ in 0..100 {
            if tracker.pending.lock().await.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(tracker.pending.lock().await.is_empty());
        assert!(!tracker.stats.read().await.contains_key(&project));
    }

    #[tokio::test]
    async fn finished_updates_release_their_slot() {
        let store = Arc::new(RwLock::new(NodeStore::in_memory()));
        let tracker = StatsTracker::new(store.clone(), Duration::from_millis(1));
        let project = Uuid::new_v4();
        store
            .write()
            .await
            .create_node(NewNode::file(project, None, "a.txt").with_content("abc"))
            .await
            .unwrap();

        tracker.schedule_update(project).await;
        tracker.schedule_update(project).await;
        for _ in 0..100 {
            if tracker.pending.lock().await.is_empty() {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(tracker.pending.lock().await.is_empty());
        assert_eq!(tracker.get(project).await.total_size, 3);
    }
}
