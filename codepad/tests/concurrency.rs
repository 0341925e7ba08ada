use codepad_core::storage::{NewNode, NodeStore};
use codepad_core::ErrorKind;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[tokio::test]
async fn concurrent_creates_at_same_path_yield_one_conflict() {
    let store = Arc::new(RwLock::new(NodeStore::in_memory()));
    let project = Uuid::new_v4();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut s = store.write().await;
            s.create_node(NewNode::file(project, None, "index.js").with_content(format!("v{}", i)))
                .await
        }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.read().await.list_project(project).len(), 1);
}

#[tokio::test]
async fn concurrent_content_updates_keep_one_winner() {
    let store = Arc::new(RwLock::new(NodeStore::in_memory()));
    let project = Uuid::new_v4();
    let id = {
        let mut s = store.write().await;
        s.create_node(NewNode::file(project, None, "note.txt").with_content("hi"))
            .await
            .unwrap()
            .id
    };

    let s1 = store.clone();
    let s2 = store.clone();
    let t1 = tokio::spawn(async move { s1.write().await.update_content(id, "one").await.unwrap() });
    let t2 = tokio::spawn(async move { s2.write().await.update_content(id, "two").await.unwrap() });
    let _ = tokio::join!(t1, t2);

    let s = store.read().await;
    let text = s.read_content(id).await.unwrap();
    assert!(text == "one" || text == "two");
    assert_eq!(s.get(id).unwrap().version, 3);
}
