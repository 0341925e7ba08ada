//! Disk-backed node store behaviour across restarts.

use anyhow::Result;
use codepad_core::events::EventBus;
use codepad_core::storage::{
    DiskCollection, FsBlobStorage, NewNode, NodeChange, NodeCollection, NodeStore, StoreConfig,
};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

fn open(dir: &TempDir) -> Result<NodeStore> {
    let blobs = Arc::new(FsBlobStorage::new(dir.path().join("blobs"))?);
    Ok(NodeStore::open_dir(
        dir.path().join("nodes"),
        blobs,
        EventBus::new(),
        StoreConfig::default(),
    )?)
}

#[tokio::test]
async fn test_tree_and_content_survive_reopen() -> Result<()> {
    let dir = TempDir::new()?;
    let project = Uuid::new_v4();
    let (src, app) = {
        let mut store = open(&dir)?;
        let src = store.create_node(NewNode::folder(project, None, "src")).await?;
        let app = store
            .create_node(NewNode::file(project, Some(src.id), "App.jsx").with_content("export {}"))
            .await?;
        store.update_content(app.id, "export default App;").await?;
        store.rename_or_move(src.id, NodeChange::rename("app"))?;
        (src.id, app.id)
    };

    let store = open(&dir)?;
    assert_eq!(store.len(), 2);
    let node = store.find_by_path(project, "/app/App.jsx").expect("moved file");
    assert_eq!(node.id, app);
    assert_eq!(node.parent_id, Some(src));
    assert_eq!(node.version, 2);
    assert_eq!(store.read_content(app).await?, "export default App;");
    assert!(store.orphan_ids().is_empty());

    let tree = store.build_tree(project);
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].path, "/app");
    assert_eq!(tree[0].children[0].path, "/app/App.jsx");
    Ok(())
}

#[tokio::test]
async fn test_delete_leaves_no_records_or_blobs() -> Result<()> {
    let dir = TempDir::new()?;
    let project = Uuid::new_v4();
    let mut store = open(&dir)?;
    let src = store.create_node(NewNode::folder(project, None, "src")).await?;
    let lib = store
        .create_node(NewNode::folder(project, Some(src.id), "lib"))
        .await?;
    for name in ["a.js", "b.js"] {
        store
            .create_node(NewNode::file(project, Some(lib.id), name).with_content(name))
            .await?;
    }
    store.delete_subtree(src.id).await?;
    drop(store);

    let collection = DiskCollection::new(dir.path().join("nodes"))?;
    assert!(collection.load_all()?.is_empty());
    let leftover = std::fs::read_dir(dir.path().join("blobs"))?
        .flatten()
        .flat_map(|e| walk(&e.path()))
        .count();
    assert_eq!(leftover, 0);

    let store = open(&dir)?;
    assert!(store.is_empty());
    Ok(())
}

fn walk(path: &std::path::Path) -> Vec<std::path::PathBuf> {
    if path.is_dir() {
        std::fs::read_dir(path)
            .map(|rd| rd.flatten().flat_map(|e| walk(&e.path())).collect())
            .unwrap_or_default()
    } else {
        vec![path.to_path_buf()]
    }
}

#[tokio::test]
async fn test_conflicting_create_writes_no_record() -> Result<()> {
    let dir = TempDir::new()?;
    let project = Uuid::new_v4();
    let mut store = open(&dir)?;
    store.create_node(NewNode::file(project, None, "index.js")).await?;
    assert!(store
        .create_node(NewNode::folder(project, None, "index.js"))
        .await
        .is_err());
    drop(store);

    let collection = DiskCollection::new(dir.path().join("nodes"))?;
    assert_eq!(collection.load_all()?.len(), 1);
    Ok(())
}
