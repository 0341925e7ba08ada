//! Project records and the ownership/public-flag access rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::storage::node::ProjectId;
use crate::storage::validation::validate_name;

const PROJECTS_FILE: &str = "projects.json";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// All known projects, persisted as a single JSON file.
pub struct ProjectDirectory {
    projects: HashMap<ProjectId, Project>,
    file: Option<PathBuf>,
}

impl ProjectDirectory {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let file = dir.join(PROJECTS_FILE);
        let projects = if file.exists() {
            let data = std::fs::read_to_string(&file)?;
            serde_json::from_str(&data)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            projects,
            file: Some(file),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            projects: HashMap::new(),
            file: None,
        }
    }

    fn save(&self) -> Result<()> {
        if let Some(file) = &self.file {
            let data = serde_json::to_string(&self.projects)?;
            // a crash mid-write must leave the previous list intact
            let tmp = file.with_extension("json.tmp");
            std::fs::write(&tmp, data)?;
            std::fs::rename(&tmp, file)?;
        }
        Ok(())
    }

    pub fn create(&mut self, name: &str, owner_id: &str, is_public: bool) -> Result<Project> {
        validate_name(name)?;
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            is_public,
            created_at: Utc::now(),
        };
        self.projects.insert(project.id, project.clone());
        if let Err(e) = self.save() {
            self.projects.remove(&project.id);
            return Err(e);
        }
        tracing::info!(project = %project.id, owner = owner_id, "created project");
        Ok(project)
    }

    pub fn get(&self, id: ProjectId) -> Option<&Project> {
        self.projects.get(&id)
    }

    pub fn require(&self, id: ProjectId) -> Result<&Project> {
        self.get(id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))
    }

    /// Projects the user owns plus every public project, newest first.
    pub fn list_visible(&self, user: &str) -> Vec<&Project> {
        let mut out: Vec<_> = self
            .projects
            .values()
            .filter(|p| p.owner_id == user || p.is_public)
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        out
    }

    pub fn update(
        &mut self,
        id: ProjectId,
        name: Option<&str>,
        is_public: Option<bool>,
    ) -> Result<Project> {
        if let Some(name) = name {
            validate_name(name)?;
        }
        let previous = self.require(id)?.clone();
        let mut project = previous.clone();
        if let Some(name) = name {
            project.name = name.to_string();
        }
        if let Some(flag) = is_public {
            project.is_public = flag;
        }
        self.projects.insert(id, project.clone());
        if let Err(e) = self.save() {
            self.projects.insert(id, previous);
            return Err(e);
        }
        Ok(project)
    }

    pub fn delete(&mut self, id: ProjectId) -> Result<Project> {
        let project = self
            .projects
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("project {}", id)))?;
        if let Err(e) = self.save() {
            self.projects.insert(id, project);
            return Err(e);
        }
        Ok(project)
    }

    /// Owners may read and write; anyone may read a public project.
    pub fn allows(&self, id: ProjectId, user: &str, access: Access) -> bool {
        match self.projects.get(&id) {
            Some(p) if p.owner_id == user => true,
            Some(p) => access == Access::Read && p.is_public,
            None => false,
        }
    }

    pub fn can_read(&self, id: ProjectId, user: &str) -> bool {
        self.allows(id, user, Access::Read)
    }

    pub fn can_write(&self, id: ProjectId, user: &str) -> bool {
        self.allows(id, user, Access::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_and_public_access() {
        let mut projects = ProjectDirectory::in_memory();
        let private = projects.create("secret", "alice", false).unwrap();
        let public = projects.create("demo", "alice", true).unwrap();

        assert!(projects.can_read(private.id, "alice"));
        assert!(projects.can_write(private.id, "alice"));
        assert!(!projects.can_read(private.id, "bob"));

        assert!(projects.can_read(public.id, "bob"));
        assert!(!projects.can_write(public.id, "bob"));

        assert!(!projects.can_read(Uuid::new_v4(), "alice"));
    }

    #[test]
    fn list_visible_includes_public_projects() {
        let mut projects = ProjectDirectory::in_memory();
        projects.create("mine", "bob", false).unwrap();
        projects.create("theirs", "alice", false).unwrap();
        projects.create("shared", "alice", true).unwrap();
        let mut names: Vec<_> = projects
            .list_visible("bob")
            .into_iter()
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["mine", "shared"]);
    }

    #[test]
    fn persists_across_reopen() {
        let tempdir = tempfile::tempdir().unwrap();
        let id = {
            let mut projects = ProjectDirectory::open(tempdir.path()).unwrap();
            let p = projects.create("site", "carol", false).unwrap();
            projects.update(p.id, None, Some(true)).unwrap();
            p.id
        };
        let projects = ProjectDirectory::open(tempdir.path()).unwrap();
        let p = projects.get(id).unwrap();
        assert_eq!(p.name, "site");
        assert!(p.is_public);
    }

    #[test]
    fn interrupted_save_leaves_previous_list_readable() {
        let tempdir = tempfile::tempdir().unwrap();
        let id = {
            let mut projects = ProjectDirectory::open(tempdir.path()).unwrap();
            projects.create("site", "carol", false).unwrap().id
        };
        let tmp = tempdir.path().join("projects.json.tmp");
        assert!(!tmp.exists());

        // a half-written replacement from a crashed save
        std::fs::write(&tmp, "{\"trunc").unwrap();
        let mut projects = ProjectDirectory::open(tempdir.path()).unwrap();
        assert!(projects.get(id).is_some());

        projects.create("docs", "carol", true).unwrap();
        assert!(!tmp.exists());
        assert_eq!(ProjectDirectory::open(tempdir.path()).unwrap().list_visible("carol").len(), 2);
    }

    #[test]
    fn rejects_invalid_names_and_unknown_ids() {
        let mut projects = ProjectDirectory::in_memory();
        assert!(projects.create("a/b", "carol", false).is_err());
        let err = projects.delete(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
