use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::ProjectRecord;
use crate::registry::Registry;

/// Canonicalized temp directory removed on drop.
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(prefix: &str) -> Self {
        let root = std::env::temp_dir().join(format!("{}-{}", prefix, Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("temp workspace should be creatable");
        let root = std::fs::canonicalize(root).expect("temp workspace should canonicalize");
        Self { root }
    }

    pub fn dir(&self, relative: &str) -> PathBuf {
        let dir = self.root.join(relative);
        std::fs::create_dir_all(&dir).expect("workspace dir should be creatable");
        dir
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

pub fn record(id: &str, root: &Path, aliases: &[&str]) -> ProjectRecord {
    ProjectRecord {
        id: id.to_string(),
        name: id.to_string(),
        root: root.to_path_buf(),
        aliases: aliases
            .iter()
            .map(|alias| (*alias).to_string())
            .collect::<BTreeSet<_>>(),
        description: None,
        tags: Vec::new(),
        git_remote: None,
        markers: Vec::new(),
        created_at: "2026-03-01T10:00:00Z".to_string(),
        last_used_at: None,
    }
}

/// Registers each `(id, relative_root)` under `work/` in the workspace.
pub fn registry_with(ws: &Workspace, projects: &[(&str, &str)]) -> Registry {
    let mut registry = Registry::empty();
    for (id, relative) in projects {
        let root = ws.dir(&format!("work/{}", relative));
        registry
            .add_project(record(id, &root, &[]))
            .expect("test project should register");
    }
    registry
}
