use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::Registry;
use crate::domain::normalize_alias;
use crate::project_id::generate_project_id;

const SKIPPED_DIRS: [&str; 4] = ["node_modules", "target", "vendor", "dist"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiscoveredProject {
    pub id: String,
    pub name: String,
    pub root: PathBuf,
    pub marker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

impl DiscoveredProject {
    pub fn is_new(&self) -> bool {
        self.skipped.is_none()
    }
}

/// Directories below `base` (up to `max_depth` levels) that contain a marker
/// file. A directory that qualifies is not descended into.
pub fn discover_projects(
    base: &Path,
    max_depth: usize,
    markers: &[String],
    registry: &Registry,
) -> std::io::Result<Vec<DiscoveredProject>> {
    let base = std::fs::canonicalize(base)?;
    let registered_roots = registry
        .records()
        .map(|record| record.root.clone())
        .collect::<HashSet<_>>();

    let mut found = Vec::new();
    let mut queue = VecDeque::from([(base, 0usize)]);
    while let Some((dir, depth)) = queue.pop_front() {
        if depth > 0 {
            if let Some(marker) = first_marker(&dir, markers) {
                if !registered_roots.contains(&dir) {
                    found.push((dir, marker));
                }
                continue;
            }
        }
        if depth >= max_depth {
            continue;
        }
        let mut children = std::fs::read_dir(&dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && !is_skipped_dir(path))
            .collect::<Vec<_>>();
        children.sort();
        queue.extend(children.into_iter().map(|child| (child, depth + 1)));
    }
    found.sort();

    let mut taken_ids = HashSet::new();
    let mut taken_names = HashSet::new();
    let mut discovered = Vec::with_capacity(found.len());
    for (root, marker) in found {
        let name = root
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("project")
            .to_string();
        let key = normalize_alias(&name).unwrap_or_default();
        let skipped = if let Some(existing) = registry.find_by_alias(&name) {
            Some(format!("name already used by project '{}'", existing.id))
        } else if !taken_names.insert(key) {
            Some("name duplicates another discovered directory".to_string())
        } else {
            None
        };
        let id = generate_project_id(&name, |candidate| {
            registry.get(candidate).is_some() || taken_ids.contains(candidate)
        });
        if skipped.is_none() {
            taken_ids.insert(id.clone());
        }
        discovered.push(DiscoveredProject {
            id,
            name,
            root,
            marker,
            skipped,
        });
    }
    Ok(discovered)
}

fn first_marker(dir: &Path, markers: &[String]) -> Option<String> {
    markers
        .iter()
        .find(|marker| dir.join(marker.as_str()).exists())
        .cloned()
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::discover_projects;
    use crate::domain::ProjectRecord;
    use crate::registry::Registry;

    fn unique_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("projctx-discover-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        std::fs::canonicalize(dir).expect("temp dir should canonicalize")
    }

    fn markers() -> Vec<String> {
        vec!["Cargo.toml".to_string(), ".git".to_string()]
    }

    #[test]
    fn finds_marker_directories_and_stops_descending() {
        let base = unique_dir();
        std::fs::create_dir_all(base.join("alpha/crates/inner")).expect("mkdir");
        std::fs::write(base.join("alpha/Cargo.toml"), "").expect("marker");
        std::fs::write(base.join("alpha/crates/inner/Cargo.toml"), "").expect("marker");
        std::fs::create_dir_all(base.join("group/beta/.git")).expect("mkdir");
        std::fs::create_dir_all(base.join("plain")).expect("mkdir");

        let found = discover_projects(&base, 3, &markers(), &Registry::empty())
            .expect("discovery should succeed");
        let names = found
            .iter()
            .map(|project| project.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert!(found.iter().all(|project| project.is_new()));
        assert_eq!(found[1].marker, ".git");

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn respects_depth_limit() {
        let base = unique_dir();
        std::fs::create_dir_all(base.join("a/b/deep")).expect("mkdir");
        std::fs::write(base.join("a/b/deep/Cargo.toml"), "").expect("marker");

        let shallow = discover_projects(&base, 2, &markers(), &Registry::empty())
            .expect("discovery should succeed");
        assert!(shallow.is_empty());
        let deep = discover_projects(&base, 3, &markers(), &Registry::empty())
            .expect("discovery should succeed");
        assert_eq!(deep.len(), 1);

        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn skips_registered_roots_and_reports_name_collisions() {
        let base = unique_dir();
        std::fs::create_dir_all(base.join("alpha")).expect("mkdir");
        std::fs::create_dir_all(base.join("other/gamma")).expect("mkdir");
        std::fs::write(base.join("alpha/Cargo.toml"), "").expect("marker");
        std::fs::write(base.join("other/gamma/Cargo.toml"), "").expect("marker");

        let mut registry = Registry::empty();
        registry
            .add_project(ProjectRecord {
                id: "alpha".to_string(),
                name: "alpha".to_string(),
                root: base.join("alpha"),
                aliases: BTreeSet::from(["gamma".to_string()]),
                description: None,
                tags: Vec::new(),
                git_remote: None,
                markers: Vec::new(),
                created_at: "2026-03-01T10:00:00Z".to_string(),
                last_used_at: None,
            })
            .expect("add should succeed");

        let found = discover_projects(&base, 3, &markers(), &registry)
            .expect("discovery should succeed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "gamma");
        assert!(!found[0].is_new());
        assert!(found[0]
            .skipped
            .as_deref()
            .is_some_and(|reason| reason.contains("alpha")));

        let _ = std::fs::remove_dir_all(base);
    }
}
