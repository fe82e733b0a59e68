use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub root: PathBuf,
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_remote: Option<String>,
    #[serde(default)]
    pub markers: Vec<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
}

impl ProjectRecord {
    /// Lowercased name followed by every alias; the namespace that must stay
    /// unique across the registry.
    pub fn identity_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.aliases.len() + 1);
        if let Some(name) = normalize_alias(&self.name) {
            keys.push(name);
        }
        for alias in &self.aliases {
            if !keys.contains(alias) {
                keys.push(alias.clone());
            }
        }
        keys
    }

    pub fn root_exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn missing_markers(&self) -> Vec<String> {
        self.markers
            .iter()
            .filter(|marker| !self.root.join(marker.as_str()).exists())
            .cloned()
            .collect()
    }
}

pub fn normalize_alias(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

pub fn normalize_text(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized = tags
        .iter()
        .filter_map(|tag| normalize_alias(tag))
        .collect::<Vec<_>>();
    normalized.sort();
    normalized.dedup();
    normalized
}
