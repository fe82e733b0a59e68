use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::now_utc_rfc3339;
use crate::domain::project::{normalize_tags, normalize_text};
use crate::domain::{normalize_alias, ProjectRecord};
use crate::project_id::{fingerprint, is_valid_project_id};

pub mod discovery;

pub const REGISTRY_FILE: &str = "registry.json";
pub const REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    pub version: u32,
    pub projects: BTreeMap<String, ProjectRecord>,
    #[serde(default)]
    pub active_project_id: Option<String>,
    #[serde(skip)]
    fingerprint: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub root: Option<PathBuf>,
    pub add_aliases: Vec<String>,
    pub remove_aliases: Vec<String>,
    pub description: Option<String>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    /// `Some(None)` clears the remote.
    pub git_remote: Option<Option<String>>,
    pub markers: Option<Vec<String>>,
}

impl ProjectPatch {
    pub fn has_changes(&self) -> bool {
        self.name.is_some()
            || self.root.is_some()
            || !self.add_aliases.is_empty()
            || !self.remove_aliases.is_empty()
            || self.description.is_some()
            || !self.add_tags.is_empty()
            || !self.remove_tags.is_empty()
            || self.git_remote.is_some()
            || self.markers.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub context: String,
    pub issues: Vec<String>,
}

impl ValidationError {
    pub fn new(context: impl Into<String>, issues: Vec<String>) -> Self {
        Self {
            context: context.into(),
            issues,
        }
    }

    pub fn single(context: impl Into<String>, issue: impl Into<String>) -> Self {
        Self::new(context, vec![issue.into()])
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.context, self.issues.join("; "))
    }
}

impl Error for ValidationError {}

#[derive(Debug)]
pub enum RegistryError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
    Validation(ValidationError),
    DuplicateId(String),
    NotFound(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Io(err) => write!(f, "registry I/O error: {}", err),
            RegistryError::Serialize(err) => {
                write!(f, "failed to serialize registry as JSON: {}", err)
            }
            RegistryError::Validation(err) => write!(f, "validation error: {}", err),
            RegistryError::DuplicateId(id) => {
                write!(f, "project id '{}' is already registered", id)
            }
            RegistryError::NotFound(reference) => {
                write!(f, "project '{}' not found in registry", reference)
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistryError::Io(err) => Some(err),
            RegistryError::Serialize(err) => Some(err),
            RegistryError::Validation(err) => Some(err),
            RegistryError::DuplicateId(_) => None,
            RegistryError::NotFound(_) => None,
        }
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(value: std::io::Error) -> Self {
        RegistryError::Io(value)
    }
}

impl From<ValidationError> for RegistryError {
    fn from(value: ValidationError) -> Self {
        RegistryError::Validation(value)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::empty()
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            version: REGISTRY_VERSION,
            projects: BTreeMap::new(),
            active_project_id: None,
            fingerprint: String::new(),
        }
    }

    /// SHA-256 of the bytes this registry was loaded from; empty when it was
    /// never read from disk.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn get(&self, id: &str) -> Option<&ProjectRecord> {
        self.projects.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&ProjectRecord, RegistryError> {
        self.get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn records(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.projects.values()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn list(&self) -> Vec<&ProjectRecord> {
        let mut records = self.projects.values().collect::<Vec<_>>();
        records.sort_by(|left, right| {
            left.name
                .to_lowercase()
                .cmp(&right.name.to_lowercase())
                .then_with(|| left.id.cmp(&right.id))
        });
        records
    }

    /// Name or alias match, case-insensitive.
    pub fn find_by_alias(&self, text: &str) -> Option<&ProjectRecord> {
        let needle = normalize_alias(text)?;
        self.projects
            .values()
            .find(|record| record.identity_keys().contains(&needle))
    }

    /// Id first, then name or alias.
    pub fn find_by_reference(&self, reference: &str) -> Option<&ProjectRecord> {
        let trimmed = reference.trim();
        self.projects
            .get(trimmed)
            .or_else(|| self.find_by_alias(trimmed))
    }

    pub fn active(&self) -> Option<&ProjectRecord> {
        self.active_project_id
            .as_deref()
            .and_then(|id| self.projects.get(id))
    }

    pub fn add_project(&mut self, record: ProjectRecord) -> Result<ProjectRecord, RegistryError> {
        if self.projects.contains_key(&record.id) {
            return Err(RegistryError::DuplicateId(record.id));
        }
        let record = normalize_record(record)?;
        self.check_collisions(&record, None)?;
        self.projects.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn update_project(
        &mut self,
        id: &str,
        patch: ProjectPatch,
    ) -> Result<ProjectRecord, RegistryError> {
        if !patch.has_changes() {
            return Err(ValidationError::single(
                format!("project '{}'", id),
                "update requires at least one field change",
            )
            .into());
        }
        let mut next = self.require(id)?.clone();

        if let Some(name) = patch.name {
            next.name = name;
        }
        if let Some(root) = patch.root {
            next.root = root;
        }
        for alias in &patch.remove_aliases {
            if let Some(alias) = normalize_alias(alias) {
                next.aliases.remove(&alias);
            }
        }
        next.aliases.extend(patch.add_aliases);
        if let Some(description) = patch.description {
            next.description = Some(description);
        }
        let removed_tags = normalize_tags(&patch.remove_tags);
        next.tags.extend(patch.add_tags);
        next.tags = normalize_tags(&next.tags)
            .into_iter()
            .filter(|tag| !removed_tags.contains(tag))
            .collect();
        if let Some(remote) = patch.git_remote {
            next.git_remote = remote;
        }
        if let Some(markers) = patch.markers {
            next.markers = markers;
        }

        let next = normalize_record(next)?;
        self.check_collisions(&next, Some(id))?;
        self.projects.insert(next.id.clone(), next.clone());
        Ok(next)
    }

    pub fn remove_project(&mut self, id: &str) -> Result<ProjectRecord, RegistryError> {
        let removed = self
            .projects
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if self.active_project_id.as_deref() == Some(id) {
            self.active_project_id = None;
        }
        Ok(removed)
    }

    pub fn set_active(&mut self, id: Option<&str>) -> Result<(), RegistryError> {
        match id {
            Some(id) => {
                self.require(id)?;
                self.active_project_id = Some(id.to_string());
            }
            None => self.active_project_id = None,
        }
        Ok(())
    }

    /// Returns `false` when the alias is already present on the record.
    pub fn add_alias(&mut self, id: &str, alias: &str) -> Result<bool, RegistryError> {
        let normalized = normalize_alias(alias).ok_or_else(|| {
            ValidationError::single(format!("project '{}'", id), "alias cannot be empty")
        })?;
        let record = self.require(id)?;
        if record.identity_keys().contains(&normalized) {
            return Ok(false);
        }
        let mut next = record.clone();
        next.aliases.insert(normalized);
        self.check_collisions(&next, Some(id))?;
        self.projects.insert(next.id.clone(), next);
        Ok(true)
    }

    pub fn touch_last_used(&mut self, id: &str, at: &str) -> Result<(), RegistryError> {
        let record = self
            .projects
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        record.last_used_at = Some(at.to_string());
        Ok(())
    }

    fn check_collisions(
        &self,
        candidate: &ProjectRecord,
        exclude_id: Option<&str>,
    ) -> Result<(), RegistryError> {
        let keys = namespace_keys(candidate);
        let mut issues = Vec::new();
        for other in self.projects.values() {
            if Some(other.id.as_str()) == exclude_id || other.id == candidate.id {
                continue;
            }
            let other_keys = namespace_keys(other);
            for key in &keys {
                if other_keys.contains(key) {
                    issues.push(format!(
                        "'{}' is already used by project '{}'",
                        key, other.id
                    ));
                }
            }
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(format!("project '{}'", candidate.id), issues).into())
        }
    }

    pub fn schema_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.version != REGISTRY_VERSION {
            issues.push(format!(
                "unsupported registry version {} (expected {})",
                self.version, REGISTRY_VERSION
            ));
        }

        let mut claimed: HashMap<String, String> = HashMap::new();
        for (key, record) in &self.projects {
            if key != &record.id {
                issues.push(format!(
                    "project key '{}' does not match record id '{}'",
                    key, record.id
                ));
            }
            if !is_valid_project_id(&record.id) {
                issues.push(format!("project id '{}' is not a valid slug", record.id));
            }
            if record.name.trim().is_empty() {
                issues.push(format!("project '{}' has an empty name", record.id));
            }
            if !record.root.is_absolute() {
                issues.push(format!(
                    "project '{}' root '{}' is not absolute",
                    record.id,
                    record.root.display()
                ));
            }
            for alias in &record.aliases {
                if normalize_alias(alias).as_deref() != Some(alias.as_str()) {
                    issues.push(format!(
                        "project '{}' alias '{}' is not normalized",
                        record.id, alias
                    ));
                }
            }
            if OffsetDateTime::parse(&record.created_at, &Rfc3339).is_err() {
                issues.push(format!(
                    "project '{}' created_at '{}' is not RFC3339",
                    record.id, record.created_at
                ));
            }
            if let Some(last_used) = record.last_used_at.as_deref() {
                if OffsetDateTime::parse(last_used, &Rfc3339).is_err() {
                    issues.push(format!(
                        "project '{}' last_used_at '{}' is not RFC3339",
                        record.id, last_used
                    ));
                }
            }
            for name_key in namespace_keys(record) {
                match claimed.get(&name_key) {
                    Some(owner) if owner != &record.id => issues.push(format!(
                        "'{}' is claimed by both '{}' and '{}'",
                        name_key, owner, record.id
                    )),
                    Some(_) => {}
                    None => {
                        claimed.insert(name_key, record.id.clone());
                    }
                }
            }
        }

        if let Some(active) = self.active_project_id.as_deref() {
            if !self.projects.contains_key(active) {
                issues.push(format!(
                    "active_project_id '{}' does not reference a registered project",
                    active
                ));
            }
        }
        issues
    }
}

/// Id, name and aliases share one case-insensitive namespace.
fn namespace_keys(record: &ProjectRecord) -> Vec<String> {
    let mut keys = vec![record.id.clone()];
    for key in record.identity_keys() {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn normalize_record(mut record: ProjectRecord) -> Result<ProjectRecord, RegistryError> {
    let context = format!("project '{}'", record.id);
    if !is_valid_project_id(&record.id) {
        return Err(ValidationError::single(
            context,
            "id must be a lowercase slug ([a-z0-9][a-z0-9._-]*)",
        )
        .into());
    }
    let name = record.name.trim();
    if name.is_empty() {
        return Err(ValidationError::single(context, "name cannot be empty").into());
    }
    record.name = name.to_string();
    record.root = validate_root(&context, &record.root)?;
    record.aliases = record
        .aliases
        .iter()
        .filter_map(|alias| normalize_alias(alias))
        .collect();
    record.description = normalize_text(record.description.as_deref());
    record.tags = normalize_tags(&record.tags);
    record.git_remote = normalize_text(record.git_remote.as_deref());
    record.markers = record
        .markers
        .iter()
        .filter_map(|marker| normalize_text(Some(marker)))
        .collect();
    if record.created_at.trim().is_empty() {
        record.created_at = now_utc_rfc3339();
    }
    Ok(record)
}

fn validate_root(context: &str, root: &Path) -> Result<PathBuf, RegistryError> {
    if !root.is_absolute() {
        return Err(ValidationError::single(
            context,
            format!("root '{}' must be an absolute path", root.display()),
        )
        .into());
    }
    if !root.is_dir() {
        return Err(ValidationError::single(
            context,
            format!("root '{}' is not an existing directory", root.display()),
        )
        .into());
    }
    Ok(fs::canonicalize(root)?)
}

pub(crate) fn write_and_replace(tmp_path: &Path, payload: &[u8], target: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(tmp_path)?;
    file.write_all(payload)?;
    file.sync_all()?;
    fs::rename(tmp_path, target)
}

#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty registry; anything unreadable or invalid is
    /// an error and never replaced by an empty fallback.
    pub fn load(&self) -> Result<Registry, RegistryError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "registry file absent");
                return Ok(Registry::empty());
            }
            Err(err) => return Err(err.into()),
        };

        let context = format!("registry '{}' is untrusted", self.path.display());
        let mut registry: Registry = serde_json::from_slice(&bytes).map_err(|err| {
            ValidationError::single(context.clone(), format!("malformed registry: {}", err))
        })?;
        let issues = registry.schema_issues();
        if !issues.is_empty() {
            tracing::warn!(
                path = %self.path.display(),
                issues = issues.len(),
                "registry failed schema validation"
            );
            return Err(ValidationError::new(context, issues).into());
        }
        registry.fingerprint = fingerprint(&bytes);
        tracing::debug!(
            path = %self.path.display(),
            projects = registry.projects.len(),
            "registry loaded"
        );
        Ok(registry)
    }

    /// Temp file in the same directory, fsync, then rename over the target.
    pub fn save(&self, registry: &Registry) -> Result<(), RegistryError> {
        let issues = registry.schema_issues();
        if !issues.is_empty() {
            return Err(ValidationError::new("refusing to save registry", issues).into());
        }
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(REGISTRY_FILE);
        let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::now_v7()));

        let mut payload = serde_json::to_vec_pretty(registry).map_err(RegistryError::Serialize)?;
        payload.push(b'\n');

        if let Err(err) = write_and_replace(&tmp_path, &payload, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        tracing::info!(
            path = %self.path.display(),
            projects = registry.projects.len(),
            "registry saved"
        );
        Ok(())
    }

    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Registry) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut registry = self.load()?;
        let outcome = change(&mut registry)?;
        self.save(&registry)?;
        Ok(outcome)
    }

    pub fn add_project(&self, record: ProjectRecord) -> Result<ProjectRecord, RegistryError> {
        self.mutate(|registry| registry.add_project(record))
    }

    pub fn update_project(
        &self,
        id: &str,
        patch: ProjectPatch,
    ) -> Result<ProjectRecord, RegistryError> {
        self.mutate(|registry| registry.update_project(id, patch))
    }

    pub fn remove_project(&self, id: &str) -> Result<ProjectRecord, RegistryError> {
        self.mutate(|registry| registry.remove_project(id))
    }

    pub fn get_project(&self, id: &str) -> Result<ProjectRecord, RegistryError> {
        self.load()?.require(id).cloned()
    }

    pub fn list_projects(&self) -> Result<Vec<ProjectRecord>, RegistryError> {
        Ok(self.load()?.list().into_iter().cloned().collect())
    }

    pub fn find_by_alias(&self, text: &str) -> Result<Option<ProjectRecord>, RegistryError> {
        Ok(self.load()?.find_by_alias(text).cloned())
    }

    pub fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<ProjectRecord>, RegistryError> {
        Ok(self.load()?.find_by_reference(reference).cloned())
    }

    pub fn get_active_project(&self) -> Result<Option<ProjectRecord>, RegistryError> {
        Ok(self.load()?.active().cloned())
    }

    pub fn set_active_project(&self, id: Option<&str>) -> Result<(), RegistryError> {
        self.mutate(|registry| registry.set_active(id))
    }

    pub fn add_alias(&self, id: &str, alias: &str) -> Result<bool, RegistryError> {
        let mut registry = self.load()?;
        let added = registry.add_alias(id, alias)?;
        if added {
            self.save(&registry)?;
        }
        Ok(added)
    }

    pub fn touch_last_used(&self, id: &str) -> Result<(), RegistryError> {
        let at = now_utc_rfc3339();
        self.mutate(|registry| registry.touch_last_used(id, &at))
    }
}
