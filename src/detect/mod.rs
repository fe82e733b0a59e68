//! Signal detectors. Each one reads the context (and at most the
//! filesystem) and returns zero or more scored candidates; only the resolver
//! combines them.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::DetectorConfig;
use crate::domain::{rank_order, DetectionCandidate};
use crate::registry::Registry;

pub mod exact;
pub mod fuzzy;
pub mod path;
pub mod remote;

pub use exact::extract_header_label;

/// Everything the caller knows about where an operation is happening and
/// which project it claims to be for.
#[derive(Debug, Clone, Default)]
pub struct DetectionContext {
    pub cwd: Option<PathBuf>,
    /// Free text naming a project, matched exactly and fuzzily.
    pub mention: Option<String>,
    /// Contents of a document whose header may declare a project.
    pub document: Option<String>,
    pub git_remote: Option<String>,
    /// Project the caller explicitly expects to be working on.
    pub expected: Option<String>,
}

impl DetectionContext {
    #[cfg(test)]
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }

    /// The explicit expectation, else the label declared by the document.
    pub fn expected_label(&self, config: &DetectorConfig) -> Option<String> {
        self.expected
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.document
                    .as_deref()
                    .and_then(|doc| extract_header_label(doc, config.header_scan_lines))
            })
    }
}

pub fn run_all(
    context: &DetectionContext,
    registry: &Registry,
    config: &DetectorConfig,
) -> Vec<DetectionCandidate> {
    let mut candidates = Vec::new();
    if let Some(mention) = context.mention.as_deref() {
        candidates.extend(exact::alias_exact(mention, registry));
    }
    if let Some(document) = context.document.as_deref() {
        candidates.extend(exact::document_header(document, registry, config));
    }
    if let Some(cwd) = context.cwd.as_deref() {
        candidates.extend(path::path_match(cwd, registry, config));
        candidates.extend(path::marker_scan(cwd, registry, config));
    }
    if let Some(remote) = context.git_remote.as_deref() {
        candidates.extend(remote::git_remote(remote, registry, config));
    }
    if let Some(mention) = context.mention.as_deref() {
        candidates.extend(fuzzy::fuzzy_name(mention, registry, config));
    }
    tracing::debug!(raw = candidates.len(), "detectors finished");
    candidates
}

/// One candidate per project: highest confidence wins, equal confidence
/// keeps the higher-priority detector. Output is in rank order.
pub fn merge(candidates: Vec<DetectionCandidate>) -> Vec<DetectionCandidate> {
    let mut best: BTreeMap<String, DetectionCandidate> = BTreeMap::new();
    for candidate in candidates {
        match best.get(&candidate.project_id) {
            Some(current) if rank_order(current, &candidate).is_le() => {}
            _ => {
                best.insert(candidate.project_id.clone(), candidate);
            }
        }
    }
    let mut merged = best.into_values().collect::<Vec<_>>();
    merged.sort_by(rank_order);
    merged
}
