use std::fmt;

use serde::Serialize;

use crate::config::Config;
use crate::detect::{self, DetectionContext};
use crate::domain::{DetectionCandidate, ProjectRecord};
use crate::registry::Registry;

/// Absorbs float noise so that values printed as equal compare as equal.
pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resolved,
    Ambiguous,
    Mismatch,
    None,
}

impl ResolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStatus::Resolved => "RESOLVED",
            ResolutionStatus::Ambiguous => "AMBIGUOUS",
            ResolutionStatus::Mismatch => "MISMATCH",
            ResolutionStatus::None => "NONE",
        }
    }
}

impl fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Project label the caller (or the document) says the operation is for.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExpectedProject {
    pub label: String,
    /// `None` when the label names no registered project.
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolutionResult {
    pub status: ResolutionStatus,
    /// For MISMATCH this is the project the current location points at.
    pub best_candidate: Option<DetectionCandidate>,
    pub all_candidates: Vec<DetectionCandidate>,
    pub contenders: Vec<DetectionCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedProject>,
    pub warnings: Vec<String>,
}

impl ResolutionResult {
    pub fn best_project_id(&self) -> Option<&str> {
        self.best_candidate
            .as_ref()
            .map(|candidate| candidate.project_id.as_str())
    }

    pub fn confidence(&self) -> f64 {
        self.best_candidate
            .as_ref()
            .map(|candidate| candidate.confidence)
            .unwrap_or(0.0)
    }

    pub fn is_resolved(&self) -> bool {
        self.status == ResolutionStatus::Resolved
    }
}

pub fn stale_root_warning(record: &ProjectRecord) -> String {
    format!(
        "project '{}' root {} no longer exists",
        record.id,
        record.root.display()
    )
}

pub fn resolve(
    context: &DetectionContext,
    registry: &Registry,
    config: &Config,
) -> ResolutionResult {
    let thresholds = &config.resolver;
    let raw = detect::run_all(context, registry, &config.detectors);
    let location = detect::merge(
        raw.iter()
            .filter(|candidate| candidate.matched_via.is_location_signal())
            .cloned()
            .collect(),
    );
    let all_candidates = detect::merge(raw);

    let mut warnings = Vec::new();
    let expected = context
        .expected_label(&config.detectors)
        .map(|label| ExpectedProject {
            project_id: registry.find_by_reference(&label).map(|record| record.id.clone()),
            label,
        });
    if let Some(expected) = expected.as_ref().filter(|expected| expected.project_id.is_none()) {
        warnings.push(format!(
            "expected project '{}' is not registered",
            expected.label
        ));
    }
    for candidate in &all_candidates {
        if let Some(record) = registry.get(&candidate.project_id) {
            if !record.root_exists() {
                tracing::warn!(
                    project = %record.id,
                    root = %record.root.display(),
                    "stale project root"
                );
                warnings.push(stale_root_warning(record));
            }
        }
    }

    let result = |status: ResolutionStatus,
                  best: Option<DetectionCandidate>,
                  contenders: Vec<DetectionCandidate>,
                  warnings: Vec<String>| {
        ResolutionResult {
            status,
            best_candidate: best,
            all_candidates: all_candidates.clone(),
            contenders,
            expected: expected.clone(),
            warnings,
        }
    };

    let Some(top) = all_candidates.first().cloned() else {
        tracing::debug!("no detector produced a candidate");
        return result(ResolutionStatus::None, None, Vec::new(), warnings);
    };

    if let (Some(expected), Some(here)) = (expected.as_ref(), location.first()) {
        let disagrees = expected.project_id.as_deref() != Some(here.project_id.as_str());
        if disagrees && here.confidence + EPSILON >= thresholds.mismatch_threshold {
            tracing::info!(
                expected = %expected.label,
                detected = %here.project_id,
                confidence = here.confidence,
                "project mismatch"
            );
            warnings.push(format!(
                "expected project '{}' but the current location belongs to '{}' ({})",
                expected.label, here.project_id, here.matched_via
            ));
            return result(
                ResolutionStatus::Mismatch,
                Some(here.clone()),
                vec![here.clone()],
                warnings,
            );
        }
    }

    let near_tied = all_candidates
        .iter()
        .filter(|candidate| {
            top.confidence - candidate.confidence <= thresholds.near_tie_margin + EPSILON
        })
        .cloned()
        .collect::<Vec<_>>();

    if top.confidence > thresholds.resolve_threshold + EPSILON && near_tied.len() == 1 {
        tracing::debug!(project = %top.project_id, confidence = top.confidence, "resolved");
        return result(
            ResolutionStatus::Resolved,
            Some(top.clone()),
            vec![top],
            warnings,
        );
    }

    let contenders = if near_tied.len() >= 2
        && top.confidence + EPSILON >= thresholds.ambiguous_threshold
    {
        near_tied
    } else {
        all_candidates.clone()
    };
    tracing::debug!(
        contenders = contenders.len(),
        confidence = top.confidence,
        "ambiguous"
    );
    if contenders.len() == 1 {
        warnings.push(format!(
            "only weak evidence for '{}' ({:.2})",
            top.project_id, top.confidence
        ));
    } else {
        warnings.push(format!(
            "{} candidate projects could not be told apart",
            contenders.len()
        ));
    }
    result(ResolutionStatus::Ambiguous, Some(top), contenders, warnings)
}

#[cfg(test)]
#[path = "resolver_tests_ext.rs"]
mod tests_ext;
