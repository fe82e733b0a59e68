use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ResolverConfig;
use crate::domain::DetectionCandidate;
use crate::registry::Registry;
use crate::resolver::{stale_root_warning, ResolutionResult, ResolutionStatus, EPSILON};
use crate::safeguard::SafeguardReport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Read,
    Write,
    Generate,
    Destructive,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Generate => "generate",
            OperationKind::Destructive => "destructive",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "read" => Some(OperationKind::Read),
            "write" => Some(OperationKind::Write),
            "generate" => Some(OperationKind::Generate),
            "destructive" => Some(OperationKind::Destructive),
            _ => None,
        }
    }

    /// A mismatch blocks these instead of warning.
    pub fn is_guarded(self) -> bool {
        matches!(self, OperationKind::Generate | OperationKind::Destructive)
    }

    pub fn requires_project(self) -> bool {
        !matches!(self, OperationKind::Read)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationDescriptor {
    pub kind: OperationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_project: Option<String>,
    #[serde(default)]
    pub override_confirmations: u8,
}

impl OperationDescriptor {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            claimed_project: None,
            override_confirmations: 0,
        }
    }

    pub fn claiming(mut self, project: impl Into<String>) -> Self {
        self.claimed_project = Some(project.into());
        self
    }

    pub fn with_confirmations(mut self, confirmations: u8) -> Self {
        self.override_confirmations = confirmations;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Allow,
    AllowWithWarning,
    Block,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::AllowWithWarning => "ALLOW_WITH_WARNING",
            Decision::Block => "BLOCK",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectMismatchError {
    pub expected: String,
    pub detected: String,
    pub confidence: f64,
}

impl fmt::Display for ProjectMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "operation targets project '{}' but the current context belongs to '{}' (confidence {:.2})",
            self.expected, self.detected, self.confidence
        )
    }
}

impl Error for ProjectMismatchError {}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AmbiguousProjectError {
    pub candidates: Vec<DetectionCandidate>,
}

impl fmt::Display for AmbiguousProjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .candidates
            .iter()
            .map(|candidate| format!("{} ({:.2})", candidate.project_id, candidate.confidence))
            .collect::<Vec<_>>();
        write!(f, "project is ambiguous between {}", names.join(", "))
    }
}

impl Error for AmbiguousProjectError {}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Mismatch(ProjectMismatchError),
    Ambiguous(AmbiguousProjectError),
    UnknownProject,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BlockReason {
    pub kind: BlockKind,
    pub explanation: String,
    pub remedy: String,
    /// Override confirmations that would lift this block; zero when it
    /// cannot be overridden.
    pub required_confirmations: u8,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationOutcome {
    pub decision: Decision,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockReason>,
    /// Set whenever a mismatch was found, including ones that were
    /// overridden or only warned about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<ProjectMismatchError>,
}

pub fn validate(
    result: &ResolutionResult,
    operation: &OperationDescriptor,
    registry: &Registry,
    safeguard: &SafeguardReport,
    thresholds: &ResolverConfig,
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome {
        decision: Decision::Allow,
        warnings: result.warnings.clone(),
        block: None,
        mismatch: None,
    };

    if result.status != ResolutionStatus::Ambiguous {
        if let Some(mismatch) = find_mismatch(result, registry, thresholds) {
            if let Some(note) = claim_note(result, operation, registry) {
                outcome.warnings.push(note);
            }
            apply_mismatch(&mut outcome, mismatch, operation, safeguard);
            return outcome;
        }
        if let Some(mismatch) = claimed_mismatch(result, operation, registry, thresholds) {
            apply_mismatch(&mut outcome, mismatch, operation, safeguard);
            return outcome;
        }
    }

    match result.status {
        // A claim cannot settle an ambiguity and no override lifts it.
        ResolutionStatus::Ambiguous => {
            let error = AmbiguousProjectError {
                candidates: result.contenders.clone(),
            };
            outcome.decision = Decision::Block;
            outcome.block = Some(BlockReason {
                explanation: error.to_string(),
                remedy: "pick the project interactively (pcx resolve --interactive) or name it \
                         explicitly with --project"
                    .to_string(),
                kind: BlockKind::Ambiguous(error),
                required_confirmations: 0,
            });
            if let Some(mismatch) = claimed_mismatch(result, operation, registry, thresholds) {
                outcome.warnings.push(mismatch.to_string());
                outcome.mismatch = Some(mismatch);
            }
        }
        ResolutionStatus::None if operation.kind.requires_project() => {
            outcome.decision = Decision::Block;
            outcome.block = Some(BlockReason {
                kind: BlockKind::UnknownProject,
                explanation: format!(
                    "no registered project matches the current context; a {} operation needs one",
                    operation.kind
                ),
                remedy: "run from inside a registered project root or register it with `pcx add`"
                    .to_string(),
                required_confirmations: 0,
            });
        }
        ResolutionStatus::None => {
            outcome.decision = Decision::AllowWithWarning;
            outcome
                .warnings
                .push("no project detected for this operation".to_string());
        }
        ResolutionStatus::Resolved | ResolutionStatus::Mismatch => {
            if let Some(best) = result.best_candidate.as_ref() {
                if !best.is_exact() {
                    outcome.decision = Decision::AllowWithWarning;
                    outcome.warnings.push(format!(
                        "project '{}' resolved via {} at confidence {:.2}",
                        best.project_id, best.matched_via, best.confidence
                    ));
                }
                check_project_health(&mut outcome, registry, &best.project_id);
            }
        }
    }
    tracing::info!(
        decision = outcome.decision.as_str(),
        kind = operation.kind.as_str(),
        status = result.status.as_str(),
        "operation validated"
    );
    outcome
}

/// The expected project (explicit or declared by a document) against the
/// best candidate, whatever the status: a result settled by selection still
/// carries the expectation it was resolved under.
fn find_mismatch(
    result: &ResolutionResult,
    registry: &Registry,
    thresholds: &ResolverConfig,
) -> Option<ProjectMismatchError> {
    let best = result.best_candidate.as_ref()?;
    let expected = result.expected.as_ref();
    if result.status == ResolutionStatus::Mismatch {
        return Some(ProjectMismatchError {
            expected: expected
                .map(|expected| expected.label.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            detected: best.project_id.clone(),
            confidence: best.confidence,
        });
    }

    let expected = expected?;
    let expected_id = expected
        .project_id
        .as_deref()
        .or_else(|| registry.find_by_reference(&expected.label).map(|record| record.id.as_str()))?;
    if expected_id == best.project_id
        || best.confidence + EPSILON < thresholds.mismatch_threshold
    {
        return None;
    }
    Some(ProjectMismatchError {
        expected: expected.label.clone(),
        detected: best.project_id.clone(),
        confidence: best.confidence,
    })
}

/// An explicitly claimed project that none of the candidates agree with.
fn claimed_mismatch(
    result: &ResolutionResult,
    operation: &OperationDescriptor,
    registry: &Registry,
    thresholds: &ResolverConfig,
) -> Option<ProjectMismatchError> {
    let best = result.best_candidate.as_ref()?;
    let claimed = operation.claimed_project.as_deref()?.trim();
    if claimed.is_empty() || best.confidence + EPSILON < thresholds.mismatch_threshold {
        return None;
    }
    let claimed_id = registry
        .find_by_reference(claimed)
        .map(|record| record.id.as_str());
    let agrees = match result.status {
        ResolutionStatus::Ambiguous => result
            .contenders
            .iter()
            .any(|candidate| Some(candidate.project_id.as_str()) == claimed_id),
        _ => claimed_id == Some(best.project_id.as_str()),
    };
    (!agrees).then(|| ProjectMismatchError {
        expected: claimed.to_string(),
        detected: best.project_id.clone(),
        confidence: best.confidence,
    })
}

/// A claim that differs from the expected project is reported on its own
/// so the mismatch keeps naming the two sides that disagree.
fn claim_note(
    result: &ResolutionResult,
    operation: &OperationDescriptor,
    registry: &Registry,
) -> Option<String> {
    let claimed = operation.claimed_project.as_deref()?.trim();
    let expected = result.expected.as_ref()?;
    if claimed.is_empty() {
        return None;
    }
    let claimed_id = registry.find_by_reference(claimed).map(|record| record.id.as_str());
    let same = match (claimed_id, expected.project_id.as_deref()) {
        (Some(claimed_id), Some(expected_id)) => claimed_id == expected_id,
        _ => claimed.eq_ignore_ascii_case(expected.label.trim()),
    };
    (!same).then(|| {
        format!(
            "operation claims project '{}' but the expected project is '{}'",
            claimed, expected.label
        )
    })
}

fn apply_mismatch(
    outcome: &mut ValidationOutcome,
    mismatch: ProjectMismatchError,
    operation: &OperationDescriptor,
    safeguard: &SafeguardReport,
) {
    tracing::info!(
        expected = %mismatch.expected,
        detected = %mismatch.detected,
        kind = operation.kind.as_str(),
        "mismatch against operation"
    );
    if !operation.kind.is_guarded() {
        outcome.decision = Decision::AllowWithWarning;
        outcome.warnings.push(mismatch.to_string());
        outcome.mismatch = Some(mismatch);
        return;
    }

    let required = safeguard.required_confirmations();
    if operation.override_confirmations >= required {
        outcome.decision = Decision::AllowWithWarning;
        outcome.warnings.push(format!(
            "{}; proceeding on {} override confirmation(s)",
            mismatch, operation.override_confirmations
        ));
        outcome.mismatch = Some(mismatch);
        return;
    }

    let mut remedy = format!(
        "work from the root of '{}', correct the declared project, or confirm the override",
        mismatch.expected
    );
    if required > 1 {
        remedy.push_str(" twice (repeated mismatches were seen recently)");
    }
    outcome.decision = Decision::Block;
    outcome.block = Some(BlockReason {
        explanation: mismatch.to_string(),
        remedy,
        kind: BlockKind::Mismatch(mismatch.clone()),
        required_confirmations: required,
    });
    outcome.mismatch = Some(mismatch);
}

fn check_project_health(outcome: &mut ValidationOutcome, registry: &Registry, project_id: &str) {
    let Some(record) = registry.get(project_id) else {
        return;
    };
    let mut degraded = false;
    if !record.root_exists() {
        degraded = true;
        let warning = stale_root_warning(record);
        if !outcome.warnings.contains(&warning) {
            outcome.warnings.push(warning);
        }
    } else {
        let missing = record.missing_markers();
        if !missing.is_empty() {
            degraded = true;
            outcome.warnings.push(format!(
                "project '{}' is missing expected files: {}",
                record.id,
                missing.join(", ")
            ));
        }
    }
    if degraded && outcome.decision == Decision::Allow {
        outcome.decision = Decision::AllowWithWarning;
    }
}

#[cfg(test)]
#[path = "validator_tests_ext.rs"]
mod tests_ext;
