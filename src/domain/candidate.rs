use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MatchedVia {
    AliasExact,
    DocumentHeader,
    PathExact,
    PathSubdirectory,
    GitRemote,
    MarkerScan,
    FuzzyName,
}

impl MatchedVia {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchedVia::AliasExact => "alias-exact",
            MatchedVia::DocumentHeader => "document-header",
            MatchedVia::PathExact => "path-exact",
            MatchedVia::PathSubdirectory => "path-subdirectory",
            MatchedVia::GitRemote => "git-remote",
            MatchedVia::MarkerScan => "marker-scan",
            MatchedVia::FuzzyName => "fuzzy-name",
        }
    }

    /// Lower rank wins ties.
    pub fn priority_rank(self) -> u8 {
        match self {
            MatchedVia::AliasExact => 0,
            MatchedVia::DocumentHeader => 1,
            MatchedVia::PathExact => 2,
            MatchedVia::PathSubdirectory => 3,
            MatchedVia::GitRemote => 4,
            MatchedVia::MarkerScan => 5,
            MatchedVia::FuzzyName => 6,
        }
    }

    /// Signals derived from where the caller is, as opposed to what the
    /// caller said.
    pub fn is_location_signal(self) -> bool {
        matches!(
            self,
            MatchedVia::PathExact
                | MatchedVia::PathSubdirectory
                | MatchedVia::GitRemote
                | MatchedVia::MarkerScan
        )
    }
}

impl fmt::Display for MatchedVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionCandidate {
    pub project_id: String,
    pub matched_via: MatchedVia,
    pub confidence: f64,
    pub evidence: String,
}

impl DetectionCandidate {
    pub fn new(
        project_id: impl Into<String>,
        matched_via: MatchedVia,
        confidence: f64,
        evidence: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            matched_via,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: evidence.into(),
        }
    }

    pub fn is_exact(&self) -> bool {
        self.confidence >= 1.0
    }
}

/// Confidence descending, then detector priority, then project id.
pub fn rank_order(left: &DetectionCandidate, right: &DetectionCandidate) -> Ordering {
    right
        .confidence
        .total_cmp(&left.confidence)
        .then_with(|| {
            left.matched_via
                .priority_rank()
                .cmp(&right.matched_via.priority_rank())
        })
        .then_with(|| left.project_id.cmp(&right.project_id))
}

#[cfg(test)]
mod tests {
    use super::{rank_order, DetectionCandidate, MatchedVia};

    #[test]
    fn serializes_kebab_case_method_names() {
        let json = serde_json::to_string(&MatchedVia::PathSubdirectory).expect("serialize");
        assert_eq!(json, "\"path-subdirectory\"");
        for via in [
            MatchedVia::AliasExact,
            MatchedVia::DocumentHeader,
            MatchedVia::PathExact,
            MatchedVia::PathSubdirectory,
            MatchedVia::GitRemote,
            MatchedVia::MarkerScan,
            MatchedVia::FuzzyName,
        ] {
            let encoded = serde_json::to_string(&via).expect("serialize");
            assert_eq!(encoded.trim_matches('"'), via.as_str());
        }
    }

    #[test]
    fn rank_order_breaks_confidence_ties_by_priority() {
        let mut candidates = vec![
            DetectionCandidate::new("b", MatchedVia::GitRemote, 0.9, ""),
            DetectionCandidate::new("a", MatchedVia::FuzzyName, 0.9, ""),
            DetectionCandidate::new("c", MatchedVia::PathExact, 1.0, ""),
            DetectionCandidate::new("d", MatchedVia::PathSubdirectory, 0.9, ""),
        ];
        candidates.sort_by(rank_order);
        let ids = candidates
            .iter()
            .map(|candidate| candidate.project_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["c", "d", "b", "a"]);
    }

    #[test]
    fn confidence_is_clamped() {
        let candidate = DetectionCandidate::new("x", MatchedVia::AliasExact, 1.4, "");
        assert!(candidate.is_exact());
        assert_eq!(candidate.confidence, 1.0);
    }
}
