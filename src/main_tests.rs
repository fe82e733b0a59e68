use std::path::{Path, PathBuf};

use super::{absolutize, block_error, learn_text, needs_selection, resolve_home};
use crate::app::AppError;
use crate::detect::DetectionContext;
use crate::domain::{DetectionCandidate, MatchedVia};
use crate::resolver::{ExpectedProject, ResolutionResult, ResolutionStatus};
use crate::validator::{
    BlockKind, BlockReason, Decision, ProjectMismatchError, ValidationOutcome,
};

fn result_with(status: ResolutionStatus, contenders: Vec<DetectionCandidate>) -> ResolutionResult {
    ResolutionResult {
        status,
        best_candidate: contenders.first().cloned(),
        all_candidates: contenders.clone(),
        contenders,
        expected: Some(ExpectedProject {
            label: "beta".to_string(),
            project_id: Some("beta".to_string()),
        }),
        warnings: Vec::new(),
    }
}

#[test]
fn explicit_home_wins_over_user_home() {
    let home = resolve_home(
        Some(PathBuf::from("/srv/pcx")),
        Some(PathBuf::from("/home/dev")),
    )
    .expect("explicit home");
    assert_eq!(home, PathBuf::from("/srv/pcx"));

    let fallback = resolve_home(None, Some(PathBuf::from("/home/dev"))).expect("fallback");
    assert_eq!(fallback, PathBuf::from("/home/dev/.projctx"));

    assert!(matches!(
        resolve_home(None, None),
        Err(AppError::InvalidArgument(_))
    ));
}

#[test]
fn absolutize_keeps_absolute_paths() {
    let base = Path::new("/work");
    assert_eq!(absolutize(base, Path::new("alpha")), PathBuf::from("/work/alpha"));
    assert_eq!(absolutize(base, Path::new("/other")), PathBuf::from("/other"));
}

#[test]
fn selection_is_offered_only_with_contenders() {
    let candidate = DetectionCandidate::new("alpha", MatchedVia::FuzzyName, 0.8, "close");
    assert!(needs_selection(&result_with(
        ResolutionStatus::Ambiguous,
        vec![candidate.clone()]
    )));
    assert!(!needs_selection(&result_with(
        ResolutionStatus::Resolved,
        vec![candidate]
    )));
    assert!(!needs_selection(&result_with(
        ResolutionStatus::Ambiguous,
        Vec::new()
    )));
}

#[test]
fn learn_text_prefers_mention_then_expected_label() {
    let result = result_with(ResolutionStatus::Ambiguous, Vec::new());
    let with_mention = DetectionContext {
        mention: Some("the api".to_string()),
        ..DetectionContext::default()
    };
    assert_eq!(
        learn_text(&with_mention, &result).as_deref(),
        Some("the api")
    );
    assert_eq!(
        learn_text(&DetectionContext::default(), &result).as_deref(),
        Some("beta")
    );
}

#[test]
fn block_maps_to_error_for_nonzero_exit() {
    let allowed = ValidationOutcome {
        decision: Decision::Allow,
        warnings: Vec::new(),
        block: None,
        mismatch: None,
    };
    assert!(block_error(&allowed).is_none());

    let mismatch = ProjectMismatchError {
        expected: "beta".to_string(),
        detected: "gamma".to_string(),
        confidence: 1.0,
    };
    let blocked = ValidationOutcome {
        decision: Decision::Block,
        warnings: Vec::new(),
        block: Some(BlockReason {
            kind: BlockKind::Mismatch(mismatch.clone()),
            explanation: mismatch.to_string(),
            remedy: "confirm".to_string(),
            required_confirmations: 1,
        }),
        mismatch: Some(mismatch),
    };
    let err = block_error(&blocked).expect("block should map to an error");
    assert!(matches!(err, AppError::Mismatch(_)));
    assert!(err.to_string().contains("'gamma'"));
}
