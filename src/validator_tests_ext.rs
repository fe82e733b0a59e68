use serde_json::json;
use time::OffsetDateTime;

use super::{validate, BlockKind, Decision, OperationDescriptor, OperationKind};
use crate::audit::{format_rfc3339, AuditEvent, AuditEventKind};
use crate::config::{Config, SafeguardConfig};
use crate::detect::DetectionContext;
use crate::registry::{ProjectPatch, Registry};
use crate::resolver::{resolve, ResolutionResult, ResolutionStatus};
use crate::safeguard::{evaluate, SafeguardReport};
use crate::test_support::{registry_with, Workspace};

fn quiet() -> SafeguardReport {
    evaluate(&[], &SafeguardConfig::default(), OffsetDateTime::now_utc())
}

fn check(
    result: &ResolutionResult,
    operation: OperationDescriptor,
    registry: &Registry,
    safeguard: &SafeguardReport,
) -> super::ValidationOutcome {
    validate(
        result,
        &operation,
        registry,
        safeguard,
        &Config::default().resolver,
    )
}

#[test]
fn subdirectory_resolution_allows_with_warning() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("alpha", "alpha")]);
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/alpha/src")),
        &registry,
        &Config::default(),
    );
    let outcome = check(
        &result,
        OperationDescriptor::new(OperationKind::Generate),
        &registry,
        &quiet(),
    );
    assert_eq!(outcome.decision, Decision::AllowWithWarning);
    assert!(outcome
        .warnings
        .iter()
        .any(|warning| warning.contains("path-subdirectory")));
    assert!(outcome.block.is_none());
}

#[test]
fn exact_resolution_allows() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("alpha", "alpha")]);
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/alpha")),
        &registry,
        &Config::default(),
    );
    let outcome = check(
        &result,
        OperationDescriptor::new(OperationKind::Destructive).claiming("ALPHA"),
        &registry,
        &quiet(),
    );
    assert_eq!(outcome.decision, Decision::Allow);
    assert!(outcome.warnings.is_empty());
}

#[test]
fn missing_marker_downgrades_allow() {
    let ws = Workspace::new("projctx-validate");
    let mut registry = registry_with(&ws, &[("alpha", "alpha")]);
    registry
        .update_project(
            "alpha",
            ProjectPatch {
                markers: Some(vec!["Cargo.toml".to_string()]),
                ..ProjectPatch::default()
            },
        )
        .expect("update");
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/alpha")),
        &registry,
        &Config::default(),
    );
    let outcome = check(
        &result,
        OperationDescriptor::new(OperationKind::Write),
        &registry,
        &quiet(),
    );
    assert_eq!(outcome.decision, Decision::AllowWithWarning);
    assert!(outcome.warnings[0].contains("Cargo.toml"));
}

#[test]
fn claimed_project_disagreeing_with_location_blocks_generation() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    // The "beta" declaration travels as the operation's claim rather than a
    // document in the context: a document header is also an expectation, and
    // with it the resolver itself reports MISMATCH (covered below).
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/gamma")),
        &registry,
        &Config::default(),
    );
    assert_eq!(result.status, ResolutionStatus::Resolved);

    let outcome = check(
        &result,
        OperationDescriptor::new(OperationKind::Generate).claiming("beta"),
        &registry,
        &quiet(),
    );
    assert_eq!(outcome.decision, Decision::Block);
    let block = outcome.block.as_ref().expect("block reason");
    let BlockKind::Mismatch(mismatch) = &block.kind else {
        panic!("expected mismatch block, got {:?}", block.kind);
    };
    assert_eq!(mismatch.expected, "beta");
    assert_eq!(mismatch.detected, "gamma");
    assert!(block.explanation.contains("beta") && block.explanation.contains("gamma"));
    assert!(!block.remedy.is_empty());
    assert_eq!(block.required_confirmations, 1);
    assert!(outcome.mismatch.is_some());
}

#[test]
fn mismatch_override_and_unguarded_kinds_warn() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/gamma")),
        document: Some("Project: beta".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Mismatch);

    let confirmed = check(
        &result,
        OperationDescriptor::new(OperationKind::Destructive).with_confirmations(1),
        &registry,
        &quiet(),
    );
    assert_eq!(confirmed.decision, Decision::AllowWithWarning);
    assert!(confirmed.warnings.iter().any(|w| w.contains("override")));

    let read = check(
        &result,
        OperationDescriptor::new(OperationKind::Read),
        &registry,
        &quiet(),
    );
    assert_eq!(read.decision, Decision::AllowWithWarning);
    assert!(read.mismatch.is_some());
}

#[test]
fn mismatch_names_the_expected_project_even_when_the_claim_matches_the_location() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/gamma")),
        document: Some("Project: beta".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Mismatch);

    let outcome = check(
        &result,
        OperationDescriptor::new(OperationKind::Generate).claiming("gamma"),
        &registry,
        &quiet(),
    );
    assert_eq!(outcome.decision, Decision::Block);
    let mismatch = outcome.mismatch.as_ref().expect("mismatch");
    assert_eq!(mismatch.expected, "beta");
    assert_eq!(mismatch.detected, "gamma");
    let block = outcome.block.as_ref().expect("block");
    assert!(block.explanation.contains("'beta'") && block.explanation.contains("'gamma'"));
    assert!(outcome
        .warnings
        .iter()
        .any(|warning| warning.contains("claims project 'gamma'")));
}

fn escalated_history(now: OffsetDateTime) -> SafeguardReport {
    let history = (0..6)
        .map(|n| {
            AuditEvent::with_identity(
                format!("evt-{}", n),
                format_rfc3339(now),
                AuditEventKind::MismatchWarning,
                Some("gamma".to_string()),
                json!({}),
                "BLOCK",
            )
        })
        .collect::<Vec<_>>();
    evaluate(&history, &SafeguardConfig::default(), now)
}

#[test]
fn resolved_result_still_checked_against_its_expectation() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/gamma")),
        document: Some("Project: beta".to_string()),
        ..DetectionContext::default()
    };
    let mismatch = resolve(&context, &registry, &Config::default());
    assert_eq!(mismatch.status, ResolutionStatus::Mismatch);
    let settled = ResolutionResult {
        status: ResolutionStatus::Resolved,
        ..mismatch
    };

    let outcome = check(
        &settled,
        OperationDescriptor::new(OperationKind::Destructive),
        &registry,
        &escalated_history(OffsetDateTime::now_utc()),
    );
    assert_eq!(outcome.decision, Decision::Block);
    assert_eq!(
        outcome.block.as_ref().map(|block| block.required_confirmations),
        Some(2)
    );
}

#[test]
fn repeated_mismatches_require_double_confirmation() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    let escalated = escalated_history(OffsetDateTime::now_utc());

    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/gamma")),
        &registry,
        &Config::default(),
    );
    let once = check(
        &result,
        OperationDescriptor::new(OperationKind::Generate)
            .claiming("beta")
            .with_confirmations(1),
        &registry,
        &escalated,
    );
    assert_eq!(once.decision, Decision::Block);
    assert_eq!(
        once.block.as_ref().map(|block| block.required_confirmations),
        Some(2)
    );

    let twice = check(
        &result,
        OperationDescriptor::new(OperationKind::Generate)
            .claiming("beta")
            .with_confirmations(2),
        &registry,
        &escalated,
    );
    assert_eq!(twice.decision, Decision::AllowWithWarning);
}

#[test]
fn ambiguous_always_blocks() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("mono", "mono"), ("inner", "mono/inner")]);
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/mono/inner")),
        &registry,
        &Config::default(),
    );
    assert_eq!(result.status, ResolutionStatus::Ambiguous);

    for claimed in [None, Some("inner")] {
        let mut operation = OperationDescriptor::new(OperationKind::Read);
        operation.claimed_project = claimed.map(str::to_string);
        let outcome = check(&result, operation, &registry, &quiet());
        assert_eq!(outcome.decision, Decision::Block);
        let block = outcome.block.expect("block");
        assert!(matches!(block.kind, BlockKind::Ambiguous(ref err) if err.candidates.len() == 2));
        assert_eq!(block.required_confirmations, 0);
    }
}

#[test]
fn ambiguity_blocks_whatever_the_claim_or_confirmations() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(
        &ws,
        &[("mono", "mono"), ("inner", "mono/inner"), ("zeta", "zeta")],
    );
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/mono/inner")),
        &registry,
        &Config::default(),
    );
    assert_eq!(result.status, ResolutionStatus::Ambiguous);

    let read = check(
        &result,
        OperationDescriptor::new(OperationKind::Read).claiming("zeta"),
        &registry,
        &quiet(),
    );
    assert_eq!(read.decision, Decision::Block);
    assert!(matches!(
        read.block.as_ref().map(|block| &block.kind),
        Some(BlockKind::Ambiguous(_))
    ));
    assert_eq!(
        read.mismatch.as_ref().map(|mismatch| mismatch.expected.as_str()),
        Some("zeta")
    );

    let confirmed = check(
        &result,
        OperationDescriptor::new(OperationKind::Destructive)
            .claiming("zeta")
            .with_confirmations(2),
        &registry,
        &quiet(),
    );
    assert_eq!(confirmed.decision, Decision::Block);
    assert_eq!(
        confirmed.block.map(|block| block.required_confirmations),
        Some(0)
    );
}

#[test]
fn no_project_blocks_only_kinds_that_need_one() {
    let ws = Workspace::new("projctx-validate");
    let registry = registry_with(&ws, &[("alpha", "alpha")]);
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("nowhere")),
        &registry,
        &Config::default(),
    );
    assert_eq!(result.status, ResolutionStatus::None);

    let read = check(
        &result,
        OperationDescriptor::new(OperationKind::Read),
        &registry,
        &quiet(),
    );
    assert_eq!(read.decision, Decision::AllowWithWarning);

    for kind in [
        OperationKind::Write,
        OperationKind::Generate,
        OperationKind::Destructive,
    ] {
        let outcome = check(&result, OperationDescriptor::new(kind), &registry, &quiet());
        assert_eq!(outcome.decision, Decision::Block, "kind {}", kind);
        assert!(matches!(
            outcome.block.map(|block| block.kind),
            Some(BlockKind::UnknownProject)
        ));
    }
}

#[test]
fn operation_kind_parsing() {
    assert_eq!(OperationKind::parse(" Generate "), Some(OperationKind::Generate));
    assert_eq!(OperationKind::parse("nuke"), None);
    assert!(OperationKind::Destructive.is_guarded());
    assert!(!OperationKind::Write.is_guarded());
    assert!(!OperationKind::Read.requires_project());
}
