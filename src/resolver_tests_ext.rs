use super::{resolve, ResolutionStatus};
use crate::config::Config;
use crate::detect::DetectionContext;
use crate::domain::MatchedVia;
use crate::test_support::{registry_with, Workspace};

fn close(left: f64, right: f64) -> bool {
    (left - right).abs() < 1e-9
}

#[test]
fn subdirectory_of_registered_root_resolves() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("alpha", "alpha")]);
    let context = DetectionContext::with_cwd(ws.dir("work/alpha/src"));

    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Resolved);
    let best = result.best_candidate.as_ref().expect("best candidate");
    assert_eq!(best.project_id, "alpha");
    assert_eq!(best.matched_via, MatchedVia::PathSubdirectory);
    assert!(close(best.confidence, 0.9));
    assert_eq!(result.contenders.len(), 1);
    assert!(result.warnings.is_empty());
}

#[test]
fn resolution_is_deterministic() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("alpha", "alpha"), ("alpine", "alpine")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/alpha/src/deep")),
        mention: Some("alpin".to_string()),
        ..DetectionContext::default()
    };
    let first = resolve(&context, &registry, &Config::default());
    for _ in 0..5 {
        assert_eq!(resolve(&context, &registry, &Config::default()), first);
    }
}

#[test]
fn no_hits_is_none_even_with_expected_project() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("alpha", "alpha")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("elsewhere")),
        expected: Some("alpha".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::None);
    assert!(result.best_candidate.is_none());
    assert!(result.contenders.is_empty());
    assert_eq!(
        result
            .expected
            .as_ref()
            .and_then(|expected| expected.project_id.as_deref()),
        Some("alpha")
    );
}

#[test]
fn candidates_sorted_by_confidence_then_priority() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("mono", "mono"), ("inner", "mono/inner")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/mono/inner")),
        mention: Some("mono".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    let order = result
        .all_candidates
        .iter()
        .map(|candidate| (candidate.project_id.as_str(), candidate.matched_via))
        .collect::<Vec<_>>();
    assert_eq!(
        order,
        vec![
            ("mono", MatchedVia::AliasExact),
            ("inner", MatchedVia::PathExact)
        ]
    );
    assert_eq!(result.status, ResolutionStatus::Ambiguous);
    assert_eq!(result.contenders.len(), 2);
}

#[test]
fn nested_roots_at_exact_margin_are_ambiguous() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("mono", "mono"), ("inner", "mono/inner")]);
    let context = DetectionContext::with_cwd(ws.dir("work/mono/inner"));

    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Ambiguous);
    let ids = result
        .contenders
        .iter()
        .map(|candidate| candidate.project_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["inner", "mono"]);

    let mut config = Config::default();
    config.detectors.subdirectory_confidence = 0.85;
    let result = resolve(&context, &registry, &config);
    assert_eq!(result.status, ResolutionStatus::Resolved);
    assert_eq!(result.best_project_id(), Some("inner"));
}

#[test]
fn confidence_equal_to_resolve_threshold_is_ambiguous() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("alpha", "alpha")]);
    let mut config = Config::default();
    config.detectors.subdirectory_confidence = 0.85;
    let context = DetectionContext::with_cwd(ws.dir("work/alpha/src"));

    let result = resolve(&context, &registry, &config);
    assert_eq!(result.status, ResolutionStatus::Ambiguous);
    assert_eq!(result.contenders.len(), 1);
    assert!(result.warnings[0].contains("weak evidence"));
}

#[test]
fn weak_fuzzy_hit_stays_ambiguous() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("gamma", "gamma")]);
    let context = DetectionContext {
        mention: Some("gama".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Ambiguous);
    assert_eq!(result.best_project_id(), Some("gamma"));
}

#[test]
fn document_header_disagreeing_with_location_is_mismatch() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/gamma")),
        document: Some("# Requirements\n**Project Name**: beta\n\nBuild it.".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Mismatch);
    assert_eq!(result.best_project_id(), Some("gamma"));
    let expected = result.expected.as_ref().expect("expected project");
    assert_eq!(expected.label, "beta");
    assert_eq!(expected.project_id.as_deref(), Some("beta"));
    assert!(result
        .all_candidates
        .iter()
        .any(|candidate| candidate.matched_via == MatchedVia::DocumentHeader));
}

#[test]
fn location_alone_resolves_regardless_of_later_claims() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    let result = resolve(
        &DetectionContext::with_cwd(ws.dir("work/gamma")),
        &registry,
        &Config::default(),
    );
    assert_eq!(result.status, ResolutionStatus::Resolved);
    assert_eq!(result.best_project_id(), Some("gamma"));
    assert!(close(result.confidence(), 1.0));
}

#[test]
fn agreeing_expectation_resolves() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("gamma", "gamma")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/gamma/src")),
        expected: Some("GAMMA".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Resolved);
}

#[test]
fn unknown_expected_label_warns_and_mismatches() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("gamma", "gamma")]);
    let context = DetectionContext {
        cwd: Some(ws.dir("work/gamma")),
        expected: Some("zeta".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Mismatch);
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("'zeta' is not registered")));
}

#[test]
fn below_mismatch_threshold_location_does_not_mismatch() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("beta", "beta"), ("gamma", "gamma")]);
    let mut config = Config::default();
    config.detectors.subdirectory_confidence = 0.4;
    config.detectors.depth_floor = 0.4;
    config.resolver.mismatch_threshold = 0.5;
    let context = DetectionContext {
        cwd: Some(ws.dir("work/gamma/src")),
        expected: Some("beta".to_string()),
        mention: Some("beta".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &config);
    assert_eq!(result.status, ResolutionStatus::Resolved);
    assert_eq!(result.best_project_id(), Some("beta"));
}

#[test]
fn stale_root_stays_eligible_through_other_signals() {
    let ws = Workspace::new("projctx-resolve");
    let registry = registry_with(&ws, &[("alpha", "alpha")]);
    std::fs::remove_dir_all(ws.root.join("work/alpha")).expect("remove root");
    let context = DetectionContext {
        cwd: Some(ws.root.join("work/alpha")),
        mention: Some("alpha".to_string()),
        ..DetectionContext::default()
    };
    let result = resolve(&context, &registry, &Config::default());
    assert_eq!(result.status, ResolutionStatus::Resolved);
    assert_eq!(
        result.best_candidate.as_ref().map(|c| c.matched_via),
        Some(MatchedVia::AliasExact)
    );
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("no longer exists")));
}
