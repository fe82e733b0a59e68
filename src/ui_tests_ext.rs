use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{
    format_audit_row, format_project_row, print_active, print_audit, print_project_list,
    print_project_show, print_resolution, print_validation, project_show_fields,
    resolution_lines, status_color_code, Palette, ProjectListOptions,
};
use crate::audit::{AuditEvent, AuditEventKind};
use crate::domain::{DetectionCandidate, MatchedVia, ProjectRecord};
use crate::resolver::{ExpectedProject, ResolutionResult, ResolutionStatus};
use crate::validator::{Decision, ValidationOutcome};

fn sample_project() -> ProjectRecord {
    ProjectRecord {
        id: "alpha".to_string(),
        name: "Alpha Web".to_string(),
        root: PathBuf::from("/nonexistent/projctx/alpha"),
        aliases: BTreeSet::from(["aw".to_string(), "web".to_string()]),
        description: Some("Customer facing site".to_string()),
        tags: vec!["frontend".to_string()],
        git_remote: Some("github.com/acme/alpha".to_string()),
        markers: vec!["package.json".to_string()],
        created_at: "2026-03-01T10:00:00Z".to_string(),
        last_used_at: None,
    }
}

fn ambiguous() -> ResolutionResult {
    let contenders = vec![
        DetectionCandidate::new("alpha", MatchedVia::FuzzyName, 0.8, "'alph' resembles 'alpha'"),
        DetectionCandidate::new("alpine", MatchedVia::FuzzyName, 0.8, "'alph' resembles 'alpine'"),
    ];
    ResolutionResult {
        status: ResolutionStatus::Ambiguous,
        best_candidate: contenders.first().cloned(),
        all_candidates: contenders.clone(),
        contenders,
        expected: Some(ExpectedProject {
            label: "alph".to_string(),
            project_id: None,
        }),
        warnings: vec!["2 candidate projects could not be told apart".to_string()],
    }
}

#[test]
fn project_row_includes_optional_sections_on_request() {
    let palette = Palette { enabled: false };
    let plain = format_project_row(
        &sample_project(),
        false,
        ProjectListOptions::default(),
        &palette,
    );
    assert!(plain.starts_with("  alpha Alpha Web"));
    assert!(plain.contains("aka aw, web"));
    assert!(plain.contains("#frontend"));
    assert!(!plain.contains("/nonexistent"));

    let full = format_project_row(
        &sample_project(),
        true,
        ProjectListOptions {
            include_paths: true,
            include_descriptions: true,
        },
        &palette,
    );
    assert!(full.starts_with("* alpha"));
    assert!(full.contains("/nonexistent/projctx/alpha (missing)"));
    assert!(full.contains("Customer facing site"));
}

#[test]
fn show_fields_skip_empty_values() {
    let fields = project_show_fields(&sample_project(), false);
    let labels = fields.iter().map(|(label, _)| *label).collect::<Vec<_>>();
    assert!(labels.contains(&"git remote"));
    assert!(!labels.contains(&"last used"));
    assert!(!labels.contains(&"active"));

    let mut bare = sample_project();
    bare.aliases.clear();
    bare.description = None;
    bare.tags.clear();
    bare.git_remote = None;
    bare.markers.clear();
    assert_eq!(project_show_fields(&bare, true).len(), 5);
}

#[test]
fn resolution_lines_list_candidates_and_warnings() {
    let palette = Palette { enabled: false };
    let lines = resolution_lines(&ambiguous(), &palette);
    assert!(lines[0].starts_with("[AMBIGUOUS] alpha 0.80 via fuzzy-name"));
    assert_eq!(lines[1], "  expected: alph");
    assert!(lines.iter().any(|line| line.contains("alpine (fuzzy-name)")));
    assert!(lines
        .last()
        .is_some_and(|line| line.contains("warning: 2 candidate projects")));

    let none = ResolutionResult {
        status: ResolutionStatus::None,
        best_candidate: None,
        all_candidates: Vec::new(),
        contenders: Vec::new(),
        expected: None,
        warnings: Vec::new(),
    };
    assert_eq!(
        resolution_lines(&none, &palette),
        vec!["[NONE] no project detected".to_string()]
    );
}

#[test]
fn palette_and_status_colors_cover_all_branches() {
    let enabled = Palette { enabled: true };
    assert!(enabled.paint("36", "x").contains("\u{1b}[36m"));
    assert!(!Palette { enabled: false }
        .paint("36", "x")
        .contains("\u{1b}["));
    assert!(enabled.decision(Decision::Block).contains("BLOCK"));
    assert!(enabled.status(ResolutionStatus::Mismatch).contains("[MISMATCH]"));

    assert_eq!(status_color_code(ResolutionStatus::Resolved), "32");
    assert_eq!(status_color_code(ResolutionStatus::Ambiguous), "33");
    assert_eq!(status_color_code(ResolutionStatus::Mismatch), "31");
    assert_eq!(status_color_code(ResolutionStatus::None), "37");
}

#[test]
fn audit_row_uses_dash_for_missing_project() {
    let event = AuditEvent::new(
        AuditEventKind::NoProjectDetected,
        None,
        serde_json::json!({}),
        "NONE",
    );
    let row = format_audit_row(&event, &Palette { enabled: false });
    assert!(row.ends_with("no_project_detected - NONE"));
}

#[test]
fn public_print_functions_do_not_panic() {
    let project = sample_project();
    print_project_list(&[], None, ProjectListOptions::default());
    print_project_list(
        std::slice::from_ref(&project),
        Some("alpha"),
        ProjectListOptions::default(),
    );
    print_project_show(&project, true);
    print_resolution(&ambiguous());
    print_validation(&ValidationOutcome {
        decision: Decision::AllowWithWarning,
        warnings: vec!["selected interactively".to_string()],
        block: None,
        mismatch: None,
    });
    print_active(Some(&project));
    print_active(None);
    print_audit(&[]);
}
