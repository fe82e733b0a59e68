use std::io::{self, IsTerminal};

use crate::audit::AuditEvent;
use crate::doctor::{DoctorReport, DoctorStatus};
use crate::domain::{DetectionCandidate, ProjectRecord};
use crate::registry::discovery::DiscoveredProject;
use crate::resolver::{ResolutionResult, ResolutionStatus};
use crate::validator::{Decision, ValidationOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectListOptions {
    pub include_paths: bool,
    pub include_descriptions: bool,
}

pub fn print_project_list(
    projects: &[ProjectRecord],
    active_id: Option<&str>,
    options: ProjectListOptions,
) {
    let palette = Palette::auto();
    println!("{}", palette.heading("Projects"));
    if projects.is_empty() {
        println!("{}", palette.dim("no projects registered"));
        return;
    }
    for record in projects {
        let active = active_id == Some(record.id.as_str());
        println!("{}", format_project_row(record, active, options, &palette));
    }
    println!("{}", palette.dim(&format!("{} project(s)", projects.len())));
}

fn format_project_row(
    record: &ProjectRecord,
    active: bool,
    options: ProjectListOptions,
    palette: &Palette,
) -> String {
    let marker = if active { "*" } else { " " };
    let mut line = format!("{} {} {}", marker, palette.id(&record.id), record.name);
    if !record.aliases.is_empty() {
        let aliases = record.aliases.iter().cloned().collect::<Vec<_>>();
        line.push(' ');
        line.push_str(&palette.dim(&format!("aka {}", aliases.join(", "))));
    }
    if !record.tags.is_empty() {
        line.push(' ');
        line.push_str(&palette.tags(&format!("#{}", record.tags.join(" #"))));
    }
    if options.include_paths {
        line.push_str(&format!("\n    {}", record.root.display()));
        if !record.root_exists() {
            line.push(' ');
            line.push_str(&palette.warn("(missing)"));
        }
    }
    if options.include_descriptions {
        if let Some(description) = record.description.as_deref() {
            line.push_str(&format!("\n    {}", palette.dim(description)));
        }
    }
    line
}

pub fn print_project_show(record: &ProjectRecord, active: bool) {
    let palette = Palette::auto();
    for (label, value) in project_show_fields(record, active) {
        println!("{} {}", palette.dim(&format!("{label:>11}:")), value);
    }
}

fn project_show_fields(record: &ProjectRecord, active: bool) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("id", record.id.clone()),
        ("name", record.name.clone()),
        ("root", record.root.display().to_string()),
    ];
    if !record.aliases.is_empty() {
        fields.push((
            "aliases",
            record.aliases.iter().cloned().collect::<Vec<_>>().join(", "),
        ));
    }
    if let Some(description) = record.description.as_deref() {
        fields.push(("description", description.to_string()));
    }
    if !record.tags.is_empty() {
        fields.push(("tags", record.tags.join(", ")));
    }
    if let Some(remote) = record.git_remote.as_deref() {
        fields.push(("git remote", remote.to_string()));
    }
    if !record.markers.is_empty() {
        fields.push(("markers", record.markers.join(", ")));
    }
    fields.push(("created", record.created_at.clone()));
    if let Some(last_used) = record.last_used_at.as_deref() {
        fields.push(("last used", last_used.to_string()));
    }
    if active {
        fields.push(("active", "yes".to_string()));
    }
    fields
}

pub fn print_resolution(result: &ResolutionResult) {
    let palette = Palette::auto();
    for line in resolution_lines(result, &palette) {
        println!("{line}");
    }
}

fn resolution_lines(result: &ResolutionResult, palette: &Palette) -> Vec<String> {
    let mut lines = Vec::new();
    let headline = match result.best_candidate.as_ref() {
        Some(best) => format!(
            "{} {} {}",
            palette.status(result.status),
            palette.id(&best.project_id),
            palette.dim(&format!("{:.2} via {}", best.confidence, best.matched_via))
        ),
        None => format!(
            "{} {}",
            palette.status(result.status),
            palette.dim("no project detected")
        ),
    };
    lines.push(headline);
    if let Some(expected) = result.expected.as_ref() {
        lines.push(format!("  expected: {}", expected.label));
    }
    if result.status == ResolutionStatus::Ambiguous || result.all_candidates.len() > 1 {
        for candidate in &result.all_candidates {
            lines.push(format!("  {}", format_candidate(candidate)));
        }
    }
    for warning in &result.warnings {
        lines.push(format!("  {} {}", palette.warn("warning:"), warning));
    }
    lines
}

fn format_candidate(candidate: &DetectionCandidate) -> String {
    format!(
        "{:.2} {} ({}): {}",
        candidate.confidence, candidate.project_id, candidate.matched_via, candidate.evidence
    )
}

pub fn print_validation(outcome: &ValidationOutcome) {
    let palette = Palette::auto();
    println!("{}", palette.decision(outcome.decision));
    for warning in &outcome.warnings {
        println!("  {} {}", palette.warn("warning:"), warning);
    }
    if let Some(block) = outcome.block.as_ref() {
        println!("  {}", block.explanation);
        println!("  {} {}", palette.dim("remedy:"), block.remedy);
        if block.required_confirmations > 0 {
            println!(
                "  {}",
                palette.dim(&format!(
                    "override needs {} confirmation(s) (--confirm)",
                    block.required_confirmations
                ))
            );
        }
    }
}

pub fn print_active(record: Option<&ProjectRecord>) {
    let palette = Palette::auto();
    match record {
        Some(record) => println!(
            "{} {} {}",
            palette.id(&record.id),
            record.name,
            palette.dim(&record.root.display().to_string())
        ),
        None => println!("{}", palette.dim("no active project")),
    }
}

pub fn print_audit(events: &[AuditEvent]) {
    let palette = Palette::auto();
    if events.is_empty() {
        println!("{}", palette.dim("no audit entries"));
        return;
    }
    for event in events {
        println!("{}", format_audit_row(event, &palette));
    }
}

fn format_audit_row(event: &AuditEvent, palette: &Palette) -> String {
    let project = event.project_id.as_deref().unwrap_or("-");
    format!(
        "{} {} {} {}",
        palette.dim(&event.timestamp),
        event.event_type,
        palette.id(project),
        event.outcome
    )
}

pub fn print_doctor(report: &DoctorReport) {
    let palette = Palette::auto();
    for check in &report.checks {
        let label = match check.status {
            DoctorStatus::Pass => palette.paint("32", "pass"),
            DoctorStatus::Warn => palette.paint("33", "warn"),
            DoctorStatus::Fail => palette.paint("31", "fail"),
        };
        println!("{label:>4} {:<16} {}", check.name, check.detail);
    }
    println!(
        "{}",
        palette.dim(&format!(
            "{} failure(s), {} warning(s)",
            report.failure_count(),
            report.warning_count()
        ))
    );
}

pub fn print_discovered(found: &[DiscoveredProject], applied: bool) {
    let palette = Palette::auto();
    if found.is_empty() {
        println!("{}", palette.dim("no unregistered projects found"));
        return;
    }
    for project in found {
        let note = match project.skipped.as_deref() {
            Some(reason) => palette.warn(&format!("skipped: {reason}")),
            None if applied => palette.paint("32", "registered"),
            None => palette.dim("new"),
        };
        println!(
            "{} {} {} {}",
            palette.id(&project.id),
            project.root.display(),
            palette.dim(&format!("[{}]", project.marker)),
            note
        );
    }
}

struct Palette {
    enabled: bool,
}

impl Palette {
    fn auto() -> Self {
        let enabled = std::env::var_os("NO_COLOR").is_none() && io::stdout().is_terminal();
        Self { enabled }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn heading(&self, text: &str) -> String {
        self.paint("1;36", text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }

    fn id(&self, text: &str) -> String {
        self.paint("1;94", text)
    }

    fn warn(&self, text: &str) -> String {
        self.paint("33", text)
    }

    fn tags(&self, text: &str) -> String {
        self.paint("90", text)
    }

    fn status(&self, status: ResolutionStatus) -> String {
        self.paint(status_color_code(status), &format!("[{status}]"))
    }

    fn decision(&self, decision: Decision) -> String {
        let code = match decision {
            Decision::Allow => "32",
            Decision::AllowWithWarning => "33",
            Decision::Block => "1;31",
        };
        self.paint(code, decision.as_str())
    }
}

fn status_color_code(status: ResolutionStatus) -> &'static str {
    match status {
        ResolutionStatus::Resolved => "32",
        ResolutionStatus::Ambiguous => "33",
        ResolutionStatus::Mismatch => "31",
        ResolutionStatus::None => "37",
    }
}

#[cfg(test)]
#[path = "ui_tests_ext.rs"]
mod tests_ext;
