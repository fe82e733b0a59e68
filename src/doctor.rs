use std::path::Path;

use serde::Serialize;
use time::OffsetDateTime;

use crate::audit::AuditLog;
use crate::config::Config;
use crate::registry::{Registry, RegistryError, RegistryStore};
use crate::safeguard;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoctorStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorCheck {
    pub name: String,
    pub status: DoctorStatus,
    pub detail: String,
}

impl DoctorCheck {
    fn new(name: &str, status: DoctorStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    pub fn failure_count(&self) -> usize {
        self.count(DoctorStatus::Fail)
    }

    pub fn warning_count(&self) -> usize {
        self.count(DoctorStatus::Warn)
    }

    fn count(&self, status: DoctorStatus) -> usize {
        self.checks
            .iter()
            .filter(|check| check.status == status)
            .count()
    }
}

pub fn run_doctor(
    config_path: &Path,
    store: &RegistryStore,
    audit: &AuditLog,
    now: OffsetDateTime,
) -> DoctorReport {
    let (config_check, config) = check_config(config_path);
    let mut checks = vec![config_check];

    match store.load() {
        Ok(registry) => {
            checks.push(DoctorCheck::new(
                "registry_schema",
                DoctorStatus::Pass,
                registry_summary(&registry, store),
            ));
            checks.push(check_active_pointer(&registry));
            checks.push(check_stale_roots(&registry));
            checks.push(check_markers(&registry));
        }
        Err(err) => {
            let detail = match err {
                RegistryError::Validation(validation) => format!(
                    "registry is untrusted ({} issue(s)): {}",
                    validation.issues.len(),
                    validation.issues.join("; ")
                ),
                other => other.to_string(),
            };
            checks.push(DoctorCheck::new(
                "registry_schema",
                DoctorStatus::Fail,
                detail,
            ));
            for name in ["active_pointer", "stale_roots", "project_markers"] {
                checks.push(DoctorCheck::new(
                    name,
                    DoctorStatus::Warn,
                    "skipped: registry could not be loaded",
                ));
            }
        }
    }

    match audit.read_all() {
        Ok(events) => {
            checks.push(DoctorCheck::new(
                "audit_log",
                DoctorStatus::Pass,
                format!("{} readable entries in {}", events.len(), audit.path().display()),
            ));
            checks.push(check_safeguards(&events, &config, now));
        }
        Err(err) => {
            checks.push(DoctorCheck::new("audit_log", DoctorStatus::Fail, err.to_string()));
            checks.push(DoctorCheck::new(
                "safeguards",
                DoctorStatus::Warn,
                "skipped: audit log unreadable",
            ));
        }
    }
    DoctorReport { checks }
}

fn check_config(path: &Path) -> (DoctorCheck, Config) {
    match Config::load(path) {
        Ok(config) => {
            let detail = if path.exists() {
                format!("loaded {}", path.display())
            } else {
                "no config file; using defaults".to_string()
            };
            (DoctorCheck::new("config", DoctorStatus::Pass, detail), config)
        }
        Err(err) => (
            DoctorCheck::new("config", DoctorStatus::Fail, err.to_string()),
            Config::default(),
        ),
    }
}

fn registry_summary(registry: &Registry, store: &RegistryStore) -> String {
    if registry.fingerprint().is_empty() {
        return format!("no registry at {} yet", store.path().display());
    }
    let fingerprint = registry.fingerprint();
    let short = fingerprint.get(..12).unwrap_or(fingerprint);
    if registry.is_empty() {
        return format!("registry has no projects; fingerprint {short}");
    }
    format!("{} project(s); fingerprint {short}", registry.projects.len())
}

fn check_active_pointer(registry: &Registry) -> DoctorCheck {
    match registry.active() {
        Some(record) => DoctorCheck::new(
            "active_pointer",
            DoctorStatus::Pass,
            format!("active project '{}'", record.id),
        ),
        None => DoctorCheck::new(
            "active_pointer",
            DoctorStatus::Warn,
            "no active project (run `pcx switch <project>`)",
        ),
    }
}

fn check_stale_roots(registry: &Registry) -> DoctorCheck {
    let stale = registry
        .records()
        .filter(|record| !record.root_exists())
        .map(|record| format!("{} ({})", record.id, record.root.display()))
        .collect::<Vec<_>>();
    if stale.is_empty() {
        DoctorCheck::new("stale_roots", DoctorStatus::Pass, "every project root exists")
    } else {
        DoctorCheck::new(
            "stale_roots",
            DoctorStatus::Warn,
            format!("missing roots: {}", stale.join(", ")),
        )
    }
}

fn check_markers(registry: &Registry) -> DoctorCheck {
    let missing = registry
        .records()
        .filter(|record| record.root_exists())
        .filter_map(|record| {
            let absent = record.missing_markers();
            (!absent.is_empty()).then(|| format!("{}: {}", record.id, absent.join(", ")))
        })
        .collect::<Vec<_>>();
    if missing.is_empty() {
        DoctorCheck::new(
            "project_markers",
            DoctorStatus::Pass,
            "expected marker files are present",
        )
    } else {
        DoctorCheck::new(
            "project_markers",
            DoctorStatus::Warn,
            format!("missing markers: {}", missing.join("; ")),
        )
    }
}

fn check_safeguards(
    events: &[crate::audit::AuditEvent],
    config: &Config,
    now: OffsetDateTime,
) -> DoctorCheck {
    let report = safeguard::evaluate(events, &config.safeguard, now);
    if report.flags.is_empty() {
        return DoctorCheck::new(
            "safeguards",
            DoctorStatus::Pass,
            format!("no flags over {} recent entries", report.considered),
        );
    }
    let suggestions = report
        .flags
        .iter()
        .map(|flag| format!("{}: {}", flag, flag.suggestion()))
        .collect::<Vec<_>>();
    DoctorCheck::new("safeguards", DoctorStatus::Warn, suggestions.join("; "))
}

#[cfg(test)]
#[path = "doctor_tests_ext.rs"]
mod tests_ext;
