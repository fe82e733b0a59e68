use serde_json::json;
use time::OffsetDateTime;

use super::{run_doctor, DoctorStatus};
use crate::audit::{AuditEvent, AuditEventKind, AuditLog, AUDIT_FILE};
use crate::config::CONFIG_FILE;
use crate::registry::{RegistryStore, REGISTRY_FILE};
use crate::test_support::{record, Workspace};

fn status_of(report: &super::DoctorReport, name: &str) -> DoctorStatus {
    report
        .checks
        .iter()
        .find(|check| check.name == name)
        .map(|check| check.status)
        .unwrap_or_else(|| panic!("check {} should exist", name))
}

#[test]
fn fresh_home_passes_with_warning_for_missing_active_project() {
    let ws = Workspace::new("projctx-doctor");
    let home = ws.dir("home");
    let report = run_doctor(
        &home.join(CONFIG_FILE),
        &RegistryStore::new(home.join(REGISTRY_FILE)),
        &AuditLog::new(home.join(AUDIT_FILE)),
        OffsetDateTime::now_utc(),
    );
    assert_eq!(report.failure_count(), 0);
    assert_eq!(status_of(&report, "config"), DoctorStatus::Pass);
    assert_eq!(status_of(&report, "registry_schema"), DoctorStatus::Pass);
    assert_eq!(status_of(&report, "active_pointer"), DoctorStatus::Warn);
    assert_eq!(status_of(&report, "safeguards"), DoctorStatus::Pass);
}

#[test]
fn untrusted_registry_and_bad_config_fail() {
    let ws = Workspace::new("projctx-doctor");
    let home = ws.dir("home");
    std::fs::write(home.join(REGISTRY_FILE), "{\"version\": 9, \"projects\": {}}")
        .expect("write registry");
    std::fs::write(home.join(CONFIG_FILE), "[resolver]\nresolve_threshold = 3.0\n")
        .expect("write config");

    let report = run_doctor(
        &home.join(CONFIG_FILE),
        &RegistryStore::new(home.join(REGISTRY_FILE)),
        &AuditLog::new(home.join(AUDIT_FILE)),
        OffsetDateTime::now_utc(),
    );
    assert_eq!(report.failure_count(), 2);
    let schema = report
        .checks
        .iter()
        .find(|check| check.name == "registry_schema")
        .expect("schema check");
    assert!(schema.detail.contains("unsupported registry version 9"));
    assert_eq!(status_of(&report, "stale_roots"), DoctorStatus::Warn);
}

#[test]
fn stale_roots_and_safeguard_flags_warn() {
    let ws = Workspace::new("projctx-doctor");
    let home = ws.dir("home");
    let store = RegistryStore::new(home.join(REGISTRY_FILE));
    let root = ws.dir("work/alpha");
    store
        .add_project(record("alpha", &root, &[]))
        .expect("add project");
    store.set_active_project(Some("alpha")).expect("activate");
    std::fs::remove_dir_all(&root).expect("remove root");

    let audit = AuditLog::new(home.join(AUDIT_FILE));
    for _ in 0..4 {
        audit
            .append(&AuditEvent::new(
                AuditEventKind::ValidationError,
                None,
                json!({}),
                "untrusted",
            ))
            .expect("append");
    }

    let report = run_doctor(
        &home.join(CONFIG_FILE),
        &store,
        &audit,
        OffsetDateTime::now_utc(),
    );
    assert_eq!(report.failure_count(), 0);
    assert_eq!(status_of(&report, "active_pointer"), DoctorStatus::Pass);
    assert_eq!(status_of(&report, "stale_roots"), DoctorStatus::Warn);
    let safeguards = report
        .checks
        .iter()
        .find(|check| check.name == "safeguards")
        .expect("safeguard check");
    assert_eq!(safeguards.status, DoctorStatus::Warn);
    assert!(safeguards.detail.contains("unstable_environment"));
    assert!(safeguards.detail.contains("registry.json"));
}
