use std::fmt;

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::audit::{AuditEvent, AuditEventKind};
use crate::config::SafeguardConfig;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SafeguardFlag {
    FrequentSwitching,
    RepeatedMismatches,
    UnstableEnvironment,
}

impl SafeguardFlag {
    pub fn as_str(self) -> &'static str {
        match self {
            SafeguardFlag::FrequentSwitching => "frequent_switching",
            SafeguardFlag::RepeatedMismatches => "repeated_mismatches",
            SafeguardFlag::UnstableEnvironment => "unstable_environment",
        }
    }

    pub fn suggestion(self) -> &'static str {
        match self {
            SafeguardFlag::FrequentSwitching => {
                "projects are switched often; confirm the active project before acting"
            }
            SafeguardFlag::RepeatedMismatches => {
                "repeated project mismatches; overrides now need a second confirmation"
            }
            SafeguardFlag::UnstableEnvironment => {
                "registry validation keeps failing; inspect registry.json and config.toml"
            }
        }
    }
}

impl fmt::Display for SafeguardFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SafeguardReport {
    pub considered: usize,
    pub project_switches: usize,
    pub mismatch_warnings: usize,
    pub validation_errors: usize,
    pub flags: Vec<SafeguardFlag>,
}

impl SafeguardReport {
    pub fn has(&self, flag: SafeguardFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Confirmations an override of a mismatch block must supply.
    pub fn required_confirmations(&self) -> u8 {
        if self.has(SafeguardFlag::RepeatedMismatches) {
            2
        } else {
            1
        }
    }
}

/// Counts the last `window_entries` events that also fall inside the recent
/// time window. Events with an unparseable timestamp are outside the window.
pub fn evaluate(
    events: &[AuditEvent],
    settings: &SafeguardConfig,
    now: OffsetDateTime,
) -> SafeguardReport {
    let start = events.len().saturating_sub(settings.window_entries);
    let cutoff = window_cutoff(settings.window_minutes, now);

    let mut report = SafeguardReport {
        considered: 0,
        project_switches: 0,
        mismatch_warnings: 0,
        validation_errors: 0,
        flags: Vec::new(),
    };
    for event in &events[start..] {
        if let Some(cutoff) = cutoff {
            match event.occurred_at() {
                Some(at) if at >= cutoff => {}
                _ => continue,
            }
        }
        report.considered += 1;
        match event.event_type {
            AuditEventKind::ProjectSwitch => report.project_switches += 1,
            AuditEventKind::MismatchWarning => report.mismatch_warnings += 1,
            AuditEventKind::ValidationError => report.validation_errors += 1,
            _ => {}
        }
    }

    if report.project_switches > settings.switch_limit {
        report.flags.push(SafeguardFlag::FrequentSwitching);
    }
    if report.mismatch_warnings > settings.mismatch_limit {
        report.flags.push(SafeguardFlag::RepeatedMismatches);
    }
    if report.validation_errors > settings.validation_error_limit {
        report.flags.push(SafeguardFlag::UnstableEnvironment);
    }
    if !report.flags.is_empty() {
        tracing::info!(
            flags = ?report.flags,
            considered = report.considered,
            "safeguard flags raised"
        );
    }
    report
}

/// `None` means no time bound: a zero window, or one reaching past the
/// representable calendar.
fn window_cutoff(window_minutes: u64, now: OffsetDateTime) -> Option<OffsetDateTime> {
    if window_minutes == 0 {
        return None;
    }
    let seconds = i64::try_from(window_minutes).ok()?.checked_mul(60)?;
    now.checked_sub(Duration::seconds(seconds))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use super::{evaluate, SafeguardFlag};
    use crate::audit::{format_rfc3339, AuditEvent, AuditEventKind};
    use crate::config::SafeguardConfig;

    fn event_at(kind: AuditEventKind, at: OffsetDateTime) -> AuditEvent {
        AuditEvent::with_identity("evt", format_rfc3339(at), kind, None, json!({}), "x")
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_780_000_000).expect("valid timestamp")
    }

    #[test]
    fn six_mismatches_escalate_to_double_confirmation() {
        let now = now();
        let mut events = (0..5)
            .map(|_| event_at(AuditEventKind::MismatchWarning, now))
            .collect::<Vec<_>>();
        let report = evaluate(&events, &SafeguardConfig::default(), now);
        assert_eq!(report.mismatch_warnings, 5);
        assert_eq!(report.required_confirmations(), 1);

        events.push(event_at(AuditEventKind::MismatchWarning, now));
        let report = evaluate(&events, &SafeguardConfig::default(), now);
        assert!(report.has(SafeguardFlag::RepeatedMismatches));
        assert_eq!(report.required_confirmations(), 2);
    }

    #[test]
    fn old_events_fall_out_of_time_window() {
        let now = now();
        let old = now - Duration::minutes(61);
        let events = (0..8)
            .map(|_| event_at(AuditEventKind::MismatchWarning, old))
            .collect::<Vec<_>>();
        let report = evaluate(&events, &SafeguardConfig::default(), now);
        assert_eq!(report.considered, 0);
        assert!(report.flags.is_empty());

        let unbounded = SafeguardConfig {
            window_minutes: 0,
            ..SafeguardConfig::default()
        };
        let report = evaluate(&events, &unbounded, now);
        assert!(report.has(SafeguardFlag::RepeatedMismatches));
    }

    #[test]
    fn oversized_time_window_counts_everything() {
        let now = now();
        let events = (0..6)
            .map(|_| event_at(AuditEventKind::MismatchWarning, now - Duration::days(400)))
            .collect::<Vec<_>>();
        for window_minutes in [10_000_000_000, u64::MAX] {
            let settings = SafeguardConfig {
                window_minutes,
                ..SafeguardConfig::default()
            };
            let report = evaluate(&events, &settings, now);
            assert_eq!(report.considered, 6, "window {}", window_minutes);
            assert!(report.has(SafeguardFlag::RepeatedMismatches));
        }
    }

    #[test]
    fn only_most_recent_entries_are_counted() {
        let now = now();
        let mut events = (0..6)
            .map(|_| event_at(AuditEventKind::MismatchWarning, now))
            .collect::<Vec<_>>();
        events.extend((0..50).map(|_| event_at(AuditEventKind::ContextCheck, now)));
        let report = evaluate(&events, &SafeguardConfig::default(), now);
        assert_eq!(report.considered, 50);
        assert_eq!(report.mismatch_warnings, 0);
    }

    #[test]
    fn switching_and_validation_flags_use_strict_limits() {
        let now = now();
        let mut events = (0..10)
            .map(|_| event_at(AuditEventKind::ProjectSwitch, now))
            .collect::<Vec<_>>();
        events.extend((0..3).map(|_| event_at(AuditEventKind::ValidationError, now)));
        let report = evaluate(&events, &SafeguardConfig::default(), now);
        assert!(report.flags.is_empty());

        events.push(event_at(AuditEventKind::ProjectSwitch, now));
        events.push(event_at(AuditEventKind::ValidationError, now));
        let report = evaluate(&events, &SafeguardConfig::default(), now);
        assert_eq!(
            report.flags,
            vec![
                SafeguardFlag::FrequentSwitching,
                SafeguardFlag::UnstableEnvironment
            ]
        );
    }
}
