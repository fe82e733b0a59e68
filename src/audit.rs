use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub const AUDIT_FILE: &str = "audit.jsonl";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    ContextCheck,
    ProjectSwitch,
    MismatchWarning,
    AmbiguousWarning,
    NoProjectDetected,
    ConfirmationPromptShown,
    ConfirmationResult,
    ValidationError,
}

impl AuditEventKind {
    pub const ALL: [AuditEventKind; 8] = [
        AuditEventKind::ContextCheck,
        AuditEventKind::ProjectSwitch,
        AuditEventKind::MismatchWarning,
        AuditEventKind::AmbiguousWarning,
        AuditEventKind::NoProjectDetected,
        AuditEventKind::ConfirmationPromptShown,
        AuditEventKind::ConfirmationResult,
        AuditEventKind::ValidationError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventKind::ContextCheck => "context_check",
            AuditEventKind::ProjectSwitch => "project_switch",
            AuditEventKind::MismatchWarning => "mismatch_warning",
            AuditEventKind::AmbiguousWarning => "ambiguous_warning",
            AuditEventKind::NoProjectDetected => "no_project_detected",
            AuditEventKind::ConfirmationPromptShown => "confirmation_prompt_shown",
            AuditEventKind::ConfirmationResult => "confirmation_result",
            AuditEventKind::ValidationError => "validation_error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|kind| kind.as_str() == needle)
    }
}

impl fmt::Display for AuditEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: String,
    pub event_type: AuditEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub details: Value,
    pub outcome: String,
}

impl AuditEvent {
    pub fn new(
        kind: AuditEventKind,
        project_id: Option<String>,
        details: Value,
        outcome: impl Into<String>,
    ) -> Self {
        Self::with_identity(
            new_event_id(),
            now_utc_rfc3339(),
            kind,
            project_id,
            details,
            outcome,
        )
    }

    pub fn with_identity(
        event_id: impl Into<String>,
        timestamp: impl Into<String>,
        kind: AuditEventKind,
        project_id: Option<String>,
        details: Value,
        outcome: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            timestamp: timestamp.into(),
            event_type: kind,
            project_id,
            details,
            outcome: outcome.into(),
        }
    }

    pub fn occurred_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.timestamp, &Rfc3339).ok()
    }
}

#[derive(Debug)]
pub enum AuditError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl fmt::Display for AuditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditError::Io(err) => write!(f, "I/O error on audit log: {}", err),
            AuditError::Serialize(err) => {
                write!(f, "failed to serialize audit event as JSON: {}", err)
            }
        }
    }
}

impl Error for AuditError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AuditError::Io(err) => Some(err),
            AuditError::Serialize(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for AuditError {
    fn from(value: std::io::Error) -> Self {
        AuditError::Io(value)
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(value: serde_json::Error) -> Self {
        AuditError::Serialize(value)
    }
}

/// Append-only JSON Lines log. Entries are never rewritten or removed here.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()?;
        tracing::debug!(
            event_type = event.event_type.as_str(),
            outcome = %event.outcome,
            "audit event appended"
        );
        Ok(())
    }

    /// Every readable entry in file order. Lines that fail to parse are
    /// skipped with a warning; a missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<AuditEvent>, AuditError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut events = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(&line) {
                Ok(event) => events.push(event),
                Err(err) => tracing::warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    error = %err,
                    "skipping unreadable audit entry"
                ),
            }
        }
        Ok(events)
    }

    /// The last `limit` readable entries, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<AuditEvent>, AuditError> {
        let mut events = self.read_all()?;
        let start = events.len().saturating_sub(limit);
        Ok(events.split_off(start))
    }
}

pub fn new_event_id() -> String {
    Uuid::now_v7().to_string()
}

pub fn now_utc_rfc3339() -> String {
    format_rfc3339(OffsetDateTime::now_utc())
}

pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::path::PathBuf;
    use uuid::Uuid;

    use super::{AuditEvent, AuditEventKind, AuditLog, AUDIT_FILE};

    fn unique_log() -> (PathBuf, AuditLog) {
        let dir = std::env::temp_dir().join(format!("projctx-audit-{}", Uuid::now_v7()));
        let log = AuditLog::new(dir.join(AUDIT_FILE));
        (dir, log)
    }

    #[test]
    fn kind_strings_parse_back() {
        for kind in AuditEventKind::ALL {
            assert_eq!(AuditEventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(
            AuditEventKind::parse("Mismatch-Warning"),
            Some(AuditEventKind::MismatchWarning)
        );
        assert_eq!(AuditEventKind::parse("bogus"), None);
    }

    #[test]
    fn appends_one_json_object_per_line() {
        let (dir, log) = unique_log();
        log.append(&AuditEvent::new(
            AuditEventKind::ContextCheck,
            Some("alpha".to_string()),
            json!({"confidence": 0.9}),
            "resolved",
        ))
        .expect("first append");
        log.append(&AuditEvent::new(
            AuditEventKind::NoProjectDetected,
            None,
            json!({}),
            "none",
        ))
        .expect("second append");

        let raw = std::fs::read_to_string(log.path()).expect("log readable");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json line");
        assert_eq!(first["event_type"], "context_check");
        assert_eq!(first["project_id"], "alpha");
        assert!(first["timestamp"].as_str().is_some());
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json line");
        assert!(second.get("project_id").is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let (dir, log) = unique_log();
        log.append(&AuditEvent::new(
            AuditEventKind::ProjectSwitch,
            Some("alpha".to_string()),
            json!({}),
            "switched",
        ))
        .expect("append");
        let mut raw = std::fs::read_to_string(log.path()).expect("read");
        raw.push_str("{not json\n\n{\"event_type\":\"mystery\"}\n");
        std::fs::write(log.path(), raw).expect("write");
        log.append(&AuditEvent::new(
            AuditEventKind::ContextCheck,
            None,
            json!({}),
            "allow",
        ))
        .expect("append after garbage");

        let events = log.read_all().expect("read_all");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, AuditEventKind::ProjectSwitch);
        assert_eq!(events[1].event_type, AuditEventKind::ContextCheck);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn recent_returns_tail_in_file_order() {
        let (dir, log) = unique_log();
        assert!(log.recent(5).expect("missing log").is_empty());
        for index in 0..4 {
            log.append(&AuditEvent::new(
                AuditEventKind::ContextCheck,
                None,
                json!({ "n": index }),
                "allow",
            ))
            .expect("append");
        }
        let tail = log.recent(2).expect("recent");
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].details["n"], 2);
        assert_eq!(tail[1].details["n"], 3);
        assert_eq!(log.recent(10).expect("recent").len(), 4);

        let _ = std::fs::remove_dir_all(dir);
    }
}
