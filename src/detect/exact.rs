use crate::config::DetectorConfig;
use crate::domain::{DetectionCandidate, MatchedVia};
use crate::registry::Registry;

const HEADER_KEYS: [&str; 3] = ["project", "project name", "project id"];

/// Exact id, name, or alias match on a declared project label.
pub fn alias_exact(text: &str, registry: &Registry) -> Vec<DetectionCandidate> {
    registry
        .find_by_reference(text)
        .map(|record| {
            DetectionCandidate::new(
                record.id.clone(),
                MatchedVia::AliasExact,
                1.0,
                format!("'{}' names project '{}'", text.trim(), record.name),
            )
        })
        .into_iter()
        .collect()
}

pub fn document_header(
    document: &str,
    registry: &Registry,
    config: &DetectorConfig,
) -> Vec<DetectionCandidate> {
    let Some(label) = extract_header_label(document, config.header_scan_lines) else {
        return Vec::new();
    };
    registry
        .find_by_reference(&label)
        .map(|record| {
            DetectionCandidate::new(
                record.id.clone(),
                MatchedVia::DocumentHeader,
                1.0,
                format!("document header declares project '{}'", label),
            )
        })
        .into_iter()
        .collect()
}

/// First `Project: <label>` style line within `max_lines`, with markdown
/// emphasis, headings, list bullets and quotes stripped.
pub fn extract_header_label(document: &str, max_lines: usize) -> Option<String> {
    document.lines().take(max_lines).find_map(header_value)
}

fn header_value(line: &str) -> Option<String> {
    let line = line.trim_start_matches(|ch: char| {
        matches!(ch, '#' | '>' | '-' | '*' | '_') || ch.is_whitespace()
    });
    let (key, value) = line.split_once(':')?;
    let key = key
        .trim()
        .trim_matches(|ch: char| matches!(ch, '*' | '_' | '`'))
        .replace(['_', '-'], " ")
        .to_ascii_lowercase();
    if !HEADER_KEYS.contains(&key.trim()) {
        return None;
    }
    let value = value
        .trim()
        .trim_matches(|ch: char| matches!(ch, '*' | '_' | '`' | '"' | '\''))
        .trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    use super::{alias_exact, document_header, extract_header_label};
    use crate::config::DetectorConfig;
    use crate::domain::{MatchedVia, ProjectRecord};
    use crate::registry::Registry;

    fn registry_with_beta() -> (PathBuf, Registry) {
        let root = std::env::temp_dir().join(format!("projctx-exact-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("mkdir");
        let mut registry = Registry::empty();
        registry
            .add_project(ProjectRecord {
                id: "beta".to_string(),
                name: "Beta".to_string(),
                root: root.clone(),
                aliases: BTreeSet::from(["b-service".to_string()]),
                description: None,
                tags: Vec::new(),
                git_remote: None,
                markers: Vec::new(),
                created_at: "2026-03-01T10:00:00Z".to_string(),
                last_used_at: None,
            })
            .expect("add");
        (root, registry)
    }

    #[test]
    fn recognizes_common_header_forms() {
        for doc in [
            "Project: beta",
            "**Project Name**: beta",
            "# Project: beta",
            "project_id: beta",
            "project_name: \"beta\"",
            "> - **Project:** beta",
        ] {
            assert_eq!(
                extract_header_label(doc, 20).as_deref(),
                Some("beta"),
                "doc {:?}",
                doc
            );
        }
    }

    #[test]
    fn header_scan_is_bounded_and_ignores_other_keys() {
        let doc = "# Roadmap\nOwner: ops\nStatus: draft\nProject: beta\n";
        assert_eq!(extract_header_label(doc, 3), None);
        assert_eq!(extract_header_label(doc, 4).as_deref(), Some("beta"));
        assert_eq!(extract_header_label("Project:   \n", 20), None);
        assert_eq!(extract_header_label("Projects: many", 20), None);
    }

    #[test]
    fn exact_matchers_emit_full_confidence() {
        let (root, registry) = registry_with_beta();
        let alias = alias_exact("B-Service", &registry);
        assert_eq!(alias.len(), 1);
        assert_eq!(alias[0].matched_via, MatchedVia::AliasExact);
        assert_eq!(alias[0].confidence, 1.0);
        assert!(alias_exact("gamma", &registry).is_empty());

        let header = document_header(
            "Title\n**Project Name**: Beta\n",
            &registry,
            &DetectorConfig::default(),
        );
        assert_eq!(header.len(), 1);
        assert_eq!(header[0].matched_via, MatchedVia::DocumentHeader);
        assert!(header[0].evidence.contains("Beta"));
        let _ = std::fs::remove_dir_all(root);
    }
}
