use crate::config::DetectorConfig;
use crate::domain::{DetectionCandidate, MatchedVia};
use crate::git::normalize_remote_url;
use crate::registry::Registry;

pub fn git_remote(
    remote: &str,
    registry: &Registry,
    config: &DetectorConfig,
) -> Vec<DetectionCandidate> {
    let Some(observed) = normalize_remote_url(remote) else {
        return Vec::new();
    };
    registry
        .records()
        .filter(|record| {
            record
                .git_remote
                .as_deref()
                .and_then(normalize_remote_url)
                .is_some_and(|registered| registered == observed)
        })
        .map(|record| {
            DetectionCandidate::new(
                record.id.clone(),
                MatchedVia::GitRemote,
                config.git_remote_confidence,
                format!("git remote {} is registered to '{}'", observed, record.name),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::git_remote;
    use crate::config::DetectorConfig;
    use crate::domain::{MatchedVia, ProjectRecord};
    use crate::registry::Registry;

    #[test]
    fn matches_equivalent_remote_urls() {
        let root = std::env::temp_dir().join(format!("projctx-remote-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("mkdir");
        let mut registry = Registry::empty();
        registry
            .add_project(ProjectRecord {
                id: "alpha".to_string(),
                name: "alpha".to_string(),
                root: root.clone(),
                aliases: BTreeSet::new(),
                description: None,
                tags: Vec::new(),
                git_remote: Some("git@github.com:acme/alpha.git".to_string()),
                markers: Vec::new(),
                created_at: "2026-03-01T10:00:00Z".to_string(),
                last_used_at: None,
            })
            .expect("add");

        let config = DetectorConfig::default();
        let found = git_remote("https://github.com/Acme/alpha", &registry, &config);
        assert!(found.is_empty(), "path segments stay case-sensitive");

        let found = git_remote("https://GITHUB.com/acme/alpha/", &registry, &config);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].matched_via, MatchedVia::GitRemote);
        assert!((found[0].confidence - 0.95).abs() < 1e-9);
        assert!(git_remote("not a url", &registry, &config).is_empty());
        let _ = std::fs::remove_dir_all(root);
    }
}
