use std::path::{Path, PathBuf};

use crate::config::DetectorConfig;
use crate::domain::{DetectionCandidate, MatchedVia};
use crate::registry::Registry;

/// Exact root hit, or descendant scored by depth below the root.
pub fn path_match(
    cwd: &Path,
    registry: &Registry,
    config: &DetectorConfig,
) -> Vec<DetectionCandidate> {
    let cwd = canonical_or_raw(cwd);
    let mut candidates = Vec::new();
    for record in registry.records() {
        if !record.root_exists() {
            tracing::debug!(
                project = %record.id,
                root = %record.root.display(),
                "skipping stale root"
            );
            continue;
        }
        if cwd == record.root {
            candidates.push(DetectionCandidate::new(
                record.id.clone(),
                MatchedVia::PathExact,
                1.0,
                format!(
                    "working directory is the root of '{}' ({})",
                    record.name,
                    record.root.display()
                ),
            ));
            continue;
        }
        let Ok(relative) = cwd.strip_prefix(&record.root) else {
            continue;
        };
        let depth = relative.components().count();
        candidates.push(DetectionCandidate::new(
            record.id.clone(),
            MatchedVia::PathSubdirectory,
            descendant_confidence(depth, config),
            format!(
                "working directory is {} level(s) below the root of '{}' ({})",
                depth,
                record.name,
                record.root.display()
            ),
        ));
    }
    candidates
}

pub fn descendant_confidence(depth: usize, config: &DetectorConfig) -> f64 {
    if depth <= config.depth_cap {
        return config.subdirectory_confidence;
    }
    let decayed =
        config.subdirectory_confidence - config.depth_decay * (depth - config.depth_cap) as f64;
    decayed.max(config.depth_floor)
}

/// Walks up from `cwd` to the nearest directory holding a marker file and
/// path-matches that directory instead, capped at `marker_cap`.
pub fn marker_scan(
    cwd: &Path,
    registry: &Registry,
    config: &DetectorConfig,
) -> Vec<DetectionCandidate> {
    let cwd = canonical_or_raw(cwd);
    let Some((marked_dir, marker)) = cwd
        .ancestors()
        .take(config.marker_max_levels + 1)
        .find_map(|dir| {
            config
                .markers
                .iter()
                .find(|marker| dir.join(marker.as_str()).exists())
                .map(|marker| (dir.to_path_buf(), marker.clone()))
        })
    else {
        return Vec::new();
    };

    path_match(&marked_dir, registry, config)
        .into_iter()
        .map(|candidate| {
            DetectionCandidate::new(
                candidate.project_id,
                MatchedVia::MarkerScan,
                candidate.confidence.min(config.marker_cap),
                format!(
                    "nearest marker '{}' at {} lies in project root",
                    marker,
                    marked_dir.display()
                ),
            )
        })
        .collect()
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
