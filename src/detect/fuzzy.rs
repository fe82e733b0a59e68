use crate::config::DetectorConfig;
use crate::domain::{DetectionCandidate, MatchedVia, ProjectRecord};
use crate::registry::Registry;

/// Normalized Levenshtein ratio over lowercased alphanumerics:
/// 1.0 for identical inputs, approaching 0.0 for disjoint ones.
pub fn similarity(left: &str, right: &str) -> f64 {
    let left = fold(left);
    let right = fold(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    if left == right {
        return 1.0;
    }
    let longest = left.len().max(right.len());
    1.0 - levenshtein(&left, &right) as f64 / longest as f64
}

fn fold(raw: &str) -> Vec<char> {
    raw.chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn levenshtein(left: &[char], right: &[char]) -> usize {
    let mut previous = (0..=right.len()).collect::<Vec<_>>();
    let mut current = vec![0; right.len() + 1];
    for (i, lch) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, rch) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(lch != rch);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

fn best_similarity(text: &str, record: &ProjectRecord) -> (f64, String) {
    std::iter::once(record.id.clone())
        .chain(record.identity_keys())
        .map(|key| (similarity(text, &key), key))
        .fold((0.0, String::new()), |best, next| {
            if next.0 > best.0 {
                next
            } else {
                best
            }
        })
}

pub fn fuzzy_name(
    text: &str,
    registry: &Registry,
    config: &DetectorConfig,
) -> Vec<DetectionCandidate> {
    registry
        .records()
        .filter_map(|record| {
            let (score, key) = best_similarity(text, record);
            if score < config.fuzzy_threshold {
                return None;
            }
            Some(DetectionCandidate::new(
                record.id.clone(),
                MatchedVia::FuzzyName,
                score.min(config.fuzzy_cap),
                format!(
                    "'{}' resembles '{}' of project '{}' ({:.2})",
                    text.trim(),
                    key,
                    record.name,
                    score
                ),
            ))
        })
        .collect()
}
