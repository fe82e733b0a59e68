use serde::Serialize;

use crate::config::ActivationConfig;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActivationScore {
    pub score: f64,
    pub should_check: bool,
    pub matched: Vec<String>,
}

/// Sum of the weights of every rule whose pattern occurs in `text`
/// (case-insensitive), capped at 1.0.
pub fn score(text: &str, config: &ActivationConfig) -> ActivationScore {
    let haystack = text.to_lowercase();
    let mut total = 0.0;
    let mut matched = Vec::new();
    for rule in &config.rules {
        let pattern = rule.pattern.trim().to_lowercase();
        if !pattern.is_empty() && haystack.contains(&pattern) {
            total += rule.weight;
            matched.push(rule.pattern.clone());
        }
    }
    let score = total.min(1.0);
    tracing::debug!(score, matched = matched.len(), "activation scored");
    ActivationScore {
        score,
        should_check: score + 1e-9 >= config.threshold,
        matched,
    }
}
