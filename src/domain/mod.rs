pub mod candidate;
pub mod project;

pub use candidate::{rank_order, DetectionCandidate, MatchedVia};
pub use project::{normalize_alias, ProjectRecord};
