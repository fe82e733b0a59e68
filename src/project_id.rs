use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn generate_project_id<F>(name: &str, mut exists: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let slug = slugify(name);
    if !exists(&slug) {
        return slug;
    }

    for _ in 0..64 {
        let seed = Uuid::now_v7().to_string();
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let candidate = format!("{}-{}", slug, &digest[..4]);
        if !exists(&candidate) {
            return candidate;
        }
    }

    format!("{}-{}", slug, &Uuid::now_v7().simple().to_string()[..8])
}

pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    let trimmed = slug.trim_start_matches(['.', '_']).to_string();
    if trimmed.is_empty() {
        "project".to_string()
    } else {
        trimmed
    }
}

pub fn is_valid_project_id(id: &str) -> bool {
    let mut chars = id.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_lowercase() || first.is_ascii_digit())
        && chars.all(|ch| {
            ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '.' | '_' | '-')
        })
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{fingerprint, generate_project_id, is_valid_project_id, slugify};

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Alpha Legacy"), "alpha-legacy");
        assert_eq!(slugify("  my__repo!! v2 "), "my__repo-v2");
        assert_eq!(slugify("***"), "project");
    }

    #[test]
    fn generated_id_prefers_plain_slug() {
        let seen: HashSet<String> = HashSet::new();
        assert_eq!(generate_project_id("Gamma", |c| seen.contains(c)), "gamma");
    }

    #[test]
    fn generated_id_adds_short_hash_when_slug_taken() {
        let seen: HashSet<String> = HashSet::from(["gamma".to_string()]);
        let id = generate_project_id("Gamma", |c| seen.contains(c));
        assert!(id.starts_with("gamma-"));
        assert_eq!(id.len(), "gamma-".len() + 4);
        assert!(is_valid_project_id(&id));
    }

    #[test]
    fn validates_id_syntax() {
        assert!(is_valid_project_id("alpha-2.0"));
        assert!(!is_valid_project_id("Alpha"));
        assert!(!is_valid_project_id("-alpha"));
        assert!(!is_valid_project_id(""));
        assert!(!is_valid_project_id("a/b"));
    }

    #[test]
    fn fingerprint_is_stable_sha256_hex() {
        let first = fingerprint(b"{}");
        assert_eq!(first, fingerprint(b"{}"));
        assert_eq!(first.len(), 64);
        assert_ne!(first, fingerprint(b"{ }"));
    }
}
