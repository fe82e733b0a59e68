use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

#[derive(Debug)]
pub enum GitError {
    Unavailable,
    Io(std::io::Error),
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitError::Unavailable => write!(f, "git executable not found on PATH"),
            GitError::Io(err) => write!(f, "I/O error while running git: {}", err),
            GitError::CommandFailed {
                command,
                code,
                stderr,
            } => write!(
                f,
                "git command failed (code {:?}): {}: {}",
                code, command, stderr
            ),
        }
    }
}

impl Error for GitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GitError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Read-only access to the local `git` binary.
#[derive(Debug, Clone, Default)]
pub struct GitAdapter;

impl GitAdapter {
    pub fn new() -> Self {
        Self
    }

    /// `None` when `cwd` is not inside a work tree or has no such remote.
    pub fn remote_url(&self, cwd: &Path, remote: &str) -> Result<Option<String>, GitError> {
        let args = vec![
            "remote".to_string(),
            "get-url".to_string(),
            remote.to_string(),
        ];
        let output = self.run_allow_failure(cwd, &args)?;
        if !output.status.success() {
            tracing::debug!(
                command = %display_command(cwd, &args),
                code = ?output.status.code(),
                "no git remote"
            );
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    pub fn toplevel(&self, cwd: &Path) -> Result<PathBuf, GitError> {
        self.run_checked(
            cwd,
            &["rev-parse".to_string(), "--show-toplevel".to_string()],
        )
        .map(PathBuf::from)
    }

    fn run_checked(&self, cwd: &Path, args: &[String]) -> Result<String, GitError> {
        let output = self.run_allow_failure(cwd, args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::CommandFailed {
                command: display_command(cwd, args),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_allow_failure(&self, cwd: &Path, args: &[String]) -> Result<Output, GitError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(cwd).args(args);
        cmd.output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                GitError::Unavailable
            } else {
                GitError::Io(err)
            }
        })
    }
}

fn display_command(cwd: &Path, args: &[String]) -> String {
    format!("git -C {} {}", cwd.display(), args.join(" "))
}

/// Canonical `host/path` form so that https, ssh and scp-style URLs for the
/// same repository compare equal.
pub fn normalize_remote_url(raw: &str) -> Option<String> {
    let mut rest = raw.trim();
    if rest.is_empty() {
        return None;
    }
    let had_scheme = match rest.find("://") {
        Some(index) => {
            rest = &rest[index + 3..];
            true
        }
        None => false,
    };
    if let Some(at) = rest.find('@') {
        let slash = rest.find('/').unwrap_or(rest.len());
        if at < slash {
            rest = &rest[at + 1..];
        }
    }

    let (host, path) = if had_scheme {
        match rest.split_once('/') {
            Some((host, path)) => (host, path),
            None => (rest, ""),
        }
    } else {
        match rest.split_once(':') {
            Some((host, path)) if !host.contains('/') => (host, path),
            _ => match rest.split_once('/') {
                Some((host, path)) => (host, path),
                None => (rest, ""),
            },
        }
    };

    let host = host
        .rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|ch| ch.is_ascii_digit()))
        .map(|(host, _)| host)
        .unwrap_or(host)
        .to_ascii_lowercase();
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).trim_end_matches('/');
    if host.is_empty() || path.is_empty() {
        return None;
    }
    Some(format!("{}/{}", host, path))
}

#[cfg(test)]
mod tests {
    use super::normalize_remote_url;

    #[test]
    fn equivalent_remote_forms_normalize_identically() {
        let expected = Some("github.com/acme/alpha".to_string());
        for raw in [
            "https://github.com/acme/alpha.git",
            "https://GitHub.com/acme/alpha/",
            "ssh://git@github.com/acme/alpha.git",
            "git@github.com:acme/alpha.git",
            "git@github.com:acme/alpha",
            "http://user@github.com:443/acme/alpha",
        ] {
            assert_eq!(normalize_remote_url(raw), expected, "input {}", raw);
        }
    }

    #[test]
    fn path_case_is_preserved_and_garbage_rejected() {
        assert_eq!(
            normalize_remote_url("git@gitlab.example.org:Team/Repo.git"),
            Some("gitlab.example.org/Team/Repo".to_string())
        );
        assert_eq!(normalize_remote_url("   "), None);
        assert_eq!(normalize_remote_url("https://github.com"), None);
    }
}
