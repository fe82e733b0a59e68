use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap_complete::{generate, Shell};
use uuid::Uuid;

use crate::app::AppError;
use crate::registry::write_and_replace;

const BIN_NAME: &str = "pcx";
const RC_BEGIN: &str = "# >>> pcx completions >>>";
const RC_END: &str = "# <<< pcx completions <<<";

pub fn generate_completions(shell: Shell, buf: &mut dyn Write) {
    let mut cmd = crate::cli::styled_command();
    generate(shell, &mut cmd, BIN_NAME, buf);
}

/// Accepts a bare name or a path such as `$SHELL`.
fn parse_shell(raw: &str) -> Option<Shell> {
    let name = raw.trim().rsplit(['/', '\\']).next()?;
    let name = name.strip_suffix(".exe").unwrap_or(name);
    match name.to_ascii_lowercase().as_str() {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "powershell" | "pwsh" => Some(Shell::PowerShell),
        _ => None,
    }
}

/// Where an installed script lives, and the rc file that must load it when
/// the shell has no autoload directory of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InstallTarget {
    script: PathBuf,
    rc_file: Option<PathBuf>,
}

/// Zsh scripts sit under the projctx home so that they move with it.
fn install_target(shell: Shell, user_home: &Path, projctx_home: &Path) -> Option<InstallTarget> {
    let (script, rc_file) = match shell {
        Shell::Bash => (
            user_home.join(".local/share/bash-completion/completions").join(BIN_NAME),
            None,
        ),
        Shell::Zsh => (
            projctx_home.join("completions").join(format!("_{BIN_NAME}")),
            Some(user_home.join(".zshrc")),
        ),
        Shell::Fish => (
            user_home
                .join(".config/fish/completions")
                .join(format!("{BIN_NAME}.fish")),
            None,
        ),
        _ => return None,
    };
    Some(InstallTarget { script, rc_file })
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Installed {
    script: PathBuf,
    rc_patched: bool,
}

fn install(shell: Shell, target: &InstallTarget) -> io::Result<Installed> {
    let mut buf = Vec::new();
    generate_completions(shell, &mut buf);
    replace_file(&target.script, &buf)?;
    let rc_patched = match target.rc_file.as_deref() {
        Some(rc) => ensure_rc_block(rc, &target.script)?,
        None => false,
    };
    Ok(Installed {
        script: target.script.clone(),
        rc_patched,
    })
}

/// Keeps exactly one marked block in `rc` sourcing `script`; an outdated
/// block is rewritten in place. Returns whether the file changed.
fn ensure_rc_block(rc: &Path, script: &Path) -> io::Result<bool> {
    let block = format!("{RC_BEGIN}\nsource \"{}\"\n{RC_END}\n", script.display());
    let current = match std::fs::read_to_string(rc) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };

    let next = match (current.find(RC_BEGIN), current.find(RC_END)) {
        (Some(start), Some(end)) if end > start => {
            let mut end = end + RC_END.len();
            if current[end..].starts_with('\n') {
                end += 1;
            }
            if current[start..end] == block {
                return Ok(false);
            }
            format!("{}{}{}", &current[..start], block, &current[end..])
        }
        _ if current.is_empty() || current.ends_with('\n') => format!("{current}{block}"),
        _ => format!("{current}\n{block}"),
    };
    replace_file(rc, next.as_bytes())?;
    Ok(true)
}

fn replace_file(target: &Path, payload: &[u8]) -> io::Result<()> {
    let parent = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent)?;
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| BIN_NAME.to_string());
    let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::now_v7()));
    write_and_replace(&tmp, payload, target).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

pub fn run_completions_command(
    shell_arg: Option<&str>,
    install_requested: bool,
    projctx_home: Option<&Path>,
    user_home: Option<&Path>,
) -> Result<(), AppError> {
    let shell = match shell_arg {
        Some(name) => parse_shell(name)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown shell '{name}'")))?,
        None => std::env::var("SHELL")
            .ok()
            .as_deref()
            .and_then(parse_shell)
            .ok_or_else(|| {
                AppError::InvalidArgument(
                    "unable to detect shell from $SHELL; pass a shell name".to_string(),
                )
            })?,
    };

    if !install_requested {
        let mut stdout = io::stdout().lock();
        generate_completions(shell, &mut stdout);
        return Ok(());
    }

    let (Some(projctx_home), Some(user_home)) = (projctx_home, user_home) else {
        return Err(AppError::InvalidArgument(
            "HOME is not set; cannot install completions".to_string(),
        ));
    };
    let target = install_target(shell, user_home, projctx_home).ok_or_else(|| {
        AppError::InvalidArgument(format!("no install location for {shell} completions"))
    })?;
    let installed = install(shell, &target)?;
    tracing::info!(
        shell = %shell,
        script = %installed.script.display(),
        rc_patched = installed.rc_patched,
        "completions installed"
    );
    println!("completions installed to {}", installed.script.display());
    if installed.rc_patched {
        if let Some(rc) = target.rc_file.as_deref() {
            println!("updated {}; restart the shell to load them", rc.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap_complete::Shell;

    use super::{ensure_rc_block, generate_completions, install, install_target, parse_shell};
    use super::{RC_BEGIN, RC_END};
    use crate::test_support::Workspace;

    #[test]
    fn shells_parse_from_names_and_paths() {
        assert_eq!(parse_shell("BASH"), Some(Shell::Bash));
        assert_eq!(parse_shell("/usr/bin/zsh"), Some(Shell::Zsh));
        assert_eq!(parse_shell("C:\\Tools\\pwsh.exe"), Some(Shell::PowerShell));
        assert_eq!(parse_shell("/bin/csh"), None);
    }

    #[test]
    fn generated_script_covers_subcommands() {
        let mut buf = Vec::new();
        generate_completions(Shell::Bash, &mut buf);
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("pcx"));
        assert!(text.contains("should-check"));
        assert!(text.contains("discover"));
    }

    #[test]
    fn zsh_script_follows_projctx_home_and_rc_keeps_one_block() {
        let ws = Workspace::new("projctx-completions");
        let user_home = ws.dir("user");
        let first_home = ws.dir("user/.projctx");
        let target = install_target(Shell::Zsh, &user_home, &first_home).expect("zsh target");
        assert!(target.script.starts_with(&first_home));

        let installed = install(Shell::Zsh, &target).expect("install");
        assert!(installed.rc_patched);
        assert!(installed.script.is_file());
        let again = install(Shell::Zsh, &target).expect("reinstall");
        assert!(!again.rc_patched);

        let moved_home = ws.dir("elsewhere/pcx");
        let moved = install_target(Shell::Zsh, &user_home, &moved_home).expect("zsh target");
        assert!(install(Shell::Zsh, &moved).expect("install moved").rc_patched);

        let rc = std::fs::read_to_string(user_home.join(".zshrc")).expect("zshrc");
        assert_eq!(rc.matches(RC_BEGIN).count(), 1);
        assert_eq!(rc.matches(RC_END).count(), 1);
        assert!(rc.contains(&moved.script.display().to_string()));
        assert!(!rc.contains(&target.script.display().to_string()));
    }

    #[test]
    fn rc_block_preserves_surrounding_lines() {
        let ws = Workspace::new("projctx-completions");
        let rc = ws.root.join(".zshrc");
        std::fs::write(&rc, "export EDITOR=vi").expect("seed rc");
        assert!(ensure_rc_block(&rc, &ws.root.join("_pcx")).expect("patch"));
        let text = std::fs::read_to_string(&rc).expect("rc");
        assert!(text.starts_with("export EDITOR=vi\n"));
        assert!(text.ends_with(&format!("{RC_END}\n")));
    }

    #[test]
    fn bash_and_fish_need_no_rc_and_others_are_unsupported() {
        let ws = Workspace::new("projctx-completions");
        let home = ws.root.clone();
        let bash = install_target(Shell::Bash, &home, &home.join(".projctx")).expect("bash");
        assert!(bash.rc_file.is_none());
        assert!(bash.script.ends_with("bash-completion/completions/pcx"));
        let fish = install_target(Shell::Fish, &home, &home.join(".projctx")).expect("fish");
        assert!(fish.script.ends_with("fish/completions/pcx.fish"));
        assert!(install_target(Shell::Elvish, &home, &home).is_none());
    }
}
