use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    std::fs::canonicalize(path).expect("workspace should canonicalize")
}

fn mkdir(root: &Path, relative: &str) -> PathBuf {
    let dir = root.join(relative);
    std::fs::create_dir_all(&dir).expect("dir should be creatable");
    dir
}

fn run_git(cwd: &Path, args: &[&str]) {
    let output = Command::new("git")
        .arg("-C")
        .arg(cwd)
        .args(args)
        .output()
        .expect("git command should run");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn run_pcx(home: &Path, cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pcx"))
        .current_dir(cwd)
        .env("PROJCTX_HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("PROJCTX_LOG")
        .args(args)
        .output()
        .expect("pcx command should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success but failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_failure(output: &Output) {
    assert!(
        !output.status.success(),
        "expected failure but command succeeded.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn registry_commands_dispatch_success_and_failure_paths() {
    let root = unique_workspace("projctx-cli-registry");
    let home = root.join("home");
    let alpha = mkdir(&root, "work/alpha");
    mkdir(&root, "work/beta");

    let added = run_pcx(
        &home,
        &root.join("work"),
        &["add", "Alpha", "--root", "alpha", "-a", "aw", "--no-detect-remote", "--json"],
    );
    assert_success(&added);
    let record = json(&added);
    assert_eq!(record["id"], "alpha");
    assert_eq!(record["root"], alpha.display().to_string());

    assert_success(&run_pcx(
        &home,
        &root,
        &["add", "Beta", "--root", "work/beta", "--no-detect-remote"],
    ));

    let duplicate = run_pcx(
        &home,
        &root,
        &["add", "Other", "--root", "work/beta", "--id", "alpha", "--no-detect-remote"],
    );
    assert_failure(&duplicate);
    assert!(String::from_utf8_lossy(&duplicate.stderr).starts_with("error:"));

    let collision = run_pcx(&home, &root, &["update", "beta", "--add-alias", "AW"]);
    assert_failure(&collision);

    let ls = run_pcx(&home, &root, &["ls", "--json"]);
    assert_success(&ls);
    assert_eq!(json(&ls).as_array().map_or(0, Vec::len), 2);

    let show = run_pcx(&home, &root, &["show", "aw", "--json"]);
    assert_success(&show);
    assert_eq!(json(&show)["id"], "alpha");

    assert_success(&run_pcx(&home, &root, &["switch", "beta"]));
    let active = run_pcx(&home, &root, &["active", "--json"]);
    assert_success(&active);
    assert_eq!(json(&active)["id"], "beta");

    assert_success(&run_pcx(&home, &root, &["rm", "beta"]));
    let cleared = run_pcx(&home, &root, &["active", "--json"]);
    assert_success(&cleared);
    assert!(json(&cleared).is_null());

    let missing = run_pcx(&home, &root, &["show", "nope"]);
    assert_failure(&missing);
    assert!(String::from_utf8_lossy(&missing.stderr).contains("not found"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn resolve_and_check_follow_the_decision_rules() {
    let root = unique_workspace("projctx-cli-check");
    let home = root.join("home");
    mkdir(&root, "work/beta");
    let gamma = mkdir(&root, "work/gamma");
    let alpha_src = mkdir(&root, "work/alpha/src");
    for name in ["alpha", "beta", "gamma"] {
        let relative = format!("work/{name}");
        assert_success(&run_pcx(
            &home,
            &root,
            &["add", name, "--root", &relative, "--no-detect-remote"],
        ));
    }

    let resolved = run_pcx(&home, &alpha_src, &["resolve", "--json"]);
    assert_success(&resolved);
    let result = json(&resolved);
    assert_eq!(result["status"], "RESOLVED");
    assert_eq!(result["best_candidate"]["project_id"], "alpha");
    assert_eq!(result["best_candidate"]["matched_via"], "path-subdirectory");

    let generate = run_pcx(
        &home,
        &gamma,
        &["check", "--kind", "generate", "--project", "beta", "--json"],
    );
    assert_failure(&generate);
    let checked = json(&generate);
    assert_eq!(checked["validation"]["decision"], "BLOCK");
    assert_eq!(checked["validation"]["block"]["kind"]["type"], "mismatch");
    assert!(String::from_utf8_lossy(&generate.stderr).contains("'gamma'"));

    let confirmed = run_pcx(
        &home,
        &gamma,
        &["check", "--kind", "generate", "--project", "beta", "--confirm", "--json"],
    );
    assert_success(&confirmed);
    assert_eq!(json(&confirmed)["validation"]["decision"], "ALLOW_WITH_WARNING");

    let read = run_pcx(&home, &gamma, &["check", "--kind", "read", "--project", "beta"]);
    assert_success(&read);

    let document = root.join("prd.md");
    std::fs::write(&document, "# PRD\n\n**Project:** beta\n").expect("document should write");
    let header = run_pcx(
        &home,
        &gamma,
        &["resolve", "--document", document.to_str().expect("utf8"), "--json"],
    );
    assert_success(&header);
    assert_eq!(json(&header)["status"], "MISMATCH");

    let required = run_pcx(&home, &root, &["resolve", "--require"]);
    assert_failure(&required);
    assert!(String::from_utf8_lossy(&required.stderr).contains("no registered project"));
    assert_success(&run_pcx(&home, &alpha_src, &["resolve", "--require"]));

    let nowhere = run_pcx(&home, &root, &["check", "--kind", "destructive"]);
    assert_failure(&nowhere);

    let bad_kind = run_pcx(&home, &root, &["check", "--kind", "launch"]);
    assert_failure(&bad_kind);
    assert!(String::from_utf8_lossy(&bad_kind.stderr).contains("unknown operation kind"));

    let audit = run_pcx(&home, &root, &["audit", "--kind", "mismatch_warning", "--json"]);
    assert_success(&audit);
    assert!(json(&audit).as_array().map_or(0, Vec::len) >= 2);

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn untrusted_registry_fails_loudly_and_doctor_reports_it() {
    let root = unique_workspace("projctx-cli-untrusted");
    let home = mkdir(&root, "home");
    std::fs::write(home.join("registry.json"), "{ not json").expect("write registry");

    let resolve = run_pcx(&home, &root, &["resolve"]);
    assert_failure(&resolve);
    assert!(String::from_utf8_lossy(&resolve.stderr).contains("untrusted"));

    let doctor = run_pcx(&home, &root, &["doctor", "--json"]);
    assert_failure(&doctor);
    let report = json(&doctor);
    let schema = report["checks"]
        .as_array()
        .and_then(|checks| checks.iter().find(|check| check["name"] == "registry_schema"))
        .cloned()
        .expect("schema check should be present");
    assert_eq!(schema["status"], "fail");

    let audit = run_pcx(&home, &root, &["audit", "--kind", "validation-error", "--json"]);
    assert_success(&audit);
    assert_eq!(json(&audit).as_array().map_or(0, Vec::len), 1);
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn should_check_and_completions_run_without_registry() {
    let root = unique_workspace("projctx-cli-misc");
    let home = root.join("home");

    let score = run_pcx(&home, &root, &["should-check", "--json", "parse-prd", "docs/prd.md"]);
    assert_success(&score);
    assert_eq!(json(&score)["should_check"], true);

    let skip = run_pcx(&home, &root, &["should-check", "what", "time", "is", "it"]);
    assert_success(&skip);
    assert!(String::from_utf8_lossy(&skip.stdout).starts_with("skip"));

    let completions = run_pcx(&home, &root, &["completions", "bash"]);
    assert_success(&completions);
    assert!(String::from_utf8_lossy(&completions.stdout).contains("pcx"));

    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn git_remote_resolves_a_checkout_outside_the_root() {
    let root = unique_workspace("projctx-cli-git");
    let home = root.join("home");
    mkdir(&root, "work/alpha");
    let clone = mkdir(&root, "elsewhere/alpha-copy");
    run_git(&clone, &["init"]);
    run_git(
        &clone,
        &["remote", "add", "origin", "git@github.com:Acme/alpha.git"],
    );

    assert_success(&run_pcx(
        &home,
        &root,
        &[
            "add",
            "alpha",
            "--root",
            "work/alpha",
            "--remote",
            "https://github.com/acme/alpha",
        ],
    ));

    let resolved = run_pcx(&home, &clone, &["resolve", "--json"]);
    assert_success(&resolved);
    let result = json(&resolved);
    assert_eq!(result["status"], "RESOLVED");
    assert_eq!(result["best_candidate"]["matched_via"], "git-remote");

    mkdir(&clone, "tools");
    let nested = run_pcx(&home, &clone, &["add", "tools", "--root", "tools", "--json"]);
    assert_success(&nested);
    assert!(json(&nested)["git_remote"].is_null());

    let copy = run_pcx(&home, &clone, &["add", "alpha copy", "--json"]);
    assert_success(&copy);
    assert_eq!(json(&copy)["git_remote"], "git@github.com:Acme/alpha.git");

    let _ = std::fs::remove_dir_all(root);
}
