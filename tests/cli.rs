use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use uuid::Uuid;

const CONFIG_ENV: [&str; 7] = [
    "WORKTREE_BRANCH_PREFIX",
    "WORKTREE_BASE_PORT",
    "WORKTREE_MAIN_PORT",
    "WORKTREE_DEV_COMMAND",
    "WORKTREE_PACKAGE_RUNNER",
    "WORKTREE_DB_PATH",
    "WORKTREE_REPO_ROOT",
];

fn unique_workspace(prefix: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{prefix}-{}", Uuid::now_v7()));
    std::fs::create_dir_all(&path).expect("workspace should be creatable");
    path
}

fn run_git(cwd: &Path, args: &[&str]) -> Output {
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
    output
}

fn setup_repo(root: &Path) {
    run_git(root, &["init"]);
    run_git(root, &["config", "user.email", "worktrees@example.com"]);
    run_git(root, &["config", "user.name", "Worktrees Test"]);
    std::fs::write(root.join("README.md"), "# app\n").expect("readme should be writable");
    run_git(root, &["add", "README.md"]);
    run_git(root, &["commit", "-m", "init"]);
    run_git(root, &["branch", "-M", "main"]);
}

fn run_worktrees(repo_root: &Path, base_port: u16, args: &[&str]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_worktrees"));
    for key in CONFIG_ENV {
        command.env_remove(key);
    }
    command
        .env("WORKTREE_BASE_PORT", base_port.to_string())
        .env("NO_COLOR", "1")
        .arg("--repo-root")
        .arg(repo_root)
        .args(args)
        .output()
        .expect("worktrees command should run")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success but failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn assert_exit_code(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "unexpected exit code.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn parse_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn create_list_info_delete_round_through_a_real_repository() {
    let root = unique_workspace("worktrees-cli-lifecycle");
    setup_repo(&root);

    let created = run_worktrees(&root, 45110, &["create", "15", "dark-mode", "--json"]);
    assert_success(&created);
    let json = parse_json(&created);
    let record = &json["value"];
    assert_eq!(record["issueNumber"], 15);
    assert_eq!(record["branch"], "feature/issue-15-dark-mode");
    assert_eq!(record["path"], ".worktrees/issue-15-dark-mode");
    assert!(record["port"].as_u64().expect("port") >= 45110);
    assert_eq!(record["dbSnapshots"], Value::Array(Vec::new()));
    assert_eq!(record["devServerPid"], Value::Null);
    assert!(String::from_utf8_lossy(&created.stderr).contains("warning:"));

    assert!(root.join(".worktrees/issue-15-dark-mode/README.md").exists());
    let branches = run_git(&root, &["branch", "--list", "feature/issue-15-dark-mode"]);
    assert!(String::from_utf8_lossy(&branches.stdout).contains("feature/issue-15-dark-mode"));
    let ignore = std::fs::read_to_string(root.join(".gitignore")).expect("gitignore written");
    assert!(ignore.contains(".worktrees/"));

    let listed = run_worktrees(&root, 45110, &["list"]);
    assert_success(&listed);
    let stdout = String::from_utf8_lossy(&listed.stdout);
    assert!(stdout.contains("#15"));
    assert!(stdout.contains("main: http://localhost:4321"));

    let info = run_worktrees(&root, 45110, &["info", "15", "--json"]);
    assert_success(&info);
    assert_eq!(parse_json(&info)["slug"], "dark-mode");

    let deleted = run_worktrees(&root, 45110, &["delete", "15", "--json"]);
    assert_success(&deleted);
    let json = parse_json(&deleted);
    assert_eq!(json["value"]["issueNumber"], 15);
    assert_eq!(json["warnings"], Value::Array(Vec::new()));
    assert!(!root.join(".worktrees/issue-15-dark-mode").exists());

    let gone = run_worktrees(&root, 45110, &["info", "15"]);
    assert_exit_code(&gone, 1);
    assert!(String::from_utf8_lossy(&gone.stderr).contains("no worktree found for issue #15"));

    let listed = run_worktrees(&root, 45110, &["list", "--json"]);
    assert_success(&listed);
    assert_eq!(parse_json(&listed), Value::Array(Vec::new()));
}

#[test]
fn duplicate_create_fails_and_keeps_the_first_record() {
    let root = unique_workspace("worktrees-cli-duplicate");
    setup_repo(&root);

    assert_success(&run_worktrees(&root, 45210, &["create", "7", "search"]));
    let before = std::fs::read(root.join(".worktrees.json")).expect("metadata written");

    let again = run_worktrees(&root, 45210, &["create", "7", "search"]);
    assert_exit_code(&again, 1);
    assert!(String::from_utf8_lossy(&again.stderr).contains("already exists"));
    let after = std::fs::read(root.join(".worktrees.json")).expect("metadata still present");
    assert_eq!(before, after);
}

#[test]
fn deleting_an_unknown_issue_exits_one_without_touching_metadata() {
    let root = unique_workspace("worktrees-cli-unknown");
    setup_repo(&root);

    assert_success(&run_worktrees(&root, 45310, &["create", "1", "first"]));
    let before = std::fs::read(root.join(".worktrees.json")).expect("metadata written");

    let missing = run_worktrees(&root, 45310, &["delete", "99"]);
    assert_exit_code(&missing, 1);
    assert!(String::from_utf8_lossy(&missing.stderr).starts_with("error:"));
    let after = std::fs::read(root.join(".worktrees.json")).expect("metadata still present");
    assert_eq!(before, after);
}

#[test]
fn unforced_delete_of_a_dirty_worktree_fails_and_force_succeeds() {
    let root = unique_workspace("worktrees-cli-dirty");
    setup_repo(&root);

    assert_success(&run_worktrees(&root, 45410, &["create", "3", "dirty"]));
    std::fs::write(root.join(".worktrees/issue-3-dirty/scratch.txt"), "wip\n")
        .expect("untracked file writable");

    let refused = run_worktrees(&root, 45410, &["delete", "3"]);
    assert_exit_code(&refused, 1);
    assert!(String::from_utf8_lossy(&refused.stderr).contains("--force"));
    assert_success(&run_worktrees(&root, 45410, &["info", "3"]));

    let forced = run_worktrees(&root, 45410, &["delete", "3", "--force"]);
    assert_success(&forced);
    assert!(!root.join(".worktrees/issue-3-dirty").exists());
    assert_exit_code(&run_worktrees(&root, 45410, &["info", "3"]), 1);
}

#[test]
fn help_and_version_exit_zero_and_unknown_commands_exit_one() {
    let root = unique_workspace("worktrees-cli-flags");

    for flag in ["-h", "--help"] {
        let output = run_worktrees(&root, 45510, &[flag]);
        assert_exit_code(&output, 0);
        assert!(String::from_utf8_lossy(&output.stdout).contains("create"));
    }
    for flag in ["-v", "--version"] {
        let output = run_worktrees(&root, 45510, &[flag]);
        assert_exit_code(&output, 0);
        assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
    }

    let unknown = run_worktrees(&root, 45510, &["frobnicate"]);
    assert_exit_code(&unknown, 1);

    let bad_issue = run_worktrees(&root, 45510, &["create", "0", "zero"]);
    assert_exit_code(&bad_issue, 1);
}

#[test]
fn completions_print_a_script() {
    let root = unique_workspace("worktrees-cli-completions");
    let output = run_worktrees(&root, 45610, &["completions", "bash"]);
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("worktrees"));
}
