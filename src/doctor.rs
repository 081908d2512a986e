use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::config::METADATA_FILE_NAME;
use crate::git::GitAdapter;
use crate::gitignore;
use crate::metadata::MetadataDocument;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DoctorStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorCheck {
    pub name: String,
    pub status: DoctorStatus,
    pub detail: String,
}

impl DoctorCheck {
    fn new(name: &str, status: DoctorStatus, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DoctorReport {
    pub checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    pub fn failure_count(&self) -> usize {
        self.checks
            .iter()
            .filter(|check| check.status == DoctorStatus::Fail)
            .count()
    }
}

#[derive(Debug)]
pub enum DoctorError {
    Io(std::io::Error),
}

impl fmt::Display for DoctorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoctorError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl Error for DoctorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DoctorError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for DoctorError {
    fn from(value: std::io::Error) -> Self {
        DoctorError::Io(value)
    }
}

pub fn run_doctor(repo_root: &Path) -> Result<DoctorReport, DoctorError> {
    let git = GitAdapter::new();
    let mut checks = vec![check_git_cli(&git), check_repository(&git, repo_root)];

    let (metadata_check, document) = check_metadata(repo_root)?;
    checks.push(metadata_check);
    if let Some(document) = document {
        checks.push(check_worktree_paths(repo_root, &document));
        checks.push(check_port_conflicts(&document));
    }
    checks.push(check_gitignore(repo_root)?);

    Ok(DoctorReport { checks })
}

fn check_git_cli(git: &GitAdapter) -> DoctorCheck {
    if git.is_available() {
        DoctorCheck::new("git_cli", DoctorStatus::Pass, "git is installed")
    } else {
        DoctorCheck::new("git_cli", DoctorStatus::Fail, "git CLI is not installed")
    }
}

fn check_repository(git: &GitAdapter, repo_root: &Path) -> DoctorCheck {
    match git.is_repository(repo_root) {
        Ok(true) => DoctorCheck::new("repository", DoctorStatus::Pass, "repo root is a git repository"),
        Ok(false) => DoctorCheck::new(
            "repository",
            DoctorStatus::Fail,
            format!("'{}' is not a git repository", repo_root.display()),
        ),
        Err(err) => DoctorCheck::new(
            "repository",
            DoctorStatus::Fail,
            format!("repository check failed: {}", err),
        ),
    }
}

fn check_metadata(
    repo_root: &Path,
) -> Result<(DoctorCheck, Option<MetadataDocument>), DoctorError> {
    let path = repo_root.join(METADATA_FILE_NAME);
    if !path.exists() {
        return Ok((
            DoctorCheck::new("metadata", DoctorStatus::Pass, "no worktrees recorded yet"),
            None,
        ));
    }

    let raw = std::fs::read_to_string(&path)?;
    match serde_json::from_str::<MetadataDocument>(&raw) {
        Ok(document) => Ok((
            DoctorCheck::new(
                "metadata",
                DoctorStatus::Pass,
                format!(
                    "{} worktree(s) tracked, next port {}",
                    document.worktrees.len(),
                    document.next_port
                ),
            ),
            Some(document),
        )),
        Err(err) => Ok((
            DoctorCheck::new(
                "metadata",
                DoctorStatus::Fail,
                format!(
                    "{} is unreadable ({}); the next create starts from an empty document",
                    METADATA_FILE_NAME, err
                ),
            ),
            None,
        )),
    }
}

fn check_worktree_paths(repo_root: &Path, document: &MetadataDocument) -> DoctorCheck {
    let missing: Vec<&str> = document
        .worktrees
        .iter()
        .filter(|(_, record)| !repo_root.join(&record.path).is_dir())
        .map(|(name, _)| name.as_str())
        .collect();
    if missing.is_empty() {
        DoctorCheck::new(
            "worktree_paths",
            DoctorStatus::Pass,
            "every recorded worktree directory exists",
        )
    } else {
        DoctorCheck::new(
            "worktree_paths",
            DoctorStatus::Warn,
            format!(
                "missing directories for {}; `delete --force` drops stale records",
                missing.join(", ")
            ),
        )
    }
}

fn check_port_conflicts(document: &MetadataDocument) -> DoctorCheck {
    let mut by_port: BTreeMap<u16, Vec<&str>> = BTreeMap::new();
    for (name, record) in &document.worktrees {
        by_port.entry(record.port).or_default().push(name);
    }
    let conflicts: Vec<String> = by_port
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(port, names)| format!("{} ({})", port, names.join(", ")))
        .collect();
    if conflicts.is_empty() {
        DoctorCheck::new("port_conflicts", DoctorStatus::Pass, "recorded ports are unique")
    } else {
        DoctorCheck::new(
            "port_conflicts",
            DoctorStatus::Fail,
            format!("ports shared by several worktrees: {}", conflicts.join("; ")),
        )
    }
}

fn check_gitignore(repo_root: &Path) -> Result<DoctorCheck, DoctorError> {
    let missing = gitignore::missing_rules(repo_root)?;
    Ok(if missing.is_empty() {
        DoctorCheck::new("gitignore", DoctorStatus::Pass, "worktree paths are ignored")
    } else {
        DoctorCheck::new(
            "gitignore",
            DoctorStatus::Warn,
            format!(".gitignore lacks {}", missing.join(", ")),
        )
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{run_doctor, DoctorStatus};

    fn unique_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("worktrees-doctor-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    fn status_of(report: &super::DoctorReport, name: &str) -> Option<DoctorStatus> {
        report
            .checks
            .iter()
            .find(|check| check.name == name)
            .map(|check| check.status)
    }

    #[test]
    fn flags_corrupt_metadata_and_missing_ignore_rules() {
        let root = unique_dir();
        std::fs::write(root.join(".worktrees.json"), "{").expect("metadata writable");

        let report = run_doctor(&root).expect("doctor should run");
        assert_eq!(status_of(&report, "metadata"), Some(DoctorStatus::Fail));
        assert_eq!(status_of(&report, "gitignore"), Some(DoctorStatus::Warn));
        assert_eq!(status_of(&report, "worktree_paths"), None);
        assert!(report.failure_count() >= 1);
    }

    #[test]
    fn flags_shared_ports_and_missing_directories() {
        let root = unique_dir();
        let record = |issue: u64, slug: &str| {
            serde_json::json!({
                "issueNumber": issue,
                "slug": slug,
                "branch": format!("feature/issue-{issue}-{slug}"),
                "port": 4400,
                "path": format!(".worktrees/issue-{issue}-{slug}"),
                "createdAt": "2026-03-01T10:00:00Z",
                "dbSnapshots": [],
                "devServerPid": null
            })
        };
        let document = serde_json::json!({
            "worktrees": {
                "issue-1-a": record(1, "a"),
                "issue-2-b": record(2, "b"),
            },
            "nextPort": 4401
        });
        std::fs::write(root.join(".worktrees.json"), document.to_string())
            .expect("metadata writable");
        std::fs::create_dir_all(root.join(".worktrees/issue-1-a")).expect("dir creatable");

        let report = run_doctor(&root).expect("doctor should run");
        assert_eq!(status_of(&report, "metadata"), Some(DoctorStatus::Pass));
        assert_eq!(status_of(&report, "port_conflicts"), Some(DoctorStatus::Fail));
        let paths = report
            .checks
            .iter()
            .find(|check| check.name == "worktree_paths")
            .expect("paths check should run");
        assert_eq!(paths.status, DoctorStatus::Warn);
        assert!(paths.detail.contains("issue-2-b"));
        assert!(!paths.detail.contains("issue-1-a"));
    }
}
