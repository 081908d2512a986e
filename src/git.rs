use std::error::Error;
use std::fmt;
use std::path::Path;
use std::process::{Command, Output};

#[derive(Debug)]
pub enum GitError {
    Io(std::io::Error),
    GitUnavailable,
    GitCommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl GitError {
    pub fn is_not_a_worktree(&self) -> bool {
        match self {
            GitError::GitCommandFailed { stderr, .. } => {
                let lower = stderr.to_ascii_lowercase();
                lower.contains("is not a working tree") || lower.contains("not a git repository")
            }
            _ => false,
        }
    }
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitError::Io(err) => write!(f, "I/O error: {}", err),
            GitError::GitUnavailable => write!(f, "git CLI is not installed"),
            GitError::GitCommandFailed {
                command,
                code,
                stderr,
            } => {
                write!(
                    f,
                    "git command failed (code {:?}): {} ({})",
                    code, command, stderr
                )
            }
        }
    }
}

impl Error for GitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GitError::Io(err) => Some(err),
            GitError::GitUnavailable => None,
            GitError::GitCommandFailed { .. } => None,
        }
    }
}

impl From<std::io::Error> for GitError {
    fn from(value: std::io::Error) -> Self {
        GitError::Io(value)
    }
}

/// The versioned-filesystem operations the lifecycle relies on.
pub trait WorktreeVcs {
    fn branch_exists(&self, repo_root: &Path, branch: &str) -> Result<bool, GitError>;
    fn current_branch(&self, cwd: &Path) -> Result<String, GitError>;
    fn worktree_add_existing_branch(
        &self,
        repo_root: &Path,
        worktree: &Path,
        branch: &str,
    ) -> Result<(), GitError>;
    fn worktree_add_new_branch(
        &self,
        repo_root: &Path,
        worktree: &Path,
        branch: &str,
    ) -> Result<(), GitError>;
    fn worktree_remove(&self, repo_root: &Path, worktree: &Path, force: bool)
        -> Result<(), GitError>;
    fn worktree_prune(&self, repo_root: &Path) -> Result<(), GitError>;
}

#[derive(Debug, Clone, Default)]
pub struct GitAdapter;

impl GitAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn is_available(&self) -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    pub fn is_repository(&self, cwd: &Path) -> Result<bool, GitError> {
        let output = self.run_allow_failure(
            cwd,
            vec!["rev-parse".to_string(), "--git-dir".to_string()],
        )?;
        Ok(output.status.success())
    }

    fn run_checked(&self, cwd: &Path, args: Vec<String>) -> Result<String, GitError> {
        let output = self.run_allow_failure(cwd, args.clone())?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(GitError::GitCommandFailed {
                command: display_command(cwd, &args),
                code: output.status.code(),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_allow_failure(&self, cwd: &Path, args: Vec<String>) -> Result<Output, GitError> {
        tracing::debug!(command = %display_command(cwd, &args), "running git");
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(cwd).args(&args);
        cmd.output().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                GitError::GitUnavailable
            } else {
                GitError::Io(err)
            }
        })
    }
}

impl WorktreeVcs for GitAdapter {
    fn branch_exists(&self, repo_root: &Path, branch: &str) -> Result<bool, GitError> {
        let output = self.run_allow_failure(
            repo_root,
            vec![
                "show-ref".to_string(),
                "--verify".to_string(),
                "--quiet".to_string(),
                format!("refs/heads/{}", branch),
            ],
        )?;
        Ok(output.status.success())
    }

    fn current_branch(&self, cwd: &Path) -> Result<String, GitError> {
        self.run_checked(
            cwd,
            vec![
                "rev-parse".to_string(),
                "--abbrev-ref".to_string(),
                "HEAD".to_string(),
            ],
        )
    }

    fn worktree_add_existing_branch(
        &self,
        repo_root: &Path,
        worktree: &Path,
        branch: &str,
    ) -> Result<(), GitError> {
        self.run_checked(
            repo_root,
            vec![
                "worktree".to_string(),
                "add".to_string(),
                display_path(worktree),
                branch.to_string(),
            ],
        )?;
        Ok(())
    }

    fn worktree_add_new_branch(
        &self,
        repo_root: &Path,
        worktree: &Path,
        branch: &str,
    ) -> Result<(), GitError> {
        self.run_checked(
            repo_root,
            vec![
                "worktree".to_string(),
                "add".to_string(),
                "-b".to_string(),
                branch.to_string(),
                display_path(worktree),
            ],
        )?;
        Ok(())
    }

    fn worktree_remove(
        &self,
        repo_root: &Path,
        worktree: &Path,
        force: bool,
    ) -> Result<(), GitError> {
        let mut args = vec!["worktree".to_string(), "remove".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(display_path(worktree));
        self.run_checked(repo_root, args)?;
        Ok(())
    }

    fn worktree_prune(&self, repo_root: &Path) -> Result<(), GitError> {
        self.run_checked(repo_root, vec!["worktree".to_string(), "prune".to_string()])?;
        Ok(())
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn display_command(cwd: &Path, args: &[String]) -> String {
    format!("git -C {} {}", cwd.display(), args.join(" "))
}
