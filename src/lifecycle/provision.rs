use std::path::Path;

use crate::config::WORKTREES_DIR;
use crate::git::{GitError, WorktreeVcs};
use crate::gitignore;
use crate::metadata::{now_utc_rfc3339, worktree_name, MetadataStore, WorktreeRecord};
use crate::os::{OsFacade, SpawnRequest};
use crate::outcome::{Outcome, Step, StepOutcome, Warning, WarningLog};
use crate::ports::PortAllocator;
use crate::snapshot;

use super::{LifecycleError, WorktreeManager};

pub const DEPENDENCY_DIR: &str = "node_modules";
pub const DEV_SERVER_LOG: &str = ".dev-server.log";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOptions {
    pub start_server: bool,
    pub branch_prefix: Option<String>,
    pub port: Option<u16>,
}

impl<S: MetadataStore, V: WorktreeVcs, O: OsFacade> WorktreeManager<S, V, O> {
    /// Provisions the worktree for one issue. The metadata document is
    /// written exactly once, at the end; every failure before that leaves it
    /// untouched.
    pub fn create(
        &self,
        issue_number: u64,
        slug: &str,
        options: &CreateOptions,
    ) -> Result<Outcome<WorktreeRecord>, LifecycleError> {
        validate_issue_number(issue_number)?;
        validate_slug(slug)?;

        let name = worktree_name(issue_number, slug);
        let mut document = self.store.load()?;
        if document.worktrees.contains_key(&name) || document.find_by_issue(issue_number).is_some()
        {
            return Err(LifecycleError::Duplicate { name, issue_number });
        }

        let prefix = options
            .branch_prefix
            .as_deref()
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(self.config.branch_prefix.as_str())
            .trim_end_matches('/');
        let branch = format!("{}/{}", prefix, name);
        let relative_path = format!("{}/{}", WORKTREES_DIR, name);
        let worktree_dir = self.repo_root.join(WORKTREES_DIR).join(&name);

        let port = PortAllocator::new(&self.os).next_available_port(&document, options.port)?;
        tracing::info!(%name, %branch, port, "provisioning worktree");

        let mut log = WarningLog::new();
        log.settle(self.add_worktree(&worktree_dir, &branch))?;
        log.settle(self.link_dependencies(&worktree_dir))?;
        let db_snapshots = log.settle(self.snapshot_databases(&worktree_dir))?;
        log.settle(self.ensure_ignore_rules())?;

        document.advance_cursor_past(port);
        let dev_server_pid = if options.start_server {
            log.settle(self.start_dev_server(&worktree_dir, port))?
        } else {
            None
        };

        let record = WorktreeRecord {
            issue_number,
            slug: slug.to_string(),
            branch,
            port,
            path: relative_path,
            created_at: now_utc_rfc3339(),
            db_snapshots,
            dev_server_pid,
        };
        document.worktrees.insert(name, record.clone());
        if let Err(err) = self.store.save(&document) {
            // Nothing will point at the server once we return.
            if let Some(pid) = record.dev_server_pid {
                if let Err(signal_err) = self.os.signal(pid) {
                    tracing::warn!(pid, error = %signal_err, "could not stop unrecorded dev server");
                }
            }
            return Err(err.into());
        }
        tracing::info!(issue_number, port, "worktree recorded");

        Ok(log.finish(record))
    }

    fn add_worktree(&self, worktree_dir: &Path, branch: &str) -> StepOutcome<()> {
        match self.try_add_worktree(worktree_dir, branch) {
            Ok(()) => StepOutcome::Done(()),
            Err(err) => StepOutcome::Fatal(err),
        }
    }

    fn try_add_worktree(&self, worktree_dir: &Path, branch: &str) -> Result<(), LifecycleError> {
        let provision_error = |message: &str, source: Option<GitError>| LifecycleError::Provision {
            branch: branch.to_string(),
            message: message.to_string(),
            source,
        };

        if worktree_dir.join(".git").exists() {
            // Left behind by an interrupted create; reuse it if it is ours.
            let current = self
                .vcs
                .current_branch(worktree_dir)
                .map_err(|err| provision_error("cannot inspect existing checkout", Some(err)))?;
            if current == branch {
                tracing::info!(path = %worktree_dir.display(), "reusing existing worktree checkout");
                return Ok(());
            }
            return Err(provision_error(
                &format!(
                    "'{}' already holds a checkout of '{}'",
                    worktree_dir.display(),
                    current
                ),
                None,
            ));
        }
        if worktree_dir.exists() {
            return Err(provision_error(
                &format!(
                    "'{}' exists and is not a git worktree",
                    worktree_dir.display()
                ),
                None,
            ));
        }
        if let Some(parent) = worktree_dir.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                provision_error("cannot create worktrees directory", Some(err.into()))
            })?;
        }

        let branch_exists = self
            .vcs
            .branch_exists(&self.repo_root, branch)
            .map_err(|err| provision_error("cannot inspect branches", Some(err)))?;
        let added = if branch_exists {
            tracing::info!(%branch, "branch exists; checking it out");
            self.vcs
                .worktree_add_existing_branch(&self.repo_root, worktree_dir, branch)
        } else {
            self.vcs
                .worktree_add_new_branch(&self.repo_root, worktree_dir, branch)
        };
        added.map_err(|err| provision_error("git worktree add failed", Some(err)))
    }

    fn link_dependencies(&self, worktree_dir: &Path) -> StepOutcome<()> {
        let shared = self.repo_root.join(DEPENDENCY_DIR);
        let link = worktree_dir.join(DEPENDENCY_DIR);
        if !shared.is_dir() {
            return StepOutcome::recovered(
                (),
                Warning::new(
                    Step::LinkDependencies,
                    format!(
                        "no shared {} in the main checkout; install dependencies in the worktree",
                        DEPENDENCY_DIR
                    ),
                ),
            );
        }
        if link.symlink_metadata().is_ok() {
            return StepOutcome::Done(());
        }
        match symlink_dir(&shared, &link) {
            Ok(()) => StepOutcome::Done(()),
            Err(err) => StepOutcome::recovered(
                (),
                Warning::new(
                    Step::LinkDependencies,
                    format!("could not link {}: {}", link.display(), err),
                ),
            ),
        }
    }

    fn snapshot_databases(&self, worktree_dir: &Path) -> StepOutcome<Vec<String>> {
        let custom = self.config.custom_db_path(&self.repo_root);
        snapshot::snapshot_all(worktree_dir, &self.repo_root, custom.as_deref()).into()
    }

    fn ensure_ignore_rules(&self) -> StepOutcome<()> {
        match gitignore::ensure_rules(&self.repo_root) {
            Ok(added) => {
                if !added.is_empty() {
                    tracing::info!(rules = ?added, "added worktree rules to .gitignore");
                }
                StepOutcome::Done(())
            }
            Err(err) => StepOutcome::recovered(
                (),
                Warning::new(
                    Step::IgnoreRules,
                    format!("could not update .gitignore: {}", err),
                ),
            ),
        }
    }

    fn start_dev_server(&self, worktree_dir: &Path, port: u16) -> StepOutcome<Option<u32>> {
        let request = SpawnRequest {
            program: self.config.package_runner.clone(),
            args: vec![
                "run".to_string(),
                self.config.dev_command.clone(),
                "--".to_string(),
                "--port".to_string(),
                port.to_string(),
            ],
            cwd: worktree_dir.to_path_buf(),
            env: vec![("PORT".to_string(), port.to_string())],
            log_path: worktree_dir.join(DEV_SERVER_LOG),
        };
        match self.os.spawn_detached(&request) {
            Ok(pid) => {
                tracing::info!(pid, port, "dev server started");
                StepOutcome::Done(Some(pid))
            }
            Err(err) => StepOutcome::recovered(
                None,
                Warning::new(
                    Step::StartDevServer,
                    format!(
                        "`{} {}` failed to start: {}",
                        request.program,
                        request.args.join(" "),
                        err
                    ),
                ),
            ),
        }
    }
}

fn validate_issue_number(issue_number: u64) -> Result<(), LifecycleError> {
    if issue_number == 0 {
        return Err(LifecycleError::InvalidArgument(
            "issue number must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

fn validate_slug(slug: &str) -> Result<(), LifecycleError> {
    let well_formed = !slug.is_empty()
        && slug
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !slug.starts_with(['-', '.'])
        && !slug.ends_with('.')
        && !slug.ends_with(".lock")
        && !slug.contains("..");
    if well_formed {
        Ok(())
    } else {
        Err(LifecycleError::InvalidArgument(format!(
            "slug '{}' must be non-empty and use only letters, digits, '-', '_' or '.'",
            slug
        )))
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}
