use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use crate::config::{Config, METADATA_FILE_NAME};
use crate::git::{GitAdapter, GitError};
use crate::metadata::{JsonFileStore, StoreError};
use crate::os::SystemOs;
use crate::ports::PortError;

mod provision;
mod query;
mod reap;

pub use provision::CreateOptions;

/// Owns the collaborators every lifecycle operation runs against. Each CLI
/// invocation builds one, runs one operation, and exits.
pub struct WorktreeManager<S, V, O> {
    repo_root: PathBuf,
    config: Config,
    store: S,
    vcs: V,
    os: O,
}

pub type SystemManager = WorktreeManager<JsonFileStore, GitAdapter, SystemOs>;

impl<S, V, O> WorktreeManager<S, V, O> {
    pub fn new(repo_root: PathBuf, config: Config, store: S, vcs: V, os: O) -> Self {
        Self {
            repo_root,
            config,
            store,
            vcs,
            os,
        }
    }

    #[cfg(test)]
    pub fn repo_root(&self) -> &std::path::Path {
        &self.repo_root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl SystemManager {
    pub fn open(repo_root: PathBuf, config: Config) -> Self {
        let store = JsonFileStore::new(repo_root.join(METADATA_FILE_NAME), config.base_port);
        Self::new(repo_root, config, store, GitAdapter::new(), SystemOs::new())
    }
}

#[derive(Debug)]
pub enum LifecycleError {
    InvalidArgument(String),
    Duplicate {
        name: String,
        issue_number: u64,
    },
    Provision {
        branch: String,
        message: String,
        source: Option<GitError>,
    },
    NotFound {
        issue_number: u64,
    },
    Teardown {
        path: PathBuf,
        source: GitError,
    },
    Store(StoreError),
    Port(PortError),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::InvalidArgument(message) => write!(f, "{}", message),
            LifecycleError::Duplicate { name, issue_number } => write!(
                f,
                "worktree '{}' already exists for issue #{}",
                name, issue_number
            ),
            LifecycleError::Provision {
                branch,
                message,
                source,
            } => match source {
                Some(source) => write!(
                    f,
                    "failed to provision worktree for branch '{}': {}: {}",
                    branch, message, source
                ),
                None => write!(
                    f,
                    "failed to provision worktree for branch '{}': {}",
                    branch, message
                ),
            },
            LifecycleError::NotFound { issue_number } => {
                write!(f, "no worktree found for issue #{}", issue_number)
            }
            LifecycleError::Teardown { path, source } => {
                write!(
                    f,
                    "failed to remove worktree '{}': {}",
                    path.display(),
                    source
                )?;
                if source.is_not_a_worktree() {
                    write!(f, " (git no longer tracks it; use --force to drop the record)")
                } else {
                    write!(f, " (re-run with --force to remove it anyway)")
                }
            }
            LifecycleError::Store(err) => write!(f, "{}", err),
            LifecycleError::Port(err) => write!(f, "{}", err),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LifecycleError::InvalidArgument(_) => None,
            LifecycleError::Duplicate { .. } => None,
            LifecycleError::Provision { source, .. } => {
                source.as_ref().map(|err| err as &(dyn Error + 'static))
            }
            LifecycleError::NotFound { .. } => None,
            LifecycleError::Teardown { source, .. } => Some(source),
            LifecycleError::Store(err) => Some(err),
            LifecycleError::Port(err) => Some(err),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(value: StoreError) -> Self {
        LifecycleError::Store(value)
    }
}

impl From<PortError> for LifecycleError {
    fn from(value: PortError) -> Self {
        LifecycleError::Port(value)
    }
}

#[cfg(test)]
mod fakes;
