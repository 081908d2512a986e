use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigError, ConfigOverrides};
use crate::doctor::DoctorError;
use crate::lifecycle::{LifecycleError, SystemManager};

/// Resolves the repo root and loads configuration for one CLI invocation.
pub fn open_manager(
    repo_root: &Path,
    overrides: ConfigOverrides,
) -> Result<SystemManager, AppError> {
    let repo_root = resolve_repo_root(repo_root)?;
    let config = Config::load(&repo_root, overrides)?;
    Ok(SystemManager::open(repo_root, config))
}

/// Git resolves relative worktree paths against `-C`, so the root must be
/// absolute before any path is derived from it.
pub fn resolve_repo_root(repo_root: &Path) -> Result<PathBuf, AppError> {
    std::fs::canonicalize(repo_root).map_err(|err| {
        AppError::InvalidArgument(format!(
            "repo root '{}' is not accessible: {}",
            repo_root.display(),
            err
        ))
    })
}

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Lifecycle(LifecycleError),
    Doctor(DoctorError),
    InvalidArgument(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Lifecycle(err) => write!(f, "{}", err),
            AppError::Doctor(err) => write!(f, "doctor error: {}", err),
            AppError::InvalidArgument(message) => write!(f, "{}", message),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Lifecycle(err) => Some(err),
            AppError::Doctor(err) => Some(err),
            AppError::InvalidArgument(_) => None,
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        AppError::Config(value)
    }
}

impl From<LifecycleError> for AppError {
    fn from(value: LifecycleError) -> Self {
        AppError::Lifecycle(value)
    }
}

impl From<DoctorError> for AppError {
    fn from(value: DoctorError) -> Self {
        AppError::Doctor(value)
    }
}
