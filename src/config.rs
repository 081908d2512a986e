use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = ".worktrees.toml";
pub const METADATA_FILE_NAME: &str = ".worktrees.json";
pub const WORKTREES_DIR: &str = ".worktrees";

pub const DEFAULT_BRANCH_PREFIX: &str = "feature";
pub const DEFAULT_BASE_PORT: u16 = 4322;
pub const DEFAULT_MAIN_PORT: u16 = 4321;
pub const DEFAULT_DEV_COMMAND: &str = "dev";
pub const DEFAULT_PACKAGE_RUNNER: &str = "npm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub branch_prefix: String,
    pub base_port: u16,
    pub main_port: u16,
    pub dev_command: String,
    pub package_runner: String,
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            base_port: DEFAULT_BASE_PORT,
            main_port: DEFAULT_MAIN_PORT,
            dev_command: DEFAULT_DEV_COMMAND.to_string(),
            package_runner: DEFAULT_PACKAGE_RUNNER.to_string(),
            db_path: None,
        }
    }
}

/// Values that win over the config file. The CLI fills these from flags or
/// their `WORKTREE_*` environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub branch_prefix: Option<String>,
    pub base_port: Option<u16>,
    pub main_port: Option<u16>,
    pub dev_command: Option<String>,
    pub package_runner: Option<String>,
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfigFile {
    branch_prefix: Option<String>,
    base_port: Option<u16>,
    main_port: Option<u16>,
    dev_command: Option<String>,
    package_runner: Option<String>,
    db_path: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml { path: PathBuf, source: toml::de::Error },
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "I/O error reading config: {}", err),
            ConfigError::Toml { path, source } => {
                write!(f, "invalid config '{}': {}", path.display(), source)
            }
            ConfigError::Invalid(message) => write!(f, "invalid config: {}", message),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl Config {
    /// Defaults, then `.worktrees.toml` in the repo root, then overrides.
    pub fn load(repo_root: &Path, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let path = repo_root.join(CONFIG_FILE_NAME);
        let file = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str::<RawConfigFile>(&raw).map_err(|source| ConfigError::Toml {
                path: path.clone(),
                source,
            })?
        } else {
            RawConfigFile::default()
        };

        let defaults = Config::default();
        let config = Config {
            branch_prefix: pick_text(
                overrides.branch_prefix,
                file.branch_prefix,
                defaults.branch_prefix,
            ),
            base_port: overrides
                .base_port
                .or(file.base_port)
                .unwrap_or(defaults.base_port),
            main_port: overrides
                .main_port
                .or(file.main_port)
                .unwrap_or(defaults.main_port),
            dev_command: pick_text(overrides.dev_command, file.dev_command, defaults.dev_command),
            package_runner: pick_text(
                overrides.package_runner,
                file.package_runner,
                defaults.package_runner,
            ),
            db_path: overrides
                .db_path
                .or(file.db_path)
                .filter(|path| !path.as_os_str().is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.base_port == 0 {
            return Err(ConfigError::Invalid("base_port must be positive".to_string()));
        }
        let prefix = self.branch_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid(format!(
                "branch prefix '{}' is not a usable branch component",
                self.branch_prefix
            )));
        }
        Ok(())
    }

    /// Custom database path resolved against the repo root.
    pub fn custom_db_path(&self, repo_root: &Path) -> Option<PathBuf> {
        self.db_path.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                repo_root.join(path)
            }
        })
    }
}

fn pick_text(first: Option<String>, second: Option<String>, fallback: String) -> String {
    first
        .into_iter()
        .chain(second)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or(fallback)
}
