use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};

use crate::outcome::{Outcome, Step, Warning};

/// Local D1 state written by wrangler/miniflare.
pub const EMBEDDED_STATE_DIR: &str = ".wrangler/state/v3/d1";
pub const DB_EXTENSIONS: [&str; 3] = ["db", "sqlite", "sqlite3"];
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];
const OUTSIDE_ROOT_DIR: &str = ".db-snapshots";

#[derive(Debug)]
pub enum SnapshotError {
    MissingSource(PathBuf),
    EmptyDirectory(PathBuf),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Unreadable {
        path: PathBuf,
        source: rusqlite::Error,
    },
    IntegrityFailed {
        path: PathBuf,
        detail: String,
    },
}

impl SnapshotError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::MissingSource(path) => {
                write!(f, "database source '{}' does not exist", path.display())
            }
            SnapshotError::EmptyDirectory(path) => write!(
                f,
                "database directory '{}' contains no database files",
                path.display()
            ),
            SnapshotError::Io { path, source } => {
                write!(f, "copying '{}' failed: {}", path.display(), source)
            }
            SnapshotError::Unreadable { path, source } => write!(
                f,
                "integrity check could not read '{}': {}",
                path.display(),
                source
            ),
            SnapshotError::IntegrityFailed { path, detail } => write!(
                f,
                "integrity check failed for '{}': {}",
                path.display(),
                detail
            ),
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SnapshotError::Io { source, .. } => Some(source),
            SnapshotError::Unreadable { source, .. } => Some(source),
            SnapshotError::MissingSource(_)
            | SnapshotError::EmptyDirectory(_)
            | SnapshotError::IntegrityFailed { .. } => None,
        }
    }
}

/// Candidate stores in discovery order: the embedded state directory,
/// root-level database files sorted by name, then the custom path.
pub fn discover(root: &Path, custom: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    let state_dir = root.join(EMBEDDED_STATE_DIR);
    if state_dir.is_dir() {
        candidates.push(state_dir);
    }

    match fs::read_dir(root) {
        Ok(entries) => {
            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && has_db_extension(path))
                .collect();
            files.sort();
            candidates.extend(files);
        }
        Err(err) => {
            tracing::warn!(root = %root.display(), error = %err, "cannot scan repo root for databases");
        }
    }

    if let Some(custom) = custom {
        if custom.exists() {
            candidates.push(custom.to_path_buf());
        } else {
            tracing::debug!(path = %custom.display(), "custom database path does not exist");
        }
    }

    candidates
}

/// Copies one candidate into the worktree, keeping its repo-relative
/// location, and verifies every copied file. Directory sources are
/// all-or-nothing: on any failure all copies for the source are removed.
pub fn snapshot(worktree_dir: &Path, root: &Path, source: &Path) -> Result<PathBuf, SnapshotError> {
    if !source.exists() {
        return Err(SnapshotError::MissingSource(source.to_path_buf()));
    }
    let target = target_for(worktree_dir, root, source);

    if source.is_dir() {
        let files = collect_db_files(source)?;
        if files.is_empty() {
            return Err(SnapshotError::EmptyDirectory(source.to_path_buf()));
        }

        let mut copied = CopyLog::new(worktree_dir);
        for file in &files {
            let relative = file.strip_prefix(source).unwrap_or(file.as_path());
            let target_file = target.join(relative);
            let result = copy_database(file, &target_file, &mut copied)
                .and_then(|()| verify_integrity(&target_file));
            if let Err(err) = result {
                copied.discard();
                return Err(err);
            }
        }
    } else {
        let mut copied = CopyLog::new(worktree_dir);
        let result = copy_database(source, &target, &mut copied)
            .and_then(|()| verify_integrity(&target));
        if let Err(err) = result {
            copied.discard();
            return Err(err);
        }
    }

    Ok(target)
}

/// Snapshots every discovered candidate. A failing candidate becomes a
/// warning and is left out; it never stops the rest.
pub fn snapshot_all(
    worktree_dir: &Path,
    root: &Path,
    custom: Option<&Path>,
) -> Outcome<Vec<String>> {
    let candidates = discover(root, custom);
    if candidates.is_empty() {
        return Outcome {
            value: Vec::new(),
            warnings: vec![Warning::new(
                Step::SnapshotDatabases,
                "no SQLite databases found to snapshot",
            )],
        };
    }

    let mut accepted = Vec::new();
    let mut warnings = Vec::new();
    for candidate in candidates {
        match snapshot(worktree_dir, root, &candidate) {
            Ok(target) => {
                tracing::info!(source = %candidate.display(), target = %target.display(), "database snapshot accepted");
                accepted.push(relative_display(root, &target));
            }
            Err(err) => {
                tracing::warn!(source = %candidate.display(), error = %err, "database snapshot rejected");
                warnings.push(Warning::new(Step::SnapshotDatabases, err.to_string()));
            }
        }
    }

    Outcome {
        value: accepted,
        warnings,
    }
}

/// Runs SQLite's built-in `PRAGMA integrity_check` against `path`.
pub fn verify_integrity(path: &Path) -> Result<(), SnapshotError> {
    let unreadable = |source| SnapshotError::Unreadable {
        path: path.to_path_buf(),
        source,
    };
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(unreadable)?;

    let mut stmt = conn.prepare("PRAGMA integrity_check").map_err(unreadable)?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(unreadable)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(unreadable)?;

    let problems: Vec<String> = rows
        .into_iter()
        .filter(|row| !row.eq_ignore_ascii_case("ok"))
        .collect();
    if problems.is_empty() {
        Ok(())
    } else {
        Err(SnapshotError::IntegrityFailed {
            path: path.to_path_buf(),
            detail: problems.join("; "),
        })
    }
}

pub fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

fn target_for(worktree_dir: &Path, root: &Path, source: &Path) -> PathBuf {
    match source.strip_prefix(root) {
        Ok(relative) if !relative.as_os_str().is_empty() => worktree_dir.join(relative),
        _ => worktree_dir
            .join(OUTSIDE_ROOT_DIR)
            .join(source.file_name().unwrap_or(source.as_os_str())),
    }
}

fn has_db_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| DB_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn collect_db_files(dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
    let mut out = Vec::new();
    let mut dirs = vec![dir.to_path_buf()];
    while let Some(current) = dirs.pop() {
        let entries = fs::read_dir(&current).map_err(|err| SnapshotError::io(&current, err))?;
        for entry in entries {
            let path = entry
                .map_err(|err| SnapshotError::io(&current, err))?
                .path();
            if path.is_dir() {
                dirs.push(path);
            } else if has_db_extension(&path) {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// Files and directories one snapshot created, so a rejected snapshot can
/// be undone without touching anything that existed before it.
struct CopyLog<'a> {
    worktree_dir: &'a Path,
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
}

impl<'a> CopyLog<'a> {
    fn new(worktree_dir: &'a Path) -> Self {
        Self {
            worktree_dir,
            files: Vec::new(),
            dirs: Vec::new(),
        }
    }

    /// Creates `dir` and records every missing level below the worktree.
    fn create_dir_all(&mut self, dir: &Path) -> Result<(), SnapshotError> {
        let mut missing: Vec<PathBuf> = dir
            .ancestors()
            .take_while(|level| !level.exists())
            .filter(|level| level.starts_with(self.worktree_dir) && *level != self.worktree_dir)
            .map(Path::to_path_buf)
            .collect();
        fs::create_dir_all(dir).map_err(|err| SnapshotError::io(dir, err))?;
        missing.reverse();
        self.dirs.extend(missing);
        Ok(())
    }

    fn discard(self) {
        for path in &self.files {
            if let Err(err) = fs::remove_file(path) {
                tracing::debug!(path = %path.display(), error = %err, "could not remove rejected snapshot copy");
            }
        }
        let mut dirs = self.dirs;
        dirs.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));
        for dir in dirs {
            // Only empty directories go; remove_dir refuses anything else.
            let _ = fs::remove_dir(&dir);
        }
    }
}

fn copy_database(source: &Path, target: &Path, copied: &mut CopyLog) -> Result<(), SnapshotError> {
    if let Some(parent) = target.parent() {
        copied.create_dir_all(parent)?;
    }
    fs::copy(source, target).map_err(|err| SnapshotError::io(source, err))?;
    copied.files.push(target.to_path_buf());

    for suffix in SIDECAR_SUFFIXES {
        let sidecar = with_suffix(source, suffix);
        if sidecar.is_file() {
            let sidecar_target = with_suffix(target, suffix);
            fs::copy(&sidecar, &sidecar_target).map_err(|err| SnapshotError::io(&sidecar, err))?;
            copied.files.push(sidecar_target);
        }
    }
    Ok(())
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
