use std::io::Write;
use std::path::Path;

use crate::config::{METADATA_FILE_NAME, WORKTREES_DIR};

pub fn ignore_rules() -> [String; 2] {
    [format!("{}/", WORKTREES_DIR), METADATA_FILE_NAME.to_string()]
}

pub fn missing_rules(repo_root: &Path) -> std::io::Result<Vec<String>> {
    let path = repo_root.join(".gitignore");
    let contents = if path.exists() {
        std::fs::read_to_string(&path)?
    } else {
        String::new()
    };
    Ok(ignore_rules()
        .into_iter()
        .filter(|rule| !contains_rule(&contents, rule))
        .collect())
}

/// Appends whichever worktree rules the root `.gitignore` lacks. Returns the
/// rules that were added.
pub fn ensure_rules(repo_root: &Path) -> std::io::Result<Vec<String>> {
    let missing = missing_rules(repo_root)?;
    if missing.is_empty() {
        return Ok(missing);
    }

    let path = repo_root.join(".gitignore");
    let contents = if path.exists() {
        std::fs::read_to_string(&path)?
    } else {
        String::new()
    };
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    if !contents.is_empty() && !contents.ends_with('\n') {
        writeln!(file)?;
    }
    for rule in &missing {
        writeln!(file, "{}", rule)?;
    }
    Ok(missing)
}

fn contains_rule(contents: &str, rule: &str) -> bool {
    let bare = rule.trim_end_matches('/');
    contents.lines().map(str::trim).any(|line| {
        let line = line.trim_start_matches('/');
        line == rule || line == bare
    })
}
