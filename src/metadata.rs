use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeRecord {
    pub issue_number: u64,
    #[serde(default)]
    pub slug: String,
    pub branch: String,
    pub port: u16,
    pub path: String,
    pub created_at: String,
    #[serde(default)]
    pub db_snapshots: Vec<String>,
    #[serde(default)]
    pub dev_server_pid: Option<u32>,
}

impl WorktreeRecord {
    pub fn server_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDocument {
    #[serde(default)]
    pub worktrees: BTreeMap<String, WorktreeRecord>,
    pub next_port: u16,
}

impl MetadataDocument {
    pub fn empty(base_port: u16) -> Self {
        Self {
            worktrees: BTreeMap::new(),
            next_port: base_port,
        }
    }

    pub fn find_by_issue(&self, issue_number: u64) -> Option<(&String, &WorktreeRecord)> {
        self.worktrees
            .iter()
            .find(|(_, record)| record.issue_number == issue_number)
    }

    pub fn is_port_assigned(&self, port: u16) -> bool {
        self.worktrees.values().any(|record| record.port == port)
    }

    /// Moves the cursor past `port` without ever moving it backwards.
    pub fn advance_cursor_past(&mut self, port: u16) {
        let candidate = port.saturating_add(1);
        if candidate > self.next_port {
            self.next_port = candidate;
        }
    }
}

pub fn worktree_name(issue_number: u64, slug: &str) -> String {
    format!("issue-{}-{}", issue_number, slug)
}

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting for UTC timestamp should never fail")
}

#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: std::io::Error },
    Serialize(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io { path, source } => {
                write!(f, "metadata I/O error on '{}': {}", path.display(), source)
            }
            StoreError::Serialize(err) => write!(f, "metadata serialization error: {}", err),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io { source, .. } => Some(source),
            StoreError::Serialize(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialize(value)
    }
}

/// Whole-document persistence. Callers load, mutate and save within one
/// operation; nothing merges concurrent writers.
pub trait MetadataStore {
    fn load(&self) -> Result<MetadataDocument, StoreError>;
    fn save(&self, document: &MetadataDocument) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    base_port: u16,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, base_port: u16) -> Self {
        Self {
            path: path.into(),
            base_port,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl MetadataStore for JsonFileStore {
    fn load(&self) -> Result<MetadataDocument, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MetadataDocument::empty(self.base_port));
            }
            Err(err) => return Err(self.io_error(err)),
        };

        match serde_json::from_str::<MetadataDocument>(&raw) {
            Ok(document) => Ok(document),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "metadata document is unreadable; starting from an empty document"
                );
                Ok(MetadataDocument::empty(self.base_port))
            }
        }
    }

    fn save(&self, document: &MetadataDocument) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(document)?;
        bytes.push(b'\n');

        let tmp_path = self.path.with_extension("json.tmp");
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)
        };
        write().map_err(|err| self.io_error(err))
    }
}

#[cfg(test)]
pub use memory::MemoryStore;


#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use uuid::Uuid;

    use super::{
        worktree_name, JsonFileStore, MetadataDocument, MetadataStore, WorktreeRecord,
    };

    fn unique_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("worktrees-store-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    fn sample_record() -> WorktreeRecord {
        WorktreeRecord {
            issue_number: 7,
            slug: "login-form".to_string(),
            branch: "feature/issue-7-login-form".to_string(),
            port: 4322,
            path: ".worktrees/issue-7-login-form".to_string(),
            created_at: "2026-03-01T10:00:00Z".to_string(),
            db_snapshots: vec![".worktrees/issue-7-login-form/local.db".to_string()],
            dev_server_pid: Some(4242),
        }
    }

    #[test]
    fn missing_file_loads_fresh_document_at_base_port() {
        let root = unique_dir();
        let store = JsonFileStore::new(root.join(".worktrees.json"), 4322);
        let doc = store.load().expect("load should succeed");
        assert!(doc.worktrees.is_empty());
        assert_eq!(doc.next_port, 4322);
        assert!(!store.path().exists());
    }

    #[test]
    fn unparseable_file_falls_back_to_fresh_document() {
        let root = unique_dir();
        let path = root.join(".worktrees.json");
        std::fs::write(&path, "{ not json").expect("file should be writable");
        let store = JsonFileStore::new(&path, 5000);
        let doc = store.load().expect("load should fail soft");
        assert_eq!(doc, MetadataDocument::empty(5000));
    }

    #[test]
    fn save_writes_camel_case_document_that_loads_back() {
        let root = unique_dir();
        let store = JsonFileStore::new(root.join(".worktrees.json"), 4322);
        let mut doc = MetadataDocument::empty(4322);
        let record = sample_record();
        doc.worktrees
            .insert(worktree_name(record.issue_number, &record.slug), record);
        doc.advance_cursor_past(4322);
        store.save(&doc).expect("save should succeed");

        let raw = std::fs::read_to_string(store.path()).expect("document should exist");
        assert!(raw.contains("\"nextPort\": 4323"));
        assert!(raw.contains("\"issueNumber\": 7"));
        assert!(raw.contains("\"devServerPid\": 4242"));
        assert!(raw.ends_with('\n'));
        assert!(!root.join(".worktrees.json.tmp").exists());

        let loaded = store.load().expect("load should succeed");
        assert_eq!(loaded, doc);
    }

    #[test]
    fn cursor_never_moves_backwards() {
        let mut doc = MetadataDocument::empty(5000);
        doc.advance_cursor_past(4000);
        assert_eq!(doc.next_port, 5000);
        doc.advance_cursor_past(5005);
        assert_eq!(doc.next_port, 5006);
        doc.advance_cursor_past(u16::MAX);
        assert_eq!(doc.next_port, u16::MAX);
    }

    #[test]
    fn lookups_by_issue_and_port() {
        let mut doc = MetadataDocument::empty(4322);
        let record = sample_record();
        doc.worktrees.insert("issue-7-login-form".to_string(), record);
        assert_eq!(
            doc.find_by_issue(7).map(|(name, _)| name.as_str()),
            Some("issue-7-login-form")
        );
        assert!(doc.find_by_issue(8).is_none());
        assert!(doc.is_port_assigned(4322));
        assert!(!doc.is_port_assigned(4323));
    }
}
