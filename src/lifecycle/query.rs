use crate::metadata::{MetadataStore, WorktreeRecord};

use super::{LifecycleError, WorktreeManager};

impl<S: MetadataStore, V, O> WorktreeManager<S, V, O> {
    /// Every tracked worktree by ascending issue number. Ports and pids are
    /// the last recorded values; nothing is re-probed.
    pub fn list(&self) -> Result<Vec<WorktreeRecord>, LifecycleError> {
        let document = self.store.load()?;
        let mut records: Vec<WorktreeRecord> = document.worktrees.into_values().collect();
        records.sort_by(|a, b| {
            a.issue_number
                .cmp(&b.issue_number)
                .then_with(|| a.slug.cmp(&b.slug))
        });
        Ok(records)
    }

    pub fn info(&self, issue_number: u64) -> Result<WorktreeRecord, LifecycleError> {
        let document = self.store.load()?;
        document
            .find_by_issue(issue_number)
            .map(|(_, record)| record.clone())
            .ok_or(LifecycleError::NotFound { issue_number })
    }
}
