use crate::git::WorktreeVcs;
use crate::metadata::{MetadataStore, WorktreeRecord};
use crate::os::OsFacade;
use crate::outcome::{Outcome, Step, StepOutcome, Warning, WarningLog};

use super::{LifecycleError, WorktreeManager};

impl<S: MetadataStore, V: WorktreeVcs, O: OsFacade> WorktreeManager<S, V, O> {
    /// Tears down the worktree for `issue_number` and returns the record as
    /// it was dropped. An unforced removal failure keeps the record so the
    /// operator can retry.
    pub fn delete(
        &self,
        issue_number: u64,
        force: bool,
    ) -> Result<Outcome<WorktreeRecord>, LifecycleError> {
        let mut document = self.store.load()?;
        let (name, mut record) = document
            .find_by_issue(issue_number)
            .map(|(name, record)| (name.clone(), record.clone()))
            .ok_or(LifecycleError::NotFound { issue_number })?;
        tracing::info!(%name, force, "removing worktree");

        let mut log = WarningLog::new();
        log.settle(self.stop_dev_server(&mut record))?;
        log.settle(self.remove_worktree(&record, force))?;

        document.worktrees.remove(&name);
        self.store.save(&document)?;
        tracing::info!(%name, "worktree record deleted");

        Ok(log.finish(record))
    }

    fn stop_dev_server(&self, record: &mut WorktreeRecord) -> StepOutcome<()> {
        let Some(pid) = record.dev_server_pid.take() else {
            return StepOutcome::Done(());
        };
        match self.os.signal(pid) {
            Ok(()) => {
                tracing::info!(pid, "dev server signalled");
                StepOutcome::Done(())
            }
            Err(err) => StepOutcome::recovered(
                (),
                Warning::new(
                    Step::StopDevServer,
                    format!("could not stop dev server (pid {}): {}", pid, err),
                ),
            ),
        }
    }

    fn remove_worktree(&self, record: &WorktreeRecord, force: bool) -> StepOutcome<()> {
        let path = self.repo_root.join(&record.path);
        let source = match self.vcs.worktree_remove(&self.repo_root, &path, force) {
            Ok(()) => return StepOutcome::Done(()),
            Err(source) => source,
        };
        if !force {
            return StepOutcome::Fatal(LifecycleError::Teardown { path, source });
        }

        let mut warnings = vec![Warning::new(
            Step::RemoveWorktree,
            format!("{}; dropping the record anyway", source),
        )];
        if let Err(err) = self.vcs.worktree_prune(&self.repo_root) {
            warnings.push(Warning::new(
                Step::RemoveWorktree,
                format!("git worktree prune failed: {}", err),
            ));
        }
        StepOutcome::Recovered {
            value: (),
            warnings,
        }
    }
}
