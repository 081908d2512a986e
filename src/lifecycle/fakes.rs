use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::git::{GitError, WorktreeVcs};
use crate::os::{OsFacade, SpawnRequest};

fn command_failed(command: &str, stderr: &str) -> GitError {
    GitError::GitCommandFailed {
        command: command.to_string(),
        code: Some(128),
        stderr: stderr.to_string(),
    }
}

/// In-memory git: worktrees are plain directories with a `.git` marker file.
#[derive(Debug, Default)]
pub struct FakeVcs {
    pub branches: RefCell<HashSet<String>>,
    pub worktrees: RefCell<BTreeMap<PathBuf, String>>,
    pub fail_add: Cell<bool>,
    pub fail_remove: Cell<bool>,
    pub calls: RefCell<Vec<String>>,
}

impl FakeVcs {
    fn checkout(&self, worktree: &Path, branch: &str) -> Result<(), GitError> {
        std::fs::create_dir_all(worktree)?;
        std::fs::write(worktree.join(".git"), "gitdir: fake\n")?;
        self.worktrees
            .borrow_mut()
            .insert(worktree.to_path_buf(), branch.to_string());
        Ok(())
    }
}

impl WorktreeVcs for FakeVcs {
    fn branch_exists(&self, _repo_root: &Path, branch: &str) -> Result<bool, GitError> {
        Ok(self.branches.borrow().contains(branch))
    }

    fn current_branch(&self, cwd: &Path) -> Result<String, GitError> {
        self.worktrees
            .borrow()
            .get(cwd)
            .cloned()
            .ok_or_else(|| command_failed("git rev-parse", "fatal: not a git repository"))
    }

    fn worktree_add_existing_branch(
        &self,
        _repo_root: &Path,
        worktree: &Path,
        branch: &str,
    ) -> Result<(), GitError> {
        self.calls.borrow_mut().push(format!("add-existing {}", branch));
        if self.fail_add.get() {
            return Err(command_failed("git worktree add", "fatal: simulated failure"));
        }
        if !self.branches.borrow().contains(branch) {
            return Err(command_failed("git worktree add", "fatal: invalid reference"));
        }
        self.checkout(worktree, branch)
    }

    fn worktree_add_new_branch(
        &self,
        _repo_root: &Path,
        worktree: &Path,
        branch: &str,
    ) -> Result<(), GitError> {
        self.calls.borrow_mut().push(format!("add-new {}", branch));
        if self.fail_add.get() {
            return Err(command_failed("git worktree add", "fatal: simulated failure"));
        }
        if !self.branches.borrow_mut().insert(branch.to_string()) {
            return Err(command_failed("git worktree add", "fatal: branch already exists"));
        }
        self.checkout(worktree, branch)
    }

    fn worktree_remove(
        &self,
        _repo_root: &Path,
        worktree: &Path,
        force: bool,
    ) -> Result<(), GitError> {
        self.calls
            .borrow_mut()
            .push(format!("remove force={}", force));
        if self.fail_remove.get() {
            return Err(command_failed(
                "git worktree remove",
                "fatal: contains modified or untracked files",
            ));
        }
        if self.worktrees.borrow_mut().remove(worktree).is_none() {
            return Err(command_failed(
                "git worktree remove",
                "fatal: is not a working tree",
            ));
        }
        std::fs::remove_dir_all(worktree)?;
        Ok(())
    }

    fn worktree_prune(&self, _repo_root: &Path) -> Result<(), GitError> {
        self.calls.borrow_mut().push("prune".to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeOs {
    pub bound: RefCell<HashSet<u16>>,
    pub next_pid: Cell<Option<u32>>,
    pub spawned: RefCell<Vec<SpawnRequest>>,
    pub signalled: RefCell<Vec<u32>>,
    pub fail_signal: Cell<bool>,
}

impl OsFacade for FakeOs {
    fn spawn_detached(&self, request: &SpawnRequest) -> std::io::Result<u32> {
        self.spawned.borrow_mut().push(request.clone());
        self.next_pid
            .get()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "npm not found"))
    }

    fn signal(&self, pid: u32) -> std::io::Result<()> {
        self.signalled.borrow_mut().push(pid);
        if self.fail_signal.get() {
            return Err(std::io::Error::other("No such process"));
        }
        Ok(())
    }

    fn is_port_bound(&self, port: u16) -> bool {
        self.bound.borrow().contains(&port)
    }
}
