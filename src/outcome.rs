use std::fmt;

use serde::Serialize;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    LinkDependencies,
    SnapshotDatabases,
    IgnoreRules,
    StartDevServer,
    StopDevServer,
    RemoveWorktree,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::LinkDependencies => "link dependencies",
            Step::SnapshotDatabases => "snapshot databases",
            Step::IgnoreRules => "gitignore rules",
            Step::StartDevServer => "start dev server",
            Step::StopDevServer => "stop dev server",
            Step::RemoveWorktree => "remove worktree",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Warning {
    pub step: Step,
    pub message: String,
}

impl Warning {
    pub fn new(step: Step, message: impl Into<String>) -> Self {
        Self {
            step,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step.as_str(), self.message)
    }
}

/// Result of one lifecycle step. Best-effort steps can only degrade into
/// `Recovered`, which must carry the value to continue with.
#[derive(Debug)]
pub enum StepOutcome<T> {
    Done(T),
    Recovered { value: T, warnings: Vec<Warning> },
    Fatal(LifecycleError),
}

impl<T> StepOutcome<T> {
    pub fn recovered(value: T, warning: Warning) -> Self {
        StepOutcome::Recovered {
            value,
            warnings: vec![warning],
        }
    }
}

impl<T> From<Outcome<T>> for StepOutcome<T> {
    fn from(outcome: Outcome<T>) -> Self {
        if outcome.warnings.is_empty() {
            StepOutcome::Done(outcome.value)
        } else {
            StepOutcome::Recovered {
                value: outcome.value,
                warnings: outcome.warnings,
            }
        }
    }
}

/// A finished operation and the warnings collected on the way.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Default)]
pub struct WarningLog {
    warnings: Vec<Warning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unwraps a step: fatal outcomes propagate, recovered ones are recorded.
    pub fn settle<T>(&mut self, outcome: StepOutcome<T>) -> Result<T, LifecycleError> {
        match outcome {
            StepOutcome::Done(value) => Ok(value),
            StepOutcome::Recovered { value, warnings } => {
                for warning in &warnings {
                    tracing::debug!(step = warning.step.as_str(), "{}", warning.message);
                }
                self.warnings.extend(warnings);
                Ok(value)
            }
            StepOutcome::Fatal(err) => Err(err),
        }
    }

    pub fn finish<T>(self, value: T) -> Outcome<T> {
        Outcome {
            value,
            warnings: self.warnings,
        }
    }
}
