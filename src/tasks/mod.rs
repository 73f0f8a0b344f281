mod random;
mod scenario;
mod staged;

pub use random::RandomTask;
pub use scenario::ScenarioTask;
pub use staged::StagedRandomTask;

use std::str::FromStr;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::types::EpisodeInfo;

/// Coordinator-failure retry budget inside one reset.
pub const MAX_RESET_ATTEMPTS: u32 = 3;

/// A task decides what the next episode looks like.
///
/// `reset` runs entirely under the map synchronization guard; the guard is
/// released on every exit path before the caller observes the result.
#[async_trait]
pub trait Task: Send {
    async fn reset(&mut self) -> Result<Option<EpisodeInfo>, TaskError>;
}

/// Lifecycle of the active task, cycled by the episode monitor for the
/// process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskState {
    /// The last reset failed; waiting for an external decision.
    Idle,
    /// A reset is in progress. The machine starts here: the first reset
    /// happens at startup.
    #[default]
    Resetting,
    /// An episode is running.
    Active,
}

impl TaskState {
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Active)
    }

    pub fn is_resetting(self) -> bool {
        matches!(self, TaskState::Resetting)
    }
}

/// Which task variant the process runs, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    Random,
    Staged,
    Scenario,
}

impl TaskMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskMode::Random => "random",
            TaskMode::Staged => "staged",
            TaskMode::Scenario => "scenario",
        }
    }

    /// Stage changes are externally triggered, so the staged variant never
    /// auto-resets.
    pub fn supports_auto_reset(self) -> bool {
        matches!(self, TaskMode::Random | TaskMode::Scenario)
    }
}

impl FromStr for TaskMode {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, TaskError> {
        match s {
            "random" => Ok(TaskMode::Random),
            "staged" => Ok(TaskMode::Staged),
            "scenario" => Ok(TaskMode::Scenario),
            other => Err(TaskError::configuration(format!(
                "unknown task mode '{other}', expected random, staged or scenario"
            ))),
        }
    }
}
