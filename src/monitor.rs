use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::error::TaskError;
use crate::managers::WorldManager;
use crate::tasks::{Task, TaskState};
use crate::types::Pose;

/// Cadence of the goal-proximity and timeout checks in auto-reset mode.
const CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Termination thresholds for auto-reset mode.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Goal-proximity threshold in meters.
    pub delta: f64,
    /// Episode timeout, configured in minutes.
    pub timeout_minutes: f64,
}

impl MonitorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_minutes * 60.0)
    }
}

/// An externally requested reset; `done` is signalled once it completed.
#[derive(Debug)]
pub struct ResetRequest {
    pub done: oneshot::Sender<()>,
}

/// Pre-enumerated map rotation for generated-world mode, popped one name
/// per reset until exhausted.
pub struct WorldRotation {
    manager: Box<dyn WorldManager>,
    queue: Vec<String>,
}

impl WorldRotation {
    pub fn new(manager: Box<dyn WorldManager>, queue: Vec<String>) -> Self {
        Self { manager, queue }
    }

    async fn swap_next(&mut self) -> Result<(), TaskError> {
        let Some(name) = self.queue.pop() else {
            return Ok(());
        };
        info!(map = %name, remaining = self.queue.len(), "swapping world model");
        self.manager.swap_world(&name).await
    }
}

/// Directory names of the form `map<digits>` under the maps directory.
pub fn enumerate_generated_maps(dir: &Path) -> Result<Vec<String>, TaskError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        TaskError::configuration(format!("cannot enumerate maps in {}: {e}", dir.display()))
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(TaskError::Persistence)?;
        if !entry.file_type().map_err(TaskError::Persistence)?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_generated_map_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn is_generated_map_name(name: &str) -> bool {
    name.strip_prefix("map")
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Drives episode boundaries: evaluates termination conditions, invokes the
/// active task's reset and broadcasts the reset counter.
pub struct TaskMonitor {
    task: Box<dyn Task>,
    state: TaskState,
    counter: u64,
    reset_tx: watch::Sender<u64>,
    pose_rx: watch::Receiver<Option<(f64, f64)>>,
    world: Option<WorldRotation>,
    goal: Option<Pose>,
    goal_dist_sq: f64,
    episode_started: Instant,
    config: MonitorConfig,
}

impl TaskMonitor {
    pub fn new(
        task: Box<dyn Task>,
        config: MonitorConfig,
        reset_tx: watch::Sender<u64>,
        pose_rx: watch::Receiver<Option<(f64, f64)>>,
        world: Option<WorldRotation>,
    ) -> Self {
        Self {
            task,
            state: TaskState::default(),
            counter: 0,
            reset_tx,
            pose_rx,
            world,
            goal: None,
            goal_dist_sq: f64::INFINITY,
            episode_started: Instant::now(),
            config,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn reset_counter(&self) -> u64 {
        self.counter
    }

    /// One reset cycle: world swap (if rotating), task reset, counter
    /// broadcast.
    pub async fn reset(&mut self) -> Result<(), TaskError> {
        self.state = TaskState::Resetting;
        if let Some(world) = self.world.as_mut() {
            if let Err(err) = world.swap_next().await {
                self.state = TaskState::Idle;
                return Err(err);
            }
        }
        match self.task.reset().await {
            Ok(info) => {
                self.goal = info.as_ref().map(|i| i.robot_goal_position);
                self.goal_dist_sq = f64::INFINITY;
                self.episode_started = Instant::now();
                self.state = TaskState::Active;
                self.counter += 1;
                let _ = self.reset_tx.send(self.counter);
                info!(reset = self.counter, "episode reset complete");
                Ok(())
            }
            Err(err) => {
                self.state = TaskState::Idle;
                error!(error = %err, "task reset failed");
                Err(err)
            }
        }
    }

    /// Reset, surviving recoverable failures with stale episode state.
    async fn try_reset(&mut self) -> Result<(), TaskError> {
        match self.reset().await {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(error = %err, "reset failed, keeping previous episode");
                self.episode_started = Instant::now();
                Ok(())
            }
        }
    }

    /// Auto-reset mode: poll goal proximity and the episode timeout.
    pub async fn run_auto(mut self) -> Result<(), TaskError> {
        self.reset().await?;
        info!("auto-reset enabled, task resets as the robot approaches the goal");
        let mut ticker = time::interval(CHECK_INTERVAL);
        loop {
            ticker.tick().await;
            let pose = *self.pose_rx.borrow();
            if let (Some((x, y)), Some(goal)) = (pose, self.goal) {
                self.goal_dist_sq = goal.squared_planar_distance(x, y);
                if self.goal_dist_sq < self.config.delta * self.config.delta {
                    info!(distance_sq = self.goal_dist_sq, "goal reached");
                    self.try_reset().await?;
                    continue;
                }
            }
            if self.episode_started.elapsed() > self.config.timeout() {
                info!("episode timed out");
                self.try_reset().await?;
            }
        }
    }

    /// On-demand mode: resets only when requested, acknowledges completion.
    pub async fn run_on_demand(
        mut self,
        mut requests: mpsc::Receiver<ResetRequest>,
    ) -> Result<(), TaskError> {
        self.reset().await?;
        while let Some(request) = requests.recv().await {
            self.try_reset().await?;
            let _ = request.done.send(());
        }
        Ok(())
    }
}
