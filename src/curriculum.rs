use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

use crate::error::TaskError;
use crate::grid::SharedMap;
use crate::managers::ObstacleManager;
use crate::params::SharedParams;

/// Obstacle density for one curriculum stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StageSpec {
    /// Number of dynamic obstacles active during this stage.
    pub dynamic: u32,
}

/// Ordered, 1-indexed curriculum definition, loaded once.
#[derive(Debug, Clone, PartialEq)]
pub struct CurriculumStages {
    stages: Vec<StageSpec>,
}

impl CurriculumStages {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, TaskError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            TaskError::configuration(format!(
                "cannot read curriculum file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parses the `stage number -> spec` mapping; stages must be numbered
    /// contiguously from 1.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TaskError> {
        let numbered: BTreeMap<u32, StageSpec> = serde_yaml::from_str(yaml)
            .map_err(|e| TaskError::configuration(format!("malformed curriculum: {e}")))?;
        if numbered.is_empty() {
            return Err(TaskError::configuration("curriculum defines no stages"));
        }
        let mut stages = Vec::with_capacity(numbered.len());
        for (expected, (number, spec)) in (1u32..).zip(&numbered) {
            if *number != expected {
                return Err(TaskError::configuration(format!(
                    "curriculum stages must be numbered 1..={}, found stage {number}",
                    numbered.len()
                )));
            }
            stages.push(*spec);
        }
        Ok(Self { stages })
    }

    pub fn count(&self) -> u32 {
        self.stages.len() as u32
    }

    /// 1-indexed lookup.
    pub fn get(&self, stage: u32) -> Option<StageSpec> {
        (stage >= 1)
            .then(|| self.stages.get(stage as usize - 1).copied())
            .flatten()
    }
}

/// Which process owns the durable curriculum record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRole {
    Training,
    Evaluation,
}

/// Stage transition commands routed from the control service to the task
/// instance that owns the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCommand {
    Advance,
    Retreat,
}

/// Tracks curriculum progress, re-applies obstacle density on stage changes
/// and persists the stage pointer.
pub struct StageController {
    stages: CurriculumStages,
    current: u32,
    role: TaskRole,
    params: Arc<SharedParams>,
    hyperparams_path: Option<PathBuf>,
    map: SharedMap,
    obstacles: Box<dyn ObstacleManager>,
}

impl StageController {
    pub fn new(
        stages: CurriculumStages,
        start_stage: u32,
        role: TaskRole,
        params: Arc<SharedParams>,
        hyperparams_path: Option<PathBuf>,
        map: SharedMap,
        obstacles: Box<dyn ObstacleManager>,
    ) -> Result<Self, TaskError> {
        if start_stage < 1 || start_stage > stages.count() {
            return Err(TaskError::configuration(format!(
                "start stage {start_stage} out of bounds, must be within 1..={}",
                stages.count()
            )));
        }
        if let Some(path) = &hyperparams_path {
            if !path.is_file() {
                return Err(TaskError::configuration(format!(
                    "no hyperparameters record at {}",
                    path.display()
                )));
            }
        } else if role == TaskRole::Evaluation {
            return Err(TaskError::configuration(
                "evaluation role requires a hyperparameters record path",
            ));
        }
        params.set_curr_stage(start_stage);
        Ok(Self {
            stages,
            current: start_stage,
            role,
            params,
            hyperparams_path,
            map,
            obstacles,
        })
    }

    pub fn current_stage(&self) -> u32 {
        self.current
    }

    pub fn dynamic_obstacle_count(&self) -> u32 {
        // 1 <= current <= count holds from construction onwards
        self.stages.stages[self.current as usize - 1].dynamic
    }

    /// Move to the next stage. A no-op at the last stage.
    pub async fn advance(&mut self) -> Result<(), TaskError> {
        if self.current >= self.stages.count() {
            info!(
                stage = self.current,
                "tried to trigger next stage but already reached the last one"
            );
            return Ok(());
        }
        self.current += 1;
        self.apply_stage().await?;
        self.params.set_curr_stage(self.current);
        if self.current == self.stages.count() {
            self.params.set_last_stage_reached(true);
        }
        self.persist()
    }

    /// Move to the previous stage. A no-op at the first stage.
    pub async fn retreat(&mut self) -> Result<(), TaskError> {
        if self.current <= 1 {
            info!(
                stage = self.current,
                "tried to trigger previous stage but already at the first one"
            );
            return Ok(());
        }
        self.params.set_last_stage_reached(false);
        self.current -= 1;
        self.apply_stage().await?;
        self.params.set_curr_stage(self.current);
        self.persist()
    }

    /// Remove all dynamic obstacles and register the current stage's count.
    pub async fn apply_stage(&mut self) -> Result<(), TaskError> {
        let count = self.dynamic_obstacle_count();
        let map_handle = Arc::clone(&self.map);
        let map = map_handle.lock().await;
        self.obstacles.remove_all_dynamic_obstacles().await?;
        self.obstacles
            .register_dynamic_obstacles(&map, count, &[])
            .await?;
        info!(
            stage = self.current,
            dynamic_obstacles = count,
            "curriculum stage initialized"
        );
        Ok(())
    }

    /// Rewrite `curr_stage` inside the durable record, evaluation role only.
    ///
    /// The record lock is never taken while the map guard is held and never
    /// held across a service call.
    fn persist(&self) -> Result<(), TaskError> {
        if self.role != TaskRole::Evaluation {
            return Ok(());
        }
        let Some(path) = &self.hyperparams_path else {
            return Ok(());
        };
        let _lock = FileLockGuard::acquire(&lock_path(path))?;
        let contents = fs::read_to_string(path)?;
        let mut record: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
            TaskError::configuration(format!(
                "malformed hyperparameters record {}: {e}",
                path.display()
            ))
        })?;
        let Some(fields) = record.as_object_mut() else {
            return Err(TaskError::configuration(format!(
                "hyperparameters record {} is not an object",
                path.display()
            )));
        };
        fields.insert("curr_stage".into(), self.current.into());
        let mut serialized = serde_json::to_string_pretty(&record)
            .map_err(|e| TaskError::configuration(e.to_string()))?;
        serialized.push('\n');
        fs::write(path, serialized)?;
        Ok(())
    }
}

fn lock_path(record: &Path) -> PathBuf {
    let mut path = record.as_os_str().to_owned();
    path.push(".lock");
    PathBuf::from(path)
}

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);
const LOCK_RETRY_LIMIT: u32 = 250;

/// Advisory lock on the durable record, shared with external tooling via a
/// sidecar lock file. Held only while the record is rewritten.
struct FileLockGuard {
    path: PathBuf,
}

impl FileLockGuard {
    fn acquire(path: &Path) -> io::Result<Self> {
        for _ in 0..LOCK_RETRY_LIMIT {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("could not acquire record lock {}", path.display()),
        ))
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Drain stage commands for the lifetime of the owning task instance.
pub async fn run_stage_commands(
    controller: Arc<Mutex<StageController>>,
    mut commands: mpsc::Receiver<StageCommand>,
) {
    while let Some(command) = commands.recv().await {
        let mut controller = controller.lock().await;
        let result = match command {
            StageCommand::Advance => controller.advance().await,
            StageCommand::Retreat => controller.retreat().await,
        };
        if let Err(error) = result {
            warn!(%error, ?command, "stage transition failed");
        }
    }
}
