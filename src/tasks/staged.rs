use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{RandomTask, Task};
use crate::curriculum::StageController;
use crate::error::TaskError;
use crate::types::EpisodeInfo;

/// Random placement with curriculum-driven obstacle density.
///
/// The stage controller is shared with the command loop that reacts to
/// advance/retreat triggers for this task instance.
pub struct StagedRandomTask {
    inner: RandomTask,
    controller: Arc<Mutex<StageController>>,
}

impl StagedRandomTask {
    pub fn new(inner: RandomTask, controller: Arc<Mutex<StageController>>) -> Self {
        Self { inner, controller }
    }

    pub fn controller(&self) -> Arc<Mutex<StageController>> {
        Arc::clone(&self.controller)
    }
}

#[async_trait]
impl Task for StagedRandomTask {
    async fn reset(&mut self) -> Result<Option<EpisodeInfo>, TaskError> {
        // re-apply the stage's density before the random placement runs
        let dynamic_obstacles = self.controller.lock().await.dynamic_obstacle_count();
        self.inner.set_dynamic_obstacles(dynamic_obstacles);
        self.inner.reset().await
    }
}
