use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Task;
use crate::error::TaskError;
use crate::grid::SharedMap;
use crate::managers::{PedestrianManager, RobotManager};
use crate::scenario::ScenarioDefinition;
use crate::types::{EpisodeInfo, MAX_SCENARIO_REPEATS, Pose};

/// Replays one pre-authored episode configuration verbatim.
pub struct ScenarioTask {
    map: SharedMap,
    robot: Box<dyn RobotManager>,
    pedestrians: Option<Box<dyn PedestrianManager>>,
    scenario: ScenarioDefinition,
    reset_count: u32,
}

impl ScenarioTask {
    /// Spawns the scenario's pedestrian agents once; resets only
    /// re-initialize them.
    pub async fn new(
        map: SharedMap,
        robot: Box<dyn RobotManager>,
        mut pedestrians: Box<dyn PedestrianManager>,
        scenario: ScenarioDefinition,
    ) -> Result<Self, TaskError> {
        let pedestrians = if scenario.pedsim_agents.is_empty() {
            None
        } else {
            pedestrians.spawn_agents(&scenario.pedsim_agents).await?;
            Some(pedestrians)
        };
        Ok(Self {
            map,
            robot,
            pedestrians,
            scenario,
            reset_count: 0,
        })
    }

    fn start_pose(&self) -> Pose {
        let [x, y] = self.scenario.robot_position;
        Pose::new(x, y, 0.0)
    }

    fn goal_pose(&self) -> Pose {
        let [x, y] = self.scenario.robot_goal;
        Pose::new(x, y, 0.0)
    }
}

#[async_trait]
impl Task for ScenarioTask {
    async fn reset(&mut self) -> Result<Option<EpisodeInfo>, TaskError> {
        self.reset_count += 1;
        let map_handle = Arc::clone(&self.map);
        let _map = map_handle.lock().await;

        if let Some(pedestrians) = self.pedestrians.as_mut() {
            pedestrians.reset_all_agents().await?;
        }
        self.robot
            .set_start_and_goal(&self.start_pose(), &self.goal_pose())
            .await?;

        debug!(repeat = self.reset_count, "scenario replayed");
        Ok(Some(EpisodeInfo {
            robot_goal_position: self.goal_pose(),
            is_new_scenario: self.reset_count == 1,
            repeats_of_current_scenario: self.reset_count,
            max_repeats_of_current_scenario: MAX_SCENARIO_REPEATS,
        }))
    }
}
