use std::sync::Arc;

use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use super::{MAX_RESET_ATTEMPTS, Task};
use crate::error::TaskError;
use crate::grid::{MapModel, SharedMap};
use crate::managers::{ObstacleManager, RobotManager};
use crate::sampler::sample_pose;
use crate::types::{EpisodeInfo, ExclusionZone, Pose, ROBOT_SAFETY_RADIUS};

/// Samples a fresh start and goal every episode and surrounds them with a
/// new set of dynamic obstacles.
pub struct RandomTask {
    map: SharedMap,
    robot: Box<dyn RobotManager>,
    obstacles: Box<dyn ObstacleManager>,
    dynamic_obstacles: u32,
    rng: StdRng,
}

impl RandomTask {
    pub fn new(
        map: SharedMap,
        robot: Box<dyn RobotManager>,
        obstacles: Box<dyn ObstacleManager>,
        dynamic_obstacles: u32,
    ) -> Self {
        Self {
            map,
            robot,
            obstacles,
            dynamic_obstacles,
            rng: StdRng::from_os_rng(),
        }
    }

    pub(super) fn set_dynamic_obstacles(&mut self, count: u32) {
        self.dynamic_obstacles = count;
    }

    async fn register_episode(
        &mut self,
        map: &MapModel,
        start: &Pose,
        goal: &Pose,
    ) -> Result<(), TaskError> {
        let zones = [
            ExclusionZone::around(start, ROBOT_SAFETY_RADIUS),
            ExclusionZone::around(goal, ROBOT_SAFETY_RADIUS),
        ];
        self.robot.set_start_and_goal(start, goal).await?;
        self.obstacles.remove_all_dynamic_obstacles().await?;
        self.obstacles
            .register_dynamic_obstacles(map, self.dynamic_obstacles, &zones)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Task for RandomTask {
    async fn reset(&mut self) -> Result<Option<EpisodeInfo>, TaskError> {
        let map_handle = Arc::clone(&self.map);
        let map = map_handle.lock().await;

        let mut attempts = 0u32;
        loop {
            let start = sample_pose(
                map.free_cells(),
                map.grid(),
                &[],
                ROBOT_SAFETY_RADIUS,
                &mut self.rng,
            )?;
            let start_zone = ExclusionZone::around(&start, ROBOT_SAFETY_RADIUS);
            let goal = sample_pose(
                map.free_cells(),
                map.grid(),
                &[start_zone],
                ROBOT_SAFETY_RADIUS,
                &mut self.rng,
            )?;

            match self.register_episode(&map, &start, &goal).await {
                Ok(()) => {
                    debug!(
                        start_x = start.x,
                        start_y = start.y,
                        goal_x = goal.x,
                        goal_y = goal.y,
                        "random episode placed"
                    );
                    return Ok(Some(EpisodeInfo {
                        robot_goal_position: goal,
                        is_new_scenario: true,
                        repeats_of_current_scenario: 1,
                        max_repeats_of_current_scenario: 1,
                    }));
                }
                Err(TaskError::Service { message }) => {
                    attempts += 1;
                    warn!(
                        attempt = attempts,
                        error = %message,
                        "coordinator call failed during reset"
                    );
                    if attempts >= MAX_RESET_ATTEMPTS {
                        return Err(TaskError::ResetFatal { attempts });
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }
}
