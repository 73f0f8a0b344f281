use async_trait::async_trait;

use crate::error::TaskError;
use crate::grid::{MapModel, OccupancyGrid};
use crate::scenario::PedAgentSpec;
use crate::types::{ExclusionZone, Pose};

/// Applies robot start/goal placements to the live simulation.
#[async_trait]
pub trait RobotManager: Send {
    /// Push a new start and goal. Returns the poses as applied by the
    /// platform.
    async fn set_start_and_goal(
        &mut self,
        start: &Pose,
        goal: &Pose,
    ) -> Result<(Pose, Pose), TaskError>;

    /// Forward a fresh map snapshot to the robot side of the platform.
    async fn update_map(&mut self, grid: &OccupancyGrid) -> Result<(), TaskError>;
}

/// Spawns and removes obstacle models in the live simulation.
///
/// Placement requests receive the caller's map view; the caller already
/// holds the map guard, so implementations must not re-acquire it.
#[async_trait]
pub trait ObstacleManager: Send {
    /// Place `count` static obstacles outside `exclusion_zones`. Returns the
    /// zone list extended with one zone per placed obstacle.
    async fn register_static_obstacles(
        &mut self,
        map: &MapModel,
        count: u32,
        exclusion_zones: &[ExclusionZone],
    ) -> Result<Vec<ExclusionZone>, TaskError>;

    async fn register_dynamic_obstacles(
        &mut self,
        map: &MapModel,
        count: u32,
        exclusion_zones: &[ExclusionZone],
    ) -> Result<(), TaskError>;

    async fn remove_all_dynamic_obstacles(&mut self) -> Result<(), TaskError>;
}

/// Controls scripted pedestrian agents.
#[async_trait]
pub trait PedestrianManager: Send {
    async fn spawn_agents(&mut self, agents: &[PedAgentSpec]) -> Result<(), TaskError>;

    async fn reset_all_agents(&mut self) -> Result<(), TaskError>;
}

/// Swaps the current world model in generated-world mode.
#[async_trait]
pub trait WorldManager: Send {
    async fn swap_world(&mut self, map_name: &str) -> Result<(), TaskError>;
}

#[cfg(test)]
pub mod fakes {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::grid::{GridMeta, SharedMap};

    /// Call records shared between a test and its fake managers.
    #[derive(Debug, Default, Clone)]
    pub struct CallLog {
        entries: Arc<Mutex<Vec<String>>>,
    }

    impl CallLog {
        pub fn push(&self, entry: impl Into<String>) {
            self.entries.lock().unwrap().push(entry.into());
        }

        pub fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }
    }

    /// Countdown of calls that fail with a `Service` error before the fake
    /// starts succeeding.
    #[derive(Debug, Default, Clone)]
    pub struct FailureBudget(Arc<Mutex<u32>>);

    impl FailureBudget {
        pub fn set(&self, failures: u32) {
            *self.0.lock().unwrap() = failures;
        }

        fn consume(&self) -> bool {
            let mut remaining = self.0.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        }
    }

    #[derive(Default)]
    pub struct FakeRobotManager {
        pub log: CallLog,
        pub failures: FailureBudget,
    }

    #[async_trait]
    impl RobotManager for FakeRobotManager {
        async fn set_start_and_goal(
            &mut self,
            start: &Pose,
            goal: &Pose,
        ) -> Result<(Pose, Pose), TaskError> {
            if self.failures.consume() {
                return Err(TaskError::service("robot service unavailable"));
            }
            self.log.push(format!(
                "set_start_and_goal ({:.1},{:.1})->({:.1},{:.1})",
                start.x, start.y, goal.x, goal.y
            ));
            Ok((*start, *goal))
        }

        async fn update_map(&mut self, _grid: &OccupancyGrid) -> Result<(), TaskError> {
            self.log.push("update_map");
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeObstacleManager {
        pub log: CallLog,
        pub failures: FailureBudget,
        pub zones_seen: Arc<Mutex<Vec<Vec<ExclusionZone>>>>,
    }

    #[async_trait]
    impl ObstacleManager for FakeObstacleManager {
        async fn register_static_obstacles(
            &mut self,
            _map: &MapModel,
            count: u32,
            exclusion_zones: &[ExclusionZone],
        ) -> Result<Vec<ExclusionZone>, TaskError> {
            if self.failures.consume() {
                return Err(TaskError::service("obstacle service unavailable"));
            }
            self.log.push(format!("register_static {count}"));
            Ok(exclusion_zones.to_vec())
        }

        async fn register_dynamic_obstacles(
            &mut self,
            _map: &MapModel,
            count: u32,
            exclusion_zones: &[ExclusionZone],
        ) -> Result<(), TaskError> {
            if self.failures.consume() {
                return Err(TaskError::service("obstacle service unavailable"));
            }
            self.log.push(format!("register_dynamic {count}"));
            self.zones_seen
                .lock()
                .unwrap()
                .push(exclusion_zones.to_vec());
            Ok(())
        }

        async fn remove_all_dynamic_obstacles(&mut self) -> Result<(), TaskError> {
            if self.failures.consume() {
                return Err(TaskError::service("obstacle service unavailable"));
            }
            self.log.push("remove_all_dynamic");
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakePedestrianManager {
        pub log: CallLog,
    }

    #[async_trait]
    impl PedestrianManager for FakePedestrianManager {
        async fn spawn_agents(&mut self, agents: &[PedAgentSpec]) -> Result<(), TaskError> {
            self.log.push(format!("spawn_agents {}", agents.len()));
            Ok(())
        }

        async fn reset_all_agents(&mut self) -> Result<(), TaskError> {
            self.log.push("reset_all_agents");
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeWorldManager {
        pub log: CallLog,
    }

    #[async_trait]
    impl WorldManager for FakeWorldManager {
        async fn swap_world(&mut self, map_name: &str) -> Result<(), TaskError> {
            self.log.push(format!("swap_world {map_name}"));
            Ok(())
        }
    }

    /// A shared map whose cells are all free.
    pub fn open_map(width: u32, height: u32) -> SharedMap {
        let grid = OccupancyGrid::new(
            GridMeta {
                width,
                height,
                resolution: 1.0,
                origin_x: 0.0,
                origin_y: 0.0,
            },
            vec![0; (width * height) as usize],
        )
        .unwrap();
        crate::grid::shared(MapModel::new(grid))
    }

    /// A shared map with no free cells at all.
    pub fn blocked_map(width: u32, height: u32) -> SharedMap {
        let grid = OccupancyGrid::new(
            GridMeta {
                width,
                height,
                resolution: 1.0,
                origin_x: 0.0,
                origin_y: 0.0,
            },
            vec![100; (width * height) as usize],
        )
        .unwrap();
        crate::grid::shared(MapModel::new(grid))
    }
}
