use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::grid::{MapModel, OccupancyGrid, SharedMap};
use crate::managers::{ObstacleManager, PedestrianManager, RobotManager, WorldManager};
use crate::sampler::sample_pose;
use crate::scenario::PedAgentSpec;
use crate::sim_interface::map_service_client::MapServiceClient;
use crate::sim_interface::obstacle_service_client::ObstacleServiceClient;
use crate::sim_interface::odometry_service_client::OdometryServiceClient;
use crate::sim_interface::pedestrian_service_client::PedestrianServiceClient;
use crate::sim_interface::robot_service_client::RobotServiceClient;
use crate::sim_interface::world_service_client::WorldServiceClient;
use crate::sim_interface::{
    Empty, OccupancyGridMsg, PedAgentMsg, SetStartAndGoalRequest, SpawnAgentsRequest,
    SpawnObstacleRequest, WorldModelRequest,
};
use crate::types::{ExclusionZone, OBSTACLE_RADIUS, Pose};

/// Typed clients for the simulation platform, cheap to clone per consumer.
#[derive(Clone)]
pub struct SimConnection {
    pub map: MapServiceClient<Channel>,
    pub odometry: OdometryServiceClient<Channel>,
    pub obstacles: ObstacleServiceClient<Channel>,
    pub robot: RobotServiceClient<Channel>,
    pub pedestrians: PedestrianServiceClient<Channel>,
    pub world: WorldServiceClient<Channel>,
}

impl SimConnection {
    pub async fn connect(endpoint: String) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(endpoint)?.connect().await?;
        Ok(SimConnection {
            map: MapServiceClient::new(channel.clone()),
            odometry: OdometryServiceClient::new(channel.clone()),
            obstacles: ObstacleServiceClient::new(channel.clone()),
            robot: RobotServiceClient::new(channel.clone()),
            pedestrians: PedestrianServiceClient::new(channel.clone()),
            world: WorldServiceClient::new(channel),
        })
    }
}

/// Robot coordinator backed by the platform's robot service.
pub struct SimRobotManager {
    client: RobotServiceClient<Channel>,
}

impl SimRobotManager {
    pub fn new(connection: &SimConnection) -> Self {
        Self {
            client: connection.robot.clone(),
        }
    }
}

#[async_trait]
impl RobotManager for SimRobotManager {
    async fn set_start_and_goal(
        &mut self,
        start: &Pose,
        goal: &Pose,
    ) -> Result<(Pose, Pose), TaskError> {
        let response = self
            .client
            .set_start_and_goal(SetStartAndGoalRequest {
                start: Some(start.into()),
                goal: Some(goal.into()),
            })
            .await?
            .into_inner();
        let applied_start = response.start.map(Pose::from).unwrap_or(*start);
        let applied_goal = response.goal.map(Pose::from).unwrap_or(*goal);
        Ok((applied_start, applied_goal))
    }

    async fn update_map(&mut self, grid: &OccupancyGrid) -> Result<(), TaskError> {
        self.client.update_map(OccupancyGridMsg::from(grid)).await?;
        Ok(())
    }
}

/// Obstacle coordinator: samples placements in-core, spawns the models over
/// the platform's obstacle service.
pub struct SimObstacleManager {
    client: ObstacleServiceClient<Channel>,
    rng: StdRng,
}

impl SimObstacleManager {
    pub fn new(connection: &SimConnection) -> Self {
        Self {
            client: connection.obstacles.clone(),
            rng: StdRng::from_os_rng(),
        }
    }

    async fn spawn_batch(
        &mut self,
        map: &MapModel,
        count: u32,
        exclusion_zones: &[ExclusionZone],
        dynamic: bool,
    ) -> Result<Vec<ExclusionZone>, TaskError> {
        let mut zones = exclusion_zones.to_vec();
        for _ in 0..count {
            let pose = sample_pose(
                map.free_cells(),
                map.grid(),
                &zones,
                OBSTACLE_RADIUS,
                &mut self.rng,
            )?;
            self.client
                .spawn_obstacle(SpawnObstacleRequest {
                    pose: Some((&pose).into()),
                    radius: OBSTACLE_RADIUS,
                    dynamic,
                })
                .await?;
            zones.push(ExclusionZone::around(&pose, OBSTACLE_RADIUS));
        }
        Ok(zones)
    }
}

#[async_trait]
impl ObstacleManager for SimObstacleManager {
    async fn register_static_obstacles(
        &mut self,
        map: &MapModel,
        count: u32,
        exclusion_zones: &[ExclusionZone],
    ) -> Result<Vec<ExclusionZone>, TaskError> {
        self.spawn_batch(map, count, exclusion_zones, false).await
    }

    async fn register_dynamic_obstacles(
        &mut self,
        map: &MapModel,
        count: u32,
        exclusion_zones: &[ExclusionZone],
    ) -> Result<(), TaskError> {
        self.spawn_batch(map, count, exclusion_zones, true).await?;
        Ok(())
    }

    async fn remove_all_dynamic_obstacles(&mut self) -> Result<(), TaskError> {
        self.client.remove_all_dynamic_obstacles(Empty {}).await?;
        Ok(())
    }
}

/// Pedestrian coordinator proxy.
pub struct SimPedestrianManager {
    client: PedestrianServiceClient<Channel>,
}

impl SimPedestrianManager {
    pub fn new(connection: &SimConnection) -> Self {
        Self {
            client: connection.pedestrians.clone(),
        }
    }
}

#[async_trait]
impl PedestrianManager for SimPedestrianManager {
    async fn spawn_agents(&mut self, agents: &[PedAgentSpec]) -> Result<(), TaskError> {
        self.client
            .spawn_agents(SpawnAgentsRequest {
                agents: agents.iter().map(PedAgentMsg::from).collect(),
            })
            .await?;
        Ok(())
    }

    async fn reset_all_agents(&mut self) -> Result<(), TaskError> {
        self.client.reset_all_agents(Empty {}).await?;
        Ok(())
    }
}

/// World coordinator: full swap sequence for generated-world mode.
pub struct SimWorldManager {
    world: WorldServiceClient<Channel>,
    pedestrians: PedestrianServiceClient<Channel>,
}

impl SimWorldManager {
    pub fn new(connection: &SimConnection) -> Self {
        Self {
            world: connection.world.clone(),
            pedestrians: connection.pedestrians.clone(),
        }
    }
}

#[async_trait]
impl WorldManager for SimWorldManager {
    async fn swap_world(&mut self, map_name: &str) -> Result<(), TaskError> {
        let request = WorldModelRequest {
            map_name: map_name.to_string(),
        };
        self.world.delete_world_model(request.clone()).await?;
        self.world.load_map_asset(request.clone()).await?;
        self.world.spawn_world_model(request.clone()).await?;
        self.pedestrians.set_world(request).await?;
        Ok(())
    }
}

/// Apply map snapshots to the shared model for as long as the stream lives.
///
/// Each snapshot is applied under the map guard, so an in-progress reset is
/// never interleaved with a replacement.
pub async fn run_map_subscriber(connection: SimConnection, map: SharedMap) -> Result<(), TaskError> {
    let mut client = connection.map.clone();
    let mut robot = SimRobotManager::new(&connection);
    let mut stream = client.subscribe_map(Empty {}).await?.into_inner();
    while let Some(msg) = stream.message().await? {
        match OccupancyGrid::try_from(msg) {
            Ok(grid) => {
                let mut model = map.lock().await;
                robot.update_map(&grid).await?;
                model.replace(grid);
                debug!(
                    free_cells = model.free_cells().len(),
                    "map snapshot applied"
                );
            }
            Err(error) => warn!(%error, "ignoring malformed map snapshot"),
        }
    }
    Ok(())
}

/// Forward pose samples into the monitor's watch channel.
///
/// Deliberately unguarded: goal-distance tracking tolerates slightly stale
/// reads, termination is re-evaluated on the next tick.
pub async fn run_odometry_subscriber(
    connection: SimConnection,
    pose_tx: watch::Sender<Option<(f64, f64)>>,
) -> Result<(), TaskError> {
    let mut client = connection.odometry.clone();
    let mut stream = client.subscribe(Empty {}).await?.into_inner();
    while let Some(msg) = stream.message().await? {
        if pose_tx.send(Some((msg.x, msg.y))).is_err() {
            break;
        }
    }
    Ok(())
}
