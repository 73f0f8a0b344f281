use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use taskgen::control::{self, ControlService};
use taskgen::curriculum::{CurriculumStages, StageController, TaskRole, run_stage_commands};
use taskgen::error::TaskError;
use taskgen::grid::{self, MapModel, OccupancyGrid};
use taskgen::managers::ObstacleManager;
use taskgen::monitor::{MonitorConfig, TaskMonitor, WorldRotation, enumerate_generated_maps};
use taskgen::scenario::ScenarioDefinition;
use taskgen::sim::{
    self, SimConnection, SimObstacleManager, SimPedestrianManager, SimRobotManager,
    SimWorldManager,
};
use taskgen::sim_interface::Empty;
use taskgen::tasks::{RandomTask, ScenarioTask, StagedRandomTask, Task, TaskMode};
use taskgen::types::{DEFAULT_DYNAMIC_OBSTACLES, DEFAULT_STATIC_OBSTACLES};

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, TaskError>
where
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|e| TaskError::configuration(format!("invalid {key}: {e}")))
        })
        .transpose()
}

#[derive(Debug, Clone)]
struct Config {
    sim_endpoint: String,
    control_listen_addr: SocketAddr,
    task_mode: TaskMode,
    auto_reset: bool,
    delta: f64,
    timeout_minutes: f64,
    start_stage: u32,
    role: TaskRole,
    curriculum_file: Option<PathBuf>,
    scenario_file: Option<PathBuf>,
    hyperparams_file: Option<PathBuf>,
    generated_world: bool,
    maps_dir: Option<PathBuf>,
    static_obstacles: u32,
    dynamic_obstacles: u32,
}

impl Config {
    fn from_env() -> Result<Self, TaskError> {
        let role = match env_var("TASKGEN_ROLE").as_deref() {
            None | Some("training") => TaskRole::Training,
            Some("evaluation") => TaskRole::Evaluation,
            Some(other) => {
                return Err(TaskError::configuration(format!(
                    "invalid TASKGEN_ROLE '{other}', expected training or evaluation"
                )));
            }
        };
        let generated_world = match env_var("TASKGEN_WORLD").as_deref() {
            None | Some("static") => false,
            Some("generated") => true,
            Some(other) => {
                return Err(TaskError::configuration(format!(
                    "invalid TASKGEN_WORLD '{other}', expected static or generated"
                )));
            }
        };
        Ok(Self {
            sim_endpoint: env_var("TASKGEN_SIM_ENDPOINT")
                .unwrap_or_else(|| "http://127.0.0.1:50051".to_string()),
            control_listen_addr: parse_env("TASKGEN_CONTROL_LISTEN_ADDR")?
                .unwrap_or_else(|| "0.0.0.0:50061".parse().unwrap()),
            task_mode: parse_env("TASKGEN_TASK_MODE")?.unwrap_or(TaskMode::Random),
            auto_reset: parse_env("TASKGEN_AUTO_RESET")?.unwrap_or(false),
            delta: parse_env("TASKGEN_DELTA")?.unwrap_or(1.0),
            timeout_minutes: parse_env("TASKGEN_TIMEOUT_MINUTES")?.unwrap_or(2.0),
            start_stage: parse_env("TASKGEN_START_STAGE")?.unwrap_or(1),
            role,
            curriculum_file: env_var("TASKGEN_CURRICULUM_FILE").map(PathBuf::from),
            scenario_file: env_var("TASKGEN_SCENARIO_FILE").map(PathBuf::from),
            hyperparams_file: env_var("TASKGEN_HYPERPARAMS_FILE").map(PathBuf::from),
            generated_world,
            maps_dir: env_var("TASKGEN_MAPS_DIR").map(PathBuf::from),
            static_obstacles: parse_env("TASKGEN_STATIC_OBSTACLES")?
                .unwrap_or(DEFAULT_STATIC_OBSTACLES),
            dynamic_obstacles: parse_env("TASKGEN_DYNAMIC_OBSTACLES")?
                .unwrap_or(DEFAULT_DYNAMIC_OBSTACLES),
        })
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskgen=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();

    let config = Config::from_env()?;
    info!(config = ?config, "loaded configuration");

    let connection = SimConnection::connect(config.sim_endpoint.clone()).await?;

    // initial map fetch, then asynchronous snapshots for the process lifetime
    let snapshot = connection.map.clone().get_map(Empty {}).await?.into_inner();
    let map = grid::shared(MapModel::new(OccupancyGrid::try_from(snapshot)?));
    {
        let connection = connection.clone();
        let map = Arc::clone(&map);
        tokio::spawn(async move {
            if let Err(error) = sim::run_map_subscriber(connection, map).await {
                warn!(%error, "map subscription ended");
            }
        });
    }

    let params = Arc::new(taskgen::params::SharedParams::new());
    params.set_task_mode(config.task_mode.as_str());

    let mut stage_commands_tx = None;
    let task: Box<dyn Task> = match config.task_mode {
        TaskMode::Random => {
            let mut obstacles = SimObstacleManager::new(&connection);
            {
                let map_model = map.lock().await;
                let zones = obstacles
                    .register_static_obstacles(&map_model, config.static_obstacles, &[])
                    .await?;
                obstacles
                    .register_dynamic_obstacles(&map_model, config.dynamic_obstacles, &zones)
                    .await?;
            }
            info!(
                static_obstacles = config.static_obstacles,
                dynamic_obstacles = config.dynamic_obstacles,
                "random task requested"
            );
            Box::new(RandomTask::new(
                Arc::clone(&map),
                Box::new(SimRobotManager::new(&connection)),
                Box::new(obstacles),
                config.dynamic_obstacles,
            ))
        }
        TaskMode::Staged => {
            let curriculum_file = config.curriculum_file.clone().ok_or_else(|| {
                TaskError::configuration("staged mode requires TASKGEN_CURRICULUM_FILE")
            })?;
            let stages = CurriculumStages::load_from_file(&curriculum_file)?;
            let mut controller = StageController::new(
                stages,
                config.start_stage,
                config.role,
                Arc::clone(&params),
                config.hyperparams_file.clone(),
                Arc::clone(&map),
                Box::new(SimObstacleManager::new(&connection)),
            )?;
            controller.apply_stage().await?;
            let controller = Arc::new(Mutex::new(controller));

            let (command_tx, command_rx) = mpsc::channel(8);
            tokio::spawn(run_stage_commands(Arc::clone(&controller), command_rx));
            stage_commands_tx = Some(command_tx);

            info!(start_stage = config.start_stage, "staged task requested");
            Box::new(StagedRandomTask::new(
                RandomTask::new(
                    Arc::clone(&map),
                    Box::new(SimRobotManager::new(&connection)),
                    Box::new(SimObstacleManager::new(&connection)),
                    config.dynamic_obstacles,
                ),
                controller,
            ))
        }
        TaskMode::Scenario => {
            let scenario_file = config.scenario_file.clone().ok_or_else(|| {
                TaskError::configuration("scenario mode requires TASKGEN_SCENARIO_FILE")
            })?;
            let definition = ScenarioDefinition::load_from_file(&scenario_file)?;
            info!(scenario = %scenario_file.display(), "scenario task requested");
            Box::new(
                ScenarioTask::new(
                    Arc::clone(&map),
                    Box::new(SimRobotManager::new(&connection)),
                    Box::new(SimPedestrianManager::new(&connection)),
                    definition,
                )
                .await?,
            )
        }
    };

    let world = if config.generated_world {
        let maps_dir = config
            .maps_dir
            .clone()
            .ok_or_else(|| TaskError::configuration("generated world requires TASKGEN_MAPS_DIR"))?;
        let names = enumerate_generated_maps(&maps_dir)?;
        info!(maps = names.len(), "generated world rotation enabled");
        Some(WorldRotation::new(
            Box::new(SimWorldManager::new(&connection)),
            names,
        ))
    } else {
        None
    };

    let auto_reset = config.auto_reset && config.task_mode.supports_auto_reset();
    if config.auto_reset && !auto_reset {
        warn!(
            mode = config.task_mode.as_str(),
            "auto-reset is not supported for this task mode, falling back to on-demand resets"
        );
    }

    let (reset_tx, reset_rx) = watch::channel(0u64);
    let (pose_tx, pose_rx) = watch::channel(None);
    if auto_reset {
        let connection = connection.clone();
        tokio::spawn(async move {
            if let Err(error) = sim::run_odometry_subscriber(connection, pose_tx).await {
                warn!(%error, "odometry subscription ended");
            }
        });
    }

    let (reset_request_tx, reset_request_rx) = mpsc::channel(1);
    let control = ControlService::new(
        Arc::clone(&params),
        reset_rx,
        (!auto_reset).then_some(reset_request_tx),
        stage_commands_tx,
    );
    let control_addr = config.control_listen_addr;
    tokio::spawn(async move {
        if let Err(error) = control::serve(control, control_addr).await {
            warn!(%error, "task control server stopped");
        }
    });

    let monitor = TaskMonitor::new(
        task,
        MonitorConfig {
            delta: config.delta,
            timeout_minutes: config.timeout_minutes,
        },
        reset_tx,
        pose_rx,
        world,
    );

    if auto_reset {
        monitor.run_auto().await?;
    } else {
        monitor.run_on_demand(reset_request_rx).await?;
    }

    Ok(())
}
