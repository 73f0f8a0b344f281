pub mod control;
pub mod curriculum;
pub mod error;
pub mod grid;
pub mod managers;
pub mod monitor;
pub mod params;
pub mod sampler;
pub mod scenario;
pub mod sim;
pub mod tasks;
pub mod types;

// Re-export commonly used types for convenience
pub use error::TaskError;
pub use grid::{MapModel, OccupancyGrid, SharedMap};
pub use sampler::sample_pose;
pub use tasks::{Task, TaskMode, TaskState};
pub use types::{EpisodeInfo, ExclusionZone, Pose};

// Re-export proto interface
pub mod sim_interface {
    include!(concat!(env!("OUT_DIR"), "/sim.interface.rs"));
}
