use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::TaskError;
use crate::sim_interface::{PedAgentMsg, PoseMsg};

/// One scripted pedestrian agent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PedAgentSpec {
    pub id: u32,
    pub start: [f64; 2],
    #[serde(default)]
    pub waypoints: Vec<[f64; 2]>,
}

impl From<&PedAgentSpec> for PedAgentMsg {
    fn from(spec: &PedAgentSpec) -> Self {
        let planar = |point: &[f64; 2]| PoseMsg {
            x: point[0],
            y: point[1],
            theta: 0.0,
        };
        PedAgentMsg {
            id: spec.id,
            start: Some(planar(&spec.start)),
            waypoints: spec.waypoints.iter().map(|w| planar(w)).collect(),
        }
    }
}

/// A pre-authored episode configuration, loaded once and replayed verbatim.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDefinition {
    pub robot_position: [f64; 2],
    pub robot_goal: [f64; 2],
    #[serde(default)]
    pub pedsim_agents: Vec<PedAgentSpec>,
}

impl ScenarioDefinition {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, TaskError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            TaskError::configuration(format!(
                "cannot read scenario file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> Result<Self, TaskError> {
        serde_json::from_str(json)
            .map_err(|e| TaskError::configuration(format!("malformed scenario definition: {e}")))
    }
}
