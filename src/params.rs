use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
struct ParamValues {
    task_mode: String,
    curr_stage: u32,
    last_stage_reached: bool,
}

/// Process-wide values read by external tooling (trainer, evaluation
/// scripts), isolated behind explicit accessors instead of ambient globals.
#[derive(Debug)]
pub struct SharedParams {
    values: Mutex<ParamValues>,
}

impl SharedParams {
    pub fn new() -> Self {
        Self {
            values: Mutex::new(ParamValues {
                task_mode: String::new(),
                curr_stage: 0,
                last_stage_reached: false,
            }),
        }
    }

    pub fn task_mode(&self) -> String {
        self.values.lock().unwrap().task_mode.clone()
    }

    pub fn set_task_mode(&self, mode: &str) {
        self.values.lock().unwrap().task_mode = mode.to_string();
    }

    pub fn curr_stage(&self) -> u32 {
        self.values.lock().unwrap().curr_stage
    }

    pub fn set_curr_stage(&self, stage: u32) {
        self.values.lock().unwrap().curr_stage = stage;
    }

    pub fn last_stage_reached(&self) -> bool {
        self.values.lock().unwrap().last_stage_reached
    }

    pub fn set_last_stage_reached(&self, reached: bool) {
        self.values.lock().unwrap().last_stage_reached = reached;
    }
}

impl Default for SharedParams {
    fn default() -> Self {
        Self::new()
    }
}
