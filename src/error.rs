use thiserror::Error;

/// Failure taxonomy for placement, resets and task construction.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No valid pose found within the sampling budget. Signals a degenerate
    /// map or over-constrained exclusion zones, not a transient fault.
    #[error(
        "no unoccupied space found after {attempts} attempts ({zones} exclusion zones); check the map"
    )]
    PlacementExhausted { attempts: u32, zones: usize },

    /// A coordinator service call failed. Retried by the task variants up to
    /// their bounded policy, then escalated.
    #[error("coordinator service failure: {message}")]
    Service { message: String },

    /// Invalid configuration detected at construction. Non-retryable.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A task variant exhausted its reset retry budget.
    #[error("reset failed after {attempts} attempts")]
    ResetFatal { attempts: u32 },

    /// Writing the durable curriculum record failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] std::io::Error),
}

impl TaskError {
    pub fn service(message: impl Into<String>) -> Self {
        TaskError::Service {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        TaskError::Configuration {
            message: message.into(),
        }
    }

    /// Fatal errors terminate the owning process; the rest are logged and
    /// survived with stale episode state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TaskError::Configuration { .. } | TaskError::ResetFatal { .. }
        )
    }
}

impl From<tonic::Status> for TaskError {
    fn from(status: tonic::Status) -> Self {
        TaskError::service(status.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_split_matches_taxonomy() {
        assert!(TaskError::configuration("bad stage").is_fatal());
        assert!(TaskError::ResetFatal { attempts: 3 }.is_fatal());
        assert!(!TaskError::service("spawn failed").is_fatal());
        assert!(
            !TaskError::PlacementExhausted {
                attempts: 100,
                zones: 2
            }
            .is_fatal()
        );
    }

    #[test]
    fn status_converts_to_service_failure() {
        let error = TaskError::from(tonic::Status::unavailable("obstacle service down"));
        assert!(matches!(error, TaskError::Service { .. }));
    }
}
