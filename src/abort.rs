use chrono::{DateTime, Utc};

/// Request to stop a pipeline run.
/// Any holder of the controller's abort handle may send one; the controller
/// only looks for it between stages.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

impl AbortSignal {
    pub fn operator(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            requested_at: Utc::now(),
        }
    }
}
