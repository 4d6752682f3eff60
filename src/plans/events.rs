use super::types::RunPlanExecutionOutcome;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle notifications published by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanEvent {
    PlanQueued {
        plan_id: String,
        name: String,
    },
    PlanExecutionStarted {
        plan_id: String,
        name: String,
    },
    PlanExecutionCompleted {
        plan_id: String,
        name: String,
        outcome: RunPlanExecutionOutcome,
    },
    PlanCancelled {
        plan_id: String,
        name: String,
        reason: String,
    },
}

impl PlanEvent {
    pub fn plan_id(&self) -> &str {
        match self {
            Self::PlanQueued { plan_id, .. }
            | Self::PlanExecutionStarted { plan_id, .. }
            | Self::PlanExecutionCompleted { plan_id, .. }
            | Self::PlanCancelled { plan_id, .. } => plan_id,
        }
    }
}

pub type EventSender = broadcast::Sender<PlanEvent>;
pub type EventReceiver = broadcast::Receiver<PlanEvent>;

pub fn event_bus(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}
