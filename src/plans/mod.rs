pub mod events;
pub mod planner;
pub mod scheduler;
pub mod types;

pub use events::{EventReceiver, EventSender, PlanEvent, event_bus};
pub use planner::RunPlanner;
pub use types::{
    ExecutionMode, PlanStatus, RunPlan, RunPlanExecutionOutcome, RunPlanSetting,
    RunPlanSnapshot, SettingSnapshot,
};
