use super::planner::RunPlanner;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

/// Poll for due scheduled plans until `shutdown` fires.
pub async fn run(planner: Arc<RunPlanner>, poll: Duration, shutdown: CancellationToken) {
    let mut interval = time::interval(poll);
    interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    tracing::info!(poll_secs = poll.as_secs(), "plan scheduler started");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }
        promote_due(&planner, Utc::now());
    }

    tracing::info!("plan scheduler stopped");
}

/// Start the earliest due plan if nothing is running. One plan per tick;
/// the rest wait for the next tick.
pub fn promote_due(planner: &Arc<RunPlanner>, now: DateTime<Utc>) -> Option<String> {
    let due = planner.due_plans(now);
    let first = due.first()?;
    if planner.try_approve(first) {
        tracing::info!(plan = %first, waiting = due.len() - 1, "scheduled plan started");
        Some(first.clone())
    } else {
        tracing::debug!(plan = %first, "scheduled plan is due but a run is active");
        None
    }
}
