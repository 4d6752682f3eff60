use super::events::{EventReceiver, EventSender, PlanEvent, event_bus};
use super::types::{PlanStatus, RunPlan, RunPlanExecutionOutcome, RunPlanSnapshot};
use crate::error::PlanError;
use crate::run::RunController;
use crate::settings::SettingsRegistry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const EVENT_CAPACITY: usize = 64;

/// Owns the ordered plan collection and advances plans through their
/// lifecycle. At most one plan is `Executing` at any time.
pub struct RunPlanner {
    plans: Mutex<Vec<RunPlan>>,
    settings: Arc<SettingsRegistry>,
    controller: Arc<RunController>,
    events: EventSender,
}

impl RunPlanner {
    pub fn new(settings: Arc<SettingsRegistry>, controller: Arc<RunController>) -> Self {
        let (events, _) = event_bus(EVENT_CAPACITY);
        Self {
            plans: Mutex::new(Vec::new()),
            settings,
            controller,
            events,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    fn lock_plans(&self) -> MutexGuard<'_, Vec<RunPlan>> {
        self.plans
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn emit(&self, event: PlanEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Validate and append a plan. Returns its id.
    pub fn enqueue(&self, mut plan: RunPlan) -> Result<String, PlanError> {
        plan.validate()?;
        plan.reset_for_queue();
        let initial = plan.queued_status();
        if initial != PlanStatus::Pending {
            plan.advance(initial)?;
        }

        let name = plan.name.clone();
        let id = {
            let mut plans = self.lock_plans();
            // the same plan document may be submitted twice
            if plans.iter().any(|existing| existing.id == plan.id) {
                plan.id = uuid::Uuid::new_v4().to_string();
            }
            let id = plan.id.clone();
            plans.push(plan);
            id
        };

        tracing::info!(plan = %id, name = %name, status = %initial, "run plan queued");
        self.emit(PlanEvent::PlanQueued {
            plan_id: id.clone(),
            name,
        });
        Ok(id)
    }

    /// Move a plan to `Executing` if it awaits approval and nothing else is
    /// running, then apply its overrides. Returns the plan copy to execute.
    fn begin_execution(&self, plan_id: &str) -> Option<RunPlan> {
        let plan = {
            let mut plans = self.lock_plans();
            if plans
                .iter()
                .any(|plan| plan.status() == PlanStatus::Executing)
                || self.controller.is_running()
            {
                tracing::debug!(plan = %plan_id, "approval refused: a run is already active");
                return None;
            }
            let plan = plans.iter_mut().find(|plan| plan.id == plan_id)?;
            if !plan.status().awaits_approval() {
                tracing::debug!(plan = %plan_id, status = %plan.status(), "approval refused");
                return None;
            }
            plan.advance(PlanStatus::Executing).ok()?;
            plan.clone()
        };

        for setting in &plan.settings {
            let Some(value) = setting.value() else {
                continue;
            };
            match self.settings.apply_override(&setting.name, &value) {
                Ok(outcome) if outcome.is_changed() => {
                    tracing::info!(plan = %plan.id, setting = %setting.name, value = %value, "plan override applied");
                }
                Ok(_) => {}
                Err(rejection) => {
                    tracing::warn!(plan = %plan.id, setting = %setting.name, "plan override rejected: {rejection}");
                }
            }
        }

        self.emit(PlanEvent::PlanExecutionStarted {
            plan_id: plan.id.clone(),
            name: plan.name.clone(),
        });
        Some(plan)
    }

    fn complete(&self, plan_id: &str, outcome: RunPlanExecutionOutcome) {
        let mut plans = self.lock_plans();
        let Some(plan) = plans.iter_mut().find(|plan| plan.id == plan_id) else {
            return;
        };
        let next = if outcome.cancelled {
            PlanStatus::Cancelled
        } else {
            PlanStatus::Completed
        };
        if let Err(e) = plan.advance(next) {
            tracing::warn!(plan = %plan_id, "cannot record outcome: {e}");
            return;
        }
        plan.record_outcome(outcome.clone());
        let name = plan.name.clone();

        tracing::info!(
            plan = %plan_id,
            success = outcome.success,
            cancelled = outcome.cancelled,
            "run plan finished"
        );
        // sent under the lock: once the plan reads as finished, its event is queued
        self.emit(PlanEvent::PlanExecutionCompleted {
            plan_id: plan_id.to_string(),
            name,
            outcome,
        });
    }

    async fn execute(&self, plan: RunPlan) -> RunPlanExecutionOutcome {
        let outcome = self.controller.run(&plan).await;
        self.complete(&plan.id, outcome.clone());
        outcome
    }

    /// Approve a plan and run it in the background. Returns false, with no
    /// state change, if the plan cannot start.
    pub fn try_approve(self: &Arc<Self>, plan_id: &str) -> bool {
        let Some(plan) = self.begin_execution(plan_id) else {
            return false;
        };
        let plan_id = plan.id.clone();
        let name = plan.name.clone();
        // start claims the run slot before returning so callers observe it
        let run = self.controller.start(plan);
        let planner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = run.await.unwrap_or_else(|e| {
                RunPlanExecutionOutcome::failed(format!("Run '{name}' ended abnormally: {e}"))
            });
            planner.complete(&plan_id, outcome);
        });
        true
    }

    /// Approve a plan and wait for its outcome.
    pub async fn approve_and_wait(&self, plan_id: &str) -> Option<RunPlanExecutionOutcome> {
        let plan = self.begin_execution(plan_id)?;
        Some(self.execute(plan).await)
    }

    /// Cancel a plan that has not started.
    pub fn try_cancel(&self, plan_id: &str, reason: &str) -> bool {
        let name = {
            let mut plans = self.lock_plans();
            let Some(plan) = plans.iter_mut().find(|plan| plan.id == plan_id) else {
                return false;
            };
            if !plan.status().awaits_approval() || plan.advance(PlanStatus::Cancelled).is_err() {
                return false;
            }
            plan.record_outcome(RunPlanExecutionOutcome::cancelled(reason));
            plan.name.clone()
        };

        tracing::info!(plan = %plan_id, reason, "run plan cancelled");
        self.emit(PlanEvent::PlanCancelled {
            plan_id: plan_id.to_string(),
            name,
            reason: reason.to_string(),
        });
        true
    }

    pub fn get(&self, plan_id: &str) -> Option<RunPlan> {
        self.lock_plans()
            .iter()
            .find(|plan| plan.id == plan_id)
            .cloned()
    }

    pub fn plans(&self) -> Vec<RunPlan> {
        self.lock_plans().clone()
    }

    pub fn active_plan(&self) -> Option<RunPlan> {
        self.lock_plans()
            .iter()
            .find(|plan| plan.status() == PlanStatus::Executing)
            .cloned()
    }

    /// Resolve a full id or unique id prefix.
    pub fn resolve_id(&self, prefix: &str) -> Result<String, PlanError> {
        let prefix = prefix.trim();
        let plans = self.lock_plans();
        if let Some(plan) = plans.iter().find(|plan| plan.id == prefix) {
            return Ok(plan.id.clone());
        }
        let matches: Vec<&RunPlan> = if prefix.is_empty() {
            Vec::new()
        } else {
            plans
                .iter()
                .filter(|plan| plan.id.starts_with(prefix))
                .collect()
        };
        match matches.as_slice() {
            [only] => Ok(only.id.clone()),
            [] => Err(PlanError::NotFound {
                id: prefix.to_string(),
            }),
            many => Err(PlanError::AmbiguousId {
                prefix: prefix.to_string(),
                matches: many.len(),
            }),
        }
    }

    /// Scheduled plans whose time has arrived, oldest schedule first.
    pub fn due_plans(&self, now: DateTime<Utc>) -> Vec<String> {
        let plans = self.lock_plans();
        let mut due: Vec<&RunPlan> = plans.iter().filter(|plan| plan.is_due(now)).collect();
        due.sort_by_key(|plan| plan.scheduled_for_utc);
        due.into_iter().map(|plan| plan.id.clone()).collect()
    }

    /// Ordered projection of every plan. The active plan shows
    /// `override_outcome` while it has none of its own.
    pub fn create_snapshot(
        &self,
        active_plan: Option<&str>,
        override_outcome: Option<&RunPlanExecutionOutcome>,
    ) -> Vec<RunPlanSnapshot> {
        self.lock_plans()
            .iter()
            .map(|plan| {
                let mut snapshot = plan.snapshot();
                if active_plan == Some(plan.id.as_str())
                    && plan.status() == PlanStatus::Executing
                    && snapshot.outcome.is_none()
                {
                    snapshot.outcome = override_outcome.cloned();
                }
                snapshot
            })
            .collect()
    }

    pub fn export_snapshot(&self, path: &Path) -> Result<()> {
        let active = self.active_plan().map(|plan| plan.id);
        let snapshot = self.create_snapshot(active.as_deref(), None);
        let json =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize plan snapshot")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write plan snapshot {}", path.display()))?;
        Ok(())
    }
}
