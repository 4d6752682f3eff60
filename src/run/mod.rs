pub mod command;

pub use command::CommandRunExecutor;

use crate::plans::{RunPlan, RunPlanExecutionOutcome};
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The opaque migration run. Implementations should stop promptly once
/// `cancel` fires; the controller reports a cancelled outcome either way.
pub trait RunExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        plan: &'a RunPlan,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<RunPlanExecutionOutcome>> + Send + 'a>>;
}

struct ActiveRun {
    generation: u64,
    token: CancellationToken,
    plan_name: String,
    cancel_reason: Option<String>,
}

/// Outcomes are attributed by generation so a superseded run never clears
/// the state of its successor.
struct RunTicket {
    generation: u64,
    token: CancellationToken,
}

/// Owns the single in-flight cancellation handle.
pub struct RunController {
    executor: Arc<dyn RunExecutor>,
    current: Mutex<Option<ActiveRun>>,
    generation: AtomicU64,
}

impl RunController {
    pub fn new(executor: Arc<dyn RunExecutor>) -> Self {
        Self {
            executor,
            current: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<ActiveRun>> {
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Claim the in-flight slot, cancelling whatever held it.
    fn begin(&self, plan_name: &str) -> RunTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        let previous = self.lock_current().replace(ActiveRun {
            generation,
            token: token.clone(),
            plan_name: plan_name.to_string(),
            cancel_reason: None,
        });
        if let Some(previous) = previous {
            tracing::info!(
                superseded = %previous.plan_name,
                generation = previous.generation,
                "cancelling previous run"
            );
            previous.token.cancel();
        }
        tracing::info!(plan = %plan_name, generation, "run started");
        RunTicket { generation, token }
    }

    /// Run the executor for a ticket issued by [`Self::begin`].
    async fn drive(&self, ticket: RunTicket, plan: &RunPlan) -> RunPlanExecutionOutcome {
        let outcome = tokio::select! {
            biased;
            () = ticket.token.cancelled() => None,
            result = self.executor.execute(plan, ticket.token.clone()) => Some(result),
        };

        let cancel_reason = self.finish(ticket.generation);
        let outcome = match outcome {
            _ if ticket.token.is_cancelled() => RunPlanExecutionOutcome::cancelled(
                cancel_reason.unwrap_or_else(|| format!("Run '{}' was cancelled.", plan.name)),
            ),
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => {
                RunPlanExecutionOutcome::failed(format!("Run '{}' failed: {e:#}", plan.name))
            }
            None => RunPlanExecutionOutcome::cancelled(format!(
                "Run '{}' was cancelled.",
                plan.name
            )),
        };

        tracing::info!(
            plan = %plan.name,
            generation = ticket.generation,
            success = outcome.success,
            cancelled = outcome.cancelled,
            "run finished"
        );
        outcome
    }

    fn finish(&self, generation: u64) -> Option<String> {
        let mut current = self.lock_current();
        match current.as_ref() {
            Some(active) if active.generation == generation => {
                current.take().and_then(|active| active.cancel_reason)
            }
            _ => None,
        }
    }

    /// Run a plan to completion in the caller's task.
    pub async fn run(&self, plan: &RunPlan) -> RunPlanExecutionOutcome {
        let ticket = self.begin(&plan.name);
        self.drive(ticket, plan).await
    }

    /// Start a run in the background. The slot is claimed before this returns.
    pub fn start(self: &Arc<Self>, plan: RunPlan) -> JoinHandle<RunPlanExecutionOutcome> {
        let ticket = self.begin(&plan.name);
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.drive(ticket, &plan).await })
    }

    pub fn is_running(&self) -> bool {
        self.lock_current().is_some()
    }

    pub fn current_plan_name(&self) -> Option<String> {
        self.lock_current()
            .as_ref()
            .map(|active| active.plan_name.clone())
    }

    pub fn cancel_current(&self, reason: &str) -> bool {
        let mut current = self.lock_current();
        let Some(active) = current.as_mut() else {
            return false;
        };
        active.cancel_reason = Some(reason.to_string());
        active.token.cancel();
        tracing::info!(plan = %active.plan_name, reason, "run cancellation requested");
        true
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn run_reports_executor_outcome() {
        let controller = RunController::new(Arc::new(SleepExecutor::new(Duration::ZERO)));
        let outcome = controller.run(&RunPlan::immediate("quick")).await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "quick finished");
        assert!(!controller.is_running());
    }

    #[tokio::test]
    async fn executor_error_becomes_failed_outcome() {
        let controller = RunController::new(Arc::new(FailingExecutor));
        let outcome = controller.run(&RunPlan::immediate("broken")).await;
        assert!(!outcome.success);
        assert!(!outcome.cancelled);
        assert!(outcome.message.contains("exporter crashed"));
    }

    #[tokio::test]
    async fn cancel_current_yields_cancelled_outcome() {
        let controller = Arc::new(RunController::new(Arc::new(SleepExecutor::new(
            Duration::from_secs(30),
        ))));
        let handle = controller.start(RunPlan::immediate("slow"));
        assert!(controller.is_running());
        assert_eq!(controller.current_plan_name().as_deref(), Some("slow"));

        assert!(controller.cancel_current("operator stop"));
        let outcome = handle.await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.message, "operator stop");
        assert!(!controller.is_running());
        assert!(!controller.cancel_current("again"));
    }

    #[tokio::test]
    async fn new_run_cancels_previous_generation() {
        let controller = Arc::new(RunController::new(Arc::new(SleepExecutor::new(
            Duration::from_millis(200),
        ))));
        let first = controller.start(RunPlan::immediate("first"));
        let second = controller.start(RunPlan::immediate("second"));

        let first = first.await.unwrap();
        assert!(first.cancelled);
        // the superseded run must not clear the newer slot
        assert_eq!(controller.current_plan_name().as_deref(), Some("second"));

        let second = second.await.unwrap();
        assert!(second.success);
        assert!(!controller.is_running());
    }
}
