pub mod commands;

pub use commands::{HELP_TEXT, OperatorCommand, parse_command};

use crate::actions::ActionHost;
use crate::activity::ActivityLog;
use crate::approval::ConfirmationGate;
use crate::directives::{AssistantDirectiveBatch, DirectiveProcessor, ProcessReport};
use crate::plans::{PlanEvent, RunPlanner, scheduler};
use crate::run::{RunController, RunExecutor};
use crate::settings::SettingsRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const OPERATOR_CANCEL_REASON: &str = "Cancelled by operator.";

/// What the session did with one line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    Command(OperatorCommand),
    Directives(ProcessReport),
    /// Looked like a directive batch but did not parse.
    Malformed,
    /// Plain text; the caller forwards it elsewhere.
    NotACommand(String),
}

/// Wires the settings table, planner, run controller and directive
/// processor around one activity log.
pub struct AdvisorSession {
    settings: Arc<SettingsRegistry>,
    runs: Arc<RunController>,
    planner: Arc<RunPlanner>,
    processor: DirectiveProcessor,
    log: Arc<ActivityLog>,
}

impl AdvisorSession {
    pub fn new(
        settings: Arc<SettingsRegistry>,
        executor: Arc<dyn RunExecutor>,
        gate: Arc<dyn ConfirmationGate>,
        host: Arc<dyn ActionHost>,
    ) -> Self {
        let log = Arc::new(ActivityLog::default());
        let runs = Arc::new(RunController::new(executor));
        let planner = Arc::new(RunPlanner::new(Arc::clone(&settings), Arc::clone(&runs)));
        let processor = DirectiveProcessor::new(
            Arc::clone(&settings),
            Arc::clone(&planner),
            Arc::clone(&runs),
            gate,
            host,
            Arc::clone(&log),
        );
        Self {
            settings,
            runs,
            planner,
            processor,
            log,
        }
    }

    pub fn settings(&self) -> &Arc<SettingsRegistry> {
        &self.settings
    }

    pub fn planner(&self) -> &Arc<RunPlanner> {
        &self.planner
    }

    pub fn runs(&self) -> &Arc<RunController> {
        &self.runs
    }

    pub fn processor(&self) -> &DirectiveProcessor {
        &self.processor
    }

    pub fn log(&self) -> &Arc<ActivityLog> {
        &self.log
    }

    pub async fn handle_input(&self, input: &str) -> InputOutcome {
        if let Some(command) = parse_command(input) {
            self.execute(&command).await;
            return InputOutcome::Command(command);
        }

        let trimmed = input.trim();
        if trimmed.starts_with('{') {
            return match AssistantDirectiveBatch::from_json(trimmed) {
                Ok(batch) => InputOutcome::Directives(self.processor.process(batch, false).await),
                Err(e) => {
                    self.log.warn(format!("Ignored directive batch: {e}"));
                    InputOutcome::Malformed
                }
            };
        }

        InputOutcome::NotACommand(trimmed.to_string())
    }

    async fn execute(&self, command: &OperatorCommand) {
        match command {
            OperatorCommand::ApplyDirectives => {
                self.processor.apply_pending().await;
            }
            OperatorCommand::DiscardDirectives => {
                self.processor.discard_pending();
            }
            OperatorCommand::Plans => self.list_plans(),
            OperatorCommand::ApprovePlan { prefix } => self.approve_plan(prefix.as_deref()),
            OperatorCommand::CancelPlan { prefix, reason } => {
                self.cancel_plan(prefix.as_deref(), reason.as_deref());
            }
            OperatorCommand::CancelRun => {
                let name = self.runs.current_plan_name();
                match name {
                    Some(name) if self.runs.cancel_current(OPERATOR_CANCEL_REASON) => {
                        self.log.info(format!("Stopping run '{name}'."));
                    }
                    _ => self.log.notice("No migration run is active."),
                }
            }
            OperatorCommand::Settings => {
                for (name, value) in self.settings.snapshot().entries() {
                    self.log.info(format!("{name} = {value}"));
                }
            }
            OperatorCommand::Help => {
                for line in HELP_TEXT.lines() {
                    self.log.info(line);
                }
            }
        }
    }

    fn list_plans(&self) {
        let active = self.planner.active_plan().map(|plan| plan.id);
        let snapshot = self.planner.create_snapshot(active.as_deref(), None);
        if snapshot.is_empty() {
            self.log.info("No run plans.");
            return;
        }
        for plan in snapshot {
            let mut line = format!(
                "{} {} [{}]",
                plan.id.get(..8).unwrap_or(&plan.id),
                plan.name,
                plan.status
            );
            if let Some(at) = plan.scheduled_for_utc {
                line.push_str(&format!(" at {}", at.format("%Y-%m-%d %H:%M UTC")));
            }
            if let Some(outcome) = &plan.outcome {
                line.push_str(&format!(": {}", outcome.message));
            }
            self.log.info(line);
        }
    }

    fn resolve(&self, prefix: Option<&str>, usage: &str) -> Option<String> {
        let Some(prefix) = prefix else {
            self.log.warn(format!("Usage: {usage}"));
            return None;
        };
        match self.planner.resolve_id(prefix) {
            Ok(id) => Some(id),
            Err(e) => {
                self.log.warn(format!("{e}"));
                None
            }
        }
    }

    fn approve_plan(&self, prefix: Option<&str>) {
        let Some(id) = self.resolve(prefix, "/approve-plan <id>") else {
            return;
        };
        let name = self
            .planner
            .get(&id)
            .map(|plan| plan.name)
            .unwrap_or_default();
        if self.planner.try_approve(&id) {
            self.log.info(format!("Approved run plan '{name}'."));
        } else {
            self.log.warn(format!(
                "Run plan '{name}' cannot start: another run is active or it is no longer awaiting approval."
            ));
        }
    }

    fn cancel_plan(&self, prefix: Option<&str>, reason: Option<&str>) {
        let Some(id) = self.resolve(prefix, "/cancel-plan <id> [reason]") else {
            return;
        };
        let reason = reason.unwrap_or(OPERATOR_CANCEL_REASON);
        if !self.planner.try_cancel(&id, reason) {
            self.log.warn(format!(
                "Run plan {} cannot be cancelled; it has already started or finished.",
                id.get(..8).unwrap_or(&id)
            ));
        }
    }

    /// Narrate planner events into the activity log until `shutdown` fires.
    pub fn spawn_outcome_reporter(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut events = self.planner.subscribe();
        let log = Arc::clone(&self.log);
        tokio::spawn(async move {
            loop {
                // queued events are drained before shutdown is observed
                let event = tokio::select! {
                    biased;
                    event = events.recv() => event,
                    () = shutdown.cancelled() => break,
                };
                match event {
                    Ok(event) => report_event(&log, &event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "plan event reporter lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn spawn_scheduler(&self, poll: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(scheduler::run(Arc::clone(&self.planner), poll, shutdown))
    }
}

fn report_event(log: &ActivityLog, event: &PlanEvent) {
    match event {
        PlanEvent::PlanQueued { .. } => {}
        PlanEvent::PlanExecutionStarted { name, .. } => {
            log.info(format!("Run plan '{name}' started."));
        }
        PlanEvent::PlanExecutionCompleted { name, outcome, .. } => {
            if outcome.cancelled {
                log.notice(format!("Run plan '{name}' was cancelled: {}", outcome.message));
            } else if outcome.success {
                log.info(format!("Run plan '{name}' completed: {}", outcome.message));
            } else {
                log.warn(format!("Run plan '{name}' failed: {}", outcome.message));
            }
        }
        PlanEvent::PlanCancelled { name, reason, .. } => {
            log.notice(format!("Run plan '{name}' cancelled: {reason}"));
        }
    }
}
