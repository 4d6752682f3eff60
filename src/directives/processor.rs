use super::classifier::{DeferralReason, deferral_reasons};
use super::types::{
    AssistantActionDirective, AssistantDirectiveBatch, AssistantRetryDirective,
    AssistantToggleDirective,
};
use crate::actions::{ActionHost, ActionVerb};
use crate::activity::ActivityLog;
use crate::approval::{ConfirmationGate, ConfirmationRequest};
use crate::plans::{RunPlan, RunPlanner};
use crate::run::RunController;
use crate::settings::{
    NumericKey, SetOutcome, SettingKey, SettingRejection, SettingsRegistry, ToggleKey,
    VALUE_EPSILON, check_numeric,
};
use std::sync::{Arc, Mutex, MutexGuard};

pub const APPLY_TOKEN: &str = "/apply-directives";
pub const DISCARD_TOKEN: &str = "/discard-directives";

const ADVISOR_RUN_NAME: &str = "Advisor-requested run";

/// What `process` did with a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessReport {
    /// Held for confirmation; these rules tripped.
    Staged { reasons: Vec<DeferralReason> },
    /// Applied; `changes` counts state mutations.
    Applied { changes: usize },
}

impl ProcessReport {
    pub fn is_staged(&self) -> bool {
        matches!(self, Self::Staged { .. })
    }

    pub fn changes(&self) -> usize {
        match self {
            Self::Staged { .. } => 0,
            Self::Applied { changes } => *changes,
        }
    }
}

/// Applies or stages advisor directive batches. Owns the single pending
/// batch slot.
pub struct DirectiveProcessor {
    settings: Arc<SettingsRegistry>,
    planner: Arc<RunPlanner>,
    runs: Arc<RunController>,
    gate: Arc<dyn ConfirmationGate>,
    host: Arc<dyn ActionHost>,
    log: Arc<ActivityLog>,
    pending: Mutex<Option<AssistantDirectiveBatch>>,
}

impl DirectiveProcessor {
    pub fn new(
        settings: Arc<SettingsRegistry>,
        planner: Arc<RunPlanner>,
        runs: Arc<RunController>,
        gate: Arc<dyn ConfirmationGate>,
        host: Arc<dyn ActionHost>,
        log: Arc<ActivityLog>,
    ) -> Self {
        Self {
            settings,
            planner,
            runs,
            gate,
            host,
            log,
            pending: Mutex::new(None),
        }
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<AssistantDirectiveBatch>> {
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn has_pending(&self) -> bool {
        self.lock_pending().is_some()
    }

    pub fn pending_summary(&self) -> Option<String> {
        self.lock_pending().as_ref().map(|batch| batch.summary.clone())
    }

    pub async fn process(&self, batch: AssistantDirectiveBatch, confirmed: bool) -> ProcessReport {
        self.announce(&batch);

        if !confirmed {
            let reasons = deferral_reasons(&batch);
            if !reasons.is_empty() {
                self.stage(batch, &reasons);
                return ProcessReport::Staged { reasons };
            }
        }

        self.lock_pending().take();

        let mut changes = 0;
        for toggle in &batch.toggles {
            changes += usize::from(self.apply_toggle(toggle));
        }
        if let Some(retry) = &batch.retry {
            changes += self.apply_retry(retry);
        }
        for action in &batch.actions {
            changes += self.apply_action(action, &batch.summary).await;
        }

        if changes == 0 && batch.has_no_changes() {
            self.log.notice("No configuration changes were requested.");
        }
        tracing::info!(changes, confirmed, "directive batch applied");
        ProcessReport::Applied { changes }
    }

    /// Re-dispatch the pending batch as confirmed.
    pub async fn apply_pending(&self) -> Option<ProcessReport> {
        let batch = self.lock_pending().take();
        let Some(batch) = batch else {
            self.log
                .notice("There are no pending directives; nothing to apply.");
            return None;
        };
        Some(self.process(batch, true).await)
    }

    pub fn discard_pending(&self) -> bool {
        let batch = self.lock_pending().take();
        match batch {
            Some(batch) => {
                self.log
                    .notice(format!("Discarded pending directives: {}.", batch.summary));
                true
            }
            None => {
                self.log
                    .notice("There are no pending directives; nothing to discard.");
                false
            }
        }
    }

    fn announce(&self, batch: &AssistantDirectiveBatch) {
        if !batch.summary.trim().is_empty() {
            self.log.info(format!("Advisor: {}", batch.summary.trim()));
        }
        if let Some(note) = batch.risk_note.as_deref().map(str::trim)
            && !note.is_empty()
        {
            self.log.warn(format!("Risk note: {note}"));
        }
        for reminder in &batch.credential_reminders {
            self.log.notice(format!("Credential reminder: {reminder}"));
        }
    }

    fn stage(&self, batch: AssistantDirectiveBatch, reasons: &[DeferralReason]) {
        let reason_text = reasons
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        self.log
            .notice(format!("Directives need confirmation: {reason_text}."));

        for toggle in &batch.toggles {
            let verb = if toggle.value { "enable" } else { "disable" };
            self.log.info(format!(
                "Preview: {verb} {}{}",
                toggle.name,
                justification_suffix(toggle.justification.as_deref())
            ));
        }
        if let Some(retry) = &batch.retry {
            self.log.info(format!(
                "Preview: retry policy {}{}",
                describe_retry(retry),
                justification_suffix(retry.justification.as_deref())
            ));
        }
        for action in &batch.actions {
            let target = action
                .plan
                .as_ref()
                .map(|plan| format!(" '{}'", plan.name))
                .unwrap_or_default();
            self.log.info(format!(
                "Preview: {}{target}{}",
                action.name,
                justification_suffix(action.justification.as_deref())
            ));
        }
        self.log.info(format!(
            "Type {APPLY_TOKEN} to apply or {DISCARD_TOKEN} to discard."
        ));

        // a newer risky batch replaces the older one without notice
        if let Some(previous) = self.lock_pending().replace(batch) {
            tracing::debug!(replaced = %previous.summary, "pending directive batch replaced");
        }
    }

    fn apply_toggle(&self, directive: &AssistantToggleDirective) -> bool {
        let SettingKey::Toggle(key) = SettingKey::parse(&directive.name) else {
            self.log.warn(format!(
                "Assistant referenced unknown toggle '{}'; skipped.",
                directive.name
            ));
            return false;
        };

        match self.settings.set_toggle(key, directive.value) {
            SetOutcome::Unchanged(value) => {
                self.log
                    .info(format!("{key} already {}; no change.", enabled_word(value)));
                false
            }
            SetOutcome::Changed { current, .. } => {
                self.log.info(format!(
                    "Assistant {} {key}{}.",
                    enabled_word(current),
                    toggle_annotations(directive)
                ));
                true
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn apply_retry(&self, directive: &AssistantRetryDirective) -> usize {
        let mut changes = 0;

        if let Some(enable) = directive.enable {
            match self.settings.set_toggle(ToggleKey::EnableHttpRetries, enable) {
                SetOutcome::Unchanged(value) => self
                    .log
                    .info(format!("HTTP retries already {}; no change.", enabled_word(value))),
                SetOutcome::Changed { current, .. } => {
                    self.log
                        .info(format!("Assistant {} HTTP retries.", enabled_word(current)));
                    changes += 1;
                }
            }
        }

        if let Some(attempts) = directive.attempts {
            changes += self
                .apply_number(NumericKey::HttpRetryAttempts, attempts as f64)
                .map_or(0, usize::from);
        }

        // base is bounded only by its range; max must not fall below the effective base
        let mut accepted_base = None;
        if let Some(base) = directive.base_delay_seconds
            && let Some(changed) = self.apply_number(NumericKey::HttpRetryBaseDelaySeconds, base)
        {
            accepted_base = Some(base);
            changes += usize::from(changed);
        }

        if let Some(max) = directive.max_delay_seconds {
            match check_numeric(NumericKey::HttpRetryMaxDelaySeconds, max) {
                Err(rejection) => self.reject(&rejection),
                Ok(()) => {
                    let base = accepted_base.unwrap_or_else(|| {
                        self.settings.number(NumericKey::HttpRetryBaseDelaySeconds)
                    });
                    if max + VALUE_EPSILON < base {
                        self.reject(&SettingRejection::MaxBelowBase { max, base });
                    } else {
                        let changed = self.store_number(NumericKey::HttpRetryMaxDelaySeconds, max);
                        changes += usize::from(changed);
                    }
                }
            }
        }

        changes
    }

    /// Range-check then store. `None` if rejected, else whether the value changed.
    fn apply_number(&self, key: NumericKey, value: f64) -> Option<bool> {
        if let Err(rejection) = check_numeric(key, value) {
            self.reject(&rejection);
            return None;
        }
        Some(self.store_number(key, value))
    }

    fn store_number(&self, key: NumericKey, value: f64) -> bool {
        match self.settings.set_number(key, value) {
            SetOutcome::Unchanged(current) => {
                self.log.info(format!("{key} already {current}; no change."));
                false
            }
            SetOutcome::Changed { previous, current } => {
                self.log.info(format!(
                    "Assistant set {key} to {current} (was {previous})."
                ));
                true
            }
        }
    }

    fn reject(&self, rejection: &SettingRejection) {
        self.log
            .warn(format!("Rejected retry directive: {rejection}."));
    }

    async fn apply_action(&self, action: &AssistantActionDirective, summary: &str) -> usize {
        let Some(verb) = ActionVerb::parse(&action.name) else {
            let prompt = format!("Allow unrecognized action '{}'?", action.name);
            if self
                .confirm(&prompt, action.justification.as_deref(), &action.name)
                .await
            {
                self.log.warn(format!(
                    "Assistant requested unrecognized action '{}'; no effect.",
                    action.name
                ));
            }
            return 0;
        };

        match verb {
            ActionVerb::StartRun => self.start_run(action, summary).await,
            ActionVerb::ScheduleRun => self.schedule_run(action, summary).await,
            open_verb => {
                if action.requires_confirmation {
                    let prompt = format!("Allow {open_verb}?");
                    if !self
                        .confirm(&prompt, action.justification.as_deref(), &open_verb.to_string())
                        .await
                    {
                        return 0;
                    }
                }
                let Some(target) = open_verb.open_target() else {
                    return 0;
                };
                match self.host.open(target) {
                    Ok(path) => self.log.info(format!("Opened {target}: {}", path.display())),
                    Err(e) => self.log.warn(format!("Could not open {target}: {e:#}")),
                }
                0
            }
        }
    }

    async fn start_run(&self, action: &AssistantActionDirective, summary: &str) -> usize {
        if self.runs.is_running() {
            self.log
                .notice("A migration run is already in progress; start_run skipped.");
            return 0;
        }
        if !self
            .confirm(
                "Start a migration run now?",
                action.justification.as_deref(),
                "start_run",
            )
            .await
        {
            return 0;
        }

        let mut plan = RunPlan::immediate(ADVISOR_RUN_NAME);
        if !summary.trim().is_empty() {
            plan = plan.with_directive_summary(summary.trim());
        }
        let id = match self.planner.enqueue(plan) {
            Ok(id) => id,
            Err(e) => {
                self.log.warn(format!("Could not start run: {e}."));
                return 0;
            }
        };
        if self.planner.try_approve(&id) {
            self.log
                .info(format!("Started migration run ({}).", short(&id)));
            1
        } else {
            self.planner.try_cancel(&id, "another run became active");
            self.log
                .notice("A migration run is already in progress; start_run skipped.");
            0
        }
    }

    async fn schedule_run(&self, action: &AssistantActionDirective, summary: &str) -> usize {
        let Some(plan) = action.plan.clone() else {
            self.log
                .warn("schedule_run did not include a run plan; skipped.");
            return 0;
        };
        if let Err(e) = plan.validate() {
            self.log
                .warn(format!("Run plan '{}' is invalid and was skipped: {e}.", plan.name));
            return 0;
        }
        if !self
            .confirm(
                &format!("Queue run plan '{}'?", plan.name),
                action.justification.as_deref(),
                "schedule_run",
            )
            .await
        {
            return 0;
        }

        let plan = if plan.directive_summary.is_none() && !summary.trim().is_empty() {
            plan.with_directive_summary(summary.trim())
        } else {
            plan
        };
        let name = plan.name.clone();
        match self.planner.enqueue(plan) {
            Ok(id) => {
                let status = self
                    .planner
                    .get(&id)
                    .map(|plan| plan.status().to_string())
                    .unwrap_or_default();
                self.log.info(format!(
                    "Queued run plan '{name}' ({}) as {status}. Use /approve-plan {} to run it.",
                    short(&id),
                    short(&id)
                ));
                1
            }
            Err(e) => {
                self.log
                    .warn(format!("Run plan '{name}' is invalid and was skipped: {e}."));
                0
            }
        }
    }

    async fn confirm(&self, prompt: &str, justification: Option<&str>, verb: &str) -> bool {
        let request = ConfirmationRequest::new(prompt, justification);
        match self.gate.confirm(&request).await {
            Ok(decision) if decision.is_approved() => true,
            Ok(_) => {
                self.log
                    .notice(format!("Operator declined {verb}; no action taken."));
                false
            }
            Err(e) => {
                tracing::warn!("confirmation gate failed: {e:#}");
                self.log
                    .warn(format!("Confirmation for {verb} failed; no action taken."));
                false
            }
        }
    }
}

fn enabled_word(value: bool) -> &'static str {
    if value { "enabled" } else { "disabled" }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn justification_suffix(justification: Option<&str>) -> String {
    justification
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| format!(" ({text})"))
        .unwrap_or_default()
}

fn toggle_annotations(directive: &AssistantToggleDirective) -> String {
    let mut parts = Vec::new();
    if let Some(confidence) = directive.confidence {
        parts.push(format!("confidence {confidence:.2}"));
    }
    if let Some(risk) = directive
        .risk_level
        .as_deref()
        .map(str::trim)
        .filter(|risk| !risk.is_empty())
    {
        parts.push(format!("risk {risk}"));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn describe_retry(retry: &AssistantRetryDirective) -> String {
    let mut parts = Vec::new();
    if let Some(enable) = retry.enable {
        parts.push(format!("retries {}", enabled_word(enable)));
    }
    if let Some(attempts) = retry.attempts {
        parts.push(format!("attempts {attempts}"));
    }
    if let Some(base) = retry.base_delay_seconds {
        parts.push(format!("base delay {base}s"));
    }
    if let Some(max) = retry.max_delay_seconds {
        parts.push(format!("max delay {max}s"));
    }
    if parts.is_empty() {
        "unchanged".to_string()
    } else {
        parts.join(", ")
    }
}
