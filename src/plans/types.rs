use crate::error::PlanError;
use crate::settings::{SettingValue, ValueKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Immediate,
    Scheduled,
}

/// Plan lifecycle. Only moves forward; see [`PlanStatus::can_advance_to`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Pending,
    Scheduled,
    Executing,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Scheduled | Self::Executing | Self::Cancelled)
                | (Self::Scheduled, Self::Executing | Self::Cancelled)
                | (Self::Executing, Self::Completed | Self::Cancelled)
        )
    }

    pub fn awaits_approval(self) -> bool {
        matches!(self, Self::Pending | Self::Scheduled)
    }
}

/// One setting override carried by a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlanSetting {
    pub name: String,
    pub value_kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boolean_value: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RunPlanSetting {
    fn empty(name: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            value_kind,
            boolean_value: None,
            number_value: None,
            text_value: None,
            description: None,
        }
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self {
            boolean_value: Some(value),
            ..Self::empty(name, ValueKind::Boolean)
        }
    }

    pub fn number(name: impl Into<String>, value: f64) -> Self {
        Self {
            number_value: Some(value),
            ..Self::empty(name, ValueKind::Number)
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            text_value: Some(value.into()),
            ..Self::empty(name, ValueKind::Text)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The populated value, if it matches the declared kind and no other
    /// value slot is filled.
    pub fn value(&self) -> Option<SettingValue> {
        let populated = usize::from(self.boolean_value.is_some())
            + usize::from(self.number_value.is_some())
            + usize::from(self.text_value.is_some());
        if populated != 1 {
            return None;
        }
        match self.value_kind {
            ValueKind::Boolean => self.boolean_value.map(SettingValue::Boolean),
            ValueKind::Number => self.number_value.map(SettingValue::Number),
            ValueKind::Text => self.text_value.clone().map(SettingValue::Text),
        }
    }

    pub fn display_value(&self) -> String {
        match self.value() {
            Some(SettingValue::Boolean(true)) => "enabled".to_string(),
            Some(SettingValue::Boolean(false)) => "disabled".to_string(),
            Some(other) => other.to_string(),
            None => "(unset)".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.value().is_none() {
            return Err(PlanError::SettingKindMismatch {
                setting: self.name.clone(),
                kind: self.value_kind,
            });
        }
        Ok(())
    }
}

/// Terminal result of one plan execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlanExecutionOutcome {
    pub success: bool,
    pub cancelled: bool,
    pub message: String,
}

impl RunPlanExecutionOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            cancelled: false,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            cancelled: false,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            success: false,
            cancelled: true,
            message: message.into(),
        }
    }
}

fn new_plan_id() -> String {
    Uuid::new_v4().to_string()
}

/// A named, schedulable bundle of setting overrides.
///
/// `status` and `outcome` belong to the planner: they are never read from
/// input documents and only change through the planner's transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunPlan {
    #[serde(default = "new_plan_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default)]
    pub scheduled_for_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub settings: Vec<RunPlanSetting>,
    #[serde(default)]
    pub prerequisite_notes: Vec<String>,
    #[serde(default)]
    pub directive_summary: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_deserializing)]
    status: PlanStatus,
    #[serde(default, skip_deserializing)]
    outcome: Option<RunPlanExecutionOutcome>,
}

impl Default for RunPlan {
    fn default() -> Self {
        Self {
            id: new_plan_id(),
            name: String::new(),
            execution_mode: ExecutionMode::Immediate,
            scheduled_for_utc: None,
            settings: Vec::new(),
            prerequisite_notes: Vec::new(),
            directive_summary: None,
            created_at: Utc::now(),
            status: PlanStatus::Pending,
            outcome: None,
        }
    }
}

impl RunPlan {
    pub fn immediate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn scheduled(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            execution_mode: ExecutionMode::Scheduled,
            scheduled_for_utc: Some(at),
            ..Self::default()
        }
    }

    pub fn from_json(input: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn with_setting(mut self, setting: RunPlanSetting) -> Self {
        self.settings.push(setting);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.prerequisite_notes.push(note.into());
        self
    }

    pub fn with_directive_summary(mut self, summary: impl Into<String>) -> Self {
        self.directive_summary = Some(summary.into());
        self
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<&RunPlanExecutionOutcome> {
        self.outcome.as_ref()
    }

    /// First eight characters of the id, for operator display.
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.name.trim().is_empty() {
            return Err(PlanError::EmptyName);
        }
        if self.execution_mode == ExecutionMode::Scheduled && self.scheduled_for_utc.is_none() {
            return Err(PlanError::MissingSchedule {
                name: self.name.clone(),
            });
        }
        for setting in &self.settings {
            setting.validate()?;
        }
        Ok(())
    }

    /// Scheduled and its time has come.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PlanStatus::Scheduled
            && self.scheduled_for_utc.is_some_and(|at| at <= now)
    }

    /// Status a freshly queued plan starts in.
    pub(crate) fn queued_status(&self) -> PlanStatus {
        match self.execution_mode {
            ExecutionMode::Immediate => PlanStatus::Pending,
            ExecutionMode::Scheduled => PlanStatus::Scheduled,
        }
    }

    pub(crate) fn reset_for_queue(&mut self) {
        self.status = PlanStatus::Pending;
        self.outcome = None;
    }

    pub(crate) fn advance(&mut self, next: PlanStatus) -> Result<(), PlanError> {
        if !self.status.can_advance_to(next) {
            return Err(PlanError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn record_outcome(&mut self, outcome: RunPlanExecutionOutcome) {
        self.outcome = Some(outcome);
    }

    pub fn snapshot(&self) -> RunPlanSnapshot {
        RunPlanSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            execution_mode: self.execution_mode,
            scheduled_for_utc: self.scheduled_for_utc,
            status: self.status,
            settings: self
                .settings
                .iter()
                .map(|setting| SettingSnapshot {
                    name: setting.name.clone(),
                    value_kind: setting.value_kind,
                    display_value: setting.display_value(),
                    description: setting.description.clone(),
                })
                .collect(),
            prerequisite_notes: self.prerequisite_notes.clone(),
            directive_summary: self.directive_summary.clone(),
            outcome: self.outcome.clone(),
        }
    }
}

/// Read-only reporting projection of a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPlanSnapshot {
    pub id: String,
    pub name: String,
    pub execution_mode: ExecutionMode,
    pub scheduled_for_utc: Option<DateTime<Utc>>,
    pub status: PlanStatus,
    pub settings: Vec<SettingSnapshot>,
    pub prerequisite_notes: Vec<String>,
    pub directive_summary: Option<String>,
    pub outcome: Option<RunPlanExecutionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingSnapshot {
    pub name: String,
    pub value_kind: ValueKind,
    pub display_value: String,
    pub description: Option<String>,
}
