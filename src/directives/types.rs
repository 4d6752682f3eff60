use crate::error::DirectiveError;
use crate::plans::RunPlan;
use serde::{Deserialize, Serialize};

/// A parsed set of advisor-proposed changes. Consumed exactly once, either
/// applied or discarded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantDirectiveBatch {
    pub summary: String,
    pub risk_note: Option<String>,
    pub requires_confirmation: bool,
    pub toggles: Vec<AssistantToggleDirective>,
    pub retry: Option<AssistantRetryDirective>,
    pub actions: Vec<AssistantActionDirective>,
    pub credential_reminders: Vec<String>,
}

impl AssistantDirectiveBatch {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn from_json(input: &str) -> Result<Self, DirectiveError> {
        serde_json::from_str(input).map_err(|e| DirectiveError::Malformed(e.to_string()))
    }

    pub fn with_toggle(mut self, toggle: AssistantToggleDirective) -> Self {
        self.toggles.push(toggle);
        self
    }

    pub fn with_retry(mut self, retry: AssistantRetryDirective) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_action(mut self, action: AssistantActionDirective) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_reminder(mut self, reminder: impl Into<String>) -> Self {
        self.credential_reminders.push(reminder.into());
        self
    }

    pub fn with_risk_note(mut self, note: impl Into<String>) -> Self {
        self.risk_note = Some(note.into());
        self
    }

    /// True when the batch carries no toggles, retry changes or actions.
    pub fn has_no_changes(&self) -> bool {
        self.toggles.is_empty() && self.retry.is_none() && self.actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantToggleDirective {
    pub name: String,
    pub value: bool,
    pub risk_level: Option<String>,
    pub confidence: Option<f64>,
    pub requires_confirmation: bool,
    pub justification: Option<String>,
}

impl AssistantToggleDirective {
    pub fn new(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantRetryDirective {
    pub enable: Option<bool>,
    pub attempts: Option<i64>,
    pub base_delay_seconds: Option<f64>,
    pub max_delay_seconds: Option<f64>,
    pub justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantActionDirective {
    pub name: String,
    pub requires_confirmation: bool,
    pub plan: Option<RunPlan>,
    pub justification: Option<String>,
}

impl AssistantActionDirective {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn schedule(plan: RunPlan) -> Self {
        Self {
            name: "schedule_run".to_string(),
            plan: Some(plan),
            ..Self::default()
        }
    }
}
