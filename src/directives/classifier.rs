use super::types::{AssistantDirectiveBatch, AssistantRetryDirective};
use crate::actions::ActionVerb;
use crate::settings::{SettingKey, ToggleKey};
use std::fmt;

pub const HIGH_RISK_LEVEL: &str = "high";
pub const MAX_UNGATED_RETRY_ATTEMPTS: i64 = 6;
pub const MAX_UNGATED_BASE_DELAY_SECONDS: f64 = 30.0;
pub const MAX_UNGATED_MAX_DELAY_SECONDS: f64 = 300.0;

/// Why a directive batch has to wait for the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum DeferralReason {
    BatchFlagged,
    RiskNote,
    ToggleFlagged { name: String },
    ToggleHighRisk { name: String },
    HighImpactToggle { name: String },
    RetryAttempts(i64),
    RetryBaseDelay(f64),
    RetryMaxDelay(f64),
    ActionFlagged { name: String },
    StartRun,
}

impl fmt::Display for DeferralReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatchFlagged => f.write_str("advisor asked for confirmation"),
            Self::RiskNote => f.write_str("advisor attached a risk note"),
            Self::ToggleFlagged { name } => write!(f, "{name} is flagged for confirmation"),
            Self::ToggleHighRisk { name } => write!(f, "{name} is marked high risk"),
            Self::HighImpactToggle { name } => write!(f, "enabling {name} is high impact"),
            Self::RetryAttempts(value) => write!(
                f,
                "{value} retry attempts exceeds {MAX_UNGATED_RETRY_ATTEMPTS}"
            ),
            Self::RetryBaseDelay(value) => write!(
                f,
                "base delay {value}s exceeds {MAX_UNGATED_BASE_DELAY_SECONDS}s"
            ),
            Self::RetryMaxDelay(value) => write!(
                f,
                "max delay {value}s exceeds {MAX_UNGATED_MAX_DELAY_SECONDS}s"
            ),
            Self::ActionFlagged { name } => write!(f, "action {name} is flagged for confirmation"),
            Self::StartRun => f.write_str("starting a run always needs confirmation"),
        }
    }
}

/// Every rule the batch trips, in batch order.
#[must_use]
pub fn deferral_reasons(batch: &AssistantDirectiveBatch) -> Vec<DeferralReason> {
    let mut reasons = Vec::new();

    if batch.requires_confirmation {
        reasons.push(DeferralReason::BatchFlagged);
    }
    if batch
        .risk_note
        .as_deref()
        .is_some_and(|note| !note.trim().is_empty())
    {
        reasons.push(DeferralReason::RiskNote);
    }

    for toggle in &batch.toggles {
        if toggle.requires_confirmation {
            reasons.push(DeferralReason::ToggleFlagged {
                name: toggle.name.clone(),
            });
        }
        if toggle
            .risk_level
            .as_deref()
            .is_some_and(|level| level.trim().eq_ignore_ascii_case(HIGH_RISK_LEVEL))
        {
            reasons.push(DeferralReason::ToggleHighRisk {
                name: toggle.name.clone(),
            });
        }
        if toggle.value && is_high_impact_name(&toggle.name) {
            reasons.push(DeferralReason::HighImpactToggle {
                name: toggle.name.clone(),
            });
        }
    }

    if let Some(retry) = &batch.retry {
        reasons.extend(retry_reasons(retry));
    }

    for action in &batch.actions {
        if action.requires_confirmation {
            reasons.push(DeferralReason::ActionFlagged {
                name: action.name.clone(),
            });
        }
        if ActionVerb::parse(&action.name).is_some_and(ActionVerb::is_intrinsically_risky) {
            reasons.push(DeferralReason::StartRun);
        }
    }

    reasons
}

/// Whether the batch must be held for explicit operator confirmation.
#[must_use]
pub fn requires_deferral(batch: &AssistantDirectiveBatch) -> bool {
    !deferral_reasons(batch).is_empty()
}

fn is_high_impact_name(name: &str) -> bool {
    matches!(SettingKey::parse(name), SettingKey::Toggle(key) if ToggleKey::is_high_impact(key))
}

fn retry_reasons(retry: &AssistantRetryDirective) -> Vec<DeferralReason> {
    let mut reasons = Vec::new();
    if let Some(attempts) = retry.attempts
        && attempts > MAX_UNGATED_RETRY_ATTEMPTS
    {
        reasons.push(DeferralReason::RetryAttempts(attempts));
    }
    if let Some(base) = retry.base_delay_seconds
        && base > MAX_UNGATED_BASE_DELAY_SECONDS
    {
        reasons.push(DeferralReason::RetryBaseDelay(base));
    }
    if let Some(max) = retry.max_delay_seconds
        && max > MAX_UNGATED_MAX_DELAY_SECONDS
    {
        reasons.push(DeferralReason::RetryMaxDelay(max));
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::types::{AssistantActionDirective, AssistantToggleDirective};

    fn toggle(name: &str, value: bool) -> AssistantToggleDirective {
        AssistantToggleDirective::new(name, value)
    }

    #[test]
    fn plain_low_impact_toggle_applies_immediately() {
        let batch = AssistantDirectiveBatch::new("csv").with_toggle(toggle("ExportCsv", true));
        assert!(!requires_deferral(&batch));
    }

    #[test]
    fn batch_flag_and_risk_note_defer() {
        let flagged = AssistantDirectiveBatch {
            requires_confirmation: true,
            ..AssistantDirectiveBatch::new("x")
        };
        assert_eq!(deferral_reasons(&flagged), vec![DeferralReason::BatchFlagged]);

        let noted = AssistantDirectiveBatch::new("x").with_risk_note("touches prod");
        assert_eq!(deferral_reasons(&noted), vec![DeferralReason::RiskNote]);

        let blank_note = AssistantDirectiveBatch::new("x").with_risk_note("   ");
        assert!(!requires_deferral(&blank_note));
    }

    #[test]
    fn high_risk_level_is_case_insensitive() {
        let mut t = toggle("ExportJson", false);
        t.risk_level = Some("HIGH".into());
        let batch = AssistantDirectiveBatch::new("x").with_toggle(t);
        assert!(requires_deferral(&batch));

        let mut t = toggle("ExportJson", true);
        t.risk_level = Some("medium".into());
        let batch = AssistantDirectiveBatch::new("x").with_toggle(t);
        assert!(!requires_deferral(&batch));
    }

    #[test]
    fn enabling_high_impact_toggle_defers_but_disabling_does_not() {
        let on = AssistantDirectiveBatch::new("x").with_toggle(toggle("importdesign", true));
        assert_eq!(
            deferral_reasons(&on),
            vec![DeferralReason::HighImpactToggle {
                name: "importdesign".into()
            }]
        );
        let off = AssistantDirectiveBatch::new("x").with_toggle(toggle("ImportDesign", false));
        assert!(!requires_deferral(&off));
    }

    #[test]
    fn retry_thresholds_are_exclusive() {
        let at_limit = AssistantRetryDirective {
            attempts: Some(6),
            base_delay_seconds: Some(30.0),
            max_delay_seconds: Some(300.0),
            ..AssistantRetryDirective::default()
        };
        let batch = AssistantDirectiveBatch::new("x").with_retry(at_limit);
        assert!(!requires_deferral(&batch));

        let over = AssistantRetryDirective {
            attempts: Some(8),
            base_delay_seconds: Some(5.0),
            max_delay_seconds: Some(400.0),
            ..AssistantRetryDirective::default()
        };
        let batch = AssistantDirectiveBatch::new("x").with_retry(over);
        assert_eq!(
            deferral_reasons(&batch),
            vec![
                DeferralReason::RetryAttempts(8),
                DeferralReason::RetryMaxDelay(400.0)
            ]
        );
    }

    #[test]
    fn start_run_always_defers() {
        let batch =
            AssistantDirectiveBatch::new("go").with_action(AssistantActionDirective::new("Start_Run"));
        assert_eq!(deferral_reasons(&batch), vec![DeferralReason::StartRun]);
    }

    #[test]
    fn other_actions_defer_only_when_flagged() {
        let batch = AssistantDirectiveBatch::new("x")
            .with_action(AssistantActionDirective::new("open_output_folder"));
        assert!(!requires_deferral(&batch));

        let mut flagged = AssistantActionDirective::new("open_output_folder");
        flagged.requires_confirmation = true;
        let batch = AssistantDirectiveBatch::new("x").with_action(flagged);
        assert!(requires_deferral(&batch));
    }

    #[test]
    fn classification_is_deterministic() {
        let batch = AssistantDirectiveBatch::new("x")
            .with_toggle(toggle("ExportDesign", true))
            .with_action(AssistantActionDirective::new("open_ai_brief"));
        let first = deferral_reasons(&batch);
        for _ in 0..5 {
            assert_eq!(deferral_reasons(&batch.clone()), first);
        }
    }

    #[test]
    fn reasons_render_for_preview() {
        assert_eq!(
            DeferralReason::RetryAttempts(8).to_string(),
            "8 retry attempts exceeds 6"
        );
        assert!(DeferralReason::StartRun.to_string().contains("starting a run"));
    }
}
