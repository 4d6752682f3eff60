//! Terminal rendering for advisor output. Colors drop out automatically
//! when stdout is not a terminal.

use crate::activity::{ActivityEntry, ActivityLevel};
use crate::plans::{PlanStatus, RunPlanExecutionOutcome};
use crate::settings::SettingValue;
use console::{Style, style};
use std::fmt::Display;
use std::path::Path;

/// Section titles and prompts.
pub fn header<D: Display>(text: D) -> String {
    style(text).white().bold().to_string()
}

/// Secondary text: usage hints, ids, labels.
pub fn hint<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}

pub fn warning<D: Display>(text: D) -> String {
    style(text).yellow().to_string()
}

fn level_style(level: ActivityLevel) -> Style {
    match level {
        ActivityLevel::Info => Style::new(),
        ActivityLevel::Notice => Style::new().cyan().bold(),
        ActivityLevel::Warning => Style::new().yellow(),
    }
}

/// `HH:MM:SS message`, colored by level.
pub fn activity_line(entry: &ActivityEntry) -> String {
    format!(
        "{} {}",
        hint(entry.at.format("%H:%M:%S")),
        level_style(entry.level).apply_to(&entry.message)
    )
}

pub fn setting_value(value: &SettingValue) -> String {
    match value {
        SettingValue::Boolean(true) => style("on").green().bold().to_string(),
        SettingValue::Boolean(false) => hint("off"),
        SettingValue::Text(text) if text.is_empty() => hint("(empty)"),
        other => style(other).green().to_string(),
    }
}

pub fn plan_status(status: PlanStatus) -> String {
    let styled = match status {
        PlanStatus::Pending => Style::new().yellow(),
        PlanStatus::Scheduled => Style::new().cyan(),
        PlanStatus::Executing => Style::new().cyan().bold(),
        PlanStatus::Completed => Style::new().green().bold(),
        PlanStatus::Cancelled => Style::new().dim(),
    };
    styled.apply_to(status).to_string()
}

/// One-line verdict for a finished run: `✓`, `■` (cancelled) or `✗`.
pub fn outcome_line(outcome: &RunPlanExecutionOutcome) -> String {
    let marker = if outcome.success {
        style("✓").green().bold()
    } else if outcome.cancelled {
        style("■").yellow()
    } else {
        style("✗").red().bold()
    };
    format!("{marker} {}", outcome.message)
}

pub fn saved_settings(path: &Path) -> String {
    format!(
        "{} {}",
        style("Saved settings to").green().bold(),
        path.display()
    )
}
