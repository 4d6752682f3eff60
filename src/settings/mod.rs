pub mod keys;

pub use keys::{NumericKey, SettingKey, TextKey, ToggleKey, ValueKind};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use strum::IntoEnumIterator;
use thiserror::Error;

/// Float comparisons below this are treated as "unchanged".
pub const VALUE_EPSILON: f64 = 0.0001;

/// Current migration-tool configuration as seen by the advisor engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    pub export_csv: bool,
    pub export_json: bool,
    pub export_excel: bool,
    pub export_markdown: bool,
    pub export_public_footprint: bool,
    pub export_design: bool,
    pub export_configuration: bool,
    pub import_public_footprint: bool,
    pub import_design: bool,
    pub import_configuration: bool,
    pub enable_http_retries: bool,
    pub http_retry_attempts: u32,
    pub http_retry_base_delay_seconds: f64,
    pub http_retry_max_delay_seconds: f64,
    pub manual_run_goals: String,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            export_csv: true,
            export_json: false,
            export_excel: false,
            export_markdown: false,
            export_public_footprint: false,
            export_design: false,
            export_configuration: false,
            import_public_footprint: false,
            import_design: false,
            import_configuration: false,
            enable_http_retries: true,
            http_retry_attempts: 3,
            http_retry_base_delay_seconds: 2.0,
            http_retry_max_delay_seconds: 30.0,
            manual_run_goals: String::new(),
        }
    }
}

impl MigrationSettings {
    pub fn toggle(&self, key: ToggleKey) -> bool {
        match key {
            ToggleKey::ExportCsv => self.export_csv,
            ToggleKey::ExportJson => self.export_json,
            ToggleKey::ExportExcel => self.export_excel,
            ToggleKey::ExportMarkdown => self.export_markdown,
            ToggleKey::ExportPublicFootprint => self.export_public_footprint,
            ToggleKey::ExportDesign => self.export_design,
            ToggleKey::ExportConfiguration => self.export_configuration,
            ToggleKey::ImportPublicFootprint => self.import_public_footprint,
            ToggleKey::ImportDesign => self.import_design,
            ToggleKey::ImportConfiguration => self.import_configuration,
            ToggleKey::EnableHttpRetries => self.enable_http_retries,
        }
    }

    fn toggle_slot(&mut self, key: ToggleKey) -> &mut bool {
        match key {
            ToggleKey::ExportCsv => &mut self.export_csv,
            ToggleKey::ExportJson => &mut self.export_json,
            ToggleKey::ExportExcel => &mut self.export_excel,
            ToggleKey::ExportMarkdown => &mut self.export_markdown,
            ToggleKey::ExportPublicFootprint => &mut self.export_public_footprint,
            ToggleKey::ExportDesign => &mut self.export_design,
            ToggleKey::ExportConfiguration => &mut self.export_configuration,
            ToggleKey::ImportPublicFootprint => &mut self.import_public_footprint,
            ToggleKey::ImportDesign => &mut self.import_design,
            ToggleKey::ImportConfiguration => &mut self.import_configuration,
            ToggleKey::EnableHttpRetries => &mut self.enable_http_retries,
        }
    }

    pub fn number(&self, key: NumericKey) -> f64 {
        match key {
            NumericKey::HttpRetryAttempts => f64::from(self.http_retry_attempts),
            NumericKey::HttpRetryBaseDelaySeconds => self.http_retry_base_delay_seconds,
            NumericKey::HttpRetryMaxDelaySeconds => self.http_retry_max_delay_seconds,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn store_number(&mut self, key: NumericKey, value: f64) {
        match key {
            NumericKey::HttpRetryAttempts => self.http_retry_attempts = value.round() as u32,
            NumericKey::HttpRetryBaseDelaySeconds => self.http_retry_base_delay_seconds = value,
            NumericKey::HttpRetryMaxDelaySeconds => self.http_retry_max_delay_seconds = value,
        }
    }

    pub fn text(&self, key: TextKey) -> &str {
        match key {
            TextKey::ManualRunGoals => &self.manual_run_goals,
        }
    }

    fn text_slot(&mut self, key: TextKey) -> &mut String {
        match key {
            TextKey::ManualRunGoals => &mut self.manual_run_goals,
        }
    }

    /// Every known setting with its current value, in declaration order.
    pub fn entries(&self) -> Vec<(&'static str, SettingValue)> {
        let toggles = ToggleKey::iter()
            .map(|key| (<&'static str>::from(key), SettingValue::Boolean(self.toggle(key))));
        let numbers = NumericKey::iter()
            .map(|key| (<&'static str>::from(key), SettingValue::Number(self.number(key))));
        let texts = TextKey::iter().map(|key| {
            (
                <&'static str>::from(key),
                SettingValue::Text(self.text(key).to_string()),
            )
        });
        toggles.chain(numbers).chain(texts).collect()
    }

    /// Range checks only. A base above the max is reachable through a
    /// base-only directive; see [`Self::max_below_base`].
    pub fn validate(&self) -> Result<(), SettingRejection> {
        for key in NumericKey::iter() {
            check_numeric(key, self.number(key))?;
        }
        Ok(())
    }

    pub fn max_below_base(&self) -> bool {
        self.http_retry_max_delay_seconds + VALUE_EPSILON < self.http_retry_base_delay_seconds
    }
}

/// A typed setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Boolean(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Result of a compare-then-set write.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOutcome<T> {
    Changed { previous: T, current: T },
    Unchanged(T),
}

impl<T> SetOutcome<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingRejection {
    #[error("unknown setting '{name}'")]
    UnknownKey { name: String },

    #[error("setting '{name}' expects a {expected} value")]
    KindMismatch { name: String, expected: ValueKind },

    #[error("{key}={value} is outside the allowed range {min}-{max}")]
    OutOfRange {
        key: NumericKey,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{key}={value} must be a whole number")]
    NotWholeNumber { key: NumericKey, value: f64 },

    #[error("HttpRetryMaxDelaySeconds={max} must be at least the base delay ({base})")]
    MaxBelowBase { max: f64, base: f64 },
}

/// Bounds check for a numeric knob. NaN is always out of range.
pub fn check_numeric(key: NumericKey, value: f64) -> Result<(), SettingRejection> {
    let range = key.range();
    if !range.contains(&value) {
        return Err(SettingRejection::OutOfRange {
            key,
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
    if key.is_whole_number() && value.fract() != 0.0 {
        return Err(SettingRejection::NotWholeNumber { key, value });
    }
    Ok(())
}

/// Shared settings table. Every writer (advisor directives, plan overrides,
/// the operator console) goes through the same compare-then-set calls.
pub struct SettingsRegistry {
    state: Mutex<MigrationSettings>,
}

impl SettingsRegistry {
    pub fn new(initial: MigrationSettings) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MigrationSettings) -> R) -> R {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut state)
    }

    pub fn snapshot(&self) -> MigrationSettings {
        self.with_state(|state| state.clone())
    }

    pub fn toggle(&self, key: ToggleKey) -> bool {
        self.with_state(|state| state.toggle(key))
    }

    pub fn set_toggle(&self, key: ToggleKey, value: bool) -> SetOutcome<bool> {
        self.with_state(|state| {
            let slot = state.toggle_slot(key);
            if *slot == value {
                return SetOutcome::Unchanged(value);
            }
            let previous = std::mem::replace(slot, value);
            tracing::debug!(setting = %key, previous, current = value, "toggle updated");
            SetOutcome::Changed {
                previous,
                current: value,
            }
        })
    }

    pub fn number(&self, key: NumericKey) -> f64 {
        self.with_state(|state| state.number(key))
    }

    /// Writes without bounds checks; callers validate with [`check_numeric`].
    pub fn set_number(&self, key: NumericKey, value: f64) -> SetOutcome<f64> {
        self.with_state(|state| set_number_locked(state, key, value))
    }

    pub fn text(&self, key: TextKey) -> String {
        self.with_state(|state| state.text(key).to_string())
    }

    pub fn set_text(&self, key: TextKey, value: &str) -> SetOutcome<String> {
        self.with_state(|state| {
            let slot = state.text_slot(key);
            if slot == value {
                return SetOutcome::Unchanged(value.to_string());
            }
            let previous = std::mem::replace(slot, value.to_string());
            SetOutcome::Changed {
                previous,
                current: value.to_string(),
            }
        })
    }

    /// Apply a named override (run plans, operator `set` commands). Numeric
    /// values are range-checked and the max delay may not drop below the
    /// current base delay.
    pub fn apply_override(
        &self,
        name: &str,
        value: &SettingValue,
    ) -> Result<SetOutcome<SettingValue>, SettingRejection> {
        let key = SettingKey::parse(name);
        let Some(expected) = key.value_kind() else {
            return Err(SettingRejection::UnknownKey {
                name: name.to_string(),
            });
        };
        if value.kind() != expected {
            return Err(SettingRejection::KindMismatch {
                name: key.name().to_string(),
                expected,
            });
        }

        match (key, value) {
            (SettingKey::Toggle(toggle), SettingValue::Boolean(flag)) => {
                Ok(map_outcome(self.set_toggle(toggle, *flag), SettingValue::Boolean))
            }
            (SettingKey::Numeric(numeric), SettingValue::Number(number)) => {
                check_numeric(numeric, *number)?;
                self.with_state(|state| {
                    if numeric == NumericKey::HttpRetryMaxDelaySeconds
                        && *number + VALUE_EPSILON < state.http_retry_base_delay_seconds
                    {
                        return Err(SettingRejection::MaxBelowBase {
                            max: *number,
                            base: state.http_retry_base_delay_seconds,
                        });
                    }
                    Ok(map_outcome(
                        set_number_locked(state, numeric, *number),
                        SettingValue::Number,
                    ))
                })
            }
            (SettingKey::Text(text), SettingValue::Text(content)) => {
                Ok(map_outcome(self.set_text(text, content), SettingValue::Text))
            }
            (key, _) => Err(SettingRejection::KindMismatch {
                name: key.name().to_string(),
                expected,
            }),
        }
    }
}

fn set_number_locked(state: &mut MigrationSettings, key: NumericKey, value: f64) -> SetOutcome<f64> {
    let previous = state.number(key);
    if (previous - value).abs() < VALUE_EPSILON {
        return SetOutcome::Unchanged(previous);
    }
    state.store_number(key, value);
    let current = state.number(key);
    tracing::debug!(setting = %key, previous, current, "numeric setting updated");
    SetOutcome::Changed { previous, current }
}

fn map_outcome<T>(outcome: SetOutcome<T>, wrap: fn(T) -> SettingValue) -> SetOutcome<SettingValue> {
    match outcome {
        SetOutcome::Changed { previous, current } => SetOutcome::Changed {
            previous: wrap(previous),
            current: wrap(current),
        },
        SetOutcome::Unchanged(value) => SetOutcome::Unchanged(wrap(value)),
    }
}
