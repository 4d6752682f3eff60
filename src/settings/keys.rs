use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Boolean switches exposed to the advisor and the operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum ToggleKey {
    ExportCsv,
    ExportJson,
    ExportExcel,
    ExportMarkdown,
    ExportPublicFootprint,
    ExportDesign,
    ExportConfiguration,
    ImportPublicFootprint,
    ImportDesign,
    ImportConfiguration,
    EnableHttpRetries,
}

impl ToggleKey {
    /// Toggles that move design/config data in or out of a live tenant.
    /// Turning one of these on always needs an operator.
    pub const HIGH_IMPACT: [Self; 6] = [
        Self::ExportPublicFootprint,
        Self::ExportDesign,
        Self::ExportConfiguration,
        Self::ImportPublicFootprint,
        Self::ImportDesign,
        Self::ImportConfiguration,
    ];

    pub fn is_high_impact(self) -> bool {
        Self::HIGH_IMPACT.contains(&self)
    }
}

/// Retry-policy knobs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum NumericKey {
    HttpRetryAttempts,
    HttpRetryBaseDelaySeconds,
    HttpRetryMaxDelaySeconds,
}

pub const RETRY_ATTEMPTS_RANGE: RangeInclusive<f64> = 0.0..=10.0;
pub const RETRY_DELAY_RANGE: RangeInclusive<f64> = 0.0..=600.0;

impl NumericKey {
    pub fn range(self) -> RangeInclusive<f64> {
        match self {
            Self::HttpRetryAttempts => RETRY_ATTEMPTS_RANGE,
            Self::HttpRetryBaseDelaySeconds | Self::HttpRetryMaxDelaySeconds => RETRY_DELAY_RANGE,
        }
    }

    pub fn is_whole_number(self) -> bool {
        self == Self::HttpRetryAttempts
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum TextKey {
    ManualRunGoals,
}

/// Value shape carried by a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ValueKind {
    Boolean,
    Number,
    Text,
}

/// A setting name resolved against the closed key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingKey {
    Toggle(ToggleKey),
    Numeric(NumericKey),
    Text(TextKey),
    Unknown(String),
}

impl SettingKey {
    /// Resolve a name case-insensitively. Never fails; unrecognised names
    /// come back as [`SettingKey::Unknown`].
    pub fn parse(name: &str) -> Self {
        let name = name.trim();
        if let Ok(key) = ToggleKey::from_str(name) {
            return Self::Toggle(key);
        }
        if let Ok(key) = NumericKey::from_str(name) {
            return Self::Numeric(key);
        }
        if let Ok(key) = TextKey::from_str(name) {
            return Self::Text(key);
        }
        Self::Unknown(name.to_string())
    }

    pub fn value_kind(&self) -> Option<ValueKind> {
        match self {
            Self::Toggle(_) => Some(ValueKind::Boolean),
            Self::Numeric(_) => Some(ValueKind::Number),
            Self::Text(_) => Some(ValueKind::Text),
            Self::Unknown(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Toggle(key) => <&'static str>::from(*key),
            Self::Numeric(key) => <&'static str>::from(*key),
            Self::Text(key) => <&'static str>::from(*key),
            Self::Unknown(name) => name,
        }
    }
}
