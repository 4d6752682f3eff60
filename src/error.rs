//! Typed failures for operator input, configuration and the run
//! infrastructure. Advisor-supplied content never surfaces here: untrusted
//! directives degrade to logged no-ops. Callers wrap these in `anyhow` for
//! context chains.

use crate::plans::PlanStatus;
use crate::settings::ValueKind;
use thiserror::Error;

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Directive errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DirectiveError {
    #[error("malformed directive batch: {0}")]
    Malformed(String),
}

// ─── Plan errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("run plan {id} not found")]
    NotFound { id: String },

    #[error("run plan {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: PlanStatus,
        to: PlanStatus,
    },

    #[error("run plan name must not be empty")]
    EmptyName,

    #[error("run plan '{name}' is scheduled but has no scheduled time")]
    MissingSchedule { name: String },

    #[error("setting '{setting}' is declared {kind} but carries no matching value")]
    SettingKindMismatch { setting: String, kind: ValueKind },

    #[error("plan id prefix '{prefix}' matches {matches} plans")]
    AmbiguousId { prefix: String, matches: usize },
}

// ─── Run errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("run command is not configured")]
    NotConfigured,
}
