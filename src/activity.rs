use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;

const DEFAULT_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityLevel {
    Info,
    Notice,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub level: ActivityLevel,
    pub message: String,
}

/// Operator-facing log shared by the directive layer and the run planner.
/// Entries are kept in arrival order and mirrored to `tracing`.
pub struct ActivityLog {
    entries: Mutex<Vec<ActivityEntry>>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(ActivityLevel::Info, message.into());
    }

    pub fn notice(&self, message: impl Into<String>) {
        self.push(ActivityLevel::Notice, message.into());
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.push(ActivityLevel::Warning, message.into());
    }

    fn push(&self, level: ActivityLevel, message: String) {
        match level {
            ActivityLevel::Info => tracing::info!(target: "activity", "{message}"),
            ActivityLevel::Notice => tracing::info!(target: "activity", notice = true, "{message}"),
            ActivityLevel::Warning => tracing::warn!(target: "activity", "{message}"),
        }

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.len() >= self.capacity {
            let overflow = entries.len() + 1 - self.capacity;
            entries.drain(..overflow);
        }
        entries.push(ActivityEntry {
            at: Utc::now(),
            level,
            message,
        });
    }

    /// True if any entry contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|entry| entry.message.contains(needle))
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.message.contains(needle))
            .count()
    }

    /// Remove and return everything logged so far.
    pub fn drain(&self) -> Vec<ActivityEntry> {
        std::mem::take(
            &mut *self
                .entries
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }
}
