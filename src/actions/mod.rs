use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Fixed verb table for advisor actions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ActionVerb {
    StartRun,
    OpenOutputFolder,
    OpenRunFolder,
    OpenManualBundle,
    OpenManualReport,
    OpenRunDelta,
    OpenAiBrief,
    ScheduleRun,
}

impl ActionVerb {
    /// Lower-cases and trims before matching.
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_str(&name.trim().to_ascii_lowercase()).ok()
    }

    /// Verbs that always need the operator, whatever the advisor says.
    pub fn is_intrinsically_risky(self) -> bool {
        self == Self::StartRun
    }

    pub fn open_target(self) -> Option<OpenTarget> {
        match self {
            Self::OpenOutputFolder => Some(OpenTarget::OutputFolder),
            Self::OpenRunFolder => Some(OpenTarget::LatestRunFolder),
            Self::OpenManualBundle => Some(OpenTarget::ManualBundle),
            Self::OpenManualReport => Some(OpenTarget::ManualReport),
            Self::OpenRunDelta => Some(OpenTarget::RunDelta),
            Self::OpenAiBrief => Some(OpenTarget::AiBrief),
            Self::StartRun | Self::ScheduleRun => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "title_case")]
pub enum OpenTarget {
    OutputFolder,
    LatestRunFolder,
    ManualBundle,
    ManualReport,
    RunDelta,
    AiBrief,
}

impl OpenTarget {
    /// Artifact name inside a run folder, for targets that live there.
    pub fn artifact_name(self) -> Option<&'static str> {
        match self {
            Self::OutputFolder | Self::LatestRunFolder => None,
            Self::ManualBundle => Some("manual-bundle"),
            Self::ManualReport => Some("manual-report.md"),
            Self::RunDelta => Some("run-delta.json"),
            Self::AiBrief => Some("ai-brief.md"),
        }
    }
}

/// Presentation-side effects the advisor may request. Implementations
/// return the path they surfaced.
pub trait ActionHost: Send + Sync {
    fn open(&self, target: OpenTarget) -> Result<PathBuf>;
}

/// Resolves targets beneath the export output directory. Each run writes
/// into its own subdirectory; the newest one is the "latest run".
pub struct FolderActionHost {
    output_dir: PathBuf,
}

impl FolderActionHost {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn latest_run_folder(&self) -> Result<PathBuf> {
        let entries = std::fs::read_dir(&self.output_dir).with_context(|| {
            format!(
                "Failed to read output directory {}",
                self.output_dir.display()
            )
        })?;

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
            let path = entry.path();
            let replace = newest.as_ref().is_none_or(|(best_time, best_path)| {
                modified > *best_time || (modified == *best_time && path > *best_path)
            });
            if replace {
                newest = Some((modified, path));
            }
        }

        newest
            .map(|(_, path)| path)
            .with_context(|| format!("No run folders under {}", self.output_dir.display()))
    }
}

impl ActionHost for FolderActionHost {
    fn open(&self, target: OpenTarget) -> Result<PathBuf> {
        let path = match target {
            OpenTarget::OutputFolder => self.output_dir.clone(),
            OpenTarget::LatestRunFolder => self.latest_run_folder()?,
            other => {
                let run = self.latest_run_folder()?;
                let Some(artifact) = other.artifact_name() else {
                    bail!("{other} has no artifact name");
                };
                run.join(artifact)
            }
        };

        if !path.exists() {
            bail!("{target} not found at {}", path.display());
        }
        tracing::info!(artifact = %target, path = %path.display(), "surfaced run artifact");
        Ok(path)
    }
}
