use super::RunExecutor;
use crate::config::RunnerConfig;
use crate::error::RunError;
use crate::plans::{RunPlan, RunPlanExecutionOutcome};
use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const MAX_OUTPUT_TAIL_CHARS: usize = 400;

/// Runs the external migration command once per plan.
///
/// Plan settings are passed as `MIGRATION_<UPPER_SNAKE_NAME>` environment
/// variables alongside `MIGRATION_PLAN_NAME` and `MIGRATION_PLAN_ID`.
#[derive(Debug, Clone)]
pub struct CommandRunExecutor {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandRunExecutor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Result<Self, RunError> {
        if config.command.trim().is_empty() {
            return Err(RunError::NotConfigured);
        }
        let executor = Self::new(config.command.trim(), config.args.clone());
        Ok(match config.resolved_working_dir() {
            Some(dir) => executor.with_working_dir(dir),
            None => executor,
        })
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn build_command(&self, plan: &RunPlan) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("MIGRATION_PLAN_NAME", &plan.name)
            .env("MIGRATION_PLAN_ID", &plan.id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for setting in &plan.settings {
            command.env(setting_env_name(&setting.name), setting.display_value());
        }
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }

    async fn run_once(
        &self,
        plan: &RunPlan,
        cancel: CancellationToken,
    ) -> Result<RunPlanExecutionOutcome> {
        let child = self
            .build_command(plan)
            .spawn()
            .map_err(|e| RunError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        // dropping the output future drops the child, which kills it
        let output = tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!(plan = %plan.name, program = %self.program, "killing cancelled run");
                return Ok(RunPlanExecutionOutcome::cancelled(format!(
                    "Run '{}' was cancelled.",
                    plan.name
                )));
            }
            output = child.wait_with_output() => output.context("Failed to wait for run command")?,
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(
            plan = %plan.name,
            status = %output.status,
            stdout = %stdout.trim(),
            stderr = %stderr.trim(),
            "run command exited"
        );

        if output.status.success() {
            return Ok(RunPlanExecutionOutcome::succeeded(format!(
                "Run '{}' completed.",
                plan.name
            )));
        }

        let detail = tail(stderr.trim(), MAX_OUTPUT_TAIL_CHARS);
        let message = if detail.is_empty() {
            format!("Run '{}' failed ({}).", plan.name, output.status)
        } else {
            format!("Run '{}' failed ({}): {detail}", plan.name, output.status)
        };
        Ok(RunPlanExecutionOutcome::failed(message))
    }
}

impl RunExecutor for CommandRunExecutor {
    fn execute<'a>(
        &'a self,
        plan: &'a RunPlan,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<RunPlanExecutionOutcome>> + Send + 'a>> {
        Box::pin(self.run_once(plan, cancel))
    }
}

/// `HttpRetryAttempts` -> `MIGRATION_HTTP_RETRY_ATTEMPTS`
pub fn setting_env_name(name: &str) -> String {
    let mut out = String::from("MIGRATION_");
    let mut prev_lower = false;
    for ch in name.trim().chars() {
        if !ch.is_ascii_alphanumeric() {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
            continue;
        }
        if ch.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        out.push(ch.to_ascii_uppercase());
    }
    out
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    text.char_indices()
        .nth(skip)
        .map_or(text, |(idx, _)| &text[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::RunPlanSetting;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn env_names_are_upper_snake() {
        assert_eq!(setting_env_name("ExportCsv"), "MIGRATION_EXPORT_CSV");
        assert_eq!(
            setting_env_name("HttpRetryBaseDelaySeconds"),
            "MIGRATION_HTTP_RETRY_BASE_DELAY_SECONDS"
        );
        assert_eq!(setting_env_name("manual run-goals"), "MIGRATION_MANUAL_RUN_GOALS");
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
    }

    #[test]
    fn from_config_requires_command() {
        let config = RunnerConfig {
            command: "  ".into(),
            ..RunnerConfig::default()
        };
        assert!(matches!(
            CommandRunExecutor::from_config(&config),
            Err(RunError::NotConfigured)
        ));
    }

    #[test]
    fn from_config_applies_working_dir() {
        let config = RunnerConfig {
            command: " migrate ".into(),
            working_dir: Some("/srv/migrations".into()),
            ..RunnerConfig::default()
        };
        let executor = CommandRunExecutor::from_config(&config).unwrap();
        assert_eq!(executor.program, "migrate");
        assert_eq!(executor.working_dir, Some(PathBuf::from("/srv/migrations")));

        let blank = RunnerConfig {
            working_dir: Some("  ".into()),
            ..RunnerConfig::default()
        };
        assert_eq!(CommandRunExecutor::from_config(&blank).unwrap().working_dir, None);
    }

    #[tokio::test]
    async fn command_receives_plan_settings() {
        let tmp = TempDir::new().unwrap();
        let marker = tmp.path().join("env.txt");
        let script = format!(
            "printf '%s %s' \"$MIGRATION_PLAN_NAME\" \"$MIGRATION_EXPORT_JSON\" > {}",
            marker.display()
        );
        let executor = CommandRunExecutor::new("sh", vec!["-c".into(), script]);
        let plan = RunPlan::immediate("json-only")
            .with_setting(RunPlanSetting::boolean("ExportJson", true));

        let outcome = executor
            .execute(&plan, CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(std::fs::read_to_string(marker).unwrap(), "json-only enabled");
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let executor = CommandRunExecutor::new(
            "sh",
            vec!["-c".into(), "echo 'quota exhausted' >&2; exit 3".into()],
        );
        let outcome = executor
            .execute(&RunPlan::immediate("nightly"), CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(!outcome.cancelled);
        assert!(outcome.message.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let executor = CommandRunExecutor::new("definitely-not-a-migration-tool", Vec::new());
        let err = executor
            .execute(&RunPlan::immediate("x"), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }

    #[tokio::test]
    async fn cancellation_kills_child() {
        let executor = CommandRunExecutor::new("sleep", vec!["30".into()]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = executor
            .execute(&RunPlan::immediate("slow"), cancel)
            .await
            .unwrap();
        assert!(outcome.cancelled);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
