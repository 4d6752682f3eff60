use crate::error::ConfigError;
use crate::settings::MigrationSettings;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_NAME: &str = ".migration-advisor";
const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml - computed, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Max tracing level: trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub settings: MigrationSettings,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

fn default_log_level() -> String {
    "info".into()
}

// ── Runner ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Migration command launched for each run
    #[serde(default = "default_run_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the command; `~` is expanded
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Export root; each run writes into its own subdirectory
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_run_command() -> String {
    "migrate".into()
}

fn default_output_dir() -> String {
    format!("~/{CONFIG_DIR_NAME}/output")
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_run_command(),
            args: Vec::new(),
            working_dir: None,
            output_dir: default_output_dir(),
        }
    }
}

impl RunnerConfig {
    pub fn resolved_output_dir(&self) -> PathBuf {
        expand_path(&self.output_dir)
    }

    pub fn resolved_working_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(expand_path)
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

// ── Scheduler ────────────────────────────────────────────────────

pub const MIN_POLL_SECONDS: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often due scheduled plans are checked
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

fn default_poll_secs() -> u64 {
    15
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_poll_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_secs.max(MIN_POLL_SECONDS))
    }
}

// ── Confirmation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Seconds to wait for a yes/no answer before declining
    #[serde(default = "default_confirmation_timeout")]
    pub timeout_secs: u64,
    /// Answer used when no terminal is attached
    #[serde(default)]
    pub unattended_answer: bool,
}

fn default_confirmation_timeout() -> u64 {
    60
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_confirmation_timeout(),
            unattended_answer: false,
        }
    }
}

impl ConfirmationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let advisor_dir = home.join(CONFIG_DIR_NAME);

        Self {
            config_path: advisor_dir.join(CONFIG_FILE_NAME),
            workspace_dir: advisor_dir,
            log_level: default_log_level(),
            settings: MigrationSettings::default(),
            runner: RunnerConfig::default(),
            scheduler: SchedulerConfig::default(),
            confirmation: ConfirmationConfig::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_in(&home.join(CONFIG_DIR_NAME))
    }

    /// Load `config.toml` from `dir`, writing defaults there on first run.
    pub fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        let config = Self {
            config_path: config_path.clone(),
            workspace_dir: dir.to_path_buf(),
            ..Self::default()
        };
        config.validate()?;
        config.save()?;
        tracing::info!(path = %config_path.display(), "wrote default config");
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::Load(e.to_string()))
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = path.to_path_buf();
        config.workspace_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.validate()?;
        if config.settings.max_below_base() {
            tracing::warn!(
                base = config.settings.http_retry_base_delay_seconds,
                max = config.settings.http_retry_max_delay_seconds,
                "retry base delay exceeds max delay"
            );
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level.parse::<tracing::Level>().map_err(|_| {
            ConfigError::Validation(format!("log_level '{}' is not a level", self.log_level))
        })?;
        self.settings
            .validate()
            .map_err(|e| ConfigError::Validation(format!("settings: {e}")))?;
        if self.runner.command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "runner.command must not be empty".into(),
            ));
        }
        if self.confirmation.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "confirmation.timeout_secs must be >= 1".into(),
            ));
        }
        Ok(())
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // Log level: MIGRATION_ADVISOR_LOG
        if let Ok(level) = std::env::var("MIGRATION_ADVISOR_LOG")
            && level.parse::<tracing::Level>().is_ok()
        {
            self.log_level = level;
        }

        // Run command: MIGRATION_ADVISOR_RUN_COMMAND
        if let Ok(command) = std::env::var("MIGRATION_ADVISOR_RUN_COMMAND")
            && !command.trim().is_empty()
        {
            self.runner.command = command;
        }

        // Output directory: MIGRATION_ADVISOR_OUTPUT_DIR
        if let Ok(dir) = std::env::var("MIGRATION_ADVISOR_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.runner.output_dir = dir;
        }

        // Scheduler poll: MIGRATION_ADVISOR_POLL_SECS
        if let Ok(raw) = std::env::var("MIGRATION_ADVISOR_POLL_SECS")
            && let Ok(secs) = raw.parse::<u64>()
        {
            self.scheduler.poll_secs = secs.max(MIN_POLL_SECONDS);
        }
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};
    use tempfile::TempDir;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.log_level, "info");
        assert_eq!(c.runner.command, "migrate");
        assert_eq!(c.scheduler.poll_secs, 15);
        assert_eq!(c.confirmation.timeout_secs, 60);
        assert!(!c.confirmation.unattended_answer);
        assert!(c.config_path.to_string_lossy().ends_with("config.toml"));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn poll_interval_has_floor() {
        let s = SchedulerConfig { poll_secs: 0 };
        assert_eq!(s.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn output_dir_expands_tilde() {
        let runner = RunnerConfig::default();
        let resolved = runner.resolved_output_dir();
        assert!(!resolved.to_string_lossy().starts_with('~'));
        assert!(resolved.ends_with("output"));
        assert_eq!(runner.resolved_working_dir(), None);
    }

    // ── Load / save ──────────────────────────────────────────

    #[test]
    fn load_or_init_writes_defaults_then_reloads() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("advisor");

        let first = Config::load_or_init_in(&dir).unwrap();
        assert!(dir.join("config.toml").exists());
        assert_eq!(first.workspace_dir, dir);

        let mut changed = first.clone();
        changed.settings.export_json = true;
        changed.runner.args = vec!["--dry-run".into()];
        changed.save().unwrap();

        let second = Config::load_or_init_in(&dir).unwrap();
        assert!(second.settings.export_json);
        assert_eq!(second.runner.args, vec!["--dry-run".to_string()]);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "log_level = \"debug\"\n[settings]\nhttp_retry_attempts = 5\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.settings.http_retry_attempts, 5);
        assert!(config.settings.export_csv);
        assert_eq!(config.runner.command, "migrate");
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn load_rejects_out_of_range_settings() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[settings]\nhttp_retry_max_delay_seconds = 700.0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{err:#}").contains("outside the allowed range"));
    }

    #[test]
    fn saved_base_above_max_reloads() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("advisor");
        let mut config = Config::load_or_init_in(&dir).unwrap();
        config.settings.http_retry_base_delay_seconds = 600.0;
        config.save().unwrap();

        let reloaded = Config::load_or_init_in(&dir).unwrap();
        assert!((reloaded.settings.http_retry_base_delay_seconds - 600.0).abs() < f64::EPSILON);
        assert!(reloaded.settings.max_below_base());
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let config = Config {
            log_level: "loud".into(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    // ── Env overrides ────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let _guard = env_lock();
        let mut config = Config::default();

        unsafe {
            std::env::set_var("MIGRATION_ADVISOR_RUN_COMMAND", "/opt/migrate/bin/run");
            std::env::set_var("MIGRATION_ADVISOR_POLL_SECS", "0");
            std::env::set_var("MIGRATION_ADVISOR_LOG", "warn");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("MIGRATION_ADVISOR_RUN_COMMAND");
            std::env::remove_var("MIGRATION_ADVISOR_POLL_SECS");
            std::env::remove_var("MIGRATION_ADVISOR_LOG");
        }

        assert_eq!(config.runner.command, "/opt/migrate/bin/run");
        assert_eq!(config.scheduler.poll_secs, 1);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn env_overrides_ignore_invalid_values() {
        let _guard = env_lock();
        let mut config = Config::default();

        unsafe {
            std::env::set_var("MIGRATION_ADVISOR_LOG", "shouting");
            std::env::set_var("MIGRATION_ADVISOR_POLL_SECS", "soon");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("MIGRATION_ADVISOR_LOG");
            std::env::remove_var("MIGRATION_ADVISOR_POLL_SECS");
        }

        assert_eq!(config.log_level, "info");
        assert_eq!(config.scheduler.poll_secs, 15);
    }
}
