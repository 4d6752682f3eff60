use migration_advisor::config::Config;
use migration_advisor::plans::RunPlanSnapshot;
use migration_advisor::settings::MigrationSettings;
use migration_advisor::ui::style;

pub fn render_status(config: &Config, settings: &MigrationSettings) -> String {
    let mut lines = vec![
        format!("◆ {}", style::header("Migration advisor")),
        String::new(),
        format!("Version     {}", env!("CARGO_PKG_VERSION")),
        format!("Config      {}", config.config_path.display()),
        format!(
            "Run command {} {}",
            config.runner.command,
            config.runner.args.join(" ")
        ),
        format!(
            "Output dir  {}",
            config.runner.resolved_output_dir().display()
        ),
        format!(
            "Scheduler   every {}s",
            config.scheduler.poll_interval().as_secs()
        ),
        String::new(),
        style::header("Settings"),
    ];

    let entries = settings.entries();
    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in entries {
        lines.push(format!("  {name:<width$}  {}", style::setting_value(&value)));
    }

    lines.join("\n")
}

pub fn render_plans(snapshot: &[RunPlanSnapshot]) -> String {
    if snapshot.is_empty() {
        return style::hint("No run plans.");
    }
    snapshot
        .iter()
        .map(|plan| {
            let outcome = plan
                .outcome
                .as_ref()
                .map(|outcome| format!(" {}", style::hint(&outcome.message)))
                .unwrap_or_default();
            format!(
                "  {} {} {}{outcome}",
                style::hint(plan.id.get(..8).unwrap_or(&plan.id)),
                style::header(&plan.name),
                style::plan_status(plan.status),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_lists_every_setting() {
        let config = Config::default();
        let rendered = render_status(&config, &MigrationSettings::default());
        assert!(rendered.contains("ExportCsv"));
        assert!(rendered.contains("HttpRetryMaxDelaySeconds"));
        assert!(rendered.contains("ManualRunGoals"));
        assert!(rendered.contains("migrate"));
    }

    #[test]
    fn empty_plan_table() {
        assert!(render_plans(&[]).contains("No run plans."));
    }
}
