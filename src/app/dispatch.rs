use crate::app::status::{render_plans, render_status};
use crate::cli::commands::{Cli, Commands};
use anyhow::{Context, Result, bail};
use migration_advisor::actions::FolderActionHost;
use migration_advisor::activity::{ActivityEntry, ActivityLog};
use migration_advisor::approval::CliConfirmationGate;
use migration_advisor::config::Config;
use migration_advisor::directives::AssistantDirectiveBatch;
use migration_advisor::plans::RunPlan;
use migration_advisor::run::CommandRunExecutor;
use migration_advisor::session::{AdvisorSession, InputOutcome};
use migration_advisor::settings::SettingsRegistry;
use migration_advisor::ui::style;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

const IDLE_POLL: Duration = Duration::from_millis(100);
const LOG_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Process {
            file,
            confirmed,
            no_save,
        } => process_batch(config, &file, confirmed, !no_save).await,
        Commands::RunPlan { file, snapshot } => run_plan(&config, &file, snapshot.as_deref()).await,
        Commands::Settings => {
            println!("{}", render_status(&config, &config.settings));
            Ok(())
        }
        Commands::Console => console(config).await,
    }
}

fn build_session(config: &Config) -> Result<AdvisorSession> {
    let executor = CommandRunExecutor::from_config(&config.runner)
        .context("Cannot build the migration run command")?;
    let gate = CliConfirmationGate::new(
        config.confirmation.timeout(),
        config.confirmation.unattended_answer,
    );
    let host = FolderActionHost::new(config.runner.resolved_output_dir());
    Ok(AdvisorSession::new(
        Arc::new(SettingsRegistry::new(config.settings.clone())),
        Arc::new(executor),
        Arc::new(gate),
        Arc::new(host),
    ))
}

async fn wait_until_idle(session: &AdvisorSession) {
    while session.runs().is_running() || session.planner().active_plan().is_some() {
        tokio::time::sleep(IDLE_POLL).await;
    }
}

/// Stop the reporter after it has narrated everything already queued.
async fn stop_reporter(shutdown: CancellationToken, reporter: tokio::task::JoinHandle<()>) {
    shutdown.cancel();
    if let Err(e) = reporter.await {
        tracing::warn!("outcome reporter ended abnormally: {e}");
    }
}

async fn process_batch(mut config: Config, file: &Path, confirmed: bool, save: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read directive batch {}", file.display()))?;
    let batch = AssistantDirectiveBatch::from_json(&raw)
        .with_context(|| format!("Invalid directive batch in {}", file.display()))?;

    let session = build_session(&config)?;
    let shutdown = CancellationToken::new();
    let reporter = session.spawn_outcome_reporter(shutdown.clone());

    let report = session.processor().process(batch, confirmed).await;
    wait_until_idle(&session).await;
    stop_reporter(shutdown, reporter).await;
    print_entries(&session.log().drain());

    if report.is_staged() {
        println!();
        println!(
            "{}",
            style::warning("Nothing applied. Re-run with --confirmed once the changes are reviewed.")
        );
        return Ok(());
    }

    if save && report.changes() > 0 {
        config.settings = session.settings().snapshot();
        config.save()?;
        println!("{}", style::saved_settings(&config.config_path));
    }
    Ok(())
}

async fn run_plan(config: &Config, file: &Path, snapshot: Option<&Path>) -> Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read run plan {}", file.display()))?;
    let plan = RunPlan::from_json(&raw)
        .with_context(|| format!("Invalid run plan in {}", file.display()))?;

    let session = build_session(config)?;
    let planner = Arc::clone(session.planner());
    let id = planner.enqueue(plan)?;

    let outcome = tokio::select! {
        outcome = planner.approve_and_wait(&id) => outcome,
        _ = tokio::signal::ctrl_c() => {
            session.runs().cancel_current("Interrupted by operator.");
            wait_until_idle(&session).await;
            planner.get(&id).and_then(|plan| plan.outcome().cloned())
        }
    };

    print_entries(&session.log().drain());
    if let Some(path) = snapshot {
        planner.export_snapshot(path)?;
    }
    println!("{}", render_plans(&planner.create_snapshot(None, None)));

    let Some(outcome) = outcome else {
        bail!("Run plan {id} could not start");
    };
    if !outcome.success && !outcome.cancelled {
        bail!("{}", outcome.message);
    }
    println!("{}", style::outcome_line(&outcome));
    Ok(())
}

async fn console(mut config: Config) -> Result<()> {
    let session = build_session(&config)?;
    let shutdown = CancellationToken::new();
    let reporter = session.spawn_outcome_reporter(shutdown.clone());
    let scheduler = session.spawn_scheduler(config.scheduler.poll_interval(), shutdown.clone());
    let printer = spawn_log_printer(Arc::clone(session.log()), shutdown.clone());

    println!("{}", style::header("Migration advisor console"));
    println!(
        "{}",
        style::hint("Paste a directive batch as one line of JSON, or type /help. Ctrl-D to exit.")
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read console input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if matches!(line.trim(), "exit" | "quit") {
            break;
        }

        if let InputOutcome::NotACommand(text) = session.handle_input(&line).await {
            session
                .log()
                .notice(format!("'{text}' is not a command. Type /help for the list."));
        }
        print_entries(&session.log().drain());
    }

    if session.runs().cancel_current("Console closed.") {
        wait_until_idle(&session).await;
    }
    shutdown.cancel();
    for handle in [reporter, scheduler, printer] {
        if let Err(e) = handle.await {
            tracing::warn!("console task ended abnormally: {e}");
        }
    }
    print_entries(&session.log().drain());

    let current = session.settings().snapshot();
    if current != config.settings {
        config.settings = current;
        config.save()?;
        println!("{}", style::saved_settings(&config.config_path));
    }
    Ok(())
}

/// Print entries that arrive between prompts, such as run outcomes.
fn spawn_log_printer(
    log: Arc<ActivityLog>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LOG_FLUSH_INTERVAL);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => print_entries(&log.drain()),
            }
        }
    })
}

fn print_entries(entries: &[ActivityEntry]) {
    for entry in entries {
        println!("{}", style::activity_line(entry));
    }
}
