#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use migration_advisor::AdvisorSession;
use migration_advisor::actions::FolderActionHost;
use migration_advisor::approval::FnConfirmationGate;
use migration_advisor::plans::{RunPlan, RunPlanExecutionOutcome};
use migration_advisor::run::RunExecutor;
use migration_advisor::settings::{MigrationSettings, SettingsRegistry};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Blocks every run until `release` is called or the run is cancelled.
#[derive(Default)]
pub struct GatedExecutor {
    release: Notify,
    pub calls: AtomicUsize,
}

impl GatedExecutor {
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RunExecutor for GatedExecutor {
    fn execute<'a>(
        &'a self,
        plan: &'a RunPlan,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<RunPlanExecutionOutcome>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            tokio::select! {
                () = cancel.cancelled() => Ok(RunPlanExecutionOutcome::cancelled("stopped")),
                () = self.release.notified() => Ok(RunPlanExecutionOutcome::succeeded(format!(
                    "{} done",
                    plan.name
                ))),
            }
        })
    }
}

/// Counts confirmation prompts and answers them with a fixed decision.
pub struct Prompts {
    count: Arc<AtomicUsize>,
}

impl Prompts {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub session: AdvisorSession,
    pub executor: Arc<GatedExecutor>,
    pub prompts: Prompts,
    _output: TempDir,
}

impl Harness {
    pub fn new(settings: MigrationSettings, approve: bool) -> Self {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let gate = FnConfirmationGate::new(move |_prompt: &str, _why: Option<&str>| {
            counter.fetch_add(1, Ordering::SeqCst);
            approve
        });
        let output = TempDir::new().unwrap();
        let executor = Arc::new(GatedExecutor::default());
        let session = AdvisorSession::new(
            Arc::new(SettingsRegistry::new(settings)),
            Arc::clone(&executor) as Arc<dyn RunExecutor>,
            Arc::new(gate),
            Arc::new(FolderActionHost::new(output.path())),
        );
        Self {
            session,
            executor,
            prompts: Prompts { count },
            _output: output,
        }
    }

    pub fn approving() -> Self {
        Self::new(MigrationSettings::default(), true)
    }

    pub fn declining() -> Self {
        Self::new(MigrationSettings::default(), false)
    }

    pub fn log_contains(&self, needle: &str) -> bool {
        self.session.log().contains(needle)
    }

    /// Wait until no plan is executing and the run slot is free.
    pub async fn settle(&self) {
        wait_for(|| {
            !self.session.runs().is_running() && self.session.planner().active_plan().is_none()
        })
        .await;
    }
}

pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

pub fn settings_with_csv_off() -> MigrationSettings {
    MigrationSettings {
        export_csv: false,
        ..MigrationSettings::default()
    }
}
