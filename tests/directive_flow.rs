mod support;

use migration_advisor::directives::{
    AssistantActionDirective, AssistantDirectiveBatch, AssistantRetryDirective,
    AssistantToggleDirective, ProcessReport, requires_deferral,
};
use migration_advisor::plans::{PlanStatus, RunPlan};
use migration_advisor::session::InputOutcome;
use migration_advisor::settings::{NumericKey, ToggleKey};
use support::{Harness, settings_with_csv_off};

fn csv_batch() -> String {
    r#"{"summary":"Turn on CSV export","toggles":[{"name":"ExportCsv","value":true,"confidence":0.9,"risk_level":"low"}]}"#
        .to_string()
}

fn retry_batch(attempts: i64, base: f64, max: f64) -> AssistantDirectiveBatch {
    AssistantDirectiveBatch::new("Tune retries").with_retry(AssistantRetryDirective {
        attempts: Some(attempts),
        base_delay_seconds: Some(base),
        max_delay_seconds: Some(max),
        ..AssistantRetryDirective::default()
    })
}

#[tokio::test]
async fn low_risk_toggle_applies_immediately() {
    let harness = Harness::new(settings_with_csv_off(), true);

    let outcome = harness.session.handle_input(&csv_batch()).await;

    assert_eq!(
        outcome,
        InputOutcome::Directives(ProcessReport::Applied { changes: 1 })
    );
    assert!(harness.session.settings().toggle(ToggleKey::ExportCsv));
    assert!(harness.log_contains("Assistant enabled ExportCsv"));
    assert!(harness.log_contains("Advisor: Turn on CSV export"));
    assert_eq!(harness.prompts.count(), 0);
}

#[tokio::test]
async fn repeated_toggle_changes_once() {
    let harness = Harness::new(settings_with_csv_off(), true);

    harness.session.handle_input(&csv_batch()).await;
    let second = harness.session.handle_input(&csv_batch()).await;

    assert_eq!(
        second,
        InputOutcome::Directives(ProcessReport::Applied { changes: 0 })
    );
    let log = harness.session.log();
    assert_eq!(log.count_matching("Assistant enabled ExportCsv"), 1);
    assert_eq!(log.count_matching("ExportCsv already enabled; no change."), 1);
}

#[tokio::test]
async fn large_retry_policy_waits_for_operator() {
    let harness = Harness::approving();
    let batch = retry_batch(8, 5.0, 400.0);
    assert!(requires_deferral(&batch));

    let report = harness.session.processor().process(batch, false).await;

    assert!(report.is_staged());
    assert!(harness.session.processor().has_pending());
    assert_eq!(
        harness.session.settings().number(NumericKey::HttpRetryAttempts),
        3.0
    );
    assert!(harness.log_contains("Directives need confirmation"));
    assert!(harness.log_contains("/apply-directives"));

    let outcome = harness.session.handle_input("/APPLY-DIRECTIVES").await;
    assert!(matches!(outcome, InputOutcome::Command(_)));
    let settings = harness.session.settings();
    assert_eq!(settings.number(NumericKey::HttpRetryAttempts), 8.0);
    assert_eq!(settings.number(NumericKey::HttpRetryBaseDelaySeconds), 5.0);
    assert_eq!(settings.number(NumericKey::HttpRetryMaxDelaySeconds), 400.0);
    assert!(!harness.session.processor().has_pending());
}

#[tokio::test]
async fn retry_values_outside_range_are_rejected() {
    let harness = Harness::approving();
    let processor = harness.session.processor();
    let settings = harness.session.settings();

    processor.process(retry_batch(11, 600.01, 600.0), true).await;
    assert_eq!(settings.number(NumericKey::HttpRetryAttempts), 3.0);
    assert_eq!(settings.number(NumericKey::HttpRetryBaseDelaySeconds), 2.0);
    assert_eq!(settings.number(NumericKey::HttpRetryMaxDelaySeconds), 600.0);
    assert_eq!(
        harness.session.log().count_matching("Rejected retry directive"),
        2
    );

    processor.process(retry_batch(10, 600.0, 600.0), true).await;
    assert_eq!(settings.number(NumericKey::HttpRetryAttempts), 10.0);
    assert_eq!(settings.number(NumericKey::HttpRetryBaseDelaySeconds), 600.0);
}

#[tokio::test]
async fn max_below_base_is_rejected() {
    let harness = Harness::approving();

    harness
        .session
        .processor()
        .process(retry_batch(3, 20.0, 10.0), true)
        .await;

    let settings = harness.session.settings();
    // the base is only range-checked; the directed max then falls below it
    assert_eq!(settings.number(NumericKey::HttpRetryBaseDelaySeconds), 20.0);
    assert_eq!(settings.number(NumericKey::HttpRetryMaxDelaySeconds), 30.0);
    assert!(harness.log_contains("must be at least the base delay"));
}

#[tokio::test]
async fn edge_base_delay_applies_on_its_own() {
    let harness = Harness::approving();
    let batch = AssistantDirectiveBatch::new("Slow down").with_retry(AssistantRetryDirective {
        base_delay_seconds: Some(600.0),
        ..AssistantRetryDirective::default()
    });

    let report = harness.session.processor().process(batch, true).await;

    assert_eq!(report, ProcessReport::Applied { changes: 1 });
    assert_eq!(
        harness.session.settings().number(NumericKey::HttpRetryBaseDelaySeconds),
        600.0
    );
    assert!(!harness.log_contains("Rejected retry directive"));
}

#[tokio::test]
async fn newer_risky_batch_replaces_pending_one() {
    let harness = Harness::approving();
    let processor = harness.session.processor();

    let first = AssistantDirectiveBatch::new("first").with_toggle(AssistantToggleDirective {
        requires_confirmation: true,
        ..AssistantToggleDirective::new("ExportJson", true)
    });
    let second = AssistantDirectiveBatch::new("second")
        .with_risk_note("touches design export")
        .with_toggle(AssistantToggleDirective::new("ExportMarkdown", true));

    processor.process(first, false).await;
    processor.process(second, false).await;
    assert_eq!(processor.pending_summary().as_deref(), Some("second"));

    processor.apply_pending().await;
    let settings = harness.session.settings();
    assert!(settings.toggle(ToggleKey::ExportMarkdown));
    assert!(!settings.toggle(ToggleKey::ExportJson));
}

#[tokio::test]
async fn discard_without_pending_batch_reports_nothing_to_discard() {
    let harness = Harness::approving();

    harness.session.handle_input("/discard-directives").await;

    assert!(harness.log_contains("nothing to discard"));
}

#[tokio::test]
async fn discard_drops_staged_changes() {
    let harness = Harness::approving();
    harness
        .session
        .processor()
        .process(retry_batch(9, 2.0, 30.0), false)
        .await;

    harness.session.handle_input("/discard-directives").await;

    assert!(!harness.session.processor().has_pending());
    assert!(harness.log_contains("Discarded pending directives: Tune retries."));
    harness.session.handle_input("/apply-directives").await;
    assert!(harness.log_contains("nothing to apply"));
    assert_eq!(
        harness.session.settings().number(NumericKey::HttpRetryAttempts),
        3.0
    );
}

#[tokio::test]
async fn start_run_during_active_run_skips_before_prompting() {
    let harness = Harness::approving();
    let planner = harness.session.planner();
    let id = planner.enqueue(RunPlan::immediate("nightly")).unwrap();
    assert!(planner.try_approve(&id));

    let batch =
        AssistantDirectiveBatch::new("Kick off").with_action(AssistantActionDirective::new("start_run"));
    let report = harness.session.processor().process(batch, true).await;

    assert_eq!(report, ProcessReport::Applied { changes: 0 });
    assert!(harness.log_contains("already in progress"));
    assert_eq!(harness.prompts.count(), 0);
    assert_eq!(planner.plans().len(), 1);

    harness.executor.release();
    harness.settle().await;
}

#[tokio::test]
async fn start_run_runs_after_operator_approval() {
    let harness = Harness::approving();
    let batch = AssistantDirectiveBatch::new("Run the migration")
        .with_action(AssistantActionDirective::new("start_run"));

    let report = harness.session.processor().process(batch, true).await;

    assert_eq!(report, ProcessReport::Applied { changes: 1 });
    assert_eq!(harness.prompts.count(), 1);
    assert!(harness.session.runs().is_running());

    harness.executor.release();
    harness.settle().await;
    let plans = harness.session.planner().plans();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].status(), PlanStatus::Completed);
    assert_eq!(
        plans[0].directive_summary.as_deref(),
        Some("Run the migration")
    );
}

#[tokio::test]
async fn declined_start_run_leaves_no_plan() {
    let harness = Harness::declining();
    let batch =
        AssistantDirectiveBatch::new("Kick off").with_action(AssistantActionDirective::new("start_run"));

    // start_run is staged even without any other flag
    let staged = harness.session.processor().process(batch, false).await;
    assert!(staged.is_staged());

    harness.session.handle_input("/apply-directives").await;

    assert_eq!(harness.prompts.count(), 1);
    assert!(harness.log_contains("Operator declined"));
    assert!(harness.session.planner().plans().is_empty());
    assert_eq!(harness.executor.calls(), 0);
}

#[tokio::test]
async fn malformed_batch_is_reported_and_ignored() {
    let harness = Harness::approving();

    let outcome = harness.session.handle_input("{\"toggles\": [").await;

    assert_eq!(outcome, InputOutcome::Malformed);
    assert!(harness.log_contains("Ignored directive batch"));
    assert!(!harness.session.processor().has_pending());
}
