use crate::directives::{APPLY_TOKEN, DISCARD_TOKEN};

/// Operator input recognized by the console session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    ApplyDirectives,
    DiscardDirectives,
    Plans,
    ApprovePlan { prefix: Option<String> },
    CancelPlan {
        prefix: Option<String>,
        reason: Option<String>,
    },
    CancelRun,
    Settings,
    Help,
}

pub const HELP_TEXT: &str = "\
/apply-directives              apply the pending directive batch
/discard-directives            drop the pending directive batch
/plans                         list run plans
/approve-plan <id>             start a pending or scheduled plan
/cancel-plan <id> [reason]     cancel a plan that has not started
/cancel-run                    stop the active migration run
/settings                      show current settings
/help                          this list";

pub fn parse_command(input: &str) -> Option<OperatorCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    // confirmation tokens match the whole input, nothing more
    if trimmed.eq_ignore_ascii_case(APPLY_TOKEN) {
        return Some(OperatorCommand::ApplyDirectives);
    }
    if trimmed.eq_ignore_ascii_case(DISCARD_TOKEN) {
        return Some(OperatorCommand::DiscardDirectives);
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let cmd = parts.next()?.to_lowercase();
    let args = parts.next().unwrap_or("").trim();

    match cmd.as_str() {
        "/plans" => Some(OperatorCommand::Plans),
        "/approve-plan" => Some(OperatorCommand::ApprovePlan {
            prefix: non_empty(args.split_whitespace().next()),
        }),
        "/cancel-plan" => {
            let mut rest = args.splitn(2, char::is_whitespace);
            Some(OperatorCommand::CancelPlan {
                prefix: non_empty(rest.next()),
                reason: non_empty(rest.next().map(str::trim)),
            })
        }
        "/cancel-run" => Some(OperatorCommand::CancelRun),
        "/settings" => Some(OperatorCommand::Settings),
        "/help" | "/?" => Some(OperatorCommand::Help),
        _ => None,
    }
}

fn non_empty(part: Option<&str>) -> Option<String> {
    part.filter(|text| !text.is_empty()).map(str::to_string)
}
