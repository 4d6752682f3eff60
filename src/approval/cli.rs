use crate::approval::{ConfirmationDecision, ConfirmationGate, ConfirmationRequest};
use crate::ui::style;
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Terminal yes/no prompt. Falls back to `unattended_answer` when stdout is
/// not a terminal, and declines on timeout.
pub struct CliConfirmationGate {
    timeout: Duration,
    unattended_answer: bool,
}

impl CliConfirmationGate {
    pub fn new(timeout: Duration, unattended_answer: bool) -> Self {
        Self {
            timeout,
            unattended_answer,
        }
    }
}

impl ConfirmationGate for CliConfirmationGate {
    fn confirm<'a>(
        &'a self,
        request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ConfirmationDecision>> + Send + 'a>> {
        Box::pin(async move {
            if !console::user_attended() {
                tracing::info!(
                    prompt = %request.prompt,
                    answer = self.unattended_answer,
                    "no terminal attached; using unattended confirmation answer"
                );
                return Ok(if self.unattended_answer {
                    ConfirmationDecision::Approved
                } else {
                    ConfirmationDecision::Declined {
                        reason: "no operator terminal attached".to_string(),
                    }
                });
            }

            eprintln!();
            eprintln!("{}", style::header("Confirmation required"));
            if let Some(justification) = &request.justification {
                eprintln!("  {} {}", style::hint("Advisor says:"), justification);
            }

            let prompt = request.prompt.clone();
            let answer = tokio::time::timeout(self.timeout, read_yes_no(prompt)).await;

            match answer {
                Ok(Ok(true)) => Ok(ConfirmationDecision::Approved),
                Ok(Ok(false)) => Ok(ConfirmationDecision::Declined {
                    reason: "declined by operator".to_string(),
                }),
                Ok(Err(e)) => Ok(ConfirmationDecision::Declined {
                    reason: format!("input error: {e}"),
                }),
                Err(_) => Ok(ConfirmationDecision::Declined {
                    reason: "confirmation timed out".to_string(),
                }),
            }
        })
    }
}

async fn read_yes_no(prompt: String) -> Result<bool> {
    // dialoguer blocks on the terminal
    let answer = tokio::task::spawn_blocking(move || {
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
    })
    .await??;
    Ok(answer)
}
