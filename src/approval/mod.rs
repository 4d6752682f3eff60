pub mod cli;

pub use cli::CliConfirmationGate;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A single yes/no question put to the operator before a risky action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub prompt: String,
    pub justification: Option<String>,
}

impl ConfirmationRequest {
    pub fn new(prompt: impl Into<String>, justification: Option<&str>) -> Self {
        Self {
            prompt: prompt.into(),
            justification: justification
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Approved,
    Declined { reason: String },
}

impl ConfirmationDecision {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

pub trait ConfirmationGate: Send + Sync {
    fn confirm<'a>(
        &'a self,
        request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ConfirmationDecision>> + Send + 'a>>;
}

/// Approves everything. For unattended runs where the operator has opted in.
pub struct AutoApproveGate;

impl ConfirmationGate for AutoApproveGate {
    fn confirm<'a>(
        &'a self,
        _request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ConfirmationDecision>> + Send + 'a>> {
        Box::pin(async move { Ok(ConfirmationDecision::Approved) })
    }
}

pub struct AutoDeclineGate {
    pub reason: String,
}

impl ConfirmationGate for AutoDeclineGate {
    fn confirm<'a>(
        &'a self,
        _request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ConfirmationDecision>> + Send + 'a>> {
        Box::pin(async move {
            Ok(ConfirmationDecision::Declined {
                reason: self.reason.clone(),
            })
        })
    }
}

/// Adapts a plain `(prompt, justification) -> bool` callback.
pub struct FnConfirmationGate<F> {
    callback: F,
}

impl<F> FnConfirmationGate<F>
where
    F: Fn(&str, Option<&str>) -> bool + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ConfirmationGate for FnConfirmationGate<F>
where
    F: Fn(&str, Option<&str>) -> bool + Send + Sync,
{
    fn confirm<'a>(
        &'a self,
        request: &'a ConfirmationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ConfirmationDecision>> + Send + 'a>> {
        let approved = (self.callback)(&request.prompt, request.justification.as_deref());
        Box::pin(async move {
            if approved {
                Ok(ConfirmationDecision::Approved)
            } else {
                Ok(ConfirmationDecision::Declined {
                    reason: "declined by operator".to_string(),
                })
            }
        })
    }
}
