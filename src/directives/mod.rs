pub mod classifier;
pub mod processor;
pub mod types;

pub use classifier::{DeferralReason, deferral_reasons, requires_deferral};
pub use processor::{APPLY_TOKEN, DISCARD_TOKEN, DirectiveProcessor, ProcessReport};
pub use types::{
    AssistantActionDirective, AssistantDirectiveBatch, AssistantRetryDirective,
    AssistantToggleDirective,
};
