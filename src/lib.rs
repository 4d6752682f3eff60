#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod actions;
pub mod activity;
pub mod approval;
pub mod config;
pub mod directives;
pub mod error;
pub mod plans;
pub mod run;
pub mod session;
pub mod settings;
pub mod ui;

pub use config::Config;
pub use session::AdvisorSession;
