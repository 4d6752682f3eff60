pub mod schema;

pub use schema::{Config, ConfirmationConfig, RunnerConfig, SchedulerConfig};
