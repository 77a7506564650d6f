pub mod config;
pub mod engine;
pub mod errors;
pub mod init;
pub mod logging;
pub mod orchestrator;
pub mod ranking;
pub mod reconcile;
pub mod reconflow_config;
pub mod session;
pub mod tracker;
pub mod ui;
pub mod workflow;

pub use errors::{EngineError, OrchestratorError};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
