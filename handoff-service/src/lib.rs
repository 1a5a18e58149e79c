pub mod clients;
pub mod config;
pub mod formatting;
pub mod models;
pub mod prompts;
pub mod references;
pub mod service;
pub mod tasks;
pub mod turns;
pub mod workflow;

pub use config::{ChatStrategy, ConfigError, ServiceConfig};
pub use service::{AppState, RouterSettings, build_router, create_app};
pub use workflow::{Workflows, build_brief_workflow, build_retrieval_workflow, build_turn_gated_workflow};
pub use models::*;
