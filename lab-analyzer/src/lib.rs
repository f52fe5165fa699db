pub mod agent;
pub mod config;
pub mod error;
pub mod health_status;
pub mod intake;
pub mod models;
pub mod profile;
pub mod report;
pub mod service;
pub mod session;
pub mod staging;
pub mod tasks;
pub mod workflow;

pub use config::{Config, ConfigError};
pub use error::{LabError, LabResult};
pub use service::{AppState, build_router, create_app, create_app_with_agent};
pub use workflow::{build_lab_workflow, create_flow_runner, create_lab_session};
