pub mod clients;
pub mod config;
pub mod service;

pub use config::{Config, ConfigError, LogFormat};
pub use service::{AppState, build_orchestrator, build_router, create_app};
