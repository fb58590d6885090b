//! Layered application configuration

mod app_config;

pub use app_config::{
    AdminConfig, AppConfig, AuthConfig, LogFormat, LoggingConfig, MetricsConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
