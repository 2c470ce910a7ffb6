//! Configuration loading

mod app_config;

pub use app_config::{AppConfig, ConfigError, LogConfig, RedisConfig, RemoteConfig};
