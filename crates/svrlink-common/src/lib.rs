//! # svrlink-common
//!
//! Shared utilities for the svrlink backend: startup configuration and
//! tracing setup.

pub mod config;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, LogConfig, RedisConfig, RemoteConfig};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
