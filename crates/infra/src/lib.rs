//! Infrastructure layer: stores, services, saga, task queue and wiring.

pub mod app;
pub mod config;
pub mod jobs;
pub mod saga;
pub mod services;
pub mod store;


pub use app::{App, StartupError, Stores};
pub use config::{Config, ConfigError};
