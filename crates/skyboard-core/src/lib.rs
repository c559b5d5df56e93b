pub mod config;
pub mod error;
pub mod preferences;
pub mod storage;

pub use config::{Config, StorageConfig, Units, UvConfig, ValidationResult, WeatherConfig};
pub use error::{
    AppError, AuthError, ConfigError, NetworkError, ReqwestErrorExt, StorageError, WeatherError,
};
pub use preferences::Preferences;
pub use storage::{FileStore, KeyValueStore, MemoryStore};

use anyhow::Result;

/// Initialize logging for the application
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Skyboard core initialized");
    Ok(())
}
