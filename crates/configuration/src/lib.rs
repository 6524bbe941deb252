use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{
    BrokerConfig, BrokerMode, Config, ConfluenceParams, DatabaseSettings, EngineSettings, LoggingSettings,
    RetrySettings, RiskSettings, SignalSettings, SimulatedSettings,
};
pub use telemetry::init_tracing;

/// Environment variables override file values, e.g. `BULLION_BROKER__API_KEY`.
pub const ENV_PREFIX: &str = "BULLION";

/// Loads the application configuration from `config.toml` in the working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Loads, overlays environment overrides, and validates the configuration.
///
/// A missing file is not an error: every section has defaults, so the
/// environment alone can configure a deployment.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

/// Reads a standalone TOML document, such as a strategy definition, into `T`.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let value = config::Config::builder()
        .add_source(config::File::from(path).required(true))
        .build()?
        .try_deserialize::<T>()?;
    Ok(value)
}
