use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{
    BinanceConfig, Config, ExecutionConfig, FeedConfig, LighterConfig, RiskConfig, TradingConfig,
    VenuesConfig,
};

/// Loads the application configuration from the `config.toml` file.
///
/// Reads the configuration file, deserializes it into the strongly-typed
/// `Config` struct, and returns it. Environment variables prefixed with
/// `FUNDARB_` override file values (e.g. `FUNDARB_TRADING__LEVERAGE=5`).
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("config.toml")
}

/// Loads configuration from an explicit path; used by tests and tooling.
pub fn load_config_from(path: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(
            config::Environment::with_prefix("FUNDARB")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    Ok(config)
}
