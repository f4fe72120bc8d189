mod settings;

use config::{Config, Environment, File};

use crate::utils::BusError;

pub use settings::{
    LoggingSettings, NodeSettings, PartialSettings, RegistrySettings, RequestSettings, Settings,
    StorageSettings,
};

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config/default";

/// Environment prefix; nested keys use `__`, e.g. `SWITCHBOARD__NODE__ID`.
pub const ENV_PREFIX: &str = "SWITCHBOARD";

/// Loads the configuration from the default file and environment variables,
/// fills the gaps with defaults and validates the result.
pub fn load_config() -> Result<Settings, BusError> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Like [`load_config`] with an explicit file (extension optional, file may
/// be absent).
pub fn load_config_from(file: &str) -> Result<Settings, BusError> {
    let config = Config::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let partial: PartialSettings = config.try_deserialize()?;
    let settings = Settings::merge(partial);
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests;
