mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{ClientSettings, LogSettings, Settings};

/// Environment prefix, e.g. `MQTTCONN__CLIENT__KEEP_ALIVE_SECS=10`.
pub const ENV_PREFIX: &str = "MQTTCONN";

/// Loads the configuration from `config/default` and the environment,
/// merged over `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
