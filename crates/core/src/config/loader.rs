use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration with environment variable overrides.
///
/// The TOML file is optional; a deployment may configure everything through
/// `PANSOU_`-prefixed environment variables, with `__` separating nesting
/// levels (e.g. `PANSOU_SERVER__PORT=9000`,
/// `PANSOU_ASYNC_PLUGIN__ENABLED=false`).
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed("PANSOU_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
