/// TOML configuration and the configuration manager.
pub mod toml_config;
