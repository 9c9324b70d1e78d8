// Configuration management module
// TOML settings file plus the interactive setup used by the `config` command

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ApiConfig, Config, ConfigError, EmbeddingConfig, GenerationConfig, PathsConfig,
    RetrievalConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
