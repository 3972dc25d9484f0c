//! Generation of a default configuration file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use shared::config::ClientConfig;

/// Serialization format for a generated configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

impl ConfigFormat {
    const fn default_file_name(self) -> &'static str {
        match self {
            Self::Yaml => "config.yaml",
            Self::Json => "config.json",
            Self::Toml => "config.toml",
        }
    }

    fn render(self, config: &ClientConfig) -> Result<String> {
        Ok(match self {
            Self::Yaml => serde_yml::to_string(config)?,
            Self::Json => serde_json::to_string_pretty(config)?,
            Self::Toml => toml::to_string_pretty(config)?,
        })
    }
}

/// Generates a configuration file holding the default settings.
///
/// # Arguments
/// * `format` - The format of the configuration file.
/// * `output` - Destination path; `config.<format>` in the current directory if absent.
///
/// # Errors
/// Returns an error if serialization or writing the file fails.
pub fn generate_config(format: ConfigFormat, output: Option<&Path>) -> Result<()> {
    let config = ClientConfig::with_defaults();
    let path = output.map_or_else(
        || PathBuf::from(format.default_file_name()),
        Path::to_path_buf,
    );

    let serialized = format.render(&config)?;
    fs::write(&path, serialized)
        .with_context(|| format!("failed to write configuration file {}", path.display()))?;

    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(())
}
