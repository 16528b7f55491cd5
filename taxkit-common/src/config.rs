//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// TOML configuration file contents
///
/// All fields optional; anything absent falls back to the next tier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub data_folder: Option<String>,
    pub bind_address: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Folder holding the database and stored upload files
    pub data_folder: PathBuf,
    /// HTTP bind address, e.g. "127.0.0.1:5870"
    pub bind_address: String,
    /// Anthropic API key; None disables analysis (service degrades, never fabricates)
    pub anthropic_api_key: Option<String>,
    /// Model id used for classification and chat turns
    pub anthropic_model: String,
}

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5870";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

impl ServiceConfig {
    /// Resolve configuration with env → TOML file → compiled default priority
    ///
    /// Environment variables:
    /// - `TAXKIT_DATA_FOLDER`
    /// - `TAXKIT_BIND_ADDRESS`
    /// - `ANTHROPIC_API_KEY`
    /// - `TAXKIT_ANTHROPIC_MODEL`
    pub fn resolve() -> Result<Self> {
        let toml_config = load_config_file().unwrap_or_default();

        let data_folder = std::env::var("TAXKIT_DATA_FOLDER")
            .ok()
            .map(PathBuf::from)
            .or_else(|| toml_config.data_folder.as_ref().map(PathBuf::from))
            .unwrap_or_else(default_data_folder);

        let bind_address = std::env::var("TAXKIT_BIND_ADDRESS")
            .ok()
            .or_else(|| toml_config.bind_address.clone())
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .or_else(|| toml_config.anthropic_api_key.clone())
            .filter(|k| is_valid_key(k));
        match &anthropic_api_key {
            Some(_) => tracing::info!("Anthropic API key configured"),
            None => tracing::warn!(
                "Anthropic API key not configured (ANTHROPIC_API_KEY or config file); \
                 analysis will run degraded"
            ),
        }

        let anthropic_model = std::env::var("TAXKIT_ANTHROPIC_MODEL")
            .ok()
            .or_else(|| toml_config.anthropic_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Ok(Self {
            data_folder,
            bind_address,
            anthropic_api_key,
            anthropic_model,
        })
    }

    /// Ensure the data folder exists, creating it if missing
    pub fn ensure_data_folder(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_folder)?;
        std::fs::create_dir_all(self.data_folder.join("files"))?;
        Ok(())
    }

    /// Path of the SQLite database inside the data folder
    pub fn database_path(&self) -> PathBuf {
        self.data_folder.join("taxkit.db")
    }

    /// Folder where uploaded file content is stored, keyed by digest
    pub fn files_folder(&self) -> PathBuf {
        self.data_folder.join("files")
    }
}

/// Validate an API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Locate and parse the TOML config file
///
/// Looks for `$TAXKIT_CONFIG`, then the platform config dir
/// (`~/.config/taxkit/config.toml` on Linux).
fn load_config_file() -> Result<TomlConfig> {
    let path = match std::env::var("TAXKIT_CONFIG") {
        Ok(p) => PathBuf::from(p),
        Err(_) => dirs::config_dir()
            .map(|d| d.join("taxkit").join("config.toml"))
            .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?,
    };

    parse_config_file(&path)
}

fn parse_config_file(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "No config file at {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

fn default_data_folder() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("taxkit"))
        .unwrap_or_else(|| PathBuf::from("./taxkit-data"))
}
