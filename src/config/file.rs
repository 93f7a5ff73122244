//! TOML configuration file loading
//!
//! Supports `~/.config/alita/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults
//! and environment variables win over it.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlitaConfigFile {
    #[serde(default)]
    pub telegram: TelegramFileConfig,

    /// Generative backend configuration
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    /// Persona prompt and fallback replies
    #[serde(default)]
    pub persona: PersonaFileConfig,

    #[serde(default)]
    pub storage: StorageFileConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramFileConfig {
    pub token: Option<String>,

    /// Bot API server root, for a self-hosted Bot API server
    pub api_url: Option<String>,

    /// Retries for a failed reply (0 disables retrying)
    pub send_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeminiFileConfig {
    pub api_key: Option<String>,

    /// Model identifier (e.g. "gemini-2.0-flash")
    pub model: Option<String>,

    /// API root, for proxies
    pub base_url: Option<String>,

    pub temperature: Option<f32>,

    /// One of `BLOCK_NONE`, `BLOCK_ONLY_HIGH`, `BLOCK_MEDIUM_AND_ABOVE`,
    /// `BLOCK_LOW_AND_ABOVE`
    pub safety_threshold: Option<String>,

    /// Upper bound on one generation round trip
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaFileConfig {
    /// Inline system instruction
    pub system_prompt: Option<String>,

    /// Path to a file holding the system instruction
    pub system_prompt_file: Option<PathBuf>,

    pub fallback_text: Option<String>,
    pub fallback_image: Option<String>,
    pub fallback_document: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageFileConfig {
    /// Root for `chat_history/` and `media_files/`
    pub data_dir: Option<PathBuf>,
}

/// Load the TOML config file
///
/// An explicit `path` must exist and parse. Without one, the standard path is
/// tried and any problem with it falls back to defaults with a warning.
///
/// # Errors
///
/// Returns error if an explicitly given file cannot be read or parsed
pub fn load_config_file(path: Option<&Path>) -> Result<AlitaConfigFile> {
    if let Some(path) = path {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(AlitaConfigFile::default());
    };

    if !path.exists() {
        return Ok(AlitaConfigFile::default());
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                Ok(config)
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                Ok(AlitaConfigFile::default())
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            Ok(AlitaConfigFile::default())
        }
    }
}

/// Return the config file path: `~/.config/alita/config.toml` on Linux
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "alita").map(|d| d.config_dir().join("config.toml"))
}
