//! Configuration management for the Alita relay

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::telegram::{DEFAULT_API_URL, RetryPolicy};
use crate::generation::{DEFAULT_BASE_URL, GenerationParams, SafetyThreshold};
use crate::orchestrator::Fallbacks;
use crate::{Error, Result};

pub use file::{AlitaConfigFile, config_file_path, load_config_file};

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default bound on one generation round trip
const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 120;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: SecretString,

    /// Bot API server root
    pub telegram_api_url: String,

    /// Backoff for replies that fail transiently
    pub telegram_retry: RetryPolicy,

    /// Google Generative Language API key
    pub google_api_key: SecretString,

    /// Gemini model identifier
    pub model: String,

    /// Gemini API root
    pub gemini_base_url: String,

    /// Persona instruction sent with every request
    pub system_prompt: String,

    /// Root for transcripts and saved media
    pub data_dir: PathBuf,

    pub generation: GenerationParams,

    pub generation_timeout: Duration,

    pub fallbacks: Fallbacks,
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if a required secret or the persona is missing, or a
    /// value fails to parse
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(config_path)?;
        Self::from_sources(fc, |name| std::env::var(name).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a required secret or the persona is missing, or a
    /// value fails to parse
    pub fn from_sources(
        fc: AlitaConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let telegram_token = env("TELEGRAM_BOT_TOKEN")
            .or(fc.telegram.token)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("TELEGRAM_BOT_TOKEN is not set".to_string()))?;

        let telegram_api_url = env("ALITA_TELEGRAM_API_URL")
            .or(fc.telegram.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let mut telegram_retry = RetryPolicy::default();
        if let Some(retries) = env("ALITA_TELEGRAM_SEND_RETRIES")
            .map(|v| parse_value::<u32>("ALITA_TELEGRAM_SEND_RETRIES", &v))
            .transpose()?
            .or(fc.telegram.send_retries)
        {
            telegram_retry.max_retries = retries;
        }

        let google_api_key = env("GOOGLE_API_KEY")
            .or(fc.gemini.api_key)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("GOOGLE_API_KEY is not set".to_string()))?;

        let model = env("ALITA_MODEL")
            .or(fc.gemini.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let gemini_base_url = env("ALITA_GEMINI_BASE_URL")
            .or(fc.gemini.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let system_prompt = Self::resolve_system_prompt(
            env("ALITA_SYSTEM_PROMPT").or(fc.persona.system_prompt),
            env("ALITA_SYSTEM_PROMPT_FILE")
                .map(PathBuf::from)
                .or(fc.persona.system_prompt_file),
        )?;

        let data_dir = env("ALITA_DATA_DIR")
            .map(PathBuf::from)
            .or(fc.storage.data_dir)
            .unwrap_or_else(default_data_dir);

        let mut generation = GenerationParams::default();
        if let Some(temperature) = env("ALITA_TEMPERATURE")
            .map(|v| parse_value::<f32>("ALITA_TEMPERATURE", &v))
            .transpose()?
            .or(fc.gemini.temperature)
        {
            generation.temperature = temperature;
        }
        if let Some(threshold) = env("ALITA_SAFETY_THRESHOLD").or(fc.gemini.safety_threshold) {
            generation.safety_threshold = threshold.parse::<SafetyThreshold>()?;
        }

        let timeout_secs = env("ALITA_GENERATION_TIMEOUT_SECS")
            .map(|v| parse_value::<u64>("ALITA_GENERATION_TIMEOUT_SECS", &v))
            .transpose()?
            .or(fc.gemini.timeout_secs)
            .unwrap_or(DEFAULT_GENERATION_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(Error::Config(
                "generation timeout must be at least one second".to_string(),
            ));
        }

        let defaults = Fallbacks::default();
        let fallbacks = Fallbacks {
            text: fc.persona.fallback_text.unwrap_or(defaults.text),
            image: fc.persona.fallback_image.unwrap_or(defaults.image),
            document: fc.persona.fallback_document.unwrap_or(defaults.document),
        };

        Ok(Self {
            telegram_token: SecretString::from(telegram_token),
            telegram_api_url,
            telegram_retry,
            google_api_key: SecretString::from(google_api_key),
            model,
            gemini_base_url,
            system_prompt,
            data_dir,
            generation,
            generation_timeout: Duration::from_secs(timeout_secs),
            fallbacks,
        })
    }

    /// Directory holding one JSONL transcript per user
    #[must_use]
    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("chat_history")
    }

    /// Directory holding saved inbound media
    #[must_use]
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media_files")
    }

    /// Inline prompt wins over a prompt file
    fn resolve_system_prompt(inline: Option<String>, path: Option<PathBuf>) -> Result<String> {
        let prompt = match (inline, path) {
            (Some(prompt), _) => prompt,
            (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!(
                    "failed to read system prompt from {}: {e}",
                    path.display()
                ))
            })?,
            (None, None) => {
                return Err(Error::Config(
                    "no system prompt: set ALITA_SYSTEM_PROMPT or ALITA_SYSTEM_PROMPT_FILE"
                        .to_string(),
                ));
            }
        };

        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::Config("system prompt is empty".to_string()));
        }
        Ok(prompt.to_string())
    }
}

/// Default data directory (`~/.local/share/alita` on Linux)
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "alita")
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().to_path_buf())
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid {name}={value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("TELEGRAM_BOT_TOKEN", "123:abc"),
        ("GOOGLE_API_KEY", "key"),
        ("ALITA_SYSTEM_PROMPT", "You are Alita."),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(AlitaConfigFile::default(), env_of(&REQUIRED)).unwrap();

        assert_eq!(config.telegram_token.expose_secret(), "123:abc");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.gemini_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.system_prompt, "You are Alita.");
        assert_eq!(config.generation, GenerationParams::default());
        assert_eq!(
            config.generation_timeout,
            Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS)
        );
        assert_eq!(config.fallbacks, Fallbacks::default());
        assert_eq!(config.telegram_api_url, DEFAULT_API_URL);
        assert_eq!(
            config.telegram_retry.max_retries,
            RetryPolicy::default().max_retries
        );
    }

    #[test]
    fn test_telegram_settings() {
        let fc: AlitaConfigFile = toml::from_str(
            r#"
            [telegram]
            api_url = "http://localhost:8081"
            send_retries = 5
            "#,
        )
        .unwrap();

        let config = Config::from_sources(fc, env_of(&REQUIRED)).unwrap();
        assert_eq!(config.telegram_api_url, "http://localhost:8081");
        assert_eq!(config.telegram_retry.max_retries, 5);

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALITA_TELEGRAM_SEND_RETRIES", "0"));
        let config = Config::from_sources(AlitaConfigFile::default(), env_of(&pairs)).unwrap();
        assert_eq!(config.telegram_retry.max_retries, 0);

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALITA_TELEGRAM_SEND_RETRIES", "-1"));
        assert!(Config::from_sources(AlitaConfigFile::default(), env_of(&pairs)).is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let fc: AlitaConfigFile = toml::from_str(
            r#"
            [gemini]
            model = "from-file"
            temperature = 0.5

            [storage]
            data_dir = "/from/file"
            "#,
        )
        .unwrap();

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALITA_MODEL", "from-env"));
        let config = Config::from_sources(fc, env_of(&pairs)).unwrap();

        assert_eq!(config.model, "from-env");
        assert!((config.generation.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.history_dir(), PathBuf::from("/from/file/chat_history"));
        assert_eq!(config.media_dir(), PathBuf::from("/from/file/media_files"));
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let result = Config::from_sources(
            AlitaConfigFile::default(),
            env_of(&[("GOOGLE_API_KEY", "key"), ("ALITA_SYSTEM_PROMPT", "p")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persona.txt");
        std::fs::write(&path, "  You are Alita.\n").unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config = Config::from_sources(
            AlitaConfigFile::default(),
            env_of(&[
                ("TELEGRAM_BOT_TOKEN", "t"),
                ("GOOGLE_API_KEY", "k"),
                ("ALITA_SYSTEM_PROMPT_FILE", &path_str),
            ]),
        )
        .unwrap();

        assert_eq!(config.system_prompt, "You are Alita.");
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALITA_TEMPERATURE", "hot"));
        assert!(Config::from_sources(AlitaConfigFile::default(), env_of(&pairs)).is_err());

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALITA_GENERATION_TIMEOUT_SECS", "0"));
        assert!(Config::from_sources(AlitaConfigFile::default(), env_of(&pairs)).is_err());
    }

    #[test]
    fn test_safety_threshold_override() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("ALITA_SAFETY_THRESHOLD", "block_only_high"));
        let config = Config::from_sources(AlitaConfigFile::default(), env_of(&pairs)).unwrap();
        assert_eq!(
            config.generation.safety_threshold,
            SafetyThreshold::BlockOnlyHigh
        );
    }
}
