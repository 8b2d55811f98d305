//! Application Configuration Module
//!
//! Settings for the terminal host, loaded from the environment (and a `.env`
//! file when present). Command-line flags in `main` take precedence.

use avatar_core::{ClipCatalog, SessionConfig};
use secrecy::SecretString;
use std::env;
use std::time::Duration;
use tracing::Level;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub classifier_url: Option<String>,
    pub classifier_token: Option<SecretString>,
    pub clip_base: String,
    pub silence_timeout: Duration,
    pub finalize_delay: Duration,
    pub speech_lang: String,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid millisecond value for {var}: {value}")]
    InvalidDuration { var: String, value: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `AVATAR_CLASSIFIER_URL`: (Optional) Remote intent classifier endpoint. Keywords only when unset.
    // *   `AVATAR_CLASSIFIER_TOKEN`: (Optional) Bearer token for the classifier. Requires the URL.
    // *   `AVATAR_CLIP_BASE`: (Optional) Base locator for clips. Defaults to "/video_files".
    // *   `AVATAR_SILENCE_MS`: (Optional) Silence watchdog delay. Defaults to 9000.
    // *   `AVATAR_FINALIZE_MS`: (Optional) Pause that ends an utterance. Defaults to 1500.
    // *   `AVATAR_SPEECH_LANG`: (Optional) Recognition language. Defaults to "en-US".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SessionConfig::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let classifier_url = non_empty("AVATAR_CLASSIFIER_URL");
        let classifier_token = non_empty("AVATAR_CLASSIFIER_TOKEN").map(SecretString::from);
        if classifier_token.is_some() && classifier_url.is_none() {
            return Err(ConfigError::MissingVar(
                "AVATAR_CLASSIFIER_URL must be set when AVATAR_CLASSIFIER_TOKEN is".to_string(),
            ));
        }

        let clip_base = non_empty("AVATAR_CLIP_BASE")
            .unwrap_or_else(|| ClipCatalog::DEFAULT_BASE.to_string());

        let millis = |var: &str, default: Duration| -> Result<Duration, ConfigError> {
            match non_empty(var) {
                None => Ok(default),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .ok_or(ConfigError::InvalidDuration {
                        var: var.to_string(),
                        value,
                    }),
            }
        };
        let silence_timeout = millis("AVATAR_SILENCE_MS", defaults.silence_timeout)?;
        let finalize_delay = millis("AVATAR_FINALIZE_MS", defaults.finalize_delay)?;

        let speech_lang = non_empty("AVATAR_SPEECH_LANG").unwrap_or(defaults.speech_lang);

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            classifier_url,
            classifier_token,
            clip_base,
            silence_timeout,
            finalize_delay,
            speech_lang,
            log_level,
        })
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            silence_timeout: self.silence_timeout,
            finalize_delay: self.finalize_delay,
            speech_lang: self.speech_lang.clone(),
            ..SessionConfig::default()
        }
    }
}
