use parley_core::{EngineConfig, llm_client::GenerationConfig, prompt::PromptSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

pub const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Absent key still lets the service start; sessions then fail to open.
    pub gemini_api_key: Option<String>,
    pub model_api_base: String,
    pub chat_model: String,
    pub log_level: Level,
    pub speech_language: String,
    pub max_messages: usize,
    pub silence_timeout: Duration,
    /// `None` when `MODEL_TIMEOUT_SECS` is 0.
    pub model_timeout: Option<Duration>,
    pub topics_path: Option<PathBuf>,
    pub prompts_path: Option<PathBuf>,
    /// Credentials reported by the health endpoint.
    pub health_required_keys: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address = parse_var::<SocketAddr>("BIND_ADDRESS", "0.0.0.0:3000")?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let model_api_base =
            std::env::var("MODEL_API_BASE").unwrap_or_else(|_| GEMINI_OPENAI_BASE.to_string());
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let speech_language =
            std::env::var("SPEECH_LANGUAGE").unwrap_or_else(|_| "ru-RU".to_string());
        if speech_language.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "SPEECH_LANGUAGE".to_string(),
                "language tag must not be empty".to_string(),
            ));
        }

        let max_messages = parse_var::<usize>("MAX_MESSAGES", "20")?;
        if max_messages == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_MESSAGES".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let silence_timeout =
            Duration::from_millis(parse_var::<u64>("SILENCE_TIMEOUT_MS", "2500")?);
        let model_timeout = match parse_var::<u64>("MODEL_TIMEOUT_SECS", "30")? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let topics_path = std::env::var("TOPICS_PATH").ok().map(PathBuf::from);
        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        let health_required_keys = std::env::var("HEALTH_REQUIRED_KEYS")
            .unwrap_or_else(|_| "GEMINI_API_KEY".to_string())
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            bind_address,
            gemini_api_key,
            model_api_base,
            chat_model,
            log_level,
            speech_language,
            max_messages,
            silence_timeout,
            model_timeout,
            topics_path,
            prompts_path,
            health_required_keys,
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))
    }

    /// Engine settings for one connection.
    pub fn engine_config(&self, prompts: PromptSet) -> EngineConfig {
        EngineConfig {
            language: self.speech_language.clone(),
            max_messages: self.max_messages,
            silence_timeout: self.silence_timeout,
            turn_timeout: self.model_timeout,
            generation: GenerationConfig::default(),
            prompts,
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("BIND_ADDRESS");
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("MODEL_API_BASE");
            env::remove_var("CHAT_MODEL");
            env::remove_var("RUST_LOG");
            env::remove_var("SPEECH_LANGUAGE");
            env::remove_var("MAX_MESSAGES");
            env::remove_var("SILENCE_TIMEOUT_MS");
            env::remove_var("MODEL_TIMEOUT_SECS");
            env::remove_var("TOPICS_PATH");
            env::remove_var("PROMPTS_PATH");
            env::remove_var("HEALTH_REQUIRED_KEYS");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_defaults_without_key() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.model_api_base, GEMINI_OPENAI_BASE);
        assert_eq!(config.chat_model, "gemini-2.5-flash");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.speech_language, "ru-RU");
        assert_eq!(config.max_messages, 20);
        assert_eq!(config.silence_timeout, Duration::from_millis(2500));
        assert_eq!(config.model_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.topics_path, None);
        assert_eq!(config.prompts_path, None);
        assert_eq!(config.health_required_keys, vec!["GEMINI_API_KEY"]);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
            env::set_var("MODEL_API_BASE", "http://localhost:11434/v1");
            env::set_var("CHAT_MODEL", "gemini-2.0-flash");
            env::set_var("RUST_LOG", "debug");
            env::set_var("SPEECH_LANGUAGE", "uk-UA");
            env::set_var("MAX_MESSAGES", "8");
            env::set_var("SILENCE_TIMEOUT_MS", "1200");
            env::set_var("MODEL_TIMEOUT_SECS", "0");
            env::set_var("TOPICS_PATH", "/custom/topics.json");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
            env::set_var("HEALTH_REQUIRED_KEYS", "GEMINI_API_KEY, NEXTAUTH_SECRET,");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.gemini_api_key, Some("test-gemini-key".to_string()));
        assert_eq!(config.model_api_base, "http://localhost:11434/v1");
        assert_eq!(config.chat_model, "gemini-2.0-flash");
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.speech_language, "uk-UA");
        assert_eq!(config.max_messages, 8);
        assert_eq!(config.silence_timeout, Duration::from_millis(1200));
        assert_eq!(config.model_timeout, None);
        assert_eq!(config.topics_path, Some(PathBuf::from("/custom/topics.json")));
        assert_eq!(config.prompts_path, Some(PathBuf::from("/custom/prompts")));
        assert_eq!(
            config.health_required_keys,
            vec!["GEMINI_API_KEY", "NEXTAUTH_SECRET"]
        );
    }

    #[test]
    #[serial]
    fn test_blank_api_key_counts_as_missing() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "  ");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.gemini_api_key, None);
        match config.require_api_key().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "GEMINI_API_KEY"),
            _ => panic!("Expected MissingVar for GEMINI_API_KEY"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_zero_message_cap() {
        clear_env_vars();
        unsafe {
            env::set_var("MAX_MESSAGES", "0");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "MAX_MESSAGES"),
            _ => panic!("Expected InvalidValue for MAX_MESSAGES"),
        }
    }

    #[test]
    #[serial]
    fn test_config_rejects_non_numeric_timeout() {
        clear_env_vars();
        unsafe {
            env::set_var("SILENCE_TIMEOUT_MS", "soon");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "SILENCE_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue for SILENCE_TIMEOUT_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_engine_config_follows_env() {
        clear_env_vars();
        unsafe {
            env::set_var("MAX_MESSAGES", "6");
            env::set_var("MODEL_TIMEOUT_SECS", "12");
        }

        let config = Config::from_env().expect("Config should load successfully");
        let engine = config.engine_config(PromptSet::default());
        assert_eq!(engine.language, "ru-RU");
        assert_eq!(engine.max_messages, 6);
        assert_eq!(engine.turn_timeout, Some(Duration::from_secs(12)));
        assert_eq!(engine.silence_timeout, Duration::from_millis(2500));
    }
}
