use echospeak_core::ResponseModality;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub voice: String,
    pub response_modality: ResponseModality,
    pub handshake_timeout: Duration,
    pub setup_timeout: Duration,
    pub prompts_path: Option<PathBuf>,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = match std::env::var("BIND_ADDRESS") {
            Ok(address) => address,
            Err(_) => match std::env::var("PORT") {
                Ok(port) => format!("0.0.0.0:{}", port),
                Err(_) => "0.0.0.0:8000".to_string(),
            },
        };
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let gemini_api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let gemini_model = std::env::var("GEMINI_MODEL")
            .unwrap_or_else(|_| gemini_realtime::client::DEFAULT_MODEL.to_string());
        let voice = std::env::var("GEMINI_VOICE")
            .unwrap_or_else(|_| echospeak_core::scenario::DEFAULT_VOICE.to_string());

        let response_modality = match std::env::var("RESPONSE_MODALITY") {
            Ok(value) => value
                .parse::<ResponseModality>()
                .map_err(|e| ConfigError::InvalidValue("RESPONSE_MODALITY".to_string(), e))?,
            Err(_) => ResponseModality::default(),
        };

        let handshake_timeout = seconds_var("HANDSHAKE_TIMEOUT_SECS", 10)?;
        let setup_timeout = seconds_var("SETUP_TIMEOUT_SECS", 10)?;

        let prompts_path = std::env::var("PROMPTS_PATH").ok().map(PathBuf::from);

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_model,
            voice,
            response_modality,
            handshake_timeout,
            setup_timeout,
            prompts_path,
            log_level,
        })
    }

    pub fn gemini_configured(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}

fn seconds_var(name: &str, default: u64) -> Result<Duration, ConfigError> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(Duration::from_secs(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a positive number of seconds", raw),
        )),
    }
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
            env::remove_var("PORT");
            env::remove_var("GEMINI_API_KEY");
            env::remove_var("GEMINI_MODEL");
            env::remove_var("GEMINI_VOICE");
            env::remove_var("RESPONSE_MODALITY");
            env::remove_var("HANDSHAKE_TIMEOUT_SECS");
            env::remove_var("SETUP_TIMEOUT_SECS");
            env::remove_var("PROMPTS_PATH");
            env::remove_var("RUST_LOG");
        }
    }

    #[test]
    fn test_config_error_display() {
        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.gemini_api_key, None);
        assert!(!config.gemini_configured());
        assert_eq!(config.gemini_model, "models/gemini-2.0-flash-exp");
        assert_eq!(config.voice, "Puck");
        assert_eq!(config.response_modality, ResponseModality::Audio);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
        assert_eq!(config.setup_timeout, Duration::from_secs(10));
        assert_eq!(config.prompts_path, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("PORT", "9999");
            env::set_var("GEMINI_API_KEY", "test-gemini-key");
            env::set_var("GEMINI_MODEL", "models/gemini-live-2.5-flash");
            env::set_var("GEMINI_VOICE", "Kore");
            env::set_var("RESPONSE_MODALITY", "TEXT");
            env::set_var("HANDSHAKE_TIMEOUT_SECS", "3");
            env::set_var("SETUP_TIMEOUT_SECS", "20");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
            env::set_var("RUST_LOG", "debug");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.gemini_api_key, Some("test-gemini-key".to_string()));
        assert!(config.gemini_configured());
        assert_eq!(config.gemini_model, "models/gemini-live-2.5-flash");
        assert_eq!(config.voice, "Kore");
        assert_eq!(config.response_modality, ResponseModality::Text);
        assert_eq!(config.handshake_timeout, Duration::from_secs(3));
        assert_eq!(config.setup_timeout, Duration::from_secs(20));
        assert_eq!(config.prompts_path, Some(PathBuf::from("/custom/prompts")));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    #[serial]
    fn test_config_port_fallback() {
        clear_env_vars();
        unsafe {
            env::set_var("PORT", "10000");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:10000");
    }

    #[test]
    #[serial]
    fn test_config_blank_api_key_is_unset() {
        clear_env_vars();
        unsafe {
            env::set_var("GEMINI_API_KEY", "  ");
        }

        let config = Config::from_env().expect("Config should load successfully");
        assert!(!config.gemini_configured());
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "BIND_ADDRESS");
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let ConfigError::InvalidValue(var, _) = Config::from_env().unwrap_err();
        assert_eq!(var, "RUST_LOG");
    }

    #[test]
    #[serial]
    fn test_config_invalid_modality_and_timeouts() {
        for (var, value) in [
            ("RESPONSE_MODALITY", "video"),
            ("HANDSHAKE_TIMEOUT_SECS", "soon"),
            ("SETUP_TIMEOUT_SECS", "0"),
        ] {
            clear_env_vars();
            unsafe {
                env::set_var(var, value);
            }

            let ConfigError::InvalidValue(name, _) = Config::from_env().unwrap_err();
            assert_eq!(name, var);
        }
        clear_env_vars();
    }
}
