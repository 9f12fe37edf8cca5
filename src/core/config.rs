use crate::core::errors::{ConfigError, ConfigResult};
use crate::core::types::{DEFAULT_PAGES, MAX_PAGES, MIN_PAGES};
use std::env;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Generative API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_keys: Vec<String>,
    pub base_url: String,
    pub script_model: String,
    pub character_image_model: String,
    pub panel_image_model: String,
    /// HTTP client timeout per request, in seconds
    pub request_timeout_secs: u64,
    /// Transport-level retries per remote call (0 = at most once)
    pub max_retries: u32,
}

/// Generation run configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Upper bound for one remote call as seen by the orchestrator, in seconds
    pub call_timeout_secs: u64,
    pub default_page_count: u32,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub generation: GenerationConfig,
}

impl Config {
    pub fn new() -> ConfigResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        // Comma-separated key list, with a single API_KEY as fallback
        let mut api_keys: Vec<String> = env::var("GEMINI_API_KEYS")
            .ok()
            .map(|keys| {
                keys.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if api_keys.is_empty() {
            if let Some(key) = env::var("API_KEY").ok().filter(|k| !k.trim().is_empty()) {
                api_keys.push(key.trim().to_string());
            }
        }

        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| parse_level(&s))
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env_parse("SERVER_PORT", 1420),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            api: ApiConfig {
                api_keys,
                base_url: env::var("API_BASE_URL").unwrap_or_else(|_| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
                script_model: env::var("SCRIPT_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-flash".to_string()),
                character_image_model: env::var("CHARACTER_IMAGE_MODEL")
                    .unwrap_or_else(|_| "imagen-4.0-generate-001".to_string()),
                panel_image_model: env::var("PANEL_IMAGE_MODEL")
                    .unwrap_or_else(|_| "gemini-2.5-flash-image-preview".to_string()),
                request_timeout_secs: env_parse("API_TIMEOUT_SECONDS", 60),
                max_retries: env_parse("MAX_RETRIES", 0),
            },
            generation: GenerationConfig {
                call_timeout_secs: env_parse("CALL_TIMEOUT_SECONDS", 120),
                default_page_count: env_parse("DEFAULT_PAGE_COUNT", DEFAULT_PAGES),
            },
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.api.api_keys.is_empty() {
            return Err(ConfigError::NoApiKeys);
        }

        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidBaseUrl(self.api.base_url.clone()));
        }

        if !(MIN_PAGES..=MAX_PAGES).contains(&self.generation.default_page_count) {
            return Err(ConfigError::InvalidPageCount(
                self.generation.default_page_count,
            ));
        }

        if self.api.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "API_TIMEOUT_SECONDS",
            });
        }
        if self.generation.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "CALL_TIMEOUT_SECONDS",
            });
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    /// `EnvFilter` directive for this crate at the configured level
    pub fn log_filter(&self) -> String {
        let level = self.log_level().as_str().to_lowercase();
        format!("manga_studio={},generate_manga={},tower_http=warn", level, level)
    }

    pub fn api_keys(&self) -> &[String] {
        &self.api.api_keys
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }

    pub fn script_model(&self) -> &str {
        &self.api.script_model
    }

    pub fn character_image_model(&self) -> &str {
        &self.api.character_image_model
    }

    pub fn panel_image_model(&self) -> &str {
        &self.api.panel_image_model
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn max_retries(&self) -> u32 {
        self.api.max_retries
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.generation.call_timeout_secs)
    }

    pub fn default_page_count(&self) -> u32 {
        self.generation.default_page_count
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

// Note: No Default implementation because Config::new() can fail

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server: ServerConfig {
                port: 1420,
                host: "127.0.0.1".to_string(),
                log_level: Level::INFO,
            },
            api: ApiConfig {
                api_keys: vec!["test-key".to_string()],
                base_url: "https://generativelanguage.googleapis.com/v1beta/".to_string(),
                script_model: "gemini-2.5-flash".to_string(),
                character_image_model: "imagen-4.0-generate-001".to_string(),
                panel_image_model: "gemini-2.5-flash-image-preview".to_string(),
                request_timeout_secs: 60,
                max_retries: 0,
            },
            generation: GenerationConfig {
                call_timeout_secs: 120,
                default_page_count: 2,
            },
        }
    }

    #[test]
    fn test_valid_config() {
        let config = sample();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.base_url(),
            "https://generativelanguage.googleapis.com/v1beta"
        );
    }

    #[test]
    fn test_log_filter_uses_level() {
        let mut config = sample();
        config.server.log_level = Level::DEBUG;
        assert!(config.log_filter().starts_with("manga_studio=debug"));
    }

    #[test]
    fn test_rejects_missing_keys() {
        let mut config = sample();
        config.api.api_keys.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoApiKeys)));
    }

    #[test]
    fn test_rejects_out_of_range_page_count() {
        let mut config = sample();
        config.generation.default_page_count = 6;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPageCount(6))
        ));
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = sample();
        config.generation.call_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout { name: "CALL_TIMEOUT_SECONDS" })
        ));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(parse_level("WARNING"), Some(Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }
}
