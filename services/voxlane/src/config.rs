use secrecy::SecretString;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use voxlane_core::{
    EngineConfig, audio::pcm::SERVICE_OUTPUT_SAMPLE_RATE, config::DEFAULT_ENDPOINT,
    config::DEFAULT_MODEL,
};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub endpoint: String,
    pub model: String,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub auto_response: bool,
    pub chunk_ms: u64,
    pub target_sample_rate: u32,
    pub log_filter: String,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let endpoint =
            std::env::var("REALTIME_URL").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
        if !endpoint.starts_with("ws://") && !endpoint.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "REALTIME_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", endpoint),
            ));
        }

        let model = std::env::var("REALTIME_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let voice = std::env::var("REALTIME_VOICE").ok();
        let instructions = std::env::var("REALTIME_INSTRUCTIONS").ok();

        let auto_response = match std::env::var("AUTO_RESPONSE") {
            Ok(value) => parse_bool(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "AUTO_RESPONSE".to_string(),
                    format!("'{}' is not a boolean", value),
                )
            })?,
            Err(_) => false,
        };

        let chunk_ms = parse_number("CHUNK_MS", 250u64)?;
        if chunk_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "CHUNK_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let target_sample_rate = parse_number("TARGET_SAMPLE_RATE", SERVICE_OUTPUT_SAMPLE_RATE)?;
        // The session declares pcm16 in both directions, which is 24 kHz.
        if target_sample_rate != SERVICE_OUTPUT_SAMPLE_RATE {
            return Err(ConfigError::InvalidValue(
                "TARGET_SAMPLE_RATE".to_string(),
                format!(
                    "pcm16 sessions carry {} Hz audio, got {}",
                    SERVICE_OUTPUT_SAMPLE_RATE, target_sample_rate
                ),
            ));
        }

        let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(&log_filter).map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log filter", log_filter),
            )
        })?;

        Ok(Self {
            api_key,
            endpoint,
            model,
            voice,
            instructions,
            auto_response,
            chunk_ms,
            target_sample_rate,
            log_filter,
        })
    }

    /// Builds the engine configuration, keeping engine defaults for anything
    /// the environment does not set.
    pub fn engine_config(&self) -> EngineConfig {
        let mut engine = EngineConfig::new(self.api_key.clone());
        engine.endpoint = self.endpoint.clone();
        engine.model = self.model.clone();
        if let Some(voice) = &self.voice {
            engine.voice = voice.clone();
        }
        engine.instructions = self.instructions.clone();
        engine.auto_response = self.auto_response;
        engine.chunk_duration = Duration::from_millis(self.chunk_ms);
        engine.target_sample_rate = self.target_sample_rate;
        engine
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(var.to_string(), format!("'{}' is not a number", value))
        }),
        Err(_) => Ok(default),
    }
}
