//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Plain environment variables used by deployment setups
//!    (HOST, PORT, GLADIA_API_KEY, MEETING_BOT_API_KEY)
//! 2. Environment variables with the APP_ prefix
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub gladia: GladiaConfig,
    pub meeting: MeetingConfig,
}

/// Listener configuration for the proxy's WebSocket endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio format declared to the transcription provider. Payloads are never
/// decoded here; these values are only forwarded in the session-initiation
/// request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u32,
    pub encoding: String,
}

/// Transcription provider credentials and session options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GladiaConfig {
    pub api_key: String,
    pub api_url: String,
    /// Target languages for the session. Empty means provider auto-detect.
    pub languages: Vec<String>,
    pub code_switching: bool,
}

/// Meeting-bot platform credentials and bot identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingConfig {
    pub api_key: String,
    pub api_url: String,
    pub bot_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                sample_rate: 16000,
                channels: 1,
                encoding: "wav/pcm".to_string(),
            },
            gladia: GladiaConfig {
                api_key: String::new(),
                api_url: "https://api.gladia.io".to_string(),
                languages: Vec::new(),
                code_switching: false,
            },
            meeting: MeetingConfig {
                api_key: String::new(),
                api_url: "https://us-west-2.recall.ai".to_string(),
                bot_name: "Transcription Bot".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Plain environment variables used by deployment platforms and the
        // provider SDK conventions. They take precedence over everything.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(key) = env::var("GLADIA_API_KEY") {
            settings = settings.set_override("gladia.api_key", key)?;
        }

        if let Ok(key) = env::var("MEETING_BOT_API_KEY") {
            settings = settings.set_override("meeting.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense. Catching these at
    /// startup beats failing on the first live audio frame.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.channels == 0 {
            return Err(anyhow::anyhow!("Audio channel count must be greater than 0"));
        }

        if self.gladia.api_url.is_empty() {
            return Err(anyhow::anyhow!("Transcription provider URL cannot be empty"));
        }

        Ok(())
    }

    /// The address the proxy listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
