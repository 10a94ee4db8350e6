use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

use crate::highlight::MatcherOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ai: AiConfig,
    pub reader: ReaderConfig,
    pub logging: LoggingConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// When unset the service keeps documents in memory only.
    pub postgres_url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout_seconds: u64,
}

/// Multimodal model endpoint used for OCR, highlight extraction and chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub api_url: String,
    pub api_key: String,
    pub ocr_model: String,
    pub chat_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Literal used inside page markers, e.g. `===== Page 3 =====`.
    pub page_label: String,
    pub max_upload_bytes: u64,
    pub allowed_file_types: Vec<String>,
    /// Upper bound on the characters of document text sent as chat context.
    pub max_context_chars: usize,
    pub matcher: MatcherOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub metrics_enabled: bool,
    pub prometheus_namespace: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                File::with_name(&format!(
                    "config/{}",
                    env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into())
                ))
                .required(false),
            )
            // Add local config (gitignored)
            .add_source(File::with_name("config/local").required(false))
            // Environment variables with STUDYLENS prefix, e.g. STUDYLENS__AI__API_KEY
            .add_source(
                Environment::with_prefix("STUDYLENS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("reader.allowed_file_types")
                    .try_parsing(true),
            );

        config.build()?.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_size: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            max_connections: 10,
            connection_timeout_seconds: 30,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            ocr_model: "gpt-4o".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            max_tokens: 8192,
            temperature: 0.1,
            timeout_seconds: 180,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            page_label: "Page".to_string(),
            max_upload_bytes: 25 * 1024 * 1024, // 25MB
            allowed_file_types: ["pdf", "png", "jpg", "jpeg", "webp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_context_chars: 60_000,
            matcher: MatcherOptions::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            prometheus_namespace: "studylens".to_string(),
        }
    }
}
