//! Configuration loading and startup validation
//!
//! Settings resolve in priority order:
//! 1. Command-line overrides (applied by the binary after loading)
//! 2. Environment variables
//! 3. TOML config file (explicit `--config` path or the per-user default)
//! 4. Compiled defaults
//!
//! The resolved [`Settings`] value is constructed once at startup and handed to
//! each component; there is no global settings singleton.

use crate::{Error, Result};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Length in bytes of the symmetric audio encryption key
pub const ENCRYPTION_KEY_LEN: usize = 32;

/// Default maximum accepted audio upload (10 MiB)
pub const DEFAULT_MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;

/// URL-safe base64 that accepts keys with or without trailing padding
pub const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Optional bootstrap file, keys mirror the environment variable names in lowercase
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub mock_mode: Option<bool>,
    pub speech_key: Option<String>,
    pub speech_region: Option<String>,
    pub speech_language: Option<String>,
    pub blob_connection_string: Option<String>,
    pub blob_container_name: Option<String>,
    pub mock_blob_dir: Option<PathBuf>,
    pub encryption_key: Option<String>,
    pub secret_key: Option<String>,
    pub cors_origins: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_audio_bytes: Option<usize>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Clone)]
pub struct Settings {
    pub project_name: String,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Selects the in-process scorer and local blob store instead of the live providers
    pub mock_mode: bool,
    pub speech_key: Option<String>,
    pub speech_region: String,
    pub speech_language: String,
    pub blob_connection_string: Option<String>,
    pub blob_container_name: String,
    pub mock_blob_dir: PathBuf,
    pub encryption_key: String,
    pub secret_key: String,
    pub cors_origins: Vec<String>,
    pub host: String,
    pub port: u16,
    pub max_audio_bytes: usize,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: "PronIELTS API".to_string(),
            database_url: "sqlite://pronielts.db?mode=rwc".to_string(),
            database_max_connections: 10,
            mock_mode: true,
            speech_key: None,
            speech_region: "brazilsouth".to_string(),
            speech_language: "en-US".to_string(),
            blob_connection_string: None,
            blob_container_name: "audio-recordings".to_string(),
            mock_blob_dir: PathBuf::from("./mock_blob_storage"),
            encryption_key: String::new(),
            secret_key: String::new(),
            cors_origins: parse_origins(
                "http://localhost:3000,http://localhost:5173,http://localhost:5174",
            ),
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            log_level: "info".to_string(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("project_name", &self.project_name)
            .field("database_url", &self.redacted_database_url())
            .field("mock_mode", &self.mock_mode)
            .field("speech_key", &self.speech_key.as_ref().map(|_| "<set>"))
            .field("speech_region", &self.speech_region)
            .field("blob_connection_string", &self.blob_connection_string.as_ref().map(|_| "<set>"))
            .field("blob_container_name", &self.blob_container_name)
            .field("mock_blob_dir", &self.mock_blob_dir)
            .field("encryption_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("max_audio_bytes", &self.max_audio_bytes)
            .finish()
    }
}

impl Settings {
    /// Load settings from the process environment layered over an optional TOML file
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let toml_config = load_toml_config(config_path)?;
        Self::resolve(toml_config, |key| std::env::var(key).ok())
    }

    /// Resolve settings from a TOML layer and an environment lookup
    ///
    /// Environment values win over TOML values, which win over compiled defaults.
    pub fn resolve<F>(toml_config: Option<TomlConfig>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let toml_config = toml_config.unwrap_or_default();
        let defaults = Settings::default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let mock_mode = match env("MOCK_MODE") {
            Some(raw) => parse_bool("MOCK_MODE", &raw)?,
            None => toml_config.mock_mode.unwrap_or(defaults.mock_mode),
        };
        let port = match env("PORT") {
            Some(raw) => parse_number::<u16>("PORT", &raw)?,
            None => toml_config.port.unwrap_or(defaults.port),
        };
        let max_audio_bytes = match env("MAX_AUDIO_BYTES") {
            Some(raw) => parse_number::<usize>("MAX_AUDIO_BYTES", &raw)?,
            None => toml_config.max_audio_bytes.unwrap_or(defaults.max_audio_bytes),
        };
        let database_max_connections = match env("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse_number::<u32>("DATABASE_MAX_CONNECTIONS", &raw)?,
            None => toml_config
                .database_max_connections
                .unwrap_or(defaults.database_max_connections),
        };
        let cors_origins = env("CORS_ORIGINS")
            .or(toml_config.cors_origins)
            .map(|raw| parse_origins(&raw))
            .unwrap_or(defaults.cors_origins);

        Ok(Self {
            project_name: defaults.project_name,
            database_url: env("DATABASE_URL")
                .or(toml_config.database_url)
                .unwrap_or(defaults.database_url),
            database_max_connections,
            mock_mode,
            speech_key: env("SPEECH_KEY").or(toml_config.speech_key),
            speech_region: env("SPEECH_REGION")
                .or(toml_config.speech_region)
                .unwrap_or(defaults.speech_region),
            speech_language: env("SPEECH_LANGUAGE")
                .or(toml_config.speech_language)
                .unwrap_or(defaults.speech_language),
            blob_connection_string: env("BLOB_CONNECTION_STRING")
                .or(toml_config.blob_connection_string),
            blob_container_name: env("BLOB_CONTAINER_NAME")
                .or(toml_config.blob_container_name)
                .unwrap_or(defaults.blob_container_name),
            mock_blob_dir: env("MOCK_BLOB_DIR")
                .map(PathBuf::from)
                .or(toml_config.mock_blob_dir)
                .unwrap_or(defaults.mock_blob_dir),
            encryption_key: env("ENCRYPTION_KEY")
                .or(toml_config.encryption_key)
                .unwrap_or_default(),
            secret_key: env("SECRET_KEY")
                .or(toml_config.secret_key)
                .unwrap_or_default(),
            cors_origins,
            host: env("HOST").or(toml_config.host).unwrap_or(defaults.host),
            port,
            max_audio_bytes,
            log_level: env("LOG_LEVEL")
                .or(toml_config.logging.level)
                .unwrap_or(defaults.log_level),
        })
    }

    /// Startup validation; any error here is fatal and the service must not bind
    pub fn validate(&self) -> Result<()> {
        if self.encryption_key.trim().is_empty() {
            return Err(Error::Config("ENCRYPTION_KEY is required".to_string()));
        }
        decode_encryption_key(&self.encryption_key)?;

        if self.secret_key.trim().is_empty() {
            return Err(Error::Config("SECRET_KEY is required".to_string()));
        }

        if self.max_audio_bytes == 0 {
            return Err(Error::Config("MAX_AUDIO_BYTES must be greater than zero".to_string()));
        }

        if !self.mock_mode {
            if self.speech_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(Error::Config(
                    "SPEECH_KEY is required when MOCK_MODE=false".to_string(),
                ));
            }
            if self
                .blob_connection_string
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
            {
                return Err(Error::Config(
                    "BLOB_CONNECTION_STRING is required when MOCK_MODE=false".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Database URL with any `user:password@` portion hidden, for logging
    pub fn redacted_database_url(&self) -> String {
        match self.database_url.rsplit_once('@') {
            Some((prefix, host)) => {
                let scheme = prefix.split("://").next().unwrap_or("db");
                format!("{}://***@{}", scheme, host)
            }
            None => self.database_url.clone(),
        }
    }

    /// Socket address string the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Decode the configured audio encryption key into raw key bytes
pub fn decode_encryption_key(key: &str) -> Result<[u8; ENCRYPTION_KEY_LEN]> {
    let bytes = KEY_ENGINE.decode(key.trim().as_bytes()).map_err(|e| {
        Error::Config(format!("ENCRYPTION_KEY is not valid URL-safe base64: {}", e))
    })?;

    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::Config(format!(
            "ENCRYPTION_KEY must decode to {} bytes, got {}",
            ENCRYPTION_KEY_LEN,
            bytes.len()
        ))
    })
}

/// Per-user default TOML location (`~/.config/pronielts/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pronielts").join("config.toml"))
}

/// Load the TOML bootstrap file
///
/// An explicit path that does not exist is an error. A missing default file is
/// not: the service runs on environment variables and compiled defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<Option<TomlConfig>> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => return Ok(None),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    match toml::from_str::<TomlConfig>(&content) {
        Ok(config) => {
            info!("Loaded config file: {}", path.display());
            Ok(Some(config))
        }
        Err(e) => {
            warn!("Failed to parse config file {}: {}", path.display(), e);
            Err(Error::Config(format!("Parse TOML failed: {}", e)))
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{} must be a boolean, got '{}'", key, other))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", key, raw)))
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
