use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_NPI_API_BASE_URL, DEFAULT_NPI_API_VERSION, DEFAULT_NPI_TIMEOUT_SECS,
    DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Settings shared by every subcommand. Each flag falls back to an
/// environment variable (a `.env` file is loaded first).
#[derive(clap::Args, Debug, Clone)]
pub struct SettingsArgs {
    /// DuckDB database file holding the source and destination tables.
    #[arg(long, env = "DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Reasoning service access key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Reasoning service base URL (OpenAI-compatible chat completions).
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    pub openai_model: String,

    /// Optional request timeout for reasoning calls. Client defaults apply when unset.
    #[arg(long, env = "OPENAI_TIMEOUT_SECS")]
    pub openai_timeout_secs: Option<u64>,

    /// NPI registry API base URL.
    #[arg(long, env = "NPPES_API_BASE_URL", default_value = DEFAULT_NPI_API_BASE_URL)]
    pub nppes_base_url: String,

    /// NPI registry API version query parameter.
    #[arg(long, env = "NPPES_API_VERSION", default_value = DEFAULT_NPI_API_VERSION)]
    pub nppes_version: String,

    #[arg(long, env = "NPPES_TIMEOUT_SECS", default_value_t = DEFAULT_NPI_TIMEOUT_SECS)]
    pub nppes_timeout_secs: u64,

    /// Comma-separated table names callers may target. Empty allows any valid identifier.
    #[arg(long, env = "ALLOWED_TABLES", value_delimiter = ',')]
    pub allowed_tables: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: PathBuf,
    pub openai: OpenAiSettings,
    pub nppes: NppesSettings,
    pub allowed_tables: Vec<String>,
}

#[derive(Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Option<Duration>,
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct NppesSettings {
    pub base_url: String,
    pub version: String,
    pub timeout: Duration,
}

impl Settings {
    pub fn from_args(args: &SettingsArgs) -> Result<Self, ConfigError> {
        let db_path = args
            .db_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::Missing("DB_PATH"))?;

        let api_key = args
            .openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?
            .to_string();

        let openai_timeout = match args.openai_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "OPENAI_TIMEOUT_SECS",
                    reason: "must be greater than zero".to_string(),
                });
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };
        if args.nppes_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "NPPES_TIMEOUT_SECS",
                reason: "must be greater than zero".to_string(),
            });
        }
        if args.openai_model.trim().is_empty() {
            return Err(ConfigError::Missing("OPENAI_MODEL"));
        }
        if args.nppes_version.trim().is_empty() {
            return Err(ConfigError::Missing("NPPES_API_VERSION"));
        }

        Ok(Self {
            db_path,
            openai: OpenAiSettings {
                api_key,
                base_url: http_url("OPENAI_BASE_URL", &args.openai_base_url)?,
                model: args.openai_model.trim().to_string(),
                timeout: openai_timeout,
            },
            nppes: NppesSettings {
                base_url: http_url("NPPES_API_BASE_URL", &args.nppes_base_url)?,
                version: args.nppes_version.trim().to_string(),
                timeout: Duration::from_secs(args.nppes_timeout_secs),
            },
            allowed_tables: args
                .allowed_tables
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        })
    }
}

fn http_url(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(value.to_string())
    } else {
        Err(ConfigError::Invalid {
            name,
            reason: format!("expected an http(s) URL, got {value:?}"),
        })
    }
}

#[cfg(test)]
pub(crate) fn test_args() -> SettingsArgs {
    SettingsArgs {
        db_path: Some(PathBuf::from("providers.duckdb")),
        openai_api_key: Some("sk-test".to_string()),
        openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        openai_model: DEFAULT_OPENAI_MODEL.to_string(),
        openai_timeout_secs: None,
        nppes_base_url: DEFAULT_NPI_API_BASE_URL.to_string(),
        nppes_version: DEFAULT_NPI_API_VERSION.to_string(),
        nppes_timeout_secs: DEFAULT_NPI_TIMEOUT_SECS,
        allowed_tables: Vec::new(),
    }
}
