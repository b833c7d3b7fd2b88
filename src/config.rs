//! Configuration types, loaded from environment variables.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::mailbox::MailboxConfig;

const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://localhost:3000"];

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    /// `None` when `EMAIL_USER` / `EMAIL_PASSWORD` are not set.
    pub mailbox: Option<MailboxConfig>,
    pub server: ServerConfig,
    pub knowledge_dir: PathBuf,
    /// Daily rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match get("LLM_BACKEND") {
            Some(value) => LlmBackend::parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: "LLM_BACKEND".to_string(),
                message: format!("unknown backend {value:?} (expected groq or openai)"),
            })?,
            None => LlmBackend::Groq,
        };
        let api_key = get(backend.api_key_var())
            .ok_or_else(|| ConfigError::MissingEnvVar(backend.api_key_var().to_string()))?;
        let model = get("SUPPORT_DESK_MODEL").unwrap_or_else(|| backend.default_model().to_string());
        let timeout = Duration::from_secs(parse_or(&get, "SUPPORT_DESK_LLM_TIMEOUT_SECS", 30u64)?);

        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model,
            base_url: get("SUPPORT_DESK_LLM_BASE_URL"),
            timeout,
        };

        let mailbox = match (get("EMAIL_USER"), get("EMAIL_PASSWORD")) {
            (Some(user), Some(password)) => {
                let host = get("EMAIL_HOST").unwrap_or_else(|| "imap.gmail.com".to_string());
                let mut config = MailboxConfig::new(host, user, SecretString::from(password));
                config.port = parse_or(&get, "EMAIL_IMAP_PORT", 993u16)?;
                Some(config)
            }
            _ => None,
        };

        let cors_origins = match get("SUPPORT_DESK_CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };

        let server = ServerConfig {
            bind: parse_or(&get, "SUPPORT_DESK_BIND", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or(&get, "SUPPORT_DESK_PORT", 3000u16)?,
            cors_origins,
        };

        Ok(Self {
            llm,
            mailbox,
            server,
            knowledge_dir: get("SUPPORT_DESK_KNOWLEDGE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./knowledge")),
            log_dir: get("SUPPORT_DESK_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
