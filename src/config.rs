/// Configuration management for Tailnet Auth
use crate::error::{TailnetError, TailnetResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_HEADER_PREFIX: &str = "X-Tailscale-";
pub const DEFAULT_CACHE_FILE: &str = "tailscale_devices.json";
pub const DEFAULT_API_URL: &str = "https://api.tailscale.com";

/// How the resolver answers a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupMode {
    /// Hold the whole directory in memory, refresh it on a miss
    Cached,
    /// One whois query per lookup, nothing kept between requests
    Direct,
}

impl std::str::FromStr for LookupMode {
    type Err = TailnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cached" | "bulk" => Ok(LookupMode::Cached),
            "direct" | "whois" => Ok(LookupMode::Direct),
            other => Err(TailnetError::Config(format!("Unknown lookup mode: {}", other))),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailnetConfig {
    pub directory: DirectoryConfig,
    pub headers: HeaderConfig,
    pub server: ServerConfig,
}

/// Remote directory and snapshot settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Tailscale API key for authentication
    pub api_key: String,
    /// Tailnet name (e.g. "example.com")
    pub tailnet: String,
    pub api_base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Path of the persisted device snapshot
    pub cache_file: PathBuf,
    pub mode: LookupMode,
}

/// Header annotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    /// Prefix prepended to every identity header
    pub prefix: String,
}

/// Listener settings for the bundled server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub hostname: String,
    pub port: u16,
}

impl TailnetConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> TailnetResult<Self> {
        dotenv::dotenv().ok();

        let api_key = env::var("TAILSCALE_API_KEY").unwrap_or_default();
        let tailnet = env::var("TAILSCALE_TAILNET").unwrap_or_default();

        let api_base_url =
            env::var("TAILSCALE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let user_agent = env::var("TAILSCALE_USER_AGENT")
            .unwrap_or_else(|_| format!("Tailnet-Auth/{}", env!("CARGO_PKG_VERSION")));
        let http_timeout_secs = env::var("TAILSCALE_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .trim()
            .parse()
            .map_err(|_| TailnetError::Config("Invalid HTTP timeout".to_string()))?;
        let cache_file = env::var("TAILSCALE_CACHE_FILE")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE));
        let mode = env::var("TAILSCALE_LOOKUP_MODE")
            .unwrap_or_else(|_| "cached".to_string())
            .parse()?;

        // A bare or empty prefix falls back to the default
        let prefix = env::var("TAILSCALE_HEADER_PREFIX")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HEADER_PREFIX.to_string());

        let hostname =
            env::var("TAILNET_AUTH_HOSTNAME").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("TAILNET_AUTH_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| TailnetError::Config("Invalid port number".to_string()))?;

        let config = TailnetConfig {
            directory: DirectoryConfig {
                api_key,
                tailnet,
                api_base_url,
                user_agent,
                http_timeout_secs,
                cache_file,
                mode,
            },
            headers: HeaderConfig { prefix },
            server: ServerConfig { hostname, port },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> TailnetResult<()> {
        if self.directory.tailnet.trim().is_empty() {
            return Err(TailnetError::Config("tailnet is required".to_string()));
        }

        if self.directory.api_key.trim().is_empty() {
            return Err(TailnetError::Config("api_key is required".to_string()));
        }

        if self.directory.http_timeout_secs == 0 {
            return Err(TailnetError::Config(
                "HTTP timeout must be at least one second".to_string(),
            ));
        }

        if self.headers.prefix.is_empty() {
            return Err(TailnetError::Config(
                "header prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Build a config for the given credentials with every optional field defaulted
    pub fn new(api_key: impl Into<String>, tailnet: impl Into<String>) -> Self {
        Self {
            directory: DirectoryConfig {
                api_key: api_key.into(),
                tailnet: tailnet.into(),
                api_base_url: DEFAULT_API_URL.to_string(),
                user_agent: format!("Tailnet-Auth/{}", env!("CARGO_PKG_VERSION")),
                http_timeout_secs: 10,
                cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
                mode: LookupMode::Cached,
            },
            headers: HeaderConfig {
                prefix: DEFAULT_HEADER_PREFIX.to_string(),
            },
            server: ServerConfig {
                hostname: "127.0.0.1".to_string(),
                port: 8080,
            },
        }
    }
}
