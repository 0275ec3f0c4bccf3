use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::InsightsError;

/// Environment variable carrying the Data API key
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// Environment variable carrying the egress proxy URL
pub const PROXY_URL_ENV: &str = "YT_PROXY_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// YouTube Data API settings
    pub youtube: YoutubeConfig,

    /// Transcript pipeline settings
    pub transcripts: TranscriptConfig,

    /// Default video filters
    pub filters: FilterConfig,

    /// HTTP server settings
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    /// Data API key
    pub api_key: Option<String>,

    /// Data API base URL
    pub base_url: String,

    /// Timeout for each Data API call
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptConfig {
    /// Caption languages, most preferred first
    pub languages: Vec<String>,

    /// Forward proxy for caption traffic
    pub proxy_url: Option<String>,

    /// Path to the subtitle downloader binary
    pub downloader_path: String,

    /// Per-attempt timeouts, in seconds
    pub timeouts: StrategyTimeouts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyTimeouts {
    pub structured_secs: u64,
    pub timedtext_secs: u64,
    pub session_secs: u64,
    pub downloader_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Videos at or below this length are treated as shorts
    pub min_duration_secs: u64,

    /// Channels below this subscriber count are dropped
    pub min_subscribers: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            youtube: YoutubeConfig {
                api_key: None,
                base_url: "https://www.googleapis.com/youtube/v3".to_string(),
                request_timeout_secs: 15,
            },
            transcripts: TranscriptConfig {
                languages: ["en", "en-US", "en-GB", "en-CA", "en-AU"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                proxy_url: None,
                downloader_path: "yt-dlp".to_string(),
                timeouts: StrategyTimeouts {
                    structured_secs: 15,
                    timedtext_secs: 10,
                    session_secs: 20,
                    downloader_secs: 45,
                },
            },
            filters: FilterConfig {
                min_duration_secs: 60,
                min_subscribers: None,
            },
            server: ServerConfig {
                bind: "0.0.0.0:8000".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file (or defaults) and apply environment overrides
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Self::default()
        };

        config.apply_env();
        config.drop_blank_values();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("youtube-insights").join("config.yaml"))
    }

    fn apply_env(&mut self) {
        if let Some(key) = env_var(API_KEY_ENV) {
            self.youtube.api_key = Some(key);
        }
        if let Some(proxy) = env_var(PROXY_URL_ENV) {
            self.transcripts.proxy_url = Some(proxy);
        }
    }

    /// Validate configuration
    /// Blank optional strings (`api_key: ""`) mean unset
    pub fn drop_blank_values(&mut self) {
        self.youtube.api_key = self.youtube.api_key.take().filter(|v| !v.trim().is_empty());
        self.transcripts.proxy_url = self.transcripts.proxy_url.take().filter(|v| !v.trim().is_empty());
    }

    pub fn validate(&self) -> Result<()> {
        if self.transcripts.languages.is_empty() {
            return Err(InsightsError::ConfigError(
                "transcripts.languages must list at least one language".to_string(),
            )
            .into());
        }

        if let Some(proxy) = &self.transcripts.proxy_url {
            url::Url::parse(proxy).map_err(|_| InsightsError::InvalidProxy(proxy.clone()))?;
        }

        self.bind_addr()?;

        Ok(())
    }

    /// Parsed server listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind.parse().map_err(|_| {
            InsightsError::ConfigError(format!("invalid server.bind address: {}", self.server.bind))
                .into()
        })
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!(
            "  API Key: {}",
            if self.youtube.api_key.is_some() { "set" } else { "not set" }
        );
        println!("  Data API: {}", self.youtube.base_url);
        println!("  Languages: {}", self.transcripts.languages.join(", "));
        if let Some(proxy) = &self.transcripts.proxy_url {
            println!("  Proxy: {}", redact_proxy(proxy));
        }
        println!("  Downloader: {}", self.transcripts.downloader_path);
        println!("  Min Duration: {}s", self.filters.min_duration_secs);
        if let Some(floor) = self.filters.min_subscribers {
            println!("  Min Subscribers: {}", floor);
        }
        println!("  Bind: {}", self.server.bind);
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Hide proxy credentials when echoing configuration
fn redact_proxy(proxy: &str) -> String {
    match url::Url::parse(proxy) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("***");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        _ => proxy.to_string(),
    }
}
