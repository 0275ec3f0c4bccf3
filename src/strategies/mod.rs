use async_trait::async_trait;
use reqwest::{ClientBuilder, Proxy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod downloader;
pub mod structured;
pub mod timedtext;

use crate::config::TranscriptConfig;
use crate::transcript::TranscriptSegment;
use crate::InsightsError;

/// Which transport produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Structured,
    RawTimedtext,
    SessionTimedtext,
    Downloader,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Structured => "structured",
            StrategyKind::RawTimedtext => "raw_timedtext",
            StrategyKind::SessionTimedtext => "session_timedtext",
            StrategyKind::Downloader => "downloader",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single strategy produced nothing
#[derive(thiserror::Error, Debug)]
pub enum StrategyError {
    #[error("transport not available: {0}")]
    Unavailable(String),

    #[error("video unavailable: {0}")]
    VideoUnavailable(String),

    #[error("captions are disabled for this video")]
    CaptionsDisabled,

    #[error("no transcript for languages {0:?}")]
    NoTranscript(Vec<String>),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed captions: {0}")]
    Malformed(String),

    #[error("downloader failed: {0}")]
    Process(String),
}

impl From<reqwest::Error> for StrategyError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => StrategyError::Status(status.as_u16()),
            None => StrategyError::Request(err.to_string()),
        }
    }
}

/// One transport-specific way of getting captions for a video
#[async_trait]
pub trait TranscriptStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Try each language in order and return the first non-empty cue list
    async fn attempt(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, StrategyError>;
}

/// Where outbound caption traffic goes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EgressPolicy {
    proxy_url: Option<String>,
}

impl EgressPolicy {
    pub fn direct() -> Self {
        Self { proxy_url: None }
    }

    pub fn via_proxy(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: Some(proxy_url.into()),
        }
    }

    pub fn from_config(config: &TranscriptConfig) -> Self {
        match &config.proxy_url {
            Some(url) => Self::via_proxy(url.clone()),
            None => Self::direct(),
        }
    }

    pub fn proxy_url(&self) -> Option<&str> {
        self.proxy_url.as_deref()
    }

    /// Route a client builder through the proxy, if any
    pub fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, InsightsError> {
        match &self.proxy_url {
            Some(url) => {
                let proxy = Proxy::all(url).map_err(|_| InsightsError::InvalidProxy(url.clone()))?;
                Ok(builder.proxy(proxy))
            }
            None => Ok(builder),
        }
    }
}

/// Build the strategy chain in priority order
pub fn default_chain(config: &TranscriptConfig) -> crate::Result<Vec<Box<dyn TranscriptStrategy>>> {
    let egress = EgressPolicy::from_config(config);
    let timeouts = &config.timeouts;

    let provider = structured::YtTranscriptProvider::new(
        &egress,
        Duration::from_secs(timeouts.structured_secs),
    )?;

    let chain: Vec<Box<dyn TranscriptStrategy>> = vec![
        Box::new(structured::StructuredStrategy::new(provider)),
        Box::new(timedtext::RawTimedtextStrategy::new(
            &egress,
            Duration::from_secs(timeouts.timedtext_secs),
        )?),
        Box::new(timedtext::SessionTimedtextStrategy::new(
            &egress,
            Duration::from_secs(timeouts.session_secs),
        )?),
        Box::new(downloader::DownloaderStrategy::new(
            config.downloader_path.clone(),
            Duration::from_secs(timeouts.downloader_secs),
            &egress,
        )),
    ];

    Ok(chain)
}
