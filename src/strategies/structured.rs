use async_trait::async_trait;
use std::time::Duration;
use yt_transcript_rs::proxies::{GenericProxyConfig, ProxyConfig};
use yt_transcript_rs::YouTubeTranscriptApi;

use super::{EgressPolicy, StrategyError, StrategyKind, TranscriptStrategy};
use crate::transcript::parser::clean_text;
use crate::transcript::{has_text, TranscriptSegment};
use crate::InsightsError;

/// Source of ready-made transcripts, one language at a time
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    async fn fetch_transcript(
        &self,
        video_id: &str,
        language: &str,
    ) -> Result<Vec<TranscriptSegment>, StrategyError>;
}

/// Strategy backed by a [`TranscriptProvider`]
pub struct StructuredStrategy<P> {
    provider: P,
}

impl<P: TranscriptProvider> StructuredStrategy<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<P: TranscriptProvider> TranscriptStrategy for StructuredStrategy<P> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Structured
    }

    async fn attempt(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, StrategyError> {
        let mut last_error = None;

        for language in languages {
            match self.provider.fetch_transcript(video_id, language).await {
                Ok(segments) if has_text(&segments) => return Ok(segments),
                Ok(_) => tracing::debug!("Empty {} transcript for {}", language, video_id),
                Err(e) => {
                    tracing::debug!("Fetching {} transcript for {} failed: {}", language, video_id, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StrategyError::NoTranscript(languages.to_vec())))
    }
}

/// Transcripts through the `yt-transcript-rs` client
pub struct YtTranscriptProvider {
    api: YouTubeTranscriptApi,
    timeout: Duration,
}

impl YtTranscriptProvider {
    pub fn new(egress: &EgressPolicy, timeout: Duration) -> crate::Result<Self> {
        let proxy = match egress.proxy_url() {
            Some(url) => {
                let config = GenericProxyConfig::new(Some(url.to_string()), Some(url.to_string()))
                    .map_err(|_| InsightsError::InvalidProxy(url.to_string()))?;
                Some(Box::new(config) as Box<dyn ProxyConfig + Send + Sync>)
            }
            None => None,
        };

        let api = YouTubeTranscriptApi::new(None, proxy, None)
            .map_err(|e| anyhow::anyhow!("Failed to initialise transcript client: {}", e))?;

        Ok(Self { api, timeout })
    }
}

#[async_trait]
impl TranscriptProvider for YtTranscriptProvider {
    async fn fetch_transcript(
        &self,
        video_id: &str,
        language: &str,
    ) -> Result<Vec<TranscriptSegment>, StrategyError> {
        let fetched = tokio::time::timeout(
            self.timeout,
            self.api.fetch_transcript(video_id, &[language], false),
        )
        .await
        .map_err(|_| StrategyError::Timeout(self.timeout))?
        .map_err(|e| StrategyError::Request(e.to_string()))?;

        Ok(fetched
            .parts()
            .iter()
            .map(|part| TranscriptSegment::new(part.start, clean_text(&part.text)))
            .filter(|segment| !segment.text.is_empty())
            .collect())
    }
}
