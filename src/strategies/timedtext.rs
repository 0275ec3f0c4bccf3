use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::Client;
use std::time::Duration;

use super::{EgressPolicy, StrategyError, StrategyKind, TranscriptStrategy};
use crate::provider::watch_url;
use crate::transcript::parser::{parse_cues, CueFormat};
use crate::transcript::TranscriptSegment;

const TIMEDTEXT_URL: &str = "https://www.youtube.com/api/timedtext";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Query variants tried per language: uploaded captions, then speech recognition
fn timedtext_queries<'a>(video_id: &'a str, language: &'a str) -> [Vec<(&'static str, &'a str)>; 2] {
    [
        vec![("lang", language), ("v", video_id)],
        vec![("lang", language), ("v", video_id), ("kind", "asr")],
    ]
}

/// Walk the language list against the timedtext endpoint
///
/// Every failure (status, transport, broken XML) is logged and the next
/// variant is tried; only the last failure is returned.
async fn fetch_timedtext(
    client: &Client,
    base_url: &str,
    kind: StrategyKind,
    video_id: &str,
    languages: &[String],
) -> Result<Vec<TranscriptSegment>, StrategyError> {
    let mut last_error = None;

    for language in languages {
        for query in timedtext_queries(video_id, language) {
            let body = match get_body(client, base_url, &query).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!("{} request for {} ({}) failed: {}", kind, video_id, language, e);
                    last_error = Some(e);
                    continue;
                }
            };

            if body.trim().is_empty() {
                continue;
            }

            let parsed = parse_cues(&body, CueFormat::Timedtext);
            if parsed.has_text() {
                if let Some(error) = &parsed.error {
                    tracing::debug!("Keeping partial {} captions for {}: {}", language, video_id, error);
                }
                return Ok(parsed.segments);
            }
            if let Some(error) = parsed.error {
                last_error = Some(StrategyError::Malformed(error));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| StrategyError::NoTranscript(languages.to_vec())))
}

async fn get_body(client: &Client, base_url: &str, query: &[(&str, &str)]) -> Result<String, StrategyError> {
    let body = client
        .get(base_url)
        .query(query)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(body)
}

/// Plain request against the raw caption endpoint
pub struct RawTimedtextStrategy {
    client: Client,
    base_url: String,
}

impl RawTimedtextStrategy {
    pub fn new(egress: &EgressPolicy, timeout: Duration) -> crate::Result<Self> {
        let builder = Client::builder().timeout(timeout);
        let client = egress.apply(builder)?.build()?;
        Ok(Self {
            client,
            base_url: TIMEDTEXT_URL.to_string(),
        })
    }

    /// Point the strategy at another caption endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TranscriptStrategy for RawTimedtextStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RawTimedtext
    }

    async fn attempt(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, StrategyError> {
        fetch_timedtext(&self.client, &self.base_url, self.kind(), video_id, languages).await
    }
}

/// Caption endpoint through a cookie-holding session that looks like a browser
pub struct SessionTimedtextStrategy {
    client: Client,
    base_url: String,
}

impl SessionTimedtextStrategy {
    pub fn new(egress: &EgressPolicy, timeout: Duration) -> crate::Result<Self> {
        let builder = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(browser_headers());
        let client = egress.apply(builder)?.build()?;
        Ok(Self {
            client,
            base_url: TIMEDTEXT_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Visit the watch page so the session picks up consent and visitor cookies
    async fn prime_session(&self, video_id: &str) {
        match self.client.get(watch_url(video_id)).send().await {
            Ok(response) => tracing::debug!("Session primed for {} (HTTP {})", video_id, response.status()),
            Err(e) => tracing::debug!("Priming session for {} failed: {}", video_id, e),
        }
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(REFERER, HeaderValue::from_static("https://www.youtube.com/"));
    headers
}

#[async_trait]
impl TranscriptStrategy for SessionTimedtextStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SessionTimedtext
    }

    async fn attempt(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, StrategyError> {
        self.prime_session(video_id).await;
        fetch_timedtext(&self.client, &self.base_url, self.kind(), video_id, languages).await
    }
}
