use serde::{Deserialize, Serialize};

use crate::config::TranscriptConfig;
use crate::strategies::{self, StrategyError, StrategyKind, TranscriptStrategy};

pub mod parser;

/// One caption cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start offset in seconds
    pub start_seconds: f64,

    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            start_seconds,
            text: text.into(),
        }
    }

    /// `[<start>] <text>`
    pub fn render_line(&self) -> String {
        format!("[{}] {}", format_start(self.start_seconds), self.text)
    }
}

/// Seconds rendered as a float literal: `1.5`, `0.0`, `12.0`
pub fn format_start(seconds: f64) -> String {
    format!("{:?}", seconds)
}

/// True when at least one cue carries non-whitespace text
pub fn has_text(segments: &[TranscriptSegment]) -> bool {
    segments.iter().any(|s| !s.text.trim().is_empty())
}

/// Outcome of resolving one video's transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub video_id: String,

    /// `None` when every strategy came up empty
    pub segments: Option<Vec<TranscriptSegment>>,

    pub source_strategy: Option<StrategyKind>,

    /// Last underlying failure, kept for diagnostics
    pub error: Option<String>,
}

impl TranscriptResult {
    pub fn found(video_id: &str, segments: Vec<TranscriptSegment>, source: StrategyKind) -> Self {
        Self {
            video_id: video_id.to_string(),
            segments: Some(segments),
            source_strategy: Some(source),
            error: None,
        }
    }

    pub fn unavailable(video_id: &str, error: impl Into<String>) -> Self {
        Self {
            video_id: video_id.to_string(),
            segments: None,
            source_strategy: None,
            error: Some(error.into()),
        }
    }

    pub fn is_found(&self) -> bool {
        self.segments.is_some()
    }

    /// One `[<start>] <text>` line per cue
    pub fn render_text(&self) -> Option<String> {
        self.segments.as_ref().map(|segments| {
            segments
                .iter()
                .map(|s| format!("{}\n", s.render_line()))
                .collect()
        })
    }
}

/// Ordered transcript strategies, tried one after another
pub struct TranscriptPipeline {
    strategies: Vec<Box<dyn TranscriptStrategy>>,
    languages: Vec<String>,
}

impl TranscriptPipeline {
    pub fn new(strategies: Vec<Box<dyn TranscriptStrategy>>, languages: Vec<String>) -> Self {
        Self {
            strategies,
            languages,
        }
    }

    /// Build the default strategy chain from configuration
    pub fn from_config(config: &TranscriptConfig) -> crate::Result<Self> {
        let strategies = strategies::default_chain(config)?;
        Ok(Self::new(strategies, config.languages.clone()))
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn strategy_kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Resolve with the configured language preferences
    pub async fn resolve(&self, video_id: &str) -> TranscriptResult {
        self.resolve_with(video_id, &self.languages).await
    }

    /// Try each strategy in turn; the first non-blank transcript wins
    pub async fn resolve_with(&self, video_id: &str, languages: &[String]) -> TranscriptResult {
        let mut last_error: Option<String> = None;

        for strategy in &self.strategies {
            let kind = strategy.kind();
            tracing::debug!("Trying {} transcript strategy for {}", kind, video_id);

            match strategy.attempt(video_id, languages).await {
                Ok(segments) if has_text(&segments) => {
                    tracing::info!(
                        "Transcript for {} resolved via {} ({} cues)",
                        video_id,
                        kind,
                        segments.len()
                    );
                    return TranscriptResult::found(video_id, segments, kind);
                }
                Ok(_) => {
                    tracing::warn!("{} strategy returned an empty transcript for {}", kind, video_id);
                    last_error = Some(format!("{}: empty transcript", kind));
                }
                Err(StrategyError::Unavailable(reason)) => {
                    tracing::debug!("Skipping {} strategy: {}", kind, reason);
                    if last_error.is_none() {
                        last_error = Some(format!("{}: {}", kind, reason));
                    }
                }
                Err(e) => {
                    tracing::warn!("{} strategy failed for {}: {}", kind, video_id, e);
                    last_error = Some(format!("{}: {}", kind, e));
                }
            }
        }

        tracing::info!("No transcript available for {}", video_id);
        TranscriptResult::unavailable(
            video_id,
            last_error.unwrap_or_else(|| "no transcript strategies configured".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone)]
    enum Outcome {
        Cues(Vec<TranscriptSegment>),
        Blank,
        Fail,
        Missing,
    }

    struct CountingStrategy {
        kind: StrategyKind,
        outcome: Outcome,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TranscriptStrategy for CountingStrategy {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn attempt(
            &self,
            _video_id: &str,
            languages: &[String],
        ) -> Result<Vec<TranscriptSegment>, StrategyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Outcome::Cues(cues) => Ok(cues.clone()),
                Outcome::Blank => Ok(vec![TranscriptSegment::new(0.0, "   ")]),
                Outcome::Fail => Err(StrategyError::NoTranscript(languages.to_vec())),
                Outcome::Missing => Err(StrategyError::Unavailable("yt-dlp not found".to_string())),
            }
        }
    }

    fn chain(outcomes: &[(StrategyKind, Outcome)]) -> (TranscriptPipeline, Vec<Arc<AtomicUsize>>) {
        let mut counters = Vec::new();
        let mut strategies: Vec<Box<dyn TranscriptStrategy>> = Vec::new();
        for (kind, outcome) in outcomes {
            let calls = Arc::new(AtomicUsize::new(0));
            counters.push(calls.clone());
            strategies.push(Box::new(CountingStrategy {
                kind: *kind,
                outcome: outcome.clone(),
                calls,
            }));
        }
        (
            TranscriptPipeline::new(strategies, vec!["en".to_string()]),
            counters,
        )
    }

    fn calls(counters: &[Arc<AtomicUsize>]) -> Vec<usize> {
        counters.iter().map(|c| c.load(Ordering::SeqCst)).collect()
    }

    #[tokio::test]
    async fn test_first_success_skips_later_strategies() {
        let (pipeline, counters) = chain(&[
            (StrategyKind::Structured, Outcome::Fail),
            (
                StrategyKind::RawTimedtext,
                Outcome::Cues(vec![TranscriptSegment::new(1.5, "hello")]),
            ),
            (StrategyKind::SessionTimedtext, Outcome::Cues(vec![])),
            (StrategyKind::Downloader, Outcome::Fail),
        ]);

        let result = pipeline.resolve("vid").await;

        assert_eq!(result.source_strategy, Some(StrategyKind::RawTimedtext));
        assert_eq!(result.segments.as_ref().map(Vec::len), Some(1));
        assert!(result.error.is_none());
        assert_eq!(calls(&counters), vec![1, 1, 0, 0]);
    }

    #[tokio::test]
    async fn test_primary_success_invokes_nothing_else() {
        let (pipeline, counters) = chain(&[
            (
                StrategyKind::Structured,
                Outcome::Cues(vec![TranscriptSegment::new(0.0, "hi")]),
            ),
            (StrategyKind::RawTimedtext, Outcome::Fail),
        ]);

        let result = pipeline.resolve("vid").await;

        assert!(result.is_found());
        assert_eq!(calls(&counters), vec![1, 0]);
    }

    #[tokio::test]
    async fn test_blank_transcript_falls_through() {
        let (pipeline, counters) = chain(&[
            (StrategyKind::Structured, Outcome::Blank),
            (
                StrategyKind::Downloader,
                Outcome::Cues(vec![TranscriptSegment::new(2.0, "real text")]),
            ),
        ]);

        let result = pipeline.resolve("vid").await;

        assert_eq!(result.source_strategy, Some(StrategyKind::Downloader));
        assert_eq!(calls(&counters), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_all_strategies_exhausted_returns_absent_result() {
        let (pipeline, counters) = chain(&[
            (StrategyKind::Structured, Outcome::Fail),
            (StrategyKind::RawTimedtext, Outcome::Blank),
            (StrategyKind::SessionTimedtext, Outcome::Cues(vec![])),
            (StrategyKind::Downloader, Outcome::Fail),
        ]);

        let result = pipeline.resolve("vid").await;

        assert!(!result.is_found());
        assert!(result.source_strategy.is_none());
        assert!(result.render_text().is_none());
        let error = result.error.unwrap();
        assert!(error.starts_with("downloader:"), "unexpected diagnostic: {}", error);
        assert_eq!(calls(&counters), vec![1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_missing_transport_keeps_earlier_diagnostic() {
        let (pipeline, _) = chain(&[
            (StrategyKind::Structured, Outcome::Fail),
            (StrategyKind::Downloader, Outcome::Missing),
        ]);

        let result = pipeline.resolve("vid").await;

        assert!(result.error.unwrap().starts_with("structured:"));
    }

    #[tokio::test]
    async fn test_empty_chain_is_unavailable() {
        let pipeline = TranscriptPipeline::new(Vec::new(), vec!["en".to_string()]);
        let result = pipeline.resolve("vid").await;
        assert_eq!(
            result.error.as_deref(),
            Some("no transcript strategies configured")
        );
    }

    #[test]
    fn test_timestamp_rendering_is_unit_consistent() {
        use parser::{parse_cues, CueFormat};

        let from_downloader = parse_cues(r#"<body><p t="1500" d="900">hello</p></body>"#, CueFormat::Srv3);
        let from_structured = TranscriptSegment::new(1.5, "hello");

        assert_eq!(from_downloader.segments[0].render_line(), "[1.5] hello");
        assert_eq!(from_structured.render_line(), "[1.5] hello");
    }

    #[test]
    fn test_render_text_lines() {
        let result = TranscriptResult::found(
            "vid",
            vec![
                TranscriptSegment::new(0.0, "first"),
                TranscriptSegment::new(12.0, "second"),
            ],
            StrategyKind::Structured,
        );
        assert_eq!(result.render_text().unwrap(), "[0.0] first\n[12.0] second\n");
    }
}
