//! YouTube Insights - a small HTTP service and CLI around YouTube metadata and transcripts
//!
//! This library exposes video/channel metadata, comments and transcripts as JSON.
//! Transcripts are resolved through an ordered chain of acquisition strategies,
//! and video listings can be narrowed by duration ("shorts") and subscriber filters.

pub mod cli;
pub mod config;
pub mod filters;
pub mod output;
pub mod provider;
pub mod server;
pub mod strategies;
pub mod transcript;
pub mod utils;
pub mod videos;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use filters::FilterCriteria;
pub use provider::{MetadataProvider, ProviderError, VideoRef};
pub use strategies::{StrategyKind, TranscriptStrategy};
pub use transcript::{TranscriptPipeline, TranscriptResult, TranscriptSegment};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the service plumbing
#[derive(thiserror::Error, Debug)]
pub enum InsightsError {
    #[error("Unsupported video reference: {0}")]
    UnsupportedVideoRef(String),

    #[error("Missing YouTube API key (set youtube.api_key, YOUTUBE_API_KEY or --api-key)")]
    MissingApiKey,

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("File operation failed: {0}")]
    FileError(String),
}
