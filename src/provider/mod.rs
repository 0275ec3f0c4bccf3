use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod youtube;

pub use youtube::YoutubeDataClient;

/// Largest page the Data API hands out for list calls
pub const MAX_PAGE_SIZE: u32 = 50;

/// Largest page the Data API hands out for comment threads
pub const MAX_COMMENT_PAGE_SIZE: u32 = 100;

/// Errors surfaced by a metadata provider
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// The video, channel or playlist does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider rejected the request (quota exhausted, bad key, disabled comments)
    #[error("Upstream rejected request (HTTP {status}): {detail}")]
    Upstream { status: u16, detail: String },

    /// Timeout, connection error or an unreadable response body
    #[error("Transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// A single video as returned by search or playlist listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub id: String,
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub channel_id: String,
    pub channel_title: String,

    /// Filled in once a duration lookup has run for this video
    pub duration_seconds: Option<u64>,
}

impl VideoRef {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        published_at: DateTime<Utc>,
        channel_id: impl Into<String>,
        channel_title: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            url: watch_url(&id),
            id,
            title: title.into(),
            published_at,
            channel_id: channel_id.into(),
            channel_title: channel_title.into(),
            duration_seconds: None,
        }
    }
}

/// Canonical watch URL for a video id
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// Raw ISO-8601 duration token for a video (`PT4M13S`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDuration {
    pub id: String,
    pub duration: String,
}

/// Snippet, statistics and content details of one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoDetails {
    pub id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub channel_id: String,
    pub channel_title: String,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub dislike_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub duration: Option<String>,
}

/// Channel content details and statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub uploads_playlist_id: Option<String>,

    /// `None` when the channel hides its subscriber count
    pub subscriber_count: Option<u64>,
}

/// A top-level comment on a video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub like_count: u64,
    pub published_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Read-only access to video and channel metadata
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Search videos by free text, newest first
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoRef>, ProviderError>;

    /// Duration tokens for up to [`MAX_PAGE_SIZE`] videos; unknown ids are omitted
    async fn video_durations(&self, ids: &[String]) -> Result<Vec<VideoDuration>, ProviderError>;

    /// Full details of a single video
    async fn video_details(&self, video_id: &str) -> Result<VideoDetails, ProviderError>;

    /// Content details and statistics of a channel
    async fn channel(&self, channel_id: &str) -> Result<ChannelInfo, ProviderError>;

    /// Resolve a channel handle (without the leading `@`) to its id
    async fn channel_id_for_handle(&self, handle: &str) -> Result<String, ProviderError>;

    /// One page of a playlist
    async fn playlist_items(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<Page<VideoRef>, ProviderError>;

    /// One page of top-level comments, newest first
    async fn comment_threads(
        &self,
        video_id: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<Page<Comment>, ProviderError>;
}
