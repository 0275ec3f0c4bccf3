use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{
    ChannelInfo, Comment, MetadataProvider, Page, ProviderError, VideoDetails, VideoDuration,
    VideoRef,
};
use crate::config::YoutubeConfig;
use crate::InsightsError;

/// YouTube Data API v3 client
pub struct YoutubeDataClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl YoutubeDataClient {
    pub fn new(config: &YoutubeConfig) -> crate::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(InsightsError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self::with_client(client, &config.base_url, api_key))
    }

    pub fn with_client(client: Client, base_url: &str, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// GET `<base>/<resource>` with the API key attached
    async fn get<T: DeserializeOwned>(
        &self,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base_url, resource);
        tracing::debug!("Data API request: {} {:?}", resource, query);

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = api_error_detail(&body);
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(ProviderError::NotFound(detail));
            }
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Transport(format!("unreadable {} response: {}", resource, e)))
    }
}

/// Pull `error.message` (and the first reason) out of a Google API error body
fn api_error_detail(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let reason = parsed
                .error
                .errors
                .first()
                .and_then(|e| e.reason.clone());
            match reason {
                Some(reason) => format!("{} ({})", parsed.error.message, reason),
                None => parsed.error.message,
            }
        }
        Err(_) => body.chars().take(300).collect(),
    }
}

fn parse_count(value: Option<String>) -> Option<u64> {
    value.and_then(|v| v.parse().ok())
}

#[async_trait]
impl MetadataProvider for YoutubeDataClient {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        published_after: Option<DateTime<Utc>>,
    ) -> Result<Vec<VideoRef>, ProviderError> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("q", query.to_string()),
            ("type", "video".to_string()),
            ("order", "date".to_string()),
            ("maxResults", max_results.to_string()),
        ];
        if let Some(after) = published_after {
            params.push((
                "publishedAfter",
                after.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ));
        }

        let response: ListResponse<SearchItem> = self.get("search", &params).await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let id = item.id.video_id?;
                Some(VideoRef::new(
                    id,
                    item.snippet.title,
                    item.snippet.published_at,
                    item.snippet.channel_id,
                    item.snippet.channel_title,
                ))
            })
            .collect())
    }

    async fn video_durations(&self, ids: &[String]) -> Result<Vec<VideoDuration>, ProviderError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let params = [("part", "contentDetails".to_string()), ("id", ids.join(","))];
        let response: ListResponse<VideoItem> = self.get("videos", &params).await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let duration = item.content_details?.duration?;
                Some(VideoDuration {
                    id: item.id,
                    duration,
                })
            })
            .collect())
    }

    async fn video_details(&self, video_id: &str) -> Result<VideoDetails, ProviderError> {
        let params = [
            ("part", "snippet,contentDetails,statistics".to_string()),
            ("id", video_id.to_string()),
        ];
        let response: ListResponse<VideoItem> = self.get("videos", &params).await?;

        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("video {}", video_id)))?;
        let snippet = item
            .snippet
            .ok_or_else(|| ProviderError::Transport("video response without snippet".to_string()))?;
        let statistics = item.statistics.unwrap_or_default();

        Ok(VideoDetails {
            id: item.id,
            title: snippet.title,
            description: snippet.description,
            published_at: snippet.published_at,
            channel_id: snippet.channel_id,
            channel_title: snippet.channel_title,
            view_count: parse_count(statistics.view_count),
            like_count: parse_count(statistics.like_count),
            dislike_count: parse_count(statistics.dislike_count),
            comment_count: parse_count(statistics.comment_count),
            duration: item.content_details.and_then(|c| c.duration),
        })
    }

    async fn channel(&self, channel_id: &str) -> Result<ChannelInfo, ProviderError> {
        let params = [
            ("part", "contentDetails,statistics".to_string()),
            ("id", channel_id.to_string()),
        ];
        let response: ListResponse<ChannelItem> = self.get("channels", &params).await?;

        let item = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound(format!("channel {}", channel_id)))?;

        let subscriber_count = item
            .statistics
            .filter(|s| !s.hidden_subscriber_count)
            .and_then(|s| parse_count(s.subscriber_count));

        Ok(ChannelInfo {
            id: item.id,
            uploads_playlist_id: item
                .content_details
                .and_then(|c| c.related_playlists.uploads),
            subscriber_count,
        })
    }

    async fn channel_id_for_handle(&self, handle: &str) -> Result<String, ProviderError> {
        let params = [("part", "id".to_string()), ("forHandle", handle.to_string())];
        let response: ListResponse<ChannelItem> = self.get("channels", &params).await?;

        response
            .items
            .into_iter()
            .next()
            .map(|item| item.id)
            .ok_or_else(|| ProviderError::NotFound(format!("channel handle @{}", handle)))
    }

    async fn playlist_items(
        &self,
        playlist_id: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<Page<VideoRef>, ProviderError> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: ListResponse<PlaylistItem> = self.get("playlistItems", &params).await?;

        let items = response
            .items
            .into_iter()
            .map(|item| {
                let snippet = item.snippet;
                VideoRef::new(
                    snippet.resource_id.video_id,
                    snippet.title,
                    snippet.published_at,
                    snippet.video_owner_channel_id.unwrap_or(snippet.channel_id),
                    snippet
                        .video_owner_channel_title
                        .unwrap_or(snippet.channel_title),
                )
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }

    async fn comment_threads(
        &self,
        video_id: &str,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<Page<Comment>, ProviderError> {
        let mut params = vec![
            ("part", "snippet".to_string()),
            ("videoId", video_id.to_string()),
            ("maxResults", page_size.to_string()),
            ("order", "time".to_string()),
            ("textFormat", "plainText".to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response: ListResponse<CommentThread> = self.get("commentThreads", &params).await?;

        let items = response
            .items
            .into_iter()
            .map(|thread| {
                let c = thread.snippet.top_level_comment.snippet;
                Comment {
                    author: c.author_display_name,
                    text: c.text_display,
                    like_count: c.like_count,
                    published_at: c.published_at,
                    updated_at: c.updated_at,
                }
            })
            .collect();

        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }
}

// Wire types for the subset of the Data API we read.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    published_at: DateTime<Utc>,
    channel_id: String,
    #[serde(default)]
    channel_title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItem {
    id: SearchId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    id: String,
    snippet: Option<Snippet>,
    statistics: Option<VideoStatistics>,
    content_details: Option<VideoContentDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    dislike_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    id: String,
    content_details: Option<ChannelContentDetails>,
    statistics: Option<ChannelStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelStatistics {
    subscriber_count: Option<String>,
    #[serde(default)]
    hidden_subscriber_count: bool,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    snippet: PlaylistSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistSnippet {
    title: String,
    published_at: DateTime<Utc>,
    channel_id: String,
    #[serde(default)]
    channel_title: String,
    resource_id: ResourceId,
    video_owner_channel_id: Option<String>,
    video_owner_channel_title: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThread {
    snippet: CommentThreadSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentThreadSnippet {
    top_level_comment: TopLevelComment,
}

#[derive(Debug, Deserialize)]
struct TopLevelComment {
    snippet: CommentSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentSnippet {
    author_display_name: String,
    text_display: String,
    #[serde(default)]
    like_count: u64,
    published_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorInner,
}

#[derive(Debug, Deserialize)]
struct ApiErrorInner {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorReason {
    reason: Option<String>,
}
