use chrono::{DateTime, Utc};

use crate::filters::{self, FilterCriteria};
use crate::provider::{Comment, MetadataProvider, ProviderError, VideoRef, MAX_COMMENT_PAGE_SIZE, MAX_PAGE_SIZE};

/// How many videos a channel listing should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoLimit {
    All,
    First(usize),
}

impl VideoLimit {
    fn reached(&self, count: usize) -> bool {
        match self {
            VideoLimit::All => false,
            VideoLimit::First(n) => count >= *n,
        }
    }

    fn as_option(&self) -> Option<usize> {
        match self {
            VideoLimit::All => None,
            VideoLimit::First(n) => Some(*n),
        }
    }
}

/// Candidates requested from search so filtering still leaves `top_n` survivors
pub fn overfetch_limit(top_n: usize) -> u32 {
    top_n.saturating_mul(3).min(MAX_PAGE_SIZE as usize) as u32
}

/// Search videos and keep the first `top_n` that pass `criteria`, in upstream order
pub async fn search_videos(
    provider: &dyn MetadataProvider,
    query: &str,
    top_n: usize,
    published_after: Option<DateTime<Utc>>,
    criteria: &FilterCriteria,
) -> Result<Vec<VideoRef>, ProviderError> {
    let max_results = if criteria.is_noop() {
        top_n.min(MAX_PAGE_SIZE as usize) as u32
    } else {
        overfetch_limit(top_n)
    };

    tracing::debug!("Searching {:?} for {} candidates", query, max_results);
    let candidates = provider.search(query, max_results, published_after).await?;
    let candidates = filters::dedup_videos(candidates);

    Ok(filters::apply(provider, candidates, criteria, Some(top_n)).await)
}

/// `UC` followed by 22 url-safe base64 characters
fn is_channel_id(reference: &str) -> bool {
    reference.len() == 24
        && reference.starts_with("UC")
        && reference[2..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Resolve a channel reference (`UC...` id, `@handle` or bare handle) to an id
pub async fn resolve_channel(provider: &dyn MetadataProvider, reference: &str) -> Result<String, ProviderError> {
    let reference = reference.trim();
    if is_channel_id(reference) {
        return Ok(reference.to_string());
    }

    let handle = reference.trim_start_matches('@');
    provider.channel_id_for_handle(handle).await
}

/// Uploads of a channel, newest first, narrowed by `criteria`
pub async fn channel_videos(
    provider: &dyn MetadataProvider,
    channel_id: &str,
    limit: VideoLimit,
    criteria: &FilterCriteria,
) -> Result<Vec<VideoRef>, ProviderError> {
    let channel = provider.channel(channel_id).await?;
    let playlist_id = channel
        .uploads_playlist_id
        .ok_or_else(|| ProviderError::NotFound(format!("uploads playlist of {}", channel_id)))?;

    let mut kept: Vec<VideoRef> = Vec::new();
    let mut page_token = None;

    loop {
        let page = provider
            .playlist_items(&playlist_id, MAX_PAGE_SIZE, page_token.take())
            .await?;
        tracing::debug!("Fetched {} uploads from {}", page.items.len(), playlist_id);

        let remaining = limit.as_option().map(|n| n.saturating_sub(kept.len()));
        let survivors = filters::apply(provider, page.items, criteria, remaining).await;
        kept.extend(survivors);

        if limit.reached(kept.len()) {
            break;
        }
        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    if let Some(n) = limit.as_option() {
        kept.truncate(n);
    }
    Ok(kept)
}

/// Most recent top-level comments of a video, at most `max_results`
pub async fn fetch_comments(
    provider: &dyn MetadataProvider,
    video_id: &str,
    max_results: usize,
) -> Result<Vec<Comment>, ProviderError> {
    let mut comments = Vec::new();
    let mut page_token = None;

    while comments.len() < max_results {
        let remaining = max_results - comments.len();
        let page_size = remaining.min(MAX_COMMENT_PAGE_SIZE as usize) as u32;

        let page = provider
            .comment_threads(video_id, page_size, page_token.take())
            .await?;
        comments.extend(page.items);

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    comments.truncate(max_results);
    Ok(comments)
}
