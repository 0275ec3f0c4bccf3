use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{Config, YoutubeConfig};
use crate::filters::FilterCriteria;
use crate::provider::{Comment, MetadataProvider, ProviderError, VideoDetails, VideoRef, YoutubeDataClient};
use crate::strategies::StrategyKind;
use crate::transcript::{TranscriptPipeline, TranscriptResult};
use crate::utils;
use crate::videos::{self, VideoLimit};

/// Shared handles for every request
#[derive(Clone)]
pub struct AppState {
    /// `None` when no Data API key is configured
    pub metadata: Option<Arc<dyn MetadataProvider>>,
    pub pipeline: Arc<TranscriptPipeline>,
    pub criteria: FilterCriteria,
}

impl AppState {
    fn metadata(&self) -> Result<&dyn MetadataProvider, ApiError> {
        self.metadata.as_deref().ok_or(ApiError::Unconfigured)
    }
}

/// Failures surfaced to HTTP clients
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("metadata provider is not configured (missing API key)")]
    Unconfigured,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unconfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Provider(ProviderError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Provider(ProviderError::Upstream { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider(ProviderError::Transport(_)) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = match &self {
            ApiError::Provider(ProviderError::Upstream { status, detail }) => serde_json::json!({
                "error": self.to_string(),
                "upstream_status": status,
                "detail": detail,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn check_range(name: &str, value: usize, min: usize, max: usize) -> ApiResult<usize> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::BadRequest(format!(
            "{} must be between {} and {}",
            name, min, max
        )))
    }
}

fn required<'a>(name: &str, value: &'a Option<String>) -> ApiResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("{} is required", name))),
    }
}

/// Build the service router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/transcript", get(transcript))
        .route("/videos", get(list_videos))
        .route("/video_details", get(video_details))
        .route("/comments", get(comments))
        .route("/search", get(search))
        .route("/channel_comments", get(channel_comments))
        .with_state(state)
}

/// Run the HTTP service until Ctrl+C
/// Data API client when a non-blank key is configured
fn metadata_provider(config: &YoutubeConfig) -> crate::Result<Option<Arc<dyn MetadataProvider>>> {
    match config.api_key.as_deref().map(str::trim) {
        Some(key) if !key.is_empty() => {
            let client = YoutubeDataClient::new(config)?;
            Ok(Some(Arc::new(client) as Arc<dyn MetadataProvider>))
        }
        _ => {
            tracing::warn!("No YouTube API key configured; metadata routes will answer 503");
            Ok(None)
        }
    }
}

pub async fn serve(config: &Config) -> crate::Result<()> {
    let metadata = metadata_provider(&config.youtube)?;

    let pipeline = TranscriptPipeline::from_config(&config.transcripts)?;
    tracing::info!(
        "Transcript strategies: {}",
        pipeline
            .strategy_kinds()
            .iter()
            .map(StrategyKind::as_str)
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let state = AppState {
        metadata,
        pipeline: Arc::new(pipeline),
        criteria: FilterCriteria::from_config(&config.filters),
    };

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running HTTP server")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
    }
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "YouTube Insights API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct TranscriptParams {
    video_id: Option<String>,
    video_link: Option<String>,
    languages: Option<String>,
}

/// Transcript outcome plus its rendered text
#[derive(Debug, Serialize)]
struct TranscriptResponse {
    #[serde(flatten)]
    result: TranscriptResult,
    transcript: Option<String>,
}

async fn transcript(
    State(state): State<AppState>,
    Query(params): Query<TranscriptParams>,
) -> ApiResult<Response> {
    let video_id = match (&params.video_id, &params.video_link) {
        (Some(id), _) if !id.trim().is_empty() => utils::video_id_from_input(id),
        (_, Some(link)) if !link.trim().is_empty() => utils::video_id_from_input(link),
        _ => return Err(ApiError::BadRequest("video_id or video_link is required".to_string())),
    }
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let languages: Vec<String> = params
        .languages
        .as_deref()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .filter(|list: &Vec<String>| !list.is_empty())
        .unwrap_or_else(|| state.pipeline.languages().to_vec());

    tracing::info!("Transcript requested for {}", video_id);
    let result = state.pipeline.resolve_with(&video_id, &languages).await;

    let status = if result.is_found() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    let transcript = result.render_text();
    Ok((status, Json(TranscriptResponse { result, transcript })).into_response())
}

#[derive(Debug, Deserialize)]
struct VideosParams {
    query: Option<String>,
    channel_id: Option<String>,
    top_n: Option<usize>,
    all: Option<bool>,
    include_shorts: Option<bool>,
    min_subscribers: Option<u64>,
}

async fn list_videos(
    State(state): State<AppState>,
    Query(params): Query<VideosParams>,
) -> ApiResult<Json<Vec<VideoRef>>> {
    let provider = state.metadata()?;

    let mut criteria = state.criteria;
    if let Some(include) = params.include_shorts {
        criteria.exclude_shorts = !include;
    }
    if params.min_subscribers.is_some() {
        criteria.min_subscribers = params.min_subscribers;
    }

    let top_n = check_range("top_n", params.top_n.unwrap_or(10), 1, 50)?;

    let found = match (&params.query, &params.channel_id) {
        (Some(query), None) => {
            tracing::info!("Video search for {:?}", query);
            videos::search_videos(provider, query, top_n, None, &criteria).await?
        }
        (None, Some(channel)) => {
            let channel_id = videos::resolve_channel(provider, channel).await?;
            let limit = if params.all.unwrap_or(false) {
                VideoLimit::All
            } else {
                VideoLimit::First(top_n)
            };
            tracing::info!("Channel listing for {} ({:?})", channel_id, limit);
            videos::channel_videos(provider, &channel_id, limit, &criteria).await?
        }
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of query or channel_id is required".to_string(),
            ))
        }
    };

    Ok(Json(found))
}

#[derive(Debug, Deserialize)]
struct VideoDetailsParams {
    video_id: Option<String>,
}

async fn video_details(
    State(state): State<AppState>,
    Query(params): Query<VideoDetailsParams>,
) -> ApiResult<Json<VideoDetails>> {
    let provider = state.metadata()?;
    let video_id = required("video_id", &params.video_id)?;
    Ok(Json(provider.video_details(video_id).await?))
}

#[derive(Debug, Deserialize)]
struct CommentsParams {
    video_id: Option<String>,
    max_results: Option<usize>,
}

async fn comments(
    State(state): State<AppState>,
    Query(params): Query<CommentsParams>,
) -> ApiResult<Json<Vec<Comment>>> {
    let provider = state.metadata()?;
    let video_id = required("video_id", &params.video_id)?;
    let max_results = check_range("max_results", params.max_results.unwrap_or(100), 1, 1000)?;

    Ok(Json(videos::fetch_comments(provider, video_id, max_results).await?))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: Option<String>,
    top_n: Option<usize>,
    max_comments_per_video: Option<usize>,
    include_transcripts: Option<bool>,
}

/// One searched video with its comments and transcript
#[derive(Debug, Serialize)]
struct VideoReport {
    #[serde(flatten)]
    video: VideoRef,
    comments: Vec<Comment>,
    transcript: Option<String>,
    transcript_source: Option<StrategyKind>,
}

#[derive(Debug, Serialize)]
struct SearchReport {
    query: String,
    videos_found: usize,
    total_comments: usize,
    videos_with_transcripts: usize,
    videos: Vec<VideoReport>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchReport>> {
    let provider = state.metadata()?;
    let query = required("query", &params.query)?;
    let top_n = check_range("top_n", params.top_n.unwrap_or(5), 1, 20)?;
    let max_comments = check_range(
        "max_comments_per_video",
        params.max_comments_per_video.unwrap_or(100),
        1,
        1000,
    )?;
    let include_transcripts = params.include_transcripts.unwrap_or(true);

    let published_after = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single();
    let found = videos::search_videos(provider, query, top_n, published_after, &state.criteria).await?;
    if found.is_empty() {
        return Err(ApiError::NotFound(format!("no videos found for {:?}", query)));
    }
    tracing::info!("Search {:?} matched {} videos", query, found.len());

    let mut reports = Vec::with_capacity(found.len());
    for video in found {
        let comments = match videos::fetch_comments(provider, &video.id, max_comments).await {
            Ok(comments) => comments,
            Err(e) => {
                tracing::warn!("Comments unavailable for {}: {}", video.id, e);
                Vec::new()
            }
        };

        let (transcript, transcript_source) = if include_transcripts {
            let result = state.pipeline.resolve(&video.id).await;
            (result.render_text(), result.source_strategy)
        } else {
            (None, None)
        };

        reports.push(VideoReport {
            video,
            comments,
            transcript,
            transcript_source,
        });
    }

    Ok(Json(SearchReport {
        query: query.to_string(),
        videos_found: reports.len(),
        total_comments: reports.iter().map(|r| r.comments.len()).sum(),
        videos_with_transcripts: reports.iter().filter(|r| r.transcript.is_some()).count(),
        videos: reports,
    }))
}

#[derive(Debug, Deserialize)]
struct ChannelCommentsParams {
    handle: Option<String>,
    num_videos: Option<usize>,
    max_comments_per_video: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChannelVideoComments {
    #[serde(flatten)]
    video: VideoRef,
    comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
struct ChannelCommentsReport {
    handle: String,
    channel_id: String,
    videos: Vec<ChannelVideoComments>,
}

async fn channel_comments(
    State(state): State<AppState>,
    Query(params): Query<ChannelCommentsParams>,
) -> ApiResult<Json<ChannelCommentsReport>> {
    let provider = state.metadata()?;
    let handle = utils::normalize_handle(required("handle", &params.handle)?);
    let num_videos = check_range("num_videos", params.num_videos.unwrap_or(2), 1, 50)?;
    let max_comments = check_range(
        "max_comments_per_video",
        params.max_comments_per_video.unwrap_or(100),
        1,
        1000,
    )?;

    let channel_id = provider.channel_id_for_handle(&handle).await?;
    let recent = videos::channel_videos(
        provider,
        &channel_id,
        VideoLimit::First(num_videos),
        &FilterCriteria::none(),
    )
    .await?;

    let mut report = Vec::with_capacity(recent.len());
    for video in recent {
        let comments = videos::fetch_comments(provider, &video.id, max_comments).await?;
        report.push(ChannelVideoComments { video, comments });
    }

    Ok(Json(ChannelCommentsReport {
        handle,
        channel_id,
        videos: report,
    }))
}
