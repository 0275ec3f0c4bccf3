use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::FilterConfig;
use crate::provider::{MetadataProvider, VideoRef};

/// Largest id batch a duration lookup may carry
pub const DURATION_BATCH_SIZE: usize = 50;

/// What a candidate video must satisfy to be kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Drop videos at or below `min_duration_seconds`
    pub exclude_shorts: bool,

    /// Exclusive lower bound on length, unless the video runs for hours
    pub min_duration_seconds: u64,

    /// Drop videos whose channel has fewer subscribers
    pub min_subscribers: Option<u64>,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            exclude_shorts: true,
            min_duration_seconds: 60,
            min_subscribers: None,
        }
    }
}

impl FilterCriteria {
    /// Keep everything
    pub fn none() -> Self {
        Self {
            exclude_shorts: false,
            min_duration_seconds: 0,
            min_subscribers: None,
        }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            exclude_shorts: true,
            min_duration_seconds: config.min_duration_secs,
            min_subscribers: config.min_subscribers,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.exclude_shorts && self.min_subscribers.is_none()
    }
}

/// A parsed `PT#H#M#S` duration token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDuration {
    /// An hour (or day) component was present
    pub long_form: bool,
    pub total_seconds: u64,
}

impl ParsedDuration {
    pub fn is_full_length(&self, min_seconds: u64) -> bool {
        self.long_form || self.total_seconds > min_seconds
    }
}

fn component_value(raw: &str) -> u64 {
    raw.parse::<u64>()
        .ok()
        .or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64)
        })
        .unwrap_or(0)
}

/// Parse an ISO-8601 video duration such as `PT1M30S`
///
/// A component that does not parse counts as zero without affecting its
/// neighbours. Tokens without a time part yield zero seconds.
pub fn parse_duration(token: &str) -> ParsedDuration {
    let token = token.trim();
    let mut parsed = ParsedDuration {
        long_form: false,
        total_seconds: 0,
    };

    let Some(rest) = token.strip_prefix('P') else {
        return parsed;
    };
    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) => (date, time),
        None => (rest, ""),
    };

    if let Some(days) = date_part.strip_suffix('D') {
        let days = component_value(days);
        if days > 0 {
            parsed.long_form = true;
            parsed.total_seconds = parsed.total_seconds.saturating_add(days.saturating_mul(86_400));
        }
    }

    let mut buffer = String::new();
    for c in time_part.chars() {
        match c {
            'H' => {
                parsed.long_form = true;
                parsed.total_seconds = parsed
                    .total_seconds
                    .saturating_add(component_value(&buffer).saturating_mul(3_600));
                buffer.clear();
            }
            'M' => {
                parsed.total_seconds = parsed
                    .total_seconds
                    .saturating_add(component_value(&buffer).saturating_mul(60));
                buffer.clear();
            }
            'S' => {
                parsed.total_seconds = parsed.total_seconds.saturating_add(component_value(&buffer));
                buffer.clear();
            }
            other => buffer.push(other),
        }
    }

    parsed
}

/// Whether a duration token describes a full-length (non-short) video
pub fn is_full_length(token: &str, min_seconds: u64) -> bool {
    parse_duration(token).is_full_length(min_seconds)
}

/// Ids of full-length videos, with their length when known
///
/// Lookups go out in batches of [`DURATION_BATCH_SIZE`]. A batch whose lookup
/// fails is kept whole with unknown lengths; ids missing from a successful
/// response are dropped.
pub async fn full_length_ids(
    provider: &dyn MetadataProvider,
    ids: &[String],
    min_seconds: u64,
) -> HashMap<String, Option<u64>> {
    let mut kept = HashMap::new();

    for batch in ids.chunks(DURATION_BATCH_SIZE) {
        match provider.video_durations(batch).await {
            Ok(durations) => {
                for entry in durations {
                    let parsed = parse_duration(&entry.duration);
                    if parsed.is_full_length(min_seconds) {
                        kept.insert(entry.id, Some(parsed.total_seconds));
                    } else {
                        tracing::debug!("Filtered out short {} ({})", entry.id, entry.duration);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Duration lookup failed for a batch of {} videos, keeping them: {}",
                    batch.len(),
                    e
                );
                for id in batch {
                    kept.insert(id.clone(), None);
                }
            }
        }
    }

    kept
}

/// Drop shorts, keeping the upstream order and recording known lengths
pub async fn exclude_shorts(
    provider: &dyn MetadataProvider,
    videos: Vec<VideoRef>,
    min_seconds: u64,
) -> Vec<VideoRef> {
    let ids: Vec<String> = videos.iter().map(|v| v.id.clone()).collect();
    let kept = full_length_ids(provider, &ids, min_seconds).await;

    videos
        .into_iter()
        .filter_map(|mut video| {
            let seconds = kept.get(&video.id)?;
            video.duration_seconds = *seconds;
            Some(video)
        })
        .collect()
}

/// Subscriber count of a channel, zero when the lookup fails or the count is hidden
pub async fn subscriber_count_or_zero(provider: &dyn MetadataProvider, channel_id: &str) -> u64 {
    match provider.channel(channel_id).await {
        Ok(info) => info.subscriber_count.unwrap_or(0),
        Err(e) => {
            tracing::warn!("Subscriber lookup failed for {}, treating as 0: {}", channel_id, e);
            0
        }
    }
}

/// Keep videos from channels with at least `floor` subscribers, up to `limit`
///
/// Each channel is looked up once per call.
pub async fn retain_popular(
    provider: &dyn MetadataProvider,
    videos: Vec<VideoRef>,
    floor: u64,
    limit: Option<usize>,
) -> Vec<VideoRef> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut kept = Vec::new();

    for video in videos {
        if limit.is_some_and(|n| kept.len() >= n) {
            break;
        }

        let count = match counts.get(&video.channel_id) {
            Some(count) => *count,
            None => {
                let count = subscriber_count_or_zero(provider, &video.channel_id).await;
                counts.insert(video.channel_id.clone(), count);
                count
            }
        };

        if count >= floor {
            kept.push(video);
        } else {
            tracing::debug!("Filtered out {}: channel has {} subscribers", video.id, count);
        }
    }

    kept
}

/// Apply `criteria` to candidates, stopping once `limit` survivors are collected
pub async fn apply(
    provider: &dyn MetadataProvider,
    videos: Vec<VideoRef>,
    criteria: &FilterCriteria,
    limit: Option<usize>,
) -> Vec<VideoRef> {
    let mut videos = if criteria.exclude_shorts {
        exclude_shorts(provider, videos, criteria.min_duration_seconds).await
    } else {
        videos
    };

    match criteria.min_subscribers {
        Some(floor) => retain_popular(provider, videos, floor, limit).await,
        None => {
            if let Some(n) = limit {
                videos.truncate(n);
            }
            videos
        }
    }
}

/// Deduplicate by id, first occurrence wins
pub fn dedup_videos(videos: Vec<VideoRef>) -> Vec<VideoRef> {
    let mut seen = HashSet::new();
    videos
        .into_iter()
        .filter(|v| seen.insert(v.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChannelInfo, MockMetadataProvider, ProviderError, VideoDuration};
    use chrono::{TimeZone, Utc};
    use mockall::predicate::eq;

    fn video(id: &str, channel: &str) -> VideoRef {
        VideoRef::new(
            id,
            format!("Video {}", id),
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            channel,
            format!("Channel {}", channel),
        )
    }

    #[test]
    fn test_duration_boundaries() {
        assert!(is_full_length("PT1H", 60));
        assert!(!is_full_length("PT59S", 60));
        assert!(!is_full_length("PT60S", 60));
        assert!(is_full_length("PT61S", 60));
        assert!(!is_full_length("PT1M", 60));
        assert!(is_full_length("PT1M1S", 60));
    }

    #[test]
    fn test_hours_short_circuit() {
        assert!(is_full_length("PT1H0M0S", 60));
        assert!(is_full_length("PT0H", 60));
        assert_eq!(parse_duration("PT1H2M3S").total_seconds, 3_723);
    }

    #[test]
    fn test_malformed_component_counts_as_zero() {
        let parsed = parse_duration("PTxM61S");
        assert_eq!(parsed.total_seconds, 61);
        assert!(parsed.is_full_length(60));

        assert_eq!(parse_duration("PT2M??S").total_seconds, 120);
    }

    #[test]
    fn test_tokens_without_time_part() {
        assert_eq!(parse_duration("P0D").total_seconds, 0);
        assert!(!is_full_length("P0D", 60));
        assert!(is_full_length("P1DT2S", 60));
        assert!(!is_full_length("garbage", 60));
        assert!(!is_full_length("", 60));
    }

    #[test]
    fn test_fractional_seconds() {
        assert_eq!(parse_duration("PT61.5S").total_seconds, 61);
    }

    #[test]
    fn test_oversized_components_saturate() {
        assert_eq!(parse_duration("PT18446744073709551615M").total_seconds, u64::MAX);
        assert_eq!(parse_duration("PT18446744073709551615H1S").total_seconds, u64::MAX);

        let days = parse_duration("P9999999999999999DT1S");
        assert!(days.long_form);
        assert_eq!(days.total_seconds, u64::MAX);
        assert!(days.is_full_length(60));
    }

    #[test]
    fn test_non_finite_components_count_as_zero() {
        assert_eq!(parse_duration("PTinfS5M").total_seconds, 300);
        assert_eq!(parse_duration("PTNaNM7S").total_seconds, 7);
        assert_eq!(parse_duration("PT-1.5M2S").total_seconds, 2);
    }

    #[test]
    fn test_criteria_noop() {
        assert!(FilterCriteria::none().is_noop());
        assert!(!FilterCriteria::default().is_noop());
    }

    #[tokio::test]
    async fn test_failed_batch_is_kept() {
        let ids: Vec<String> = (0..75).map(|i| format!("v{:02}", i)).collect();

        let mut provider = MockMetadataProvider::new();
        let mut call = 0;
        provider
            .expect_video_durations()
            .times(2)
            .returning(move |batch| {
                call += 1;
                if call == 1 {
                    assert_eq!(batch.len(), 50);
                    // Every video in the first batch is a short except v00
                    Ok(batch
                        .iter()
                        .map(|id| VideoDuration {
                            id: id.clone(),
                            duration: if id == "v00" { "PT10M".to_string() } else { "PT30S".to_string() },
                        })
                        .collect())
                } else {
                    assert_eq!(batch.len(), 25);
                    Err(ProviderError::Upstream {
                        status: 403,
                        detail: "quotaExceeded".to_string(),
                    })
                }
            });

        let kept = full_length_ids(&provider, &ids, 60).await;

        assert_eq!(kept.len(), 26);
        assert_eq!(kept.get("v00"), Some(&Some(600)));
        for i in 50..75 {
            assert_eq!(kept.get(&format!("v{:02}", i)), Some(&None));
        }
        assert!(!kept.contains_key("v01"));
    }

    #[tokio::test]
    async fn test_exclude_shorts_preserves_order() {
        let videos = vec![video("a", "c"), video("b", "c"), video("c", "c"), video("d", "c")];

        let mut provider = MockMetadataProvider::new();
        provider.expect_video_durations().times(1).returning(|_| {
            // Response order differs from request order
            Ok(vec![
                VideoDuration { id: "d".to_string(), duration: "PT5M".to_string() },
                VideoDuration { id: "b".to_string(), duration: "PT45S".to_string() },
                VideoDuration { id: "a".to_string(), duration: "PT1H".to_string() },
            ])
        });

        let kept = exclude_shorts(&provider, videos, 60).await;

        let ids: Vec<_> = kept.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(kept[0].duration_seconds, Some(3_600));
        assert_eq!(kept[1].duration_seconds, Some(300));
    }

    #[tokio::test]
    async fn test_subscriber_floor_and_fail_closed() {
        let videos = vec![
            video("a", "big"),
            video("b", "small"),
            video("c", "broken"),
            video("d", "big"),
            video("e", "exact"),
        ];

        let mut provider = MockMetadataProvider::new();
        provider
            .expect_channel()
            .with(eq("big"))
            .times(1)
            .returning(|id| Ok(ChannelInfo { id: id.to_string(), uploads_playlist_id: None, subscriber_count: Some(50_000) }));
        provider
            .expect_channel()
            .with(eq("small"))
            .times(1)
            .returning(|id| Ok(ChannelInfo { id: id.to_string(), uploads_playlist_id: None, subscriber_count: Some(999) }));
        provider
            .expect_channel()
            .with(eq("exact"))
            .times(1)
            .returning(|id| Ok(ChannelInfo { id: id.to_string(), uploads_playlist_id: None, subscriber_count: Some(1_000) }));
        provider
            .expect_channel()
            .with(eq("broken"))
            .times(1)
            .returning(|_| Err(ProviderError::Transport("timeout".to_string())));

        let kept = retain_popular(&provider, videos, 1_000, None).await;

        let ids: Vec<_> = kept.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d", "e"]);
    }

    #[tokio::test]
    async fn test_zero_floor_keeps_failed_lookups() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_channel()
            .returning(|_| Err(ProviderError::NotFound("channel".to_string())));

        let kept = retain_popular(&provider, vec![video("a", "x")], 0, None).await;
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_without_criteria_makes_no_calls() {
        let provider = MockMetadataProvider::new();
        let videos = vec![video("a", "x"), video("b", "x"), video("c", "x")];

        let kept = apply(&provider, videos, &FilterCriteria::none(), Some(2)).await;
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_dedup_videos() {
        let videos = vec![video("a", "x"), video("b", "x"), video("a", "y")];
        let deduped = dedup_videos(videos);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].channel_id, "x");
    }
}
