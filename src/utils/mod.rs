use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

use crate::InsightsError;

const VIDEO_ID_LEN: usize = 11;

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Extract the video id from a bare id or any common YouTube link
///
/// Accepts `watch?v=`, `youtu.be/`, `/shorts/`, `/embed/`, `/live/` and `/v/` forms.
pub fn video_id_from_input(input: &str) -> Result<String, InsightsError> {
    let input = input.trim();
    if is_video_id(input) {
        return Ok(input.to_string());
    }

    let unsupported = || InsightsError::UnsupportedVideoRef(input.to_string());

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let url = Url::parse(&with_scheme).map_err(|_| unsupported())?;
    let host = url.host_str().ok_or_else(unsupported)?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let mut segments = url.path_segments().into_iter().flatten().filter(|s| !s.is_empty());

    let candidate = match host {
        "youtu.be" => segments.next().map(str::to_string),
        "youtube.com" | "m.youtube.com" | "music.youtube.com" | "youtube-nocookie.com" => {
            match segments.next() {
                Some("watch") => url
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.into_owned()),
                Some("shorts" | "embed" | "live" | "v") => segments.next().map(str::to_string),
                _ => None,
            }
        }
        _ => None,
    };

    candidate.filter(|id| is_video_id(id)).ok_or_else(unsupported)
}

/// Channel handle without its leading `@`
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_string()
}

/// Format duration in human-readable format
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Report external tools that are missing from the environment
pub async fn check_dependencies(downloader: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(downloader).await {
        missing.push(format!(
            "{} - used as the last-resort transcript source",
            downloader
        ));
    }

    missing
}

/// How long `<command> --version` may take before the command counts as missing
pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str) -> bool {
    command_responds(command, VERSION_CHECK_TIMEOUT).await
}

/// Run `<command> --version` and report whether it exits successfully in time
pub async fn command_responds(command: &str, timeout: Duration) -> bool {
    let output = Command::new(command)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) => output.status.success(),
        Ok(Err(_)) => false,
        Err(_) => {
            tracing::debug!("{} --version did not answer within {:?}", command, timeout);
            false
        }
    }
}
