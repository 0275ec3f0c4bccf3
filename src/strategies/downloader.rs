use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{EgressPolicy, StrategyError, StrategyKind, TranscriptStrategy};
use crate::provider::watch_url;
use crate::transcript::parser::{parse_cues, CueFormat};
use crate::transcript::TranscriptSegment;
use crate::utils;

const SUBTITLE_EXT: &str = "srv3";

/// Subtitle download through an external yt-dlp process
pub struct DownloaderStrategy {
    binary: String,
    timeout: Duration,
    proxy_url: Option<String>,
}

impl DownloaderStrategy {
    pub fn new(binary: String, timeout: Duration, egress: &EgressPolicy) -> Self {
        Self {
            binary,
            timeout,
            proxy_url: egress.proxy_url().map(str::to_string),
        }
    }

    /// Check if the downloader binary can be run
    pub async fn is_installed(&self) -> bool {
        utils::check_command_available(&self.binary).await
    }

    fn command(&self, video_id: &str, languages: &[String], out_dir: &Path) -> Command {
        let template = out_dir.join("%(id)s.%(ext)s");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--skip-download")
            .arg("--write-sub")
            .arg("--write-auto-sub")
            .arg("--sub-lang")
            .arg(languages.join(","))
            .arg("--sub-format")
            .arg(SUBTITLE_EXT)
            .arg("-o")
            .arg(template.to_string_lossy().to_string())
            .arg("--no-warnings")
            .arg("--no-playlist");
        if let Some(proxy) = &self.proxy_url {
            cmd.arg("--proxy").arg(proxy);
        }
        cmd.arg(watch_url(video_id))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, video_id: &str, languages: &[String], out_dir: &Path) -> Result<(), StrategyError> {
        let mut cmd = self.command(video_id, languages, out_dir);

        // Dropping the future on timeout drops the child, which kills it
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| StrategyError::Timeout(self.timeout))?
            .map_err(|e| StrategyError::Process(format!("failed to spawn {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().last().unwrap_or("").chars().take(300).collect();
            return Err(StrategyError::Process(format!("{} ({})", output.status, tail)));
        }
        Ok(())
    }
}

/// Subtitle file for the most preferred language, else any subtitle file
fn pick_subtitle_file(dir: &Path, video_id: &str, languages: &[String]) -> Option<PathBuf> {
    for language in languages {
        let candidate = dir.join(format!("{}.{}.{}", video_id, language, SUBTITLE_EXT));
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(SUBTITLE_EXT))
        .collect();
    found.sort();
    found.into_iter().next()
}

#[async_trait]
impl TranscriptStrategy for DownloaderStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Downloader
    }

    async fn attempt(
        &self,
        video_id: &str,
        languages: &[String],
    ) -> Result<Vec<TranscriptSegment>, StrategyError> {
        if !self.is_installed().await {
            return Err(StrategyError::Unavailable(format!("{} is not installed", self.binary)));
        }

        // Removed when it goes out of scope, whichever way this function exits
        let workdir = tempfile::Builder::new()
            .prefix("ytinsights-subs-")
            .tempdir()
            .map_err(|e| StrategyError::Process(format!("temporary directory: {}", e)))?;

        tracing::debug!("Running {} for {} in {}", self.binary, video_id, workdir.path().display());
        self.run(video_id, languages, workdir.path()).await?;

        let path = pick_subtitle_file(workdir.path(), video_id, languages)
            .ok_or_else(|| StrategyError::NoTranscript(languages.to_vec()))?;

        let xml = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StrategyError::Process(format!("reading {}: {}", path.display(), e)))?;

        let parsed = parse_cues(&xml, CueFormat::Srv3);
        match parsed.error {
            Some(error) if !parsed.has_text() => Err(StrategyError::Malformed(error)),
            _ => Ok(parsed.segments),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pick_subtitle_prefers_language_order() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("vid.en-GB.srv3"), "<p/>").unwrap();
        fs_err::write(dir.path().join("vid.en.srv3"), "<p/>").unwrap();

        let picked = pick_subtitle_file(dir.path(), "vid", &langs(&["en", "en-GB"])).unwrap();
        assert_eq!(picked.file_name().unwrap(), "vid.en.srv3");
    }

    #[test]
    fn test_pick_subtitle_falls_back_to_any_track() {
        let dir = tempfile::tempdir().unwrap();
        fs_err::write(dir.path().join("vid.en-orig.srv3"), "<p/>").unwrap();
        fs_err::write(dir.path().join("notes.txt"), "ignore").unwrap();

        let picked = pick_subtitle_file(dir.path(), "vid", &langs(&["en"])).unwrap();
        assert_eq!(picked.file_name().unwrap(), "vid.en-orig.srv3");
    }

    #[test]
    fn test_pick_subtitle_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(pick_subtitle_file(dir.path(), "vid", &langs(&["en"])).is_none());
    }

    #[test]
    fn test_command_arguments() {
        let strategy = DownloaderStrategy::new(
            "yt-dlp".to_string(),
            Duration::from_secs(5),
            &EgressPolicy::via_proxy("http://127.0.0.1:3128"),
        );
        let cmd = strategy.command("vid", &langs(&["en", "en-US"]), Path::new("/tmp/out"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(args.windows(2).any(|w| w[0] == "--sub-lang" && w[1] == "en,en-US"));
        assert!(args.windows(2).any(|w| w[0] == "--sub-format" && w[1] == "srv3"));
        assert!(args.windows(2).any(|w| w[0] == "--proxy" && w[1] == "http://127.0.0.1:3128"));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=vid");
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let strategy = DownloaderStrategy::new(
            "definitely-not-a-real-downloader".to_string(),
            Duration::from_secs(5),
            &EgressPolicy::direct(),
        );
        let err = strategy.attempt("vid", &langs(&["en"])).await.unwrap_err();
        assert!(matches!(err, StrategyError::Unavailable(_)));
    }

    /// Fake downloader that records the directory of its `-o` template, then runs `body`
    #[cfg(unix)]
    fn fake_downloader(body: &str) -> (tempfile::TempDir, DownloaderStrategy, PathBuf) {
        use std::os::unix::fs::PermissionsExt;

        let bin_dir = tempfile::tempdir().unwrap();
        let seen = bin_dir.path().join("seen");
        let script = bin_dir.path().join("fake-dl");
        fs_err::write(
            &script,
            format!(
                r#"#!/bin/sh
if [ "$1" = "--version" ]; then echo 1; exit 0; fi
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then shift; out=$(dirname "$1"); fi
  shift
done
printf '%s' "$out" > "{}"
{}
"#,
                seen.display(),
                body
            ),
        )
        .unwrap();
        fs_err::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let strategy = DownloaderStrategy::new(
            script.to_string_lossy().to_string(),
            Duration::from_secs(10),
            &EgressPolicy::direct(),
        );
        (bin_dir, strategy, seen)
    }

    #[cfg(unix)]
    fn assert_workdir_removed(seen: &Path) {
        let workdir = fs_err::read_to_string(seen).unwrap();
        assert!(!workdir.is_empty());
        assert!(!Path::new(&workdir).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_downloader_times_out_and_cleans_up() {
        let (_bin, strategy, seen) = fake_downloader("sleep 30");
        let strategy = DownloaderStrategy {
            timeout: Duration::from_millis(500),
            ..strategy
        };

        let err = strategy.attempt("vid", &langs(&["en"])).await.unwrap_err();
        assert!(matches!(err, StrategyError::Timeout(_)));
        assert_workdir_removed(&seen);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_downloader_output_parsed_from_srv3() {
        let (_bin, strategy, seen) = fake_downloader(
            r#"printf '<timedtext><body><p t="1500" d="800">from the downloader</p></body></timedtext>' > "$out/vid.en.srv3""#,
        );

        let segments = strategy.attempt("vid", &langs(&["en"])).await.unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].render_line(), "[1.5] from the downloader");
        assert_workdir_removed(&seen);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unparseable_subtitles_clean_up() {
        let (_bin, strategy, seen) = fake_downloader(
            r#"printf '<timedtext><body><p t="1">x</q>' > "$out/vid.en.srv3""#,
        );

        let err = strategy.attempt("vid", &langs(&["en"])).await.unwrap_err();
        assert!(matches!(err, StrategyError::Malformed(_)));
        assert_workdir_removed(&seen);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_downloader_cleans_up() {
        let (_bin, strategy, seen) = fake_downloader("echo 'ERROR: Video unavailable' >&2\nexit 1");

        let err = strategy.attempt("vid", &langs(&["en"])).await.unwrap_err();
        match err {
            StrategyError::Process(message) => assert!(message.contains("Video unavailable")),
            other => panic!("expected process error, got {:?}", other),
        }
        assert_workdir_removed(&seen);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_no_subtitle_written_cleans_up() {
        let (_bin, strategy, seen) = fake_downloader("exit 0");

        let err = strategy.attempt("vid", &langs(&["en"])).await.unwrap_err();
        assert!(matches!(err, StrategyError::NoTranscript(_)));
        assert_workdir_removed(&seen);
    }
}
