use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use youtube_insights::cli::{Cli, Commands};
use youtube_insights::config::Config;
use youtube_insights::filters::FilterCriteria;
use youtube_insights::provider::YoutubeDataClient;
use youtube_insights::transcript::TranscriptPipeline;
use youtube_insights::videos::{self, VideoLimit};
use youtube_insights::{output, server, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "youtube_insights=debug,ytinsights=debug"
    } else {
        "youtube_insights=info,ytinsights=info"
    };
    let registry = tracing_subscriber::registry().with(
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| default_filter.into()),
    );
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let mut config = Config::load().await?;
    if let Some(key) = cli.api_key.clone() {
        config.youtube.api_key = Some(key);
        config.drop_blank_values();
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
                config.validate()?;
            }

            let missing = utils::check_dependencies(&config.transcripts.downloader_path).await;
            if !missing.is_empty() {
                eprintln!("{}", style("Dependency check warnings:").yellow());
                for dep in missing {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - the other transcript sources still work)");
            }

            server::serve(&config).await?;
        }
        Commands::Transcript {
            video,
            language,
            format,
            output,
        } => {
            let video_id = utils::video_id_from_input(&video)?;
            let pipeline = TranscriptPipeline::from_config(&config.transcripts)?;
            let languages = if language.is_empty() {
                pipeline.languages().to_vec()
            } else {
                language
            };

            let progress = if cli.quiet {
                ProgressBar::hidden()
            } else {
                ProgressBar::new_spinner()
            };
            progress.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            progress.enable_steady_tick(Duration::from_millis(100));
            progress.set_message(format!("Resolving transcript for {}...", video_id));

            let result = pipeline.resolve_with(&video_id, &languages).await;
            progress.finish_and_clear();

            if !result.is_found() {
                anyhow::bail!(
                    "No transcript available for {}: {}",
                    video_id,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }

            match output {
                Some(path) => {
                    output::save_to_file(&result, &path, &format).await?;
                    println!("Transcript saved to: {}", path.display());
                }
                None => {
                    output::print_to_console(&result, &format)?;
                }
            }
        }
        Commands::Videos {
            query,
            channel_id,
            top_n,
            all,
            include_shorts,
            min_subscribers,
        } => {
            let client = YoutubeDataClient::new(&config.youtube)?;

            let mut criteria = FilterCriteria::from_config(&config.filters);
            criteria.exclude_shorts = !include_shorts;
            if min_subscribers.is_some() {
                criteria.min_subscribers = min_subscribers;
            }

            let found = match (query, channel_id) {
                (Some(query), _) => videos::search_videos(&client, &query, top_n, None, &criteria).await?,
                (None, Some(channel)) => {
                    let channel_id = videos::resolve_channel(&client, &channel).await?;
                    let limit = if all { VideoLimit::All } else { VideoLimit::First(top_n) };
                    videos::channel_videos(&client, &channel_id, limit, &criteria).await?
                }
                (None, None) => anyhow::bail!("either --query or --channel-id is required"),
            };

            for video in &found {
                let length = video
                    .duration_seconds
                    .map(utils::format_duration)
                    .unwrap_or_else(|| "?".to_string());
                tracing::debug!("{} ({}) {}", video.id, length, video.title);
            }
            output::print_json(&found)?;
        }
        Commands::Comments { video, max } => {
            let video_id = utils::video_id_from_input(&video)?;
            let client = YoutubeDataClient::new(&config.youtube)?;
            let comments = videos::fetch_comments(&client, &video_id, max).await?;
            output::print_json(&comments)?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = Config::config_path()?;
                if path.exists() {
                    println!("Configuration already exists at: {}", path.display());
                } else {
                    let path = Config::default()
                        .save()
                        .await
                        .context("Failed to write default configuration")?;
                    println!("Default configuration written to: {}", path.display());
                }
            }
        }
        Commands::Doctor => {
            let downloader = &config.transcripts.downloader_path;
            if utils::check_command_available(downloader).await {
                println!("{} {} is available", style("✓").green(), downloader);
            } else {
                println!(
                    "{} {} not found - transcripts fall back to caption endpoints only",
                    style("!").yellow(),
                    downloader
                );
            }

            if config.youtube.api_key.is_some() {
                println!("{} YouTube API key configured", style("✓").green());
            } else {
                println!(
                    "{} No YouTube API key - metadata commands and routes are disabled",
                    style("!").yellow()
                );
            }
        }
    }

    Ok(())
}
