use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ytinsights",
    about = "YouTube Insights - video metadata, comments and transcripts as JSON",
    version,
    long_about = "A small HTTP service and CLI exposing YouTube video metadata, comments and transcripts. Transcripts are resolved through a chain of caption sources, falling back to yt-dlp when the lighter ones fail."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// YouTube Data API key (overrides the config file)
    #[arg(long, global = true, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        /// Listen address (defaults to server.bind from the config)
        #[arg(short, long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Fetch the transcript of a single video
    Transcript {
        /// Video id or YouTube link
        #[arg(value_name = "VIDEO")]
        video: String,

        /// Preferred caption language, repeatable (defaults to the configured list)
        #[arg(short, long, value_name = "LANG")]
        language: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Search videos or list a channel's uploads
    Videos {
        /// Free-text search query
        #[arg(long, conflicts_with = "channel_id", required_unless_present = "channel_id")]
        query: Option<String>,

        /// Channel id (UC...) or @handle
        #[arg(long, value_name = "CHANNEL")]
        channel_id: Option<String>,

        /// Number of videos to return
        #[arg(short = 'n', long, default_value = "10")]
        top_n: usize,

        /// Return every upload of the channel
        #[arg(long, requires = "channel_id", conflicts_with = "query")]
        all: bool,

        /// Keep videos at or below the minimum duration
        #[arg(long)]
        include_shorts: bool,

        /// Drop channels with fewer subscribers
        #[arg(long, value_name = "COUNT")]
        min_subscribers: Option<u64>,
    },

    /// Fetch the most recent comments of a video
    Comments {
        /// Video id or YouTube link
        #[arg(value_name = "VIDEO")]
        video: String,

        /// Maximum number of comments
        #[arg(short, long, default_value = "100")]
        max: usize,
    },

    /// Show or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// Check that external tools are available
    Doctor,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum OutputFormat {
    /// `[start] text` lines
    Text,
    /// Transcript result as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
