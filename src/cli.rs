use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use indoc::indoc;

use crate::types::{Order, Timestamp};

macro_rules! arg_env {
    ($v:literal) => {
        concat!("VODRESCUE_", $v)
    };
}

/// Archive the videos of a channel, with their chat and metadata, sorted by collection.
///
/// Downloads run one at a time while the previous ones are finalized in the background.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// The folder holding the videos csv file and the `collections` folder
    #[arg(long, global = true, env = arg_env!("CONFIG_DIR"))]
    pub config_dir: Option<PathBuf>,

    /// The folder in which the videos are archived
    #[arg(long, global = true, env = arg_env!("OUTPUT_DIR"))]
    pub output_dir: Option<PathBuf>,

    /// The TOML settings file to read instead of `vodrescue.toml`
    #[arg(long, global = true, env = arg_env!("SETTINGS"))]
    pub settings: Option<PathBuf>,

    /// Report what would be done without writing or downloading anything
    #[arg(long, global = true, env = arg_env!("DRY_RUN"))]
    pub dry_run: bool,

    /// Log more, twice for everything
    #[arg(short, long, global = true, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the metadata files and download the chats and videos (default)
    #[command(long_about = indoc! {"
        Write the metadata files and download the chats and videos (default).

        Press the stop key while downloading to stop after the current video,
        once every finalization is over. Press it again to resume. When stdin
        is not a terminal, a line holding only the stop key does the same.
    "})]
    Download(DownloadArgs),

    /// Print the name of every collection
    ListCollections,

    /// Print the videos sharing their title with another one
    ListDuplicateTitles,

    /// Print the videos outside of any collection, then the content of each collection
    ListVideos(SelectionArgs),

    /// Cut a part of a media file without re-encoding it
    #[command(long_about = indoc! {"
        Cut a part of a media file without re-encoding it.

        The part starts at the last keyframe before <START>, so it may be a few
        seconds longer than asked. It is written next to the media file.
    "})]
    Extract(ExtractArgs),

    /// Check the duration of the downloaded videos against the catalog
    Validate,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Only process the videos of these collections
    #[arg(long, num_args = 1.., env = arg_env!("COLLECTIONS"), value_delimiter = ',')]
    pub collections: Vec<String>,

    /// Only process the videos outside of any collection
    #[arg(long, conflicts_with = "collections", env = arg_env!("NON_COLLECTIONS"))]
    pub non_collections: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Download the videos
    #[arg(long, env = arg_env!("DOWNLOAD_VIDEO"))]
    pub download_video: bool,

    /// Download the chats
    #[arg(long, env = arg_env!("DOWNLOAD_CHAT"))]
    pub download_chat: bool,

    /// Download the thumbnails listed in the `thumbnailUrl` column of the csv file
    #[arg(long, env = arg_env!("DOWNLOAD_THUMBNAIL"))]
    pub download_thumbnail: bool,

    /// The order in which the videos are processed
    #[arg(long, value_enum, default_value_t, env = arg_env!("ORDER"))]
    pub order: Order,

    /// Stop starting new downloads after this many minutes, 0 or less for no limit
    #[arg(long, default_value_t = 0, allow_negative_numbers = true, env = arg_env!("TIME_LIMIT"))]
    pub time_limit: i64,

    /// How many videos can be finalized at the same time
    #[arg(long, env = arg_env!("MAX_FINALIZATIONS"))]
    pub max_finalizations: Option<usize>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// The scratch folder of the downloader
    #[arg(long, env = arg_env!("TEMP_DIR"))]
    pub temp_dir: Option<PathBuf>,

    /// The TwitchDownloaderCLI executable
    #[arg(long, env = arg_env!("DOWNLOADER_CLI"))]
    pub downloader_cli: Option<String>,

    /// Do not listen for the stop key
    #[arg(long)]
    pub no_watcher: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// The media file to cut
    pub file: PathBuf,

    /// Start of the part, as `[[h:]m:]s[.mmm]`
    pub start: Timestamp,

    /// End of the part, as `[[h:]m:]s[.mmm]`
    pub stop: Timestamp,
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        match (self.quiet, self.verbose) {
            (true, _) => tracing::Level::WARN,
            (false, 0) => tracing::Level::INFO,
            (false, 1) => tracing::Level::DEBUG,
            (false, _) => tracing::Level::TRACE,
        }
    }
}
