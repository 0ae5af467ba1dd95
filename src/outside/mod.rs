mod command;
mod downloader;
mod ffmpeg;
mod thumbnail;

pub use downloader::{MediaDownloader, RunningTransfer, TwitchDownloader};
pub use ffmpeg::{Ffmpeg, StreamTransformer};
pub use thumbnail::{HttpThumbnails, ThumbnailFetcher};
