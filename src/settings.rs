use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::result::{Error, Result};

/// Settings file looked for in the working directory when none is given
pub const DEFAULT_SETTINGS_FILE: &str = "vodrescue.toml";

/// Values read from the settings file, command line flags take precedence over them
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Holds the videos csv file and the `collections` folder
    pub config_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Scratch folder handed to the downloader
    pub temp_dir: Option<PathBuf>,
    pub downloader_cli: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub max_concurrent_finalization: usize,
    pub stop_key: char,
    /// Broadcast types to keep from the catalog, all of them when unset
    pub accepted_types: Option<Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("configuration"),
            output_dir: PathBuf::from("downloads"),
            temp_dir: None,
            downloader_cli: "TwitchDownloaderCLI".to_owned(),
            ffmpeg: "ffmpeg".to_owned(),
            ffprobe: "ffprobe".to_owned(),
            max_concurrent_finalization: 4,
            stop_key: 's',
            accepted_types: None,
        }
    }
}

impl Settings {
    /// Read the settings file at `path`, or the default one if it exists.
    ///
    /// An explicitly given file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_SETTINGS_FILE), false),
        };
        debug!("Reading settings from {} (required: {required})", path.display());

        let settings: Settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|err| {
                Error::Configuration(format!("Invalid settings file {}: {err}", path.display()))
            })?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_finalization < 1 {
            return Err(Error::Configuration(
                "max_concurrent_finalization must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
