use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Child, Command},
};

use super::command::{assert_success_command, spawn_command, Capture};
use crate::result::{Error, Result};

/// A transfer process that has been started but not waited for yet.
pub trait RunningTransfer: Send {
    /// Non-blocking check. `Some(success)` once the process has exited.
    fn try_wait(&mut self) -> Result<Option<bool>>;

    /// Block until the process exits and return its exit code
    /// (`None` when it was terminated by a signal).
    fn wait(&mut self) -> Result<Option<i32>>;
}

/// Interface for fetching the assets of a VOD
pub trait MediaDownloader: Sync {
    /// Name of the program, for messages
    fn program(&self) -> &str;

    /// Download the chat history of the video to `output`, waiting for completion.
    fn download_chat(&self, video_id: u64, output: &Path) -> Result<()>;

    /// Start downloading the video to `output` and return immediately.
    fn start_video(&self, video_id: u64, output: &Path) -> Result<Box<dyn RunningTransfer>>;
}

/// Interface for the [TwitchDownloader](https://github.com/lay295/TwitchDownloader) CLI
#[derive(Debug, Clone)]
pub struct TwitchDownloader {
    program: String,
    temp_dir: Option<PathBuf>,
}

impl TwitchDownloader {
    pub fn new(program: impl Into<String>, temp_dir: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            temp_dir,
        }
    }

    fn with_temp_dir<'c>(&self, cmd: &'c mut Command) -> &'c mut Command {
        if let Some(temp_dir) = &self.temp_dir {
            cmd.args([OsStr::new("--temp-path"), temp_dir.as_os_str()])
        } else {
            cmd
        }
    }
}

impl MediaDownloader for TwitchDownloader {
    fn program(&self) -> &str {
        &self.program
    }

    fn download_chat(&self, video_id: u64, output: &Path) -> Result<()> {
        assert_success_command(&self.program, "download chat history", |cmd| {
            let cmd = cmd
                .arg("chatdownload")
                .arg("--embed-images")
                .args(["--id", &video_id.to_string()])
                .args([OsStr::new("-o"), output.as_os_str()]);
            self.with_temp_dir(cmd)
        })
    }

    fn start_video(&self, video_id: u64, output: &Path) -> Result<Box<dyn RunningTransfer>> {
        let child = spawn_command(
            &self.program,
            |cmd| {
                let cmd = cmd
                    .arg("videodownload")
                    .args(["--id", &video_id.to_string()])
                    .args([OsStr::new("-o"), output.as_os_str()]);
                self.with_temp_dir(cmd)
            },
            Capture::INHERIT,
        )?;

        Ok(Box::new(ChildTransfer {
            child,
            program: self.program.clone(),
        }))
    }
}

struct ChildTransfer {
    child: Child,
    program: String,
}

impl ChildTransfer {
    fn io_error(&self, err: std::io::Error) -> Error {
        Error::from(err).wrap_err_with(|| format!("Could not wait for {}", self.program))
    }
}

impl RunningTransfer for ChildTransfer {
    fn try_wait(&mut self) -> Result<Option<bool>> {
        match self.child.try_wait() {
            Ok(status) => Ok(status.map(|s| s.success())),
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn wait(&mut self) -> Result<Option<i32>> {
        match self.child.wait() {
            Ok(status) => Ok(status.code()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}
