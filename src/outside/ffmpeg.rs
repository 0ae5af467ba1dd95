use std::{ffi::OsStr, fmt::Debug, path::Path, process::Command};

use miette::{Context, IntoDiagnostic};
use serde::Deserialize;

use crate::{
    result::{Error, Result},
    types::Timestamp,
};

use super::command::{assert_success_command, run_command, Capture, FFXXX_DEFAULT_ARGS};

pub trait StreamTransformer: Sync + Debug {
    /// Presentation timestamps of the keyframes of the first video stream
    /// found between `from` and `to`.
    ///
    /// Frames without a decodable timestamp are left out.
    fn keyframes(&self, input: &Path, from: Timestamp, to: Timestamp) -> Result<Vec<Timestamp>>;

    /// Copy `duration` of the streams starting at the input position `seek`
    /// into `output`, without re-encoding.
    fn extract_segment(
        &self,
        input: &Path,
        output: &Path,
        seek: Timestamp,
        duration: Timestamp,
    ) -> Result<()>;

    /// Duration of the container
    fn duration(&self, input: &Path) -> Result<Timestamp>;
}

/// Interface for the [ffmpeg & ffprobe](https://ffmpeg.org) programs
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: String,
    ffprobe: String,
}

impl Ffmpeg {
    /// Verify that the `ffmpeg` and `ffprobe` binaries are reachable
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Result<Self> {
        let this = Self::unchecked(ffmpeg, ffprobe);
        assert_success_command(&this.ffmpeg, "report its version", |cmd| cmd.arg("-version"))?;
        assert_success_command(&this.ffprobe, "report its version", |cmd| cmd.arg("-version"))?;

        Ok(this)
    }

    /// Build the handle without running anything, for dry runs
    pub fn unchecked(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn probe_json<F: FnOnce(&mut Command) -> &mut Command>(&self, f: F) -> Result<Vec<u8>> {
        let res = run_command(&self.ffprobe, f, Capture::STDOUT | Capture::STDERR)?;
        if res.status.success() {
            Ok(res.stdout)
        } else {
            Err(Error::Finalize {
                program: self.ffprobe.clone(),
                code: res.status.code(),
                what: format!(
                    "probe the file: {}",
                    String::from_utf8_lossy(&res.stderr).trim()
                ),
            })
        }
    }
}

impl StreamTransformer for Ffmpeg {
    fn keyframes(&self, input: &Path, from: Timestamp, to: Timestamp) -> Result<Vec<Timestamp>> {
        let interval = format!("{}%{}", from.to_secs_string(), to.to_secs_string());
        let stdout = self.probe_json(|cmd| {
            cmd.args(["-v", "error"])
                .args(["-select_streams", "v:0"])
                .args(["-skip_frame", "nokey"])
                .args(["-read_intervals", &interval])
                .args(["-show_entries", "frame=key_frame,pts_time"])
                .args(["-of", "json"])
                .arg(input)
        })?;

        parse_keyframes(&stdout)
    }

    fn extract_segment(
        &self,
        input: &Path,
        output: &Path,
        seek: Timestamp,
        duration: Timestamp,
    ) -> Result<()> {
        // Seeking must happen on the input side: an output-side -ss produces
        // non-monotonic timestamps when copying streams
        assert_success_command(&self.ffmpeg, "extract the segment", |cmd| {
            cmd.args(FFXXX_DEFAULT_ARGS)
                .arg("-n")
                .args(["-ss", &seek.to_string()])
                .args([OsStr::new("-i"), input.as_os_str()])
                .args(["-t", &duration.to_secs_string()])
                .args(["-map", "0"])
                .args(["-c", "copy"])
                .args(["-avoid_negative_ts", "make_zero"])
                .arg(output)
        })
    }

    fn duration(&self, input: &Path) -> Result<Timestamp> {
        let stdout = self.probe_json(|cmd| {
            cmd.args(["-v", "error"])
                .args(["-show_entries", "format=duration"])
                .args(["-of", "json"])
                .arg(input)
        })?;

        parse_duration(&stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FramesOutput {
    #[serde(default)]
    frames: Vec<ProbeFrame>,
}

#[derive(Debug, Deserialize)]
struct ProbeFrame {
    key_frame: Option<u8>,
    pts_time: Option<String>,
}

fn parse_keyframes(json: &[u8]) -> Result<Vec<Timestamp>> {
    let output: FramesOutput = serde_json::from_slice(json)
        .into_diagnostic()
        .wrap_err("Could not parse ffprobe frames output")?;

    Ok(output
        .frames
        .into_iter()
        .filter(|frame| frame.key_frame == Some(1))
        .filter_map(|frame| frame.pts_time?.parse::<f64>().ok())
        .filter_map(Timestamp::from_secs_f64)
        .collect())
}

#[derive(Debug, Deserialize)]
struct FormatOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_duration(json: &[u8]) -> Result<Timestamp> {
    let output: FormatOutput = serde_json::from_slice(json)
        .into_diagnostic()
        .wrap_err("Could not parse ffprobe format output")?;

    let duration = output
        .format
        .duration
        .ok_or_else(|| miette::miette!("ffprobe did not report a duration"))?;

    duration
        .parse::<f64>()
        .ok()
        .and_then(Timestamp::from_secs_f64)
        .ok_or_else(|| miette::miette!("Invalid duration '{duration}'").into())
}
