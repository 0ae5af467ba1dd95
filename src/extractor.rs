use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::{
    outside::StreamTransformer,
    result::{Error, Result},
    types::{Timeframe, Timestamp},
};

/// How far before the requested start keyframes are looked for
pub const KEYFRAME_WINDOW: Timestamp = Timestamp::from_secs(10);

/// The cut actually performed for a requested timeframe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CutPlan {
    pub output: PathBuf,
    /// Keyframe from which the copy starts
    pub seek: Timestamp,
    /// From `seek` to the requested stop
    pub duration: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// The output already exists, nothing was done
    Skipped(PathBuf),
    /// Dry run, nothing was probed nor written
    Planned(PathBuf),
    Extracted(CutPlan),
}

/// Cut segments out of a media file without re-encoding.
///
/// Streams can only be copied starting at a keyframe, so the segment starts at
/// the last keyframe before the requested start and is longer than requested.
#[derive(Debug)]
pub struct SegmentExtractor<'a> {
    stream_tsf: &'a dyn StreamTransformer,
}

impl<'a> SegmentExtractor<'a> {
    pub fn new(stream_tsf: &'a dyn StreamTransformer) -> Self {
        Self { stream_tsf }
    }

    /// `<name> <start>-<stop><ext>`, next to the source
    pub fn output_path(source: &Path, timeframe: &Timeframe) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = source
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        source.with_file_name(format!(
            "{stem} {}-{}{ext}",
            timeframe.start.to_file_component(),
            timeframe.stop.to_file_component()
        ))
    }

    /// The latest candidate strictly before `start`, the stream start if there is none
    pub fn nearest_keyframe(keyframes: &[Timestamp], start: Timestamp) -> Timestamp {
        keyframes
            .iter()
            .copied()
            .filter(|&k| k < start)
            .chain([Timestamp::ZERO])
            .max()
            .unwrap_or(Timestamp::ZERO)
    }

    pub fn extract(&self, source: &Path, timeframe: Timeframe, dry_run: bool) -> Result<ExtractOutcome> {
        if !source.is_file() {
            return Err(Error::Configuration(format!(
                "No such media file: {}",
                source.display()
            )));
        }

        let output = Self::output_path(source, &timeframe);
        if output.exists() {
            info!("Skipping:    {} already exists", output.display());
            return Ok(ExtractOutcome::Skipped(output));
        }

        if dry_run {
            info!("Extracting:  {} ({timeframe})", output.display());
            return Ok(ExtractOutcome::Planned(output));
        }

        let window_start = timeframe.start.saturating_sub(KEYFRAME_WINDOW);
        let keyframes = self
            .stream_tsf
            .keyframes(source, window_start, timeframe.start)
            .map_err(|err| err.wrap_err_with(|| "Could not list the keyframes"))?;
        debug!("{} keyframes between {window_start} and {}", keyframes.len(), timeframe.start);

        let seek = Self::nearest_keyframe(&keyframes, timeframe.start);
        let duration = timeframe.stop.saturating_sub(seek);

        info!(
            "Extracting:  {} (from keyframe {seek}, {}s)",
            output.display(),
            duration.to_secs_string()
        );
        self.stream_tsf
            .extract_segment(source, &output, seek, duration)
            .map_err(|err| err.wrap_err_with(|| "Could not extract the segment"))?;

        Ok(ExtractOutcome::Extracted(CutPlan {
            output,
            seek,
            duration,
        }))
    }
}
