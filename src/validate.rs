use tracing::{debug, info, warn};

use crate::{catalog::Catalog, layout::Layout, outside::StreamTransformer, types::Timestamp};

/// Difference tolerated between the catalog duration and the probed one
pub const DURATION_TOLERANCE: Timestamp = Timestamp::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationMismatch {
    pub id: u64,
    pub expected: Timestamp,
    pub actual: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Videos present on disk and successfully probed
    pub checked: usize,
    /// Videos present on disk that could not be probed
    pub unreadable: usize,
    pub mismatches: Vec<DurationMismatch>,
}

/// Compare the duration of every downloaded video with the catalog.
///
/// Best effort: missing videos are ignored and probe failures are only logged.
pub fn validate_durations(
    catalog: &Catalog,
    layout: &Layout,
    stream_tsf: &dyn StreamTransformer,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    for item in &catalog.items {
        let path = layout.video_path(catalog, item);
        if !path.is_file() {
            debug!("Not downloaded: {}", path.display());
            continue;
        }

        let actual = match stream_tsf.duration(&path) {
            Ok(actual) => actual,
            Err(err) => {
                let report_err = miette::Report::from(err);
                warn!("Could not probe {}: {report_err}", path.display());
                report.unreadable += 1;
                continue;
            }
        };
        report.checked += 1;

        let expected = Timestamp::from_secs(item.duration_secs);
        let difference = actual
            .saturating_sub(expected)
            .max(expected.saturating_sub(actual));
        if difference > DURATION_TOLERANCE {
            warn!(
                "{} lasts {actual} but the catalog says {expected}",
                path.display()
            );
            report.mismatches.push(DurationMismatch {
                id: item.id,
                expected,
                actual,
            });
        }
    }

    info!(
        "{} videos checked, {} with an unexpected duration, {} unreadable",
        report.checked,
        report.mismatches.len(),
        report.unreadable
    );
    report
}
