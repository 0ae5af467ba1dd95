use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Group, GroupEntry};
use crate::{
    result::{Error, Result},
    types::Timestamp,
};

/// Number of non-blank lines describing one entry
const RECORD_LINES: usize = 7;

/// Read every collection file of the directory, ordered by file name.
///
/// A missing directory simply means that there are no collections.
pub fn read_collections_dir(dir: &Path) -> Result<Vec<Group>> {
    if !dir.is_dir() {
        debug!("No collections folder at {}", dir.display());
        return Ok(vec![]);
    }

    let mut files: Vec<PathBuf> = dir
        .read_dir()
        .map_err(|err| {
            Error::Configuration(format!("Could not read folder {}: {err}", dir.display()))
        })?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    files
        .iter()
        .map(|file| {
            let title = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = std::fs::read_to_string(file).map_err(|err| {
                Error::Configuration(format!("Could not read {}: {err}", file.display()))
            })?;
            parse_collection(title, &content).map_err(|err| {
                Error::Configuration(format!("{}: {err}", file.display()))
            })
        })
        .collect()
}

/// Parse the text copied from a collection page.
///
/// Every entry spans 7 non-blank lines: 2 ignored, the title, the date,
/// the length, and 2 more ignored.
pub fn parse_collection(title: String, content: &str) -> std::result::Result<Group, String> {
    let lines: Vec<&str> = content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect();

    let entries = lines
        .chunks(RECORD_LINES)
        .enumerate()
        .map(|(i, record)| {
            let ordinal = i as u32 + 1;
            let [_, _, title, date, length, ..] = record else {
                return Err(format!("entry {ordinal} is truncated"));
            };

            let duration_secs = length
                .trim()
                .parse::<Timestamp>()
                .map_err(|err| format!("entry {ordinal} has an invalid length '{length}': {err}"))?
                .as_secs();

            Ok(GroupEntry {
                ordinal,
                title: title.trim().to_owned(),
                date: date.trim().to_owned(),
                duration_secs,
                item: None,
            })
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Group { title, entries })
}
