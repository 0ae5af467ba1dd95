use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};

use regex::Regex;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;

use super::WorkItem;
use crate::result::{Error, Result};

/// A row of the videos csv file, as exported from the platform
#[derive(Debug, Deserialize)]
struct DetailRow {
    #[serde(rename = "URL")]
    url: String,
    title: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "viewCount", default)]
    view_count: u64,
    duration: String,
    #[serde(rename = "createdAt")]
    created_at: String,
    /// Optional column, absent from older exports
    #[serde(rename = "thumbnailUrl", default)]
    thumbnail_url: Option<String>,
}

/// Durations look like `1h2m3s`, every unit being optional
fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap())
}

/// The video id is the number ending the URL
fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(\d+)/?$").unwrap())
}

fn parse_duration(duration: &str) -> Option<u64> {
    let duration = duration.trim();
    if duration.is_empty() {
        return None;
    }

    let cap = duration_re().captures(duration)?;
    let unit = |i| -> Option<u64> {
        cap.get(i).map_or(Some(0), |m| m.as_str().parse().ok())
    };

    Some(unit(1)? * 3600 + unit(2)? * 60 + unit(3)?)
}

fn parse_id(url: &str) -> Option<u64> {
    id_re().captures(url.trim())?.get(1)?.as_str().parse().ok()
}

impl TryFrom<DetailRow> for WorkItem {
    type Error = String;

    fn try_from(row: DetailRow) -> std::result::Result<Self, Self::Error> {
        let id = parse_id(&row.url).ok_or_else(|| format!("no video id in URL '{}'", row.url))?;
        let duration_secs = parse_duration(&row.duration)
            .ok_or_else(|| format!("invalid duration '{}'", row.duration))?;
        let created_at = OffsetDateTime::parse(row.created_at.trim(), &Rfc3339)
            .map_err(|err| format!("invalid creation date '{}': {err}", row.created_at))?;

        Ok(WorkItem {
            id,
            url: row.url,
            title: row.title,
            kind: row.kind,
            views: row.view_count,
            duration_secs,
            created_at_raw: row.created_at,
            created_at,
            thumbnail_url: row
                .thumbnail_url
                .map(|url| url.trim().to_owned())
                .filter(|url| !url.is_empty()),
            memberships: vec![],
        })
    }
}

/// Find the first csv file of the directory, by file name
fn find_csv_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut csv_files: Vec<PathBuf> = dir
        .read_dir()
        .map_err(|err| {
            Error::Configuration(format!("Could not read folder {}: {err}", dir.display()))
        })?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "csv"))
        .collect();

    csv_files.sort();
    Ok(csv_files.into_iter().next())
}

/// Read every video of the csv file found in the configuration directory
pub fn read_details_dir(config_dir: &Path) -> Result<Vec<WorkItem>> {
    let csv_file = find_csv_file(config_dir)?.ok_or_else(|| {
        Error::Configuration(format!("Missing csv file in: {}", config_dir.display()))
    })?;

    debug!("Reading videos from {}", csv_file.display());
    let reader = csv::Reader::from_path(&csv_file).map_err(|err| {
        Error::Configuration(format!("Could not open {}: {err}", csv_file.display()))
    })?;

    read_details(reader, &csv_file)
}

fn read_details<R: std::io::Read>(mut reader: csv::Reader<R>, origin: &Path) -> Result<Vec<WorkItem>> {
    reader
        .deserialize::<DetailRow>()
        .enumerate()
        .map(|(i, row)| {
            // +2: one-based, and the header line
            let line = i + 2;
            let row = row.map_err(|err| {
                Error::Configuration(format!("{} line {line}: {err}", origin.display()))
            })?;
            WorkItem::try_from(row).map_err(|err| {
                Error::Configuration(format!("{} line {line}: {err}", origin.display()))
            })
        })
        .collect()
}
