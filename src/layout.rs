use std::path::{Path, PathBuf};

use time::{format_description::FormatItem, macros::format_description, UtcOffset};

use crate::catalog::{Catalog, Membership, WorkItem};

const DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]-[minute]-[second]");

/// Characters that are not allowed or troublesome in file names
const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '\'', '<', '>', '|'];

/// Where and under which names the assets of an item are written.
///
/// `context` is the group through which the item is being processed.
/// Without context, the primary group (if any) is used.
/// File dates are rendered in `offset`, UTC unless told otherwise.
#[derive(Debug, Clone)]
pub struct Layout {
    output_dir: PathBuf,
    offset: UtcOffset,
}

impl Layout {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            offset: UtcOffset::UTC,
        }
    }

    /// Render the file dates in `offset`, usually the local one
    pub fn with_offset(self, offset: UtcOffset) -> Self {
        Self { offset, ..self }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn effective(item: &WorkItem, context: Option<Membership>) -> Option<Membership> {
        context.or_else(|| item.primary())
    }

    /// Whether the item is processed through another group than its primary one
    pub fn is_external(item: &WorkItem, context: Option<Membership>) -> bool {
        context.is_some() && context != item.primary()
    }

    pub fn directory(&self, catalog: &Catalog, item: &WorkItem, context: Option<Membership>) -> PathBuf {
        match Self::effective(item, context) {
            Some(m) => self.output_dir.join(&catalog.groups[m.group].title),
            None => self.output_dir.clone(),
        }
    }

    /// `Group/` prefix shown in messages
    pub fn display_prefix(catalog: &Catalog, item: &WorkItem, context: Option<Membership>) -> String {
        Self::effective(item, context)
            .map(|m| format!("{}/", catalog.groups[m.group].title))
            .unwrap_or_default()
    }

    fn with_ordinal(item: &WorkItem, context: Option<Membership>, name: String) -> String {
        match Self::effective(item, context) {
            Some(m) => format!("{:03}  {name}", m.ordinal),
            None => name,
        }
    }

    fn date(&self, item: &WorkItem) -> String {
        item.created_at
            .to_offset(self.offset)
            .format(DATE_FORMAT)
            .unwrap_or_else(|_| item.created_at_raw.clone())
    }

    pub fn metadata_filename(&self, item: &WorkItem, context: Option<Membership>) -> String {
        let suffix = if Self::is_external(item, context) {
            " (external)"
        } else {
            ""
        };
        let name = format!("{}  metadata{suffix}.json", self.date(item));
        Self::with_ordinal(item, context, name)
    }

    pub fn chat_filename(&self, item: &WorkItem) -> String {
        Self::with_ordinal(item, None, format!("{}  chat.json", self.date(item)))
    }

    pub fn thumbnail_filename(&self, item: &WorkItem) -> String {
        Self::with_ordinal(item, None, format!("{}  thumbnail.jpg", self.date(item)))
    }

    pub fn video_filename(&self, item: &WorkItem) -> String {
        let title: String = item
            .title
            .chars()
            .filter(|c| !FORBIDDEN_CHARS.contains(c))
            .collect();
        Self::with_ordinal(item, None, format!("{}  {title}.mp4", self.date(item)))
    }

    pub fn metadata_path(&self, catalog: &Catalog, item: &WorkItem, context: Option<Membership>) -> PathBuf {
        self.directory(catalog, item, context)
            .join(self.metadata_filename(item, context))
    }

    /// Chat logs only live at the primary location
    pub fn chat_path(&self, catalog: &Catalog, item: &WorkItem) -> PathBuf {
        self.directory(catalog, item, None).join(self.chat_filename(item))
    }

    pub fn thumbnail_path(&self, catalog: &Catalog, item: &WorkItem) -> PathBuf {
        self.directory(catalog, item, None).join(self.thumbnail_filename(item))
    }

    /// Videos only live at the primary location
    pub fn video_path(&self, catalog: &Catalog, item: &WorkItem) -> PathBuf {
        self.directory(catalog, item, None).join(self.video_filename(item))
    }
}
