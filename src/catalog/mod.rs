//! The catalog of archived videos and the collections referencing them.

mod collections;
mod details;

use std::{collections::HashMap, fmt::Display, path::Path};

use time::OffsetDateTime;
use tracing::{debug, error};

use crate::result::{Error, Result};

pub use collections::read_collections_dir;
pub use details::read_details_dir;

/// Index of a [`WorkItem`] in [`Catalog::items`]
pub type ItemIdx = usize;

/// Index of a [`Group`] in [`Catalog::groups`]
pub type GroupIdx = usize;

/// One archived video
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Numeric id of the video on the platform
    pub id: u64,
    pub url: String,
    pub title: String,
    /// Raw broadcast type (archive, highlight, upload...)
    pub kind: String,
    pub views: u64,
    pub duration_secs: u64,
    /// Creation date as written in the catalog
    pub created_at_raw: String,
    pub created_at: OffsetDateTime,
    /// Preview image, when the catalog has one
    pub thumbnail_url: Option<String>,
    /// Groups referencing this item, the first one is the primary group
    pub memberships: Vec<Membership>,
}

impl WorkItem {
    pub fn primary(&self) -> Option<Membership> {
        self.memberships.first().copied()
    }
}

/// Reference of an item inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Membership {
    pub group: GroupIdx,
    /// One-based position in the group
    pub ordinal: u32,
}

/// A named, ordered list of references to items (a curated playlist)
#[derive(Debug, Clone)]
pub struct Group {
    pub title: String,
    pub entries: Vec<GroupEntry>,
}

#[derive(Debug, Clone)]
pub struct GroupEntry {
    pub ordinal: u32,
    pub title: String,
    pub date: String,
    pub duration_secs: u64,
    /// Set once resolved against the catalog
    pub item: Option<ItemIdx>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFailure {
    NoMatch,
    Ambiguous(usize),
}

/// A group entry that could not be matched to exactly one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    pub group: String,
    pub entry: String,
    pub failure: ResolutionFailure,
}

impl Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.failure {
            ResolutionFailure::NoMatch => write!(
                f,
                "The collection entry '{}' in the collection '{}' has no matching video in the videos csv file",
                self.entry, self.group
            ),
            ResolutionFailure::Ambiguous(count) => write!(
                f,
                "The collection entry '{}' in the collection '{}' matches {count} videos in the videos csv file",
                self.entry, self.group
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    /// Items in chronological order
    pub items: Vec<WorkItem>,
    pub groups: Vec<Group>,
}

impl Catalog {
    pub fn new(mut items: Vec<WorkItem>, groups: Vec<Group>) -> Self {
        // Stable, so items created at the same instant keep the catalog order
        items.sort_by_key(|item| item.created_at);
        Self { items, groups }
    }

    /// Read the details csv file and the collection files of the configuration directory.
    ///
    /// The returned catalog is not resolved yet, see [`Catalog::resolve`].
    pub fn load(config_dir: &Path, accepted_types: Option<&[String]>) -> Result<Self> {
        if !config_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "No such configuration folder: {}",
                config_dir.display()
            )));
        }

        let mut items = read_details_dir(config_dir)?;
        if let Some(accepted) = accepted_types {
            let before = items.len();
            items.retain(|item| accepted.iter().any(|t| t.eq_ignore_ascii_case(&item.kind)));
            debug!("{} videos filtered out by type", before - items.len());
        }

        let groups = read_collections_dir(&config_dir.join("collections"))?;
        Ok(Self::new(items, groups))
    }

    pub fn group_by_title(&self, title: &str) -> Option<GroupIdx> {
        self.groups.iter().position(|g| g.title == title)
    }

    /// Link every group entry to its item by matching the duration and title.
    ///
    /// Entries matching none or several items are logged and returned, they stay unresolved.
    /// Memberships are added in group order then entry order.
    pub fn resolve(&mut self) -> Vec<ResolutionError> {
        let mut lookup: HashMap<(u64, &str), Vec<ItemIdx>> = HashMap::new();
        for (idx, item) in self.items.iter().enumerate() {
            lookup
                .entry((item.duration_secs, item.title.trim()))
                .or_default()
                .push(idx);
        }

        let mut errors = Vec::new();
        let mut links = Vec::new();
        for (group_idx, group) in self.groups.iter().enumerate() {
            for (entry_idx, entry) in group.entries.iter().enumerate() {
                let key = (entry.duration_secs, entry.title.trim());
                let failure = match lookup.get(&key).map(Vec::as_slice) {
                    Some(&[item]) => {
                        links.push((group_idx, entry_idx, item));
                        continue;
                    }
                    None | Some(&[]) => ResolutionFailure::NoMatch,
                    Some(matches) => ResolutionFailure::Ambiguous(matches.len()),
                };

                let err = ResolutionError {
                    group: group.title.clone(),
                    entry: entry.title.clone(),
                    failure,
                };
                error!("{err}");
                errors.push(err);
            }
        }
        drop(lookup);

        for (group_idx, entry_idx, item) in links {
            let entry = &mut self.groups[group_idx].entries[entry_idx];
            entry.item = Some(item);
            self.items[item].memberships.push(Membership {
                group: group_idx,
                ordinal: entry.ordinal,
            });
        }

        errors
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use time::macros::datetime;

    use super::*;

    pub(crate) fn item(id: u64, title: &str, duration_secs: u64, day: u8) -> WorkItem {
        let created_at = datetime!(2023-03-01 18:00:00 UTC)
            .replace_day(day)
            .unwrap_or(datetime!(2023-03-01 18:00:00 UTC));
        WorkItem {
            id,
            url: format!("https://www.twitch.tv/videos/{id}"),
            title: title.to_owned(),
            kind: "highlight".to_owned(),
            views: 10,
            duration_secs,
            created_at_raw: created_at.to_string(),
            created_at,
            thumbnail_url: None,
            memberships: vec![],
        }
    }

    pub(crate) fn group(title: &str, entries: &[(&str, u64)]) -> Group {
        Group {
            title: title.to_owned(),
            entries: entries
                .iter()
                .enumerate()
                .map(|(i, (title, secs))| GroupEntry {
                    ordinal: i as u32 + 1,
                    title: (*title).to_owned(),
                    date: String::new(),
                    duration_secs: *secs,
                    item: None,
                })
                .collect(),
        }
    }

    #[test]
    fn keeps_items_chronological() {
        let catalog = Catalog::new(vec![item(2, "b", 1, 5), item(1, "a", 1, 2)], vec![]);
        let ids: Vec<u64> = catalog.items.iter().map(|i| i.id).collect();
        assert_eq!(ids, [1, 2]);
    }

    #[test]
    fn resolves_by_duration_and_title() {
        let length = |s: &str| s.parse::<crate::types::Timestamp>().unwrap().as_secs();
        let mut catalog = Catalog::new(
            vec![item(1, "Intro", 125, 1)],
            vec![
                group("Good", &[("Intro", length("2:05"))]),
                group("Bad", &[("Intro", length("2:06"))]),
            ],
        );

        let errors = catalog.resolve();

        assert_eq!(catalog.groups[0].entries[0].item, Some(0));
        assert_eq!(
            errors,
            vec![ResolutionError {
                group: "Bad".into(),
                entry: "Intro".into(),
                failure: ResolutionFailure::NoMatch,
            }]
        );
        assert_eq!(catalog.groups[1].entries[0].item, None);
        assert_eq!(
            catalog.items[0].memberships,
            vec![Membership { group: 0, ordinal: 1 }]
        );
    }

    #[test]
    fn reports_ambiguous_entries() {
        let mut catalog = Catalog::new(
            vec![item(1, "Rerun", 60, 1), item(2, "Rerun", 60, 2)],
            vec![group("Reruns", &[("Rerun", 60)])],
        );

        let errors = catalog.resolve();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].failure, ResolutionFailure::Ambiguous(2));
        assert!(catalog.items.iter().all(|i| i.memberships.is_empty()));
    }

    #[test]
    fn first_group_is_primary() {
        let mut catalog = Catalog::new(
            vec![item(1, "Finale", 300, 1)],
            vec![
                group("Season", &[("Other", 1), ("Finale", 300)]),
                group("Best of", &[("Finale", 300)]),
            ],
        );

        assert!(catalog.resolve().len() == 1);
        let finale = &catalog.items[0];
        assert_eq!(finale.primary(), Some(Membership { group: 0, ordinal: 2 }));
        assert_eq!(finale.memberships.len(), 2);
    }
}
