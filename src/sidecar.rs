use std::path::Path;

use miette::{Context, IntoDiagnostic};
use serde::Serialize;

use crate::{
    catalog::{Catalog, Membership, WorkItem},
    io::{write_if_changed, WriteOutcome},
    layout::Layout,
    result::Result,
};

/// The small json document written next to every asset
#[derive(Debug, Serialize)]
pub struct Sidecar<'a> {
    title: &'a str,
    broadcast_type: &'a str,
    views: u64,
    seconds: u64,
    created_at: &'a str,
    url: &'a str,
    id: u64,
    /// -1 when the video is not in any collection
    collection_index: i64,
    collection_title: &'a str,
    /// Primary collection of the video when written for another collection
    collection_title_external: &'a str,
}

impl<'a> Sidecar<'a> {
    pub fn new(catalog: &'a Catalog, item: &'a WorkItem, context: Option<Membership>) -> Self {
        let effective = context.or_else(|| item.primary());
        let group_title = move |m: Option<Membership>| {
            m.map_or("", |m| catalog.groups[m.group].title.as_str())
        };

        Self {
            title: &item.title,
            broadcast_type: &item.kind,
            views: item.views,
            seconds: item.duration_secs,
            created_at: &item.created_at_raw,
            url: &item.url,
            id: item.id,
            collection_index: effective.map_or(-1, |m| i64::from(m.ordinal)),
            collection_title: group_title(effective),
            collection_title_external: if Layout::is_external(item, context) {
                group_title(item.primary())
            } else {
                ""
            },
        }
    }

    pub fn render(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)
            .into_diagnostic()
            .wrap_err("Could not serialize metadata")?)
    }

    /// Create or refresh the document at `path`. Unchanged documents are not rewritten.
    pub fn write(&self, path: &Path, dry_run: bool) -> Result<WriteOutcome> {
        write_if_changed(path, self.render()?.as_bytes(), dry_run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{group, item};

    #[test]
    fn describes_external_references() {
        let mut catalog = Catalog::new(
            vec![item(42, "Finale", 300, 1)],
            vec![
                group("Season", &[("Finale", 300)]),
                group("Best of", &[("Other", 1), ("Finale", 300)]),
            ],
        );
        catalog.resolve();
        let finale = &catalog.items[0];

        let json: serde_json::Value =
            serde_json::from_str(&Sidecar::new(&catalog, finale, Some(finale.memberships[1])).render().unwrap())
                .unwrap();

        assert_eq!(json["id"], 42);
        assert_eq!(json["collection_index"], 2);
        assert_eq!(json["collection_title"], "Best of");
        assert_eq!(json["collection_title_external"], "Season");
    }

    #[test]
    fn ungrouped_items_have_no_collection() {
        let catalog = Catalog::new(vec![item(7, "Solo", 30, 1)], vec![]);

        let json: serde_json::Value =
            serde_json::from_str(&Sidecar::new(&catalog, &catalog.items[0], None).render().unwrap())
                .unwrap();

        assert_eq!(json["collection_index"], -1);
        assert_eq!(json["collection_title"], "");
        assert_eq!(json["collection_title_external"], "");
        assert_eq!(json["seconds"], 30);
    }

    #[test]
    fn rewriting_unchanged_sidecar_is_byte_identical_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let catalog = Catalog::new(vec![item(7, "Solo", 30, 1)], vec![]);
        let sidecar = Sidecar::new(&catalog, &catalog.items[0], None);

        assert_eq!(sidecar.write(&path, false).unwrap(), WriteOutcome::Created);
        let first = std::fs::read(&path).unwrap();
        assert_eq!(sidecar.write(&path, false).unwrap(), WriteOutcome::Unchanged);
        assert_eq!(std::fs::read(&path).unwrap(), first);
    }
}
