//! Read-only reports over the resolved catalog.

use std::{collections::HashMap, io::Write};

use crate::{catalog::Catalog, pipeline::Selection, result::Result};

pub fn list_collections(catalog: &Catalog, out: &mut impl Write) -> Result<()> {
    for group in &catalog.groups {
        writeln!(out, "{}", group.title)?;
    }
    Ok(())
}

/// Print every item whose title is shared with another one, then the number of such titles
pub fn list_duplicate_titles(catalog: &Catalog, out: &mut impl Write) -> Result<()> {
    let mut titles: Vec<&str> = vec![];
    let mut by_title: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, item) in catalog.items.iter().enumerate() {
        let same = by_title.entry(item.title.as_str()).or_insert_with(|| {
            titles.push(&item.title);
            vec![]
        });
        same.push(idx);
    }

    let mut duplicated = 0;
    for title in titles {
        let same = &by_title[title];
        if same.len() < 2 {
            continue;
        }

        duplicated += 1;
        for &idx in same {
            let item = &catalog.items[idx];
            writeln!(
                out,
                "{}  {}  {}  {}",
                same.len(),
                item.created_at_raw,
                item.url,
                item.title
            )?;
        }
    }

    writeln!(out, "unique duplicate title count: {duplicated}")?;
    Ok(())
}

/// Print the ungrouped items and the content of the selected groups
pub fn list_videos(catalog: &Catalog, selection: &Selection, out: &mut impl Write) -> Result<()> {
    if matches!(selection, Selection::All | Selection::NonCollections) {
        writeln!(out, "Videos not in any collections:")?;
        for item in catalog.items.iter().filter(|i| i.memberships.is_empty()) {
            writeln!(out, "  {}  {}", item.created_at_raw, item.title)?;
        }
    }

    for (idx, group) in catalog.groups.iter().enumerate() {
        let selected = match selection {
            Selection::All => true,
            Selection::NonCollections => false,
            Selection::Collections(groups) => groups.contains(&idx),
        };
        if !selected {
            continue;
        }

        writeln!(out, "{}:", group.title)?;
        for entry in &group.entries {
            let date = entry
                .item
                .map_or(entry.date.as_str(), |i| catalog.items[i].created_at_raw.as_str());
            writeln!(out, "  {:>3}  {date}  {}", entry.ordinal, entry.title)?;
        }
    }

    Ok(())
}
