use std::collections::HashSet;

use crate::{
    catalog::{Catalog, GroupIdx, ItemIdx, Membership, WorkItem},
    layout::Layout,
    types::Order,
};

/// Which items of the catalog a run processes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// The whole catalog
    All,
    /// Only items that are not in any group
    NonCollections,
    /// The members of these groups, in this order
    Collections(Vec<GroupIdx>),
}

/// One unit of scheduling: an item seen through one of its groups (or none)
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub item: &'a WorkItem,
    pub context: Option<Membership>,
}

impl DownloadRequest<'_> {
    /// External requests only produce metadata, the assets belong to the primary one
    pub fn is_external(&self) -> bool {
        Layout::is_external(self.item, self.context)
    }
}

/// Expand an item into its requests: one per membership, the external ones first
/// and the primary one last. Ungrouped items give a single request without context.
pub fn expand(item: &WorkItem) -> Vec<DownloadRequest<'_>> {
    if item.memberships.is_empty() {
        return vec![DownloadRequest {
            item,
            context: None,
        }];
    }

    item.memberships
        .iter()
        .rev()
        .map(|&m| DownloadRequest {
            item,
            context: Some(m),
        })
        .collect()
}

/// The items to process, in processing order.
///
/// Walking groups, an item reachable through several of them is only visited the first time.
pub fn traversal<'a>(catalog: &'a Catalog, selection: &Selection, order: Order) -> Vec<&'a WorkItem> {
    match selection {
        Selection::All => order.apply(&catalog.items).collect(),
        Selection::NonCollections => order
            .apply(&catalog.items)
            .filter(|item| item.memberships.is_empty())
            .collect(),
        Selection::Collections(groups) => {
            let mut visited: HashSet<ItemIdx> = HashSet::new();
            groups
                .iter()
                .flat_map(|&g| order.apply(&catalog.groups[g].entries))
                .filter_map(|entry| entry.item)
                .filter(|&idx| visited.insert(idx))
                .map(|idx| &catalog.items[idx])
                .collect()
        }
    }
}
