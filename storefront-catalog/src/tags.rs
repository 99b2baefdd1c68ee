//! Tag reconciliation for the product/tag associative table.
//!
//! Given the tag ids currently associated with a product and the full list the
//! caller wants, [`reconcile`] works out the smallest set of rows to insert and
//! delete. It is a pure function; applying the plan is the store's job.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::product::{ProductId, TagId};

/// A (product, tag) pair that should exist in the associative table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagLink {
    pub product_id: ProductId,
    pub tag_id: TagId,
}

/// Rows to insert and tag ids to delete for one product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPlan {
    /// In the order the ids first appear in the desired list.
    pub to_create: Vec<TagLink>,
    /// In the order the ids appear in the current list.
    pub to_remove: Vec<TagId>,
}

impl TagPlan {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_remove.is_empty()
    }
}

/// Computes the associations to add and remove so that `current` becomes `desired`.
///
/// Ids present in both lists are left alone. Duplicates in `desired` produce a
/// single link.
pub fn reconcile(product_id: ProductId, current: &[TagId], desired: &[TagId]) -> TagPlan {
    let current_set: HashSet<TagId> = current.iter().copied().collect();
    let desired_set: HashSet<TagId> = desired.iter().copied().collect();

    let to_create = dedup_tag_ids(desired)
        .into_iter()
        .filter(|id| !current_set.contains(id))
        .map(|tag_id| TagLink { product_id, tag_id })
        .collect();

    let to_remove = dedup_tag_ids(current)
        .into_iter()
        .filter(|id| !desired_set.contains(id))
        .collect();

    TagPlan { to_create, to_remove }
}

/// Drops repeated ids, keeping the first occurrence of each.
pub fn dedup_tag_ids(ids: &[TagId]) -> Vec<TagId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
