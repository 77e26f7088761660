use crate::filter::Predicate;
use crate::model::ItemId;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq)]
struct Scope {
    query: String,
    filters: Vec<Predicate>,
    collection_version: u64,
}

/// User-selected keys for bulk operations.
///
/// The set is bound to the query, filters and collection version it was made
/// under; any change to those empties it.
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    keys: BTreeSet<ItemId>,
    scope: Scope,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebinds to the current view inputs; clears when any of them changed.
    /// Returns true if the selection was cleared.
    pub fn sync_scope(&mut self, query: &str, filters: &[Predicate], collection_version: u64) -> bool {
        let same = self.scope.query == query
            && self.scope.filters == filters
            && self.scope.collection_version == collection_version;
        if same {
            return false;
        }
        self.scope = Scope {
            query: query.to_string(),
            filters: filters.to_vec(),
            collection_version,
        };
        let had_keys = !self.keys.is_empty();
        self.keys.clear();
        had_keys
    }

    pub fn toggle(&mut self, id: ItemId) -> bool {
        if self.keys.remove(&id) {
            false
        } else {
            self.keys.insert(id);
            true
        }
    }

    pub fn select(&mut self, id: ItemId) {
        self.keys.insert(id);
    }

    pub fn select_all(&mut self, ids: impl IntoIterator<Item = ItemId>) {
        self.keys.extend(ids);
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.keys.contains(id)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ItemId> {
        self.keys.iter()
    }
}
