use crate::config::SearchConfig;
use crate::orchestrator::Action;
use crate::store::{CollectionStore, LoadOutcome, StoreSnapshot};
use realm_core::{
    parse_count, CollectionKind, CollectionSource, FilterSchema, FuzzyMatcher, ItemId, LoadPhase,
    Predicate, Projection, ProjectionMemo, SearchError, SelectionSet, ValidationError,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Per-screen state over one store collection: query text, fixed filter
/// slots and the selection. The collection itself stays in the store.
pub struct CollectionView {
    store: Arc<CollectionStore>,
    kind: CollectionKind,
    schema: FilterSchema,
    matcher: Result<FuzzyMatcher, SearchError>,
    query: String,
    filters: Vec<Predicate>,
    selection: SelectionSet,
    memo: ProjectionMemo,
    rx: watch::Receiver<StoreSnapshot>,
}

impl CollectionView {
    pub fn new(
        store: Arc<CollectionStore>,
        kind: CollectionKind,
        schema: FilterSchema,
        filter_slots: usize,
        matcher: Result<FuzzyMatcher, SearchError>,
    ) -> Self {
        let rx = store.subscribe(kind);
        Self {
            store,
            kind,
            schema,
            matcher,
            query: String::new(),
            filters: vec![Predicate::empty(); filter_slots],
            selection: SelectionSet::new(),
            memo: ProjectionMemo::new(),
            rx,
        }
    }

    /// Inventory screen: two filter slots, search over name and description.
    pub fn inventory(store: Arc<CollectionStore>, search: &SearchConfig) -> Self {
        let matcher = FuzzyMatcher::new(search.keys.iter().cloned(), search.threshold);
        Self::new(store, CollectionKind::Inventory, FilterSchema::inventory(), 2, matcher)
    }

    pub fn buy_requests(store: Arc<CollectionStore>, search: &SearchConfig) -> Self {
        let matcher = FuzzyMatcher::new(["item_name"], search.threshold);
        Self::new(store, CollectionKind::BuyRequests, FilterSchema::buy_requests(), 1, matcher)
    }

    pub fn auction_lots(store: Arc<CollectionStore>, search: &SearchConfig) -> Self {
        let matcher = FuzzyMatcher::new(["item_name"], search.threshold);
        Self::new(store, CollectionKind::AuctionLots, FilterSchema::auction_lots(), 1, matcher)
    }

    /// Any other list, searched by the configured keys without filters.
    pub fn plain(store: Arc<CollectionStore>, kind: CollectionKind, search: &SearchConfig) -> Self {
        let matcher = FuzzyMatcher::new(search.keys.iter().cloned(), search.threshold);
        Self::new(store, kind, FilterSchema::new(), 0, matcher)
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    pub async fn ensure_loaded<S>(&self, source: &S) -> LoadOutcome
    where
        S: CollectionSource + ?Sized,
    {
        self.store.load(source, self.kind, false).await
    }

    pub async fn reload<S>(&self, source: &S) -> LoadOutcome
    where
        S: CollectionSource + ?Sized,
    {
        self.store.load(source, self.kind, true).await
    }

    /// Waits for the next store update. Returns false once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.rx.borrow().clone()
    }

    pub fn phase(&self) -> LoadPhase {
        self.rx.borrow().phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase() == LoadPhase::Loading
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn filters(&self) -> &[Predicate] {
        &self.filters
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.sync_selection();
    }

    /// Returns false if `slot` does not exist for this view.
    pub fn set_filter(&mut self, slot: usize, predicate: Predicate) -> bool {
        let Some(current) = self.filters.get_mut(slot) else {
            return false;
        };
        *current = predicate;
        self.sync_selection();
        true
    }

    pub fn clear_filter(&mut self, slot: usize) -> bool {
        self.set_filter(slot, Predicate::empty())
    }

    fn sync_selection(&mut self) {
        let version = self.rx.borrow().version;
        if self.selection.sync_scope(&self.query, &self.filters, version) {
            tracing::debug!(target: "store", kind=%self.kind, "selection cleared");
        }
    }

    pub fn projection(&mut self) -> Projection {
        self.sync_selection();
        let snap = self.rx.borrow().clone();
        self.memo
            .get_or_project(
                snap.version,
                &snap.collection,
                &self.query,
                &self.filters,
                &self.schema,
                self.matcher.as_ref(),
            )
            .clone()
    }

    pub fn toggle(&mut self, id: ItemId) -> bool {
        self.sync_selection();
        self.selection.toggle(id)
    }

    /// Selects every row currently visible.
    pub fn select_visible(&mut self) {
        let ids = self.projection().ids();
        self.selection.select_all(ids);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selected(&mut self) -> Vec<ItemId> {
        self.sync_selection();
        self.selection.keys().cloned().collect()
    }

    /// One full-stack sell action per selected inventory item. A selected
    /// item whose stack size cannot be read fails the whole batch.
    pub fn bulk_sell_actions(&mut self) -> Result<Vec<Action>, ValidationError> {
        let collection = self.rx.borrow().collection.clone();
        self.selected()
            .into_iter()
            .map(|item_id| {
                let raw = collection.get(&item_id).and_then(|r| r.get("count"));
                match raw.and_then(parse_count) {
                    Some(amount) => Ok(Action::SellItem { item_id, amount }),
                    None => Err(ValidationError::Malformed {
                        field: "count",
                        input: format!(
                            "{item_id}: {}",
                            raw.map(Value::to_string).unwrap_or_else(|| "missing".into())
                        ),
                    }),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::notify::NotificationChannel;
    use realm_core::{Collection, EmptyReason, Metrics, Operator};
    use serde_json::json;

    fn store_with_inventory() -> Arc<CollectionStore> {
        let store = Arc::new(CollectionStore::new(
            NotificationChannel::new(&NotificationConfig::default()),
            Metrics::unregistered(),
        ));
        let mut c = Collection::new();
        c.insert(
            ItemId::Num(1),
            json!({"name": "Sword", "type": "weapon", "value": 100, "count": 1}),
        );
        c.insert(
            ItemId::Num(2),
            json!({"name": "Healing Herb", "type": "herb", "value": 5, "count": 12}),
        );
        c.insert(
            ItemId::Num(3),
            json!({"name": "Rusty Shield", "type": "armor", "value": 50, "count": 1, "junk": true}),
        );
        store.replace(CollectionKind::Inventory, c);
        store
    }

    #[test]
    fn query_and_filters_narrow_projection() {
        let store = store_with_inventory();
        let mut view = CollectionView::inventory(store, &SearchConfig::default());
        assert_eq!(view.projection().len(), 3);

        view.set_filter(0, Predicate::new("value", Operator::GreaterOrEqual, "50"));
        assert_eq!(view.projection().ids(), vec![ItemId::Num(1), ItemId::Num(3)]);
        view.set_filter(1, Predicate::new("junk", Operator::Equal, "true"));
        assert_eq!(view.projection().ids(), vec![ItemId::Num(3)]);
        assert!(!view.set_filter(2, Predicate::empty()));

        view.set_query("Sw");
        let p = view.projection();
        assert!(p.is_empty());
        assert_eq!(p.empty, Some(EmptyReason::NoMatches));
    }

    #[test]
    fn changing_query_or_filter_clears_selection() {
        let store = store_with_inventory();
        let mut view = CollectionView::inventory(store, &SearchConfig::default());
        view.toggle(ItemId::Num(1));
        view.toggle(ItemId::Num(2));
        assert_eq!(view.selected().len(), 2);

        view.set_query("herb");
        assert!(view.selected().is_empty());

        view.toggle(ItemId::Num(2));
        view.set_filter(0, Predicate::new("count", Operator::Greater, "1"));
        assert!(view.selected().is_empty());
    }

    #[test]
    fn collection_update_clears_selection_and_memo() {
        let store = store_with_inventory();
        let mut view = CollectionView::inventory(store.clone(), &SearchConfig::default());
        view.toggle(ItemId::Num(1));
        assert_eq!(view.projection().len(), 3);

        let mut c = Collection::new();
        c.insert(ItemId::Num(9), json!({"name": "Bow", "count": 1}));
        store.replace(CollectionKind::Inventory, c);

        assert!(view.selected().is_empty());
        assert_eq!(view.projection().ids(), vec![ItemId::Num(9)]);
    }

    #[test]
    fn bulk_sell_uses_full_stacks_of_selection() {
        let store = store_with_inventory();
        let mut view = CollectionView::inventory(store, &SearchConfig::default());
        view.toggle(ItemId::Num(2));
        view.toggle(ItemId::Num(3));
        let actions = view.bulk_sell_actions().unwrap();
        assert_eq!(
            actions,
            vec![
                Action::SellItem {
                    item_id: ItemId::Num(2),
                    amount: 12
                },
                Action::SellItem {
                    item_id: ItemId::Num(3),
                    amount: 1
                },
            ]
        );
    }

    #[test]
    fn bulk_sell_reads_string_and_float_counts() {
        let store = Arc::new(CollectionStore::new(
            NotificationChannel::new(&NotificationConfig::default()),
            Metrics::unregistered(),
        ));
        let mut c = Collection::new();
        c.insert(ItemId::Num(1), json!({"name": "Ore", "count": "5"}));
        c.insert(ItemId::Num(2), json!({"name": "Hide", "count": 3.0}));
        c.insert(ItemId::Num(3), json!({"name": "Bone", "count": 1}));
        store.replace(CollectionKind::Inventory, c);

        let mut view = CollectionView::inventory(store.clone(), &SearchConfig::default());
        view.select_visible();
        let amounts: Vec<(ItemId, i64)> = view
            .bulk_sell_actions()
            .unwrap()
            .into_iter()
            .map(|a| match a {
                Action::SellItem { item_id, amount } => (item_id, amount),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            amounts,
            vec![(ItemId::Num(1), 5), (ItemId::Num(2), 3), (ItemId::Num(3), 1)]
        );

        let mut c = Collection::new();
        c.insert(ItemId::Num(1), json!({"name": "Ore", "count": 5}));
        c.insert(ItemId::Num(2), json!({"name": "Hide", "count": "lots"}));
        store.replace(CollectionKind::Inventory, c);
        view.select_visible();
        let err = view.bulk_sell_actions().unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { field: "count", .. }));
    }

    #[test]
    fn empty_store_reports_no_items() {
        let store = Arc::new(CollectionStore::new(
            NotificationChannel::new(&NotificationConfig::default()),
            Metrics::unregistered(),
        ));
        let mut view = CollectionView::plain(store, CollectionKind::Storage, &SearchConfig::default());
        assert_eq!(view.projection().empty, Some(EmptyReason::NoItems));
        assert_eq!(view.phase(), LoadPhase::Unloaded);
    }
}
