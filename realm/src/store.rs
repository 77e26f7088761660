use crate::notify::NotificationChannel;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use parking_lot::Mutex;
use realm_core::{
    ClientError, Collection, CollectionKind, CollectionSource, ItemId, LoadGuard, LoadPhase,
    Metrics, PlayerGateway, PlayerSnapshot,
};
use std::sync::Arc;
use tokio::sync::watch;

/// What a subscriber sees of one cached collection.
///
/// `version` increases every time a fetch result is accepted; views key
/// their memo and selection scope on it.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub collection: Arc<Collection>,
    pub version: u64,
    pub phase: LoadPhase,
    pub error: Option<ClientError>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            collection: Arc::new(Collection::new()),
            version: 0,
            phase: LoadPhase::Unloaded,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlayerState {
    pub snapshot: Option<Arc<PlayerSnapshot>>,
    pub phase: Option<LoadPhase>,
    pub error: Option<ClientError>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded,
    /// The guard refused: already loading or loaded.
    Skipped,
    Failed(ClientError),
    /// A newer load or a reset superseded this one; its result was dropped.
    Discarded,
}

struct Slot {
    guard: LoadGuard,
    tx: watch::Sender<StoreSnapshot>,
}

impl Slot {
    fn new() -> Self {
        let (tx, _) = watch::channel(StoreSnapshot::default());
        Self {
            guard: LoadGuard::new(),
            tx,
        }
    }

    fn publish_state(&self) {
        let phase = self.guard.phase();
        let error = self.guard.last_error().cloned();
        self.tx.send_modify(|s| {
            s.phase = phase;
            s.error = error;
        });
    }

    fn publish_collection(&self, collection: Collection) {
        let phase = self.guard.phase();
        self.tx.send_modify(|s| {
            s.collection = Arc::new(collection);
            s.version += 1;
            s.phase = phase;
            s.error = None;
        });
    }
}

struct PlayerSlot {
    guard: LoadGuard,
    tx: watch::Sender<PlayerState>,
}

/// Single owner of every cached server collection and of the current player
/// snapshot. Views read it through `watch` subscriptions.
pub struct CollectionStore {
    slots: DashMap<CollectionKind, Slot>,
    player: Mutex<PlayerSlot>,
    notifier: NotificationChannel,
    metrics: Arc<Metrics>,
}

impl CollectionStore {
    pub fn new(notifier: NotificationChannel, metrics: Arc<Metrics>) -> Self {
        let (tx, _) = watch::channel(PlayerState::default());
        Self {
            slots: DashMap::new(),
            player: Mutex::new(PlayerSlot {
                guard: LoadGuard::new(),
                tx,
            }),
            notifier,
            metrics,
        }
    }

    pub fn notifier(&self) -> &NotificationChannel {
        &self.notifier
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    fn slot_mut(&self, kind: CollectionKind) -> RefMut<'_, CollectionKind, Slot> {
        self.slots.entry(kind).or_insert_with(Slot::new)
    }

    pub fn subscribe(&self, kind: CollectionKind) -> watch::Receiver<StoreSnapshot> {
        self.slot_mut(kind).tx.subscribe()
    }

    pub fn snapshot(&self, kind: CollectionKind) -> StoreSnapshot {
        match self.slots.get(&kind) {
            Some(slot) => slot.tx.borrow().clone(),
            None => StoreSnapshot::default(),
        }
    }

    pub fn collection(&self, kind: CollectionKind) -> Arc<Collection> {
        self.snapshot(kind).collection
    }

    pub fn phase(&self, kind: CollectionKind) -> LoadPhase {
        self.slots
            .get(&kind)
            .map(|s| s.guard.phase())
            .unwrap_or(LoadPhase::Unloaded)
    }

    /// Fetches `kind` unless the guard says it is already loading or loaded.
    /// `force` always dispatches and supersedes any load still in flight.
    pub async fn load<S>(&self, source: &S, kind: CollectionKind, force: bool) -> LoadOutcome
    where
        S: CollectionSource + ?Sized,
    {
        let ticket = {
            let mut slot = self.slot_mut(kind);
            match slot.guard.begin(force) {
                Some(ticket) => {
                    slot.publish_state();
                    ticket
                }
                None => {
                    self.metrics.loads_skipped.inc();
                    tracing::debug!(target: "store", %kind, phase=?slot.guard.phase(), "load skipped");
                    return LoadOutcome::Skipped;
                }
            }
        };
        self.metrics.loads_started.inc();
        tracing::debug!(target: "store", %kind, force, generation=ticket.generation(), "load dispatched");

        let result = source.fetch_collection(kind).await;

        let mut slot = self.slot_mut(kind);
        match result {
            Ok(collection) => {
                if !slot.guard.complete(ticket) {
                    self.metrics.loads_discarded.inc();
                    tracing::debug!(target: "store", %kind, generation=ticket.generation(), "stale load discarded");
                    return LoadOutcome::Discarded;
                }
                tracing::info!(target: "store", %kind, records=collection.len(), "collection loaded");
                slot.publish_collection(collection);
                LoadOutcome::Loaded
            }
            Err(err) => {
                if !slot.guard.fail(ticket, err.clone()) {
                    self.metrics.loads_discarded.inc();
                    return LoadOutcome::Discarded;
                }
                slot.publish_state();
                drop(slot);
                self.metrics.loads_failed.inc();
                self.report_load_error(kind, &err);
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Loads several kinds concurrently, each through its own guard.
    pub async fn load_many<S>(&self, source: &S, kinds: &[CollectionKind], force: bool) -> Vec<LoadOutcome>
    where
        S: CollectionSource + ?Sized,
    {
        futures::future::join_all(kinds.iter().map(|kind| self.load(source, *kind, force))).await
    }

    fn report_load_error(&self, kind: CollectionKind, err: &ClientError) {
        // Chart and history panels render empty instead of alerting.
        let quiet = matches!(
            kind,
            CollectionKind::BirzhaHistory
                | CollectionKind::EventPurchases
                | CollectionKind::PremiumPurchases
        );
        tracing::warn!(target: "store", %kind, ?err, "collection load failed");
        if !quiet {
            self.notifier
                .error(err.user_message(&format!("Failed to load {}", kind.as_str().replace('_', " "))));
        }
    }

    pub fn subscribe_player(&self) -> watch::Receiver<PlayerState> {
        self.player.lock().tx.subscribe()
    }

    pub fn player(&self) -> Option<Arc<PlayerSnapshot>> {
        self.player.lock().tx.borrow().snapshot.clone()
    }

    /// Fetches the current player. On success the inventory and equipment
    /// collections are replaced from the same payload.
    pub async fn load_player<G>(&self, gateway: &G, player_id: &ItemId, force: bool) -> LoadOutcome
    where
        G: PlayerGateway + ?Sized,
    {
        let ticket = {
            let mut p = self.player.lock();
            match p.guard.begin(force) {
                Some(t) => {
                    p.tx.send_modify(|s| s.phase = Some(LoadPhase::Loading));
                    t
                }
                None => {
                    self.metrics.loads_skipped.inc();
                    return LoadOutcome::Skipped;
                }
            }
        };
        self.metrics.loads_started.inc();

        let result = gateway.fetch_player(player_id).await;

        match result {
            Ok(snapshot) => {
                let (inventory, equipment) = (snapshot.inventory.clone(), snapshot.equipment.clone());
                {
                    let mut p = self.player.lock();
                    if !p.guard.complete(ticket) {
                        self.metrics.loads_discarded.inc();
                        return LoadOutcome::Discarded;
                    }
                    tracing::info!(target: "store", player=%player_id, money=snapshot.money, "player refreshed");
                    p.tx.send_replace(PlayerState {
                        snapshot: Some(Arc::new(snapshot)),
                        phase: Some(LoadPhase::Loaded),
                        error: None,
                    });
                }
                self.replace(CollectionKind::Inventory, inventory);
                self.replace(CollectionKind::Equipment, equipment);
                LoadOutcome::Loaded
            }
            Err(err) => {
                {
                    let mut p = self.player.lock();
                    if !p.guard.fail(ticket, err.clone()) {
                        self.metrics.loads_discarded.inc();
                        return LoadOutcome::Discarded;
                    }
                    let e = err.clone();
                    p.tx.send_modify(|s| {
                        s.phase = Some(LoadPhase::Unloaded);
                        s.error = Some(e);
                    });
                }
                self.metrics.loads_failed.inc();
                tracing::warn!(target: "store", player=%player_id, ?err, "player load failed");
                self.notifier
                    .error(err.user_message("Failed to load player data"));
                LoadOutcome::Failed(err)
            }
        }
    }

    /// Installs a collection obtained outside `load`, superseding any fetch
    /// of the same kind still in flight.
    pub fn replace(&self, kind: CollectionKind, collection: Collection) {
        let mut slot = self.slot_mut(kind);
        if let Some(ticket) = slot.guard.begin(true) {
            slot.guard.complete(ticket);
        }
        slot.publish_collection(collection);
    }

    /// Forgets the loaded state of `kind` and orphans any in-flight load. The
    /// last collection stays visible until the next load replaces it.
    pub fn invalidate(&self, kind: CollectionKind) {
        if let Some(mut slot) = self.slots.get_mut(&kind) {
            slot.guard.reset();
            slot.publish_state();
        }
    }

    /// Drops all cached data, e.g. after logout.
    pub fn clear(&self) {
        for mut entry in self.slots.iter_mut() {
            entry.guard.reset();
            entry.tx.send_replace(StoreSnapshot::default());
        }
        let mut p = self.player.lock();
        p.guard.reset();
        p.tx.send_replace(PlayerState::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use async_trait::async_trait;
    use realm_core::ClientResult;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    type Step = (Option<oneshot::Receiver<()>>, ClientResult<Collection>);

    #[derive(Default)]
    struct ScriptedSource {
        calls: AtomicUsize,
        script: Mutex<VecDeque<Step>>,
    }

    impl ScriptedSource {
        fn push(&self, gate: Option<oneshot::Receiver<()>>, result: ClientResult<Collection>) {
            self.script.lock().push_back((gate, result));
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CollectionSource for ScriptedSource {
        async fn fetch_collection(&self, _kind: CollectionKind) -> ClientResult<Collection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().pop_front();
            let (gate, result) = step.unwrap_or((None, Ok(Collection::new())));
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            result
        }
    }

    struct FixedPlayer(PlayerSnapshot);

    #[async_trait]
    impl PlayerGateway for FixedPlayer {
        async fn fetch_player(&self, _id: &ItemId) -> ClientResult<PlayerSnapshot> {
            Ok(self.0.clone())
        }
    }

    fn store() -> CollectionStore {
        CollectionStore::new(
            NotificationChannel::new(&NotificationConfig::default()),
            Metrics::unregistered(),
        )
    }

    fn one(id: i64, name: &str) -> Collection {
        let mut c = Collection::new();
        c.insert(ItemId::Num(id), json!({ "name": name }));
        c
    }

    #[tokio::test]
    async fn second_unforced_load_is_skipped_while_loading() {
        let store = store();
        let src = ScriptedSource::default();
        let (tx, rx) = oneshot::channel();
        src.push(Some(rx), Ok(one(1, "Sword")));

        let (first, second) = tokio::join!(
            store.load(&src, CollectionKind::AuctionLots, false),
            async {
                let out = store.load(&src, CollectionKind::AuctionLots, false).await;
                let _ = tx.send(());
                out
            }
        );
        assert_eq!(first, LoadOutcome::Loaded);
        assert_eq!(second, LoadOutcome::Skipped);
        assert_eq!(src.calls(), 1);

        assert_eq!(
            store.load(&src, CollectionKind::AuctionLots, false).await,
            LoadOutcome::Skipped
        );
        assert_eq!(src.calls(), 1);
        let snap = store.snapshot(CollectionKind::AuctionLots);
        assert_eq!(snap.phase, LoadPhase::Loaded);
        assert_eq!(snap.version, 1);
    }

    #[tokio::test]
    async fn forced_reload_supersedes_slow_response() {
        let store = store();
        let src = ScriptedSource::default();
        let (tx, rx) = oneshot::channel();
        src.push(Some(rx), Ok(one(1, "old")));
        src.push(None, Ok(one(2, "new")));

        let (slow, forced) = tokio::join!(
            store.load(&src, CollectionKind::Storage, false),
            async {
                let out = store.load(&src, CollectionKind::Storage, true).await;
                let _ = tx.send(());
                out
            }
        );
        assert_eq!(slow, LoadOutcome::Discarded);
        assert_eq!(forced, LoadOutcome::Loaded);
        let c = store.collection(CollectionKind::Storage);
        assert!(c.contains(&ItemId::Num(2)));
        assert!(!c.contains(&ItemId::Num(1)));
    }

    #[tokio::test]
    async fn invalidate_orphans_in_flight_load() {
        let store = store();
        let src = ScriptedSource::default();
        let (tx, rx) = oneshot::channel();
        src.push(Some(rx), Ok(one(1, "late")));

        let (late, _) = tokio::join!(store.load(&src, CollectionKind::BuyRequests, false), async {
            store.invalidate(CollectionKind::BuyRequests);
            let _ = tx.send(());
        });
        assert_eq!(late, LoadOutcome::Discarded);
        assert!(store.collection(CollectionKind::BuyRequests).is_empty());
        assert_eq!(store.phase(CollectionKind::BuyRequests), LoadPhase::Unloaded);
    }

    #[tokio::test]
    async fn failure_returns_to_unloaded_and_notifies() {
        let store = store();
        let src = ScriptedSource::default();
        src.push(None, Err(ClientError::server(500, "Storage offline")));
        src.push(None, Ok(one(3, "Ore")));

        let out = store.load(&src, CollectionKind::Storage, false).await;
        assert_eq!(out, LoadOutcome::Failed(ClientError::server(500, "Storage offline")));
        let snap = store.snapshot(CollectionKind::Storage);
        assert_eq!(snap.phase, LoadPhase::Unloaded);
        assert!(snap.error.is_some());
        assert_eq!(store.notifier().current().unwrap().message, "Storage offline");

        assert_eq!(
            store.load(&src, CollectionKind::Storage, false).await,
            LoadOutcome::Loaded
        );
        assert!(store.snapshot(CollectionKind::Storage).error.is_none());
    }

    #[tokio::test]
    async fn history_failures_stay_quiet() {
        let store = store();
        let src = ScriptedSource::default();
        src.push(None, Err(ClientError::Network("down".into())));
        let out = store.load(&src, CollectionKind::BirzhaHistory, false).await;
        assert!(matches!(out, LoadOutcome::Failed(_)));
        assert!(store.notifier().current().is_none());
        assert!(store.collection(CollectionKind::BirzhaHistory).is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_new_versions() {
        let store = store();
        let src = ScriptedSource::default();
        src.push(None, Ok(one(1, "Sword")));
        let mut rx = store.subscribe(CollectionKind::Inventory);
        store.load(&src, CollectionKind::Inventory, false).await;
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().version, 1);
    }

    #[tokio::test]
    async fn player_refresh_replaces_inventory_and_equipment() {
        let store = store();
        let mut snap = PlayerSnapshot {
            money: 500,
            ..Default::default()
        };
        snap.inventory.insert(ItemId::Num(10), json!({"name": "Herb", "count": 2}));
        snap.equipment.insert(ItemId::Num(20), json!({"name": "Helm"}));
        let gw = FixedPlayer(snap);

        let out = store.load_player(&gw, &ItemId::Num(1), false).await;
        assert_eq!(out, LoadOutcome::Loaded);
        assert_eq!(store.player().unwrap().money, 500);
        assert!(store.collection(CollectionKind::Inventory).contains(&ItemId::Num(10)));
        assert!(store.collection(CollectionKind::Equipment).contains(&ItemId::Num(20)));
        assert_eq!(store.phase(CollectionKind::Inventory), LoadPhase::Loaded);
        assert_eq!(
            store.load_player(&gw, &ItemId::Num(1), false).await,
            LoadOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn clear_forgets_everything() {
        let store = store();
        store.replace(CollectionKind::Storage, one(1, "Ore"));
        store.clear();
        assert!(store.collection(CollectionKind::Storage).is_empty());
        assert_eq!(store.phase(CollectionKind::Storage), LoadPhase::Unloaded);
        assert!(store.player().is_none());
    }
}
