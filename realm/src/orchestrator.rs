use crate::session::Session;
use crate::store::CollectionStore;
use dashmap::DashMap;
use realm_core::{
    ActionAck, AuctionGateway, BirzhaGateway, BuyRequestGateway, ClientError, ClientResult,
    CollectionKind, ErrorDisplay, GameApi, InventoryGateway, ItemId, ModalWorkflow,
    PlayerSettings, PlayerSnapshot, SettingsGateway, SettlementGateway, ShopGateway, ShopKind,
    StorageGateway, ValidationError, WorkflowError,
};
use serde_json::Value;
use std::sync::Arc;

/// A user-initiated mutation with everything needed to validate and send it.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    WearItem { item_id: ItemId },
    UnwearItem { item_id: ItemId },
    SellItem { item_id: ItemId, amount: i64 },
    ThrowItem { item_id: ItemId, amount: i64 },
    CreateLot {
        item_id: ItemId,
        amount: i64,
        start_price: i64,
        buyout_price: Option<i64>,
    },
    PlaceBid { lot_id: ItemId, amount: i64 },
    Buyout { lot_id: ItemId, price: i64 },
    /// Buys `amount` premium currency at `rate` money each.
    BirzhaBuy { amount: i64, rate: f64 },
    BirzhaSell { amount: i64 },
    CreateBuyRequest { item_id: ItemId, price: i64, amount: i64 },
    /// `wanted` is how many the request still asks for.
    SellToRequest {
        request_id: ItemId,
        item_id: ItemId,
        amount: i64,
        wanted: i64,
    },
    CancelBuyRequest { request_id: ItemId },
    CollectStorage { entry_id: ItemId },
    PurchaseOffer {
        shop: ShopKind,
        offer_id: ItemId,
        price: i64,
        amount: i64,
    },
    UpdateSettings { settings: PlayerSettings },
    SelectImage { image: String },
    StartConstruction { building_id: ItemId },
    Contribute { construction_id: ItemId, amount: i64 },
    CancelConstruction { construction_id: ItemId },
}

impl Action {
    /// Invocation site; at most one action per site is in flight.
    pub fn site(&self) -> &'static str {
        match self {
            Action::WearItem { .. } => "inventory.wear",
            Action::UnwearItem { .. } => "inventory.unwear",
            Action::SellItem { .. } => "inventory.sell",
            Action::ThrowItem { .. } => "inventory.throw",
            Action::CreateLot { .. } => "auction.create",
            Action::PlaceBid { .. } => "auction.bid",
            Action::Buyout { .. } => "auction.buyout",
            Action::BirzhaBuy { .. } => "birzha.buy",
            Action::BirzhaSell { .. } => "birzha.sell",
            Action::CreateBuyRequest { .. } => "requests.create",
            Action::SellToRequest { .. } => "requests.sell",
            Action::CancelBuyRequest { .. } => "requests.cancel",
            Action::CollectStorage { .. } => "storage.collect",
            Action::PurchaseOffer { shop: ShopKind::Event, .. } => "shop.event.purchase",
            Action::PurchaseOffer { shop: ShopKind::Premium, .. } => "shop.premium.purchase",
            Action::UpdateSettings { .. } => "settings.update",
            Action::SelectImage { .. } => "settings.image",
            Action::StartConstruction { .. } => "settlement.start",
            Action::Contribute { .. } => "settlement.contribute",
            Action::CancelConstruction { .. } => "settlement.cancel",
        }
    }

    /// Collections whose server truth changes when this action succeeds.
    pub fn affected(&self) -> Vec<CollectionKind> {
        use CollectionKind::*;
        match self {
            Action::WearItem { .. } | Action::UnwearItem { .. } => vec![Inventory, Equipment],
            Action::SellItem { .. } | Action::ThrowItem { .. } => vec![Inventory],
            Action::CreateLot { .. } => vec![AuctionLots, Inventory],
            Action::PlaceBid { .. } => vec![AuctionLots],
            Action::Buyout { .. } => vec![AuctionLots, Inventory],
            Action::BirzhaBuy { .. } | Action::BirzhaSell { .. } => vec![BirzhaHistory],
            Action::CreateBuyRequest { .. } | Action::CancelBuyRequest { .. } => vec![BuyRequests],
            Action::SellToRequest { .. } => vec![BuyRequests, Inventory],
            Action::CollectStorage { .. } => vec![Storage, Inventory],
            Action::PurchaseOffer { shop, .. } => {
                vec![shop.offers_kind(), shop.history_kind(), Inventory]
            }
            Action::UpdateSettings { .. } | Action::SelectImage { .. } => vec![],
            Action::StartConstruction { .. }
            | Action::Contribute { .. }
            | Action::CancelConstruction { .. } => vec![Buildings, Constructions],
        }
    }

    /// Purchases that cost currency report failures in the blocking modal.
    pub fn error_display(&self) -> ErrorDisplay {
        match self {
            Action::PurchaseOffer { .. }
            | Action::Buyout { .. }
            | Action::BirzhaBuy { .. }
            | Action::BirzhaSell { .. } => ErrorDisplay::BlockingModal,
            _ => ErrorDisplay::Inline,
        }
    }

    pub fn fallback_message(&self) -> &'static str {
        match self {
            Action::WearItem { .. } => "Failed to equip item",
            Action::UnwearItem { .. } => "Failed to unequip item",
            Action::SellItem { .. } => "Failed to sell item",
            Action::ThrowItem { .. } => "Failed to throw away item",
            Action::CreateLot { .. } => "Failed to create lot",
            Action::PlaceBid { .. } => "Failed to place bid",
            Action::Buyout { .. } => "Failed to buy out lot",
            Action::BirzhaBuy { .. } => "Failed to buy currency",
            Action::BirzhaSell { .. } => "Failed to sell currency",
            Action::CreateBuyRequest { .. } => "Failed to create request",
            Action::SellToRequest { .. } => "Failed to sell to request",
            Action::CancelBuyRequest { .. } => "Failed to cancel request",
            Action::CollectStorage { .. } => "Failed to collect from storage",
            Action::PurchaseOffer { .. } => "Purchase failed",
            Action::UpdateSettings { .. } => "Failed to save settings",
            Action::SelectImage { .. } => "Failed to change image",
            Action::StartConstruction { .. } => "Failed to start construction",
            Action::Contribute { .. } => "Failed to contribute",
            Action::CancelConstruction { .. } => "Failed to cancel construction",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Action::WearItem { .. } => "Item equipped",
            Action::UnwearItem { .. } => "Item unequipped",
            Action::SellItem { .. } | Action::SellToRequest { .. } => "Sold",
            Action::ThrowItem { .. } => "Item thrown away",
            Action::CreateLot { .. } => "Lot created",
            Action::PlaceBid { .. } => "Bid placed",
            Action::Buyout { .. } => "Lot bought out",
            Action::BirzhaBuy { .. } | Action::BirzhaSell { .. } => "Exchange complete",
            Action::CreateBuyRequest { .. } => "Request created",
            Action::CancelBuyRequest { .. } => "Request cancelled",
            Action::CollectStorage { .. } => "Collected",
            Action::PurchaseOffer { .. } => "Purchase complete",
            Action::UpdateSettings { .. } => "Settings saved",
            Action::SelectImage { .. } => "Image changed",
            Action::StartConstruction { .. } => "Construction started",
            Action::Contribute { .. } => "Contribution accepted",
            Action::CancelConstruction { .. } => "Construction cancelled",
        }
    }

    /// Client-side preconditions. Balance and stock checks need the player
    /// snapshot and are skipped when none is loaded; the server still decides.
    pub fn validate(&self, player: Option<&PlayerSnapshot>) -> Result<(), ValidationError> {
        let positive = |amount: i64| {
            if amount <= 0 {
                Err(ValidationError::NonPositiveAmount)
            } else {
                Ok(())
            }
        };
        let stock = |item_id: &ItemId, requested: i64| match player {
            Some(p) if requested > p.item_count(item_id) => Err(ValidationError::ExceedsAvailable {
                requested,
                available: p.item_count(item_id),
            }),
            _ => Ok(()),
        };
        let funds = |required: i64| match player {
            Some(p) if required > p.money => Err(ValidationError::InsufficientFunds {
                required,
                available: p.money,
            }),
            _ => Ok(()),
        };
        let premium = |required: i64| match player {
            Some(p) if required > p.premium_money => Err(ValidationError::InsufficientPremium {
                required,
                available: p.premium_money,
            }),
            _ => Ok(()),
        };

        match self {
            Action::SellItem { item_id, amount } | Action::ThrowItem { item_id, amount } => {
                positive(*amount)?;
                stock(item_id, *amount)
            }
            Action::CreateLot {
                item_id,
                amount,
                start_price,
                buyout_price,
            } => {
                positive(*amount)?;
                positive(*start_price)?;
                if let Some(b) = buyout_price {
                    if *b < *start_price {
                        return Err(ValidationError::Malformed {
                            field: "buyout price",
                            input: b.to_string(),
                        });
                    }
                }
                stock(item_id, *amount)
            }
            Action::PlaceBid { amount, .. } => {
                positive(*amount)?;
                funds(*amount)
            }
            Action::Buyout { price, .. } => funds(*price),
            Action::BirzhaBuy { amount, rate } => {
                positive(*amount)?;
                funds((*amount as f64 * rate).ceil() as i64)
            }
            Action::BirzhaSell { amount } => {
                positive(*amount)?;
                premium(*amount)
            }
            Action::CreateBuyRequest { price, amount, .. } => {
                positive(*price)?;
                positive(*amount)?;
                funds(price.saturating_mul(*amount))
            }
            Action::SellToRequest {
                item_id,
                amount,
                wanted,
                ..
            } => {
                positive(*amount)?;
                if *amount > *wanted {
                    return Err(ValidationError::ExceedsAvailable {
                        requested: *amount,
                        available: *wanted,
                    });
                }
                stock(item_id, *amount)
            }
            Action::PurchaseOffer {
                shop, price, amount, ..
            } => {
                positive(*amount)?;
                let total = price.saturating_mul(*amount);
                match shop {
                    ShopKind::Premium => premium(total),
                    ShopKind::Event => funds(total),
                }
            }
            Action::SelectImage { image } if image.trim().is_empty() => {
                Err(ValidationError::MissingSelection("an image"))
            }
            Action::Contribute { amount, .. } => {
                positive(*amount)?;
                funds(*amount)
            }
            _ => Ok(()),
        }
    }
}

impl Action {
    /// Deducts the stock and currency this action consumes from a working
    /// copy of the player.
    fn reserve(&self, player: &mut PlayerSnapshot) {
        match self {
            Action::SellItem { item_id, amount }
            | Action::ThrowItem { item_id, amount }
            | Action::CreateLot { item_id, amount, .. }
            | Action::SellToRequest { item_id, amount, .. } => take_stock(player, item_id, *amount),
            Action::PlaceBid { amount, .. } | Action::Contribute { amount, .. } => {
                player.money -= amount;
            }
            Action::Buyout { price, .. } => player.money -= price,
            Action::BirzhaBuy { amount, rate } => {
                player.money -= (*amount as f64 * rate).ceil() as i64;
            }
            Action::BirzhaSell { amount } => player.premium_money -= amount,
            Action::CreateBuyRequest { price, amount, .. } => {
                player.money -= price.saturating_mul(*amount);
            }
            Action::PurchaseOffer {
                shop, price, amount, ..
            } => {
                let total = price.saturating_mul(*amount);
                match shop {
                    ShopKind::Premium => player.premium_money -= total,
                    ShopKind::Event => player.money -= total,
                }
            }
            _ => {}
        }
    }
}

fn take_stock(player: &mut PlayerSnapshot, item_id: &ItemId, amount: i64) {
    let left = (player.item_count(item_id) - amount).max(0);
    let Some(mut record) = player.inventory.get(item_id).cloned() else {
        return;
    };
    if let Some(obj) = record.as_object_mut() {
        obj.insert("count".to_string(), Value::from(left));
        player.inventory.insert(item_id.clone(), record);
    }
}

/// Parses a numeric form field, rejecting blanks, garbage and values <= 0.
pub fn parse_amount(field: &'static str, input: &str) -> Result<i64, ValidationError> {
    let n: i64 = input.trim().parse().map_err(|_| ValidationError::Malformed {
        field,
        input: input.to_string(),
    })?;
    if n <= 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(n)
}

struct SiteClaim<'a> {
    sites: &'a DashMap<&'static str, ()>,
    site: &'static str,
}

impl Drop for SiteClaim<'_> {
    fn drop(&mut self) {
        self.sites.remove(self.site);
    }
}

/// Runs mutations: validate, send, then re-read server truth.
pub struct MutationOrchestrator<A: ?Sized> {
    api: Arc<A>,
    store: Arc<CollectionStore>,
    session: Arc<Session>,
    inflight: DashMap<&'static str, ()>,
}

impl<A> MutationOrchestrator<A>
where
    A: GameApi + ?Sized,
{
    pub fn new(api: Arc<A>, store: Arc<CollectionStore>, session: Arc<Session>) -> Self {
        Self {
            api,
            store,
            session,
            inflight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.store
    }

    /// True while an action from `site` awaits the server; the control that
    /// triggers it should be disabled.
    pub fn is_busy(&self, site: &str) -> bool {
        self.inflight.contains_key(site)
    }

    fn claim(&self, site: &'static str) -> ClientResult<SiteClaim<'_>> {
        if self.inflight.insert(site, ()).is_some() {
            tracing::debug!(target: "orchestrator", site, "duplicate submit rejected");
            return Err(ClientError::InFlight);
        }
        Ok(SiteClaim {
            sites: &self.inflight,
            site,
        })
    }

    fn report(&self, display: ErrorDisplay, message: String) {
        match display {
            ErrorDisplay::Inline => {
                self.store.notifier().error(message);
            }
            ErrorDisplay::BlockingModal => {
                self.store.notifier().notify_blocking(message);
            }
        }
    }

    fn reject_locally(&self, action: &Action, err: ValidationError) -> ClientError {
        self.store.metrics().mutations_rejected_locally.inc();
        tracing::info!(target: "orchestrator", site=action.site(), %err, "validation failed");
        self.report(action.error_display(), err.to_string());
        err.into()
    }

    pub async fn perform(&self, action: Action) -> ClientResult<ActionAck> {
        let player = self.store.player();
        if let Err(err) = action.validate(player.as_deref()) {
            return Err(self.reject_locally(&action, err));
        }
        let _claim = self.claim(action.site())?;

        let metrics = self.store.metrics();
        metrics.mutations_sent.inc();
        metrics.inflight_mutations.inc();
        tracing::info!(target: "orchestrator", site=action.site(), "mutation sent");
        let result = self.dispatch(&action).await;
        metrics.inflight_mutations.dec();

        match result {
            Ok(ack) => {
                metrics.mutations_succeeded.inc();
                let message = if ack.message.trim().is_empty() {
                    action.success_message().to_string()
                } else {
                    ack.message.clone()
                };
                self.store.notifier().success(message);
                // a failed refresh replaces the banner with its own error
                self.refresh_after(&action.affected()).await;
                Ok(ack)
            }
            Err(err) => {
                metrics.mutations_failed.inc();
                tracing::warn!(target: "orchestrator", site=action.site(), ?err, "mutation failed");
                self.report(action.error_display(), err.user_message(action.fallback_message()));
                Err(err)
            }
        }
    }

    /// Drives a modal form through submit. `build` turns the form input into
    /// an action; its validation errors are shown without a network call.
    pub async fn submit_form<I, F>(&self, workflow: &mut ModalWorkflow<I>, build: F) -> ClientResult<ActionAck>
    where
        I: Clone + Default,
        F: FnOnce(&I) -> Result<Action, ValidationError>,
    {
        let input = workflow.submit().map_err(|err| match err {
            WorkflowError::AlreadySubmitting => ClientError::InFlight,
            other => ClientError::Unexpected(format!("form not submittable: {other:?}")),
        })?;
        let action = match build(&input) {
            Ok(action) => action,
            Err(err) => {
                let message = err.to_string();
                self.store.metrics().mutations_rejected_locally.inc();
                self.report(workflow.error_display(), message.clone());
                let _ = workflow.fail(message);
                return Err(err.into());
            }
        };
        let fallback = action.fallback_message();
        match self.perform(action).await {
            Ok(ack) => {
                let _ = workflow.succeed();
                Ok(ack)
            }
            Err(err) => {
                let _ = workflow.fail(err.user_message(fallback));
                Err(err)
            }
        }
    }

    /// Sends several actions of one kind (e.g. selling every selected item)
    /// and refreshes once afterwards. Each action is validated against the
    /// player minus what earlier actions in the batch already consumed.
    pub async fn perform_batch(&self, actions: Vec<Action>) -> Vec<ClientResult<ActionAck>> {
        let Some(first) = actions.first() else {
            return Vec::new();
        };
        let site = first.site();
        if let Some(other) = actions.iter().find(|a| a.site() != site) {
            tracing::warn!(target: "orchestrator", site, other=other.site(), "mixed batch rejected");
            let err = ClientError::Unexpected(format!(
                "batch mixes {site} with {}",
                other.site()
            ));
            return actions.iter().map(|_| Err(err.clone())).collect();
        }
        let display = first.error_display();
        let claim = match self.claim(site) {
            Ok(c) => c,
            Err(err) => return actions.iter().map(|_| Err(err.clone())).collect(),
        };

        let mut working = self.store.player().map(|p| (*p).clone());
        let metrics = self.store.metrics();
        let mut affected: Vec<CollectionKind> = Vec::new();
        let mut results = Vec::with_capacity(actions.len());
        let mut first_error: Option<String> = None;

        for action in &actions {
            if let Err(err) = action.validate(working.as_ref()) {
                metrics.mutations_rejected_locally.inc();
                first_error.get_or_insert_with(|| err.to_string());
                results.push(Err(err.into()));
                continue;
            }
            metrics.mutations_sent.inc();
            metrics.inflight_mutations.inc();
            let result = self.dispatch(action).await;
            metrics.inflight_mutations.dec();
            match &result {
                Ok(_) => {
                    metrics.mutations_succeeded.inc();
                    if let Some(player) = working.as_mut() {
                        action.reserve(player);
                    }
                    for kind in action.affected() {
                        if !affected.contains(&kind) {
                            affected.push(kind);
                        }
                    }
                }
                Err(err) => {
                    metrics.mutations_failed.inc();
                    tracing::warn!(target: "orchestrator", site=action.site(), ?err, "batch mutation failed");
                    first_error.get_or_insert_with(|| err.user_message(action.fallback_message()));
                }
            }
            results.push(result);
        }
        drop(claim);

        let done = results.iter().filter(|r| r.is_ok()).count();
        match first_error {
            Some(message) if done == 0 => self.report(display, message),
            Some(message) => self.report(
                display,
                format!("{done} of {} done; {message}", results.len()),
            ),
            None => {
                self.store
                    .notifier()
                    .success(format!("{done} of {} done", results.len()));
            }
        }
        if done > 0 {
            self.refresh_after(&affected).await;
        }
        results
    }

    /// One player refresh (which also republishes inventory and equipment)
    /// plus one forced load of every other affected collection.
    async fn refresh_after(&self, affected: &[CollectionKind]) {
        let mut kinds = affected.to_vec();
        if let Some(player_id) = self.session.user_id() {
            self.store.load_player(&*self.api, &player_id, true).await;
            kinds.retain(|k| !matches!(k, CollectionKind::Inventory | CollectionKind::Equipment));
        }
        if !kinds.is_empty() {
            self.store.load_many(&*self.api, &kinds, true).await;
        }
    }

    async fn dispatch(&self, action: &Action) -> ClientResult<ActionAck> {
        let api = &*self.api;
        match action {
            Action::WearItem { item_id } => api.wear(item_id).await,
            Action::UnwearItem { item_id } => api.unwear(item_id).await,
            Action::SellItem { item_id, amount } => {
                InventoryGateway::sell(api, item_id, *amount).await
            }
            Action::ThrowItem { item_id, amount } => api.throw_away(item_id, *amount).await,
            Action::CreateLot {
                item_id,
                amount,
                start_price,
                buyout_price,
            } => {
                api.create_lot(item_id, *amount, *start_price, *buyout_price)
                    .await
            }
            Action::PlaceBid { lot_id, amount } => api.place_bid(lot_id, *amount).await,
            Action::Buyout { lot_id, .. } => api.buyout(lot_id).await,
            Action::BirzhaBuy { amount, .. } => api.buy(*amount).await,
            Action::BirzhaSell { amount } => BirzhaGateway::sell(api, *amount).await,
            Action::CreateBuyRequest {
                item_id,
                price,
                amount,
            } => api.create_request(item_id, *price, *amount).await,
            Action::SellToRequest {
                request_id, amount, ..
            } => api.sell_to_request(request_id, *amount).await,
            Action::CancelBuyRequest { request_id } => api.cancel_request(request_id).await,
            Action::CollectStorage { entry_id } => api.collect(entry_id).await,
            Action::PurchaseOffer {
                shop,
                offer_id,
                amount,
                ..
            } => api.purchase(*shop, offer_id, *amount).await,
            Action::UpdateSettings { settings } => api.update_settings(settings).await,
            Action::SelectImage { image } => api.select_image(image).await,
            Action::StartConstruction { building_id } => api.start_construction(building_id).await,
            Action::Contribute {
                construction_id,
                amount,
            } => api.contribute(construction_id, *amount).await,
            Action::CancelConstruction { construction_id } => {
                api.cancel_construction(construction_id).await
            }
        }
    }

    /// Reloads the player snapshot for the logged-in user.
    pub async fn refresh_player(&self) -> ClientResult<()> {
        let id = self.session.user_id().ok_or(ClientError::Unauthorized)?;
        match self.store.load_player(&*self.api, &id, true).await {
            crate::store::LoadOutcome::Failed(err) => Err(err),
            _ => Ok(()),
        }
    }
}
