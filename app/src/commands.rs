use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use prometheus::Registry;
use realm::{
    Action, CollectionStore, CollectionView, Credentials, FileCredentialStore, HttpGameApi,
    HttpPool, LoadOutcome, MutationOrchestrator, NotificationChannel, Session,
};
use realm_core::format::{format_money, format_weight};
use realm_core::{
    AuctionGateway, AuctionLot, BirzhaGateway, BuyRequest, ClientError, CollectionKind, ItemId, Metrics, Operator,
    Predicate, ProjectedRecord,
};
use serde_json::Value;

use crate::config::AppConfig;

/// Wired-up client stack for one CLI invocation.
pub struct Client {
    pub config: AppConfig,
    pub registry: Registry,
    pub session: Arc<Session>,
    pub api: Arc<HttpGameApi>,
    pub store: Arc<CollectionStore>,
    pub orchestrator: MutationOrchestrator<HttpGameApi>,
}

impl Client {
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let registry = Registry::new();
        let creds = Arc::new(FileCredentialStore::new(
            &config.credentials_path,
            config.config_secret.clone(),
        ));
        let session = Arc::new(
            Session::restore(creds)
                .await
                .context("restore session")?,
        );
        let pool = Arc::new(HttpPool::new(&config.client, Arc::clone(&session), &registry)?);
        let api = Arc::new(HttpGameApi::new(pool));
        let store = Arc::new(CollectionStore::new(
            NotificationChannel::new(&config.client.notifications),
            Metrics::new(&registry),
        ));
        let orchestrator =
            MutationOrchestrator::new(Arc::clone(&api), Arc::clone(&store), Arc::clone(&session));
        Ok(Self {
            config,
            registry,
            session,
            api,
            store,
            orchestrator,
        })
    }

    pub async fn login(&self, creds: Credentials) -> Result<()> {
        self.session.login(creds).await
    }

    pub async fn logout(&self) {
        self.session.logout().await;
        self.store.clear();
    }

    pub async fn show_player(&self) -> Result<()> {
        self.orchestrator.refresh_player().await?;
        let player = self
            .store
            .player()
            .ok_or_else(|| anyhow!("player not loaded"))?;
        println!("{} (level {})", player.name, player.level);
        println!("money:   {}", format_money(player.money));
        println!("premium: {}", format_money(player.premium_money));
        println!(
            "items:   {} in inventory, {} equipped",
            player.inventory.len(),
            player.equipment.len()
        );
        Ok(())
    }

    pub async fn list(&self, kind: CollectionKind, query: &str, filters: Vec<Predicate>) -> Result<()> {
        let search = &self.config.client.search;
        let mut view = match kind {
            CollectionKind::Inventory => CollectionView::inventory(Arc::clone(&self.store), search),
            CollectionKind::BuyRequests => CollectionView::buy_requests(Arc::clone(&self.store), search),
            CollectionKind::AuctionLots => CollectionView::auction_lots(Arc::clone(&self.store), search),
            other => CollectionView::plain(Arc::clone(&self.store), other, search),
        };
        if let LoadOutcome::Failed(err) = view.ensure_loaded(self.api.as_ref()).await {
            return Err(anyhow!(err.user_message("load failed")));
        }

        let slots = view.filters().len();
        if filters.len() > slots {
            return Err(anyhow!("{kind} supports {slots} filter(s), got {}", filters.len()));
        }
        for (slot, predicate) in filters.into_iter().enumerate() {
            view.set_filter(slot, predicate);
        }
        view.set_query(query);

        let projection = view.projection();
        if let Some(reason) = projection.empty {
            println!("{}", reason.message());
            return Ok(());
        }
        for row in &projection.items {
            println!("{}", render_row(row));
        }
        Ok(())
    }

    pub async fn bid_history(&self, lot_id: &ItemId) -> Result<()> {
        let bids = self.api.bid_history(lot_id).await?;
        if bids.is_empty() {
            println!("No bids yet");
        }
        for bid in bids {
            println!(
                "{:>12}  {}  {}",
                format_money(bid.amount),
                bid.bidder,
                bid.created_at.unwrap_or_default()
            );
        }
        Ok(())
    }

    pub async fn rate(&self) -> Result<()> {
        let rate = self.api.rate().await?;
        println!("buy:  {}", rate.buy_rate);
        println!("sell: {}", rate.sell_rate);
        Ok(())
    }

    async fn record<T>(&self, kind: CollectionKind, id: &ItemId) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if let LoadOutcome::Failed(err) = self.store.load(self.api.as_ref(), kind, false).await {
            return Err(anyhow!(err.user_message("load failed")));
        }
        let collection = self.store.collection(kind);
        let mut record = collection
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("no {kind} entry with id {id}"))?;
        // keyed payloads carry the id only as the map key
        if let Some(obj) = record.as_object_mut() {
            obj.entry("id")
                .or_insert_with(|| serde_json::to_value(id).unwrap_or(Value::Null));
        }
        serde_json::from_value(record).with_context(|| format!("decode {kind} entry {id}"))
    }

    pub async fn buyout_action(&self, lot_id: ItemId) -> Result<Action> {
        let lot: AuctionLot = self.record(CollectionKind::AuctionLots, &lot_id).await?;
        let price = lot
            .buyout_price
            .ok_or_else(|| anyhow!("lot {lot_id} has no buyout price"))?;
        Ok(Action::Buyout { lot_id, price })
    }

    pub async fn sell_to_request_action(&self, request_id: ItemId, amount: i64) -> Result<Action> {
        let request: BuyRequest = self.record(CollectionKind::BuyRequests, &request_id).await?;
        Ok(Action::SellToRequest {
            request_id,
            item_id: request.item_id,
            amount,
            wanted: request.buy_amount,
        })
    }

    pub async fn birzha_buy_action(&self, amount: i64) -> Result<Action> {
        let rate = self.api.rate().await?;
        Ok(Action::BirzhaBuy {
            amount,
            rate: rate.buy_rate,
        })
    }

    /// Runs one mutation and prints what the notification channel shows.
    pub async fn perform(&self, action: Action) -> Result<()> {
        if let Err(err) = self.orchestrator.refresh_player().await {
            tracing::warn!(?err, "player snapshot unavailable; server will validate");
        }
        let result = self.orchestrator.perform(action).await;
        self.print_notifications();
        match result {
            Ok(_) => Ok(()),
            Err(ClientError::Unauthorized) => Err(anyhow!("session expired, run `realm login`")),
            Err(err) => Err(anyhow!(err)),
        }
    }

    /// Sells the whole stack of every inventory item matching `query`.
    pub async fn sell_matching(&self, query: &str) -> Result<()> {
        self.orchestrator.refresh_player().await?;
        let mut view = CollectionView::inventory(Arc::clone(&self.store), &self.config.client.search);
        view.set_query(query);
        view.select_visible();
        let actions = view.bulk_sell_actions()?;
        if actions.is_empty() {
            println!("Nothing matches your search");
            return Ok(());
        }
        let results = self.orchestrator.perform_batch(actions).await;
        self.print_notifications();
        if results.iter().all(|r| r.is_err()) {
            return Err(anyhow!("no item was sold"));
        }
        Ok(())
    }

    fn print_notifications(&self) {
        let notifier = self.store.notifier();
        if let Some(note) = notifier.current() {
            if note.is_error() {
                eprintln!("error: {}", note.message);
            } else {
                println!("{}", note.message);
            }
        }
        while let Some(modal) = notifier.acknowledge() {
            eprintln!("error: {}", modal.message);
        }
    }
}

fn render_row(row: &ProjectedRecord) -> String {
    let name = match row.name() {
        "" => row
            .field("item_name")
            .and_then(Value::as_str)
            .unwrap_or("?"),
        n => n,
    };
    let mut out = format!("{:>8}  {}", row.id.to_string(), name);
    if let Some(count) = row.field("count").and_then(Value::as_i64) {
        out.push_str(&format!("  x{count}"));
    }
    for key in ["value", "buy_price", "current_bid", "price"] {
        if let Some(v) = row.field(key).and_then(Value::as_i64) {
            out.push_str(&format!("  {key}={}", format_money(v)));
        }
    }
    if let Some(w) = row.field("weight").and_then(Value::as_f64) {
        out.push_str(&format!("  {}kg", format_weight(w)));
    }
    out
}

/// Parses `field<op>value`, e.g. `value>=50` or `junk=true`.
pub fn parse_filter(input: &str) -> Result<Predicate> {
    for symbol in [">=", "<=", ">", "<", "="] {
        if let Some(pos) = input.find(symbol) {
            let field = input[..pos].trim();
            let value = input[pos + symbol.len()..].trim();
            if field.is_empty() || value.is_empty() {
                break;
            }
            let operator: Operator = symbol
                .parse()
                .map_err(|_| anyhow!("unknown operator {symbol}"))?;
            return Ok(Predicate::new(field, operator, value));
        }
    }
    Err(anyhow!("filter must look like field>=value, got {input:?}"))
}

pub fn parse_kind(input: &str) -> Result<CollectionKind> {
    let wanted = input.trim().replace('-', "_");
    CollectionKind::ALL
        .iter()
        .copied()
        .find(|k| k.as_str() == wanted)
        .ok_or_else(|| {
            let names: Vec<&str> = CollectionKind::ALL.iter().map(|k| k.as_str()).collect();
            anyhow!("unknown collection {input:?}; expected one of {}", names.join(", "))
        })
}
