use crate::error::ClientResult;
use crate::model::*;
use async_trait::async_trait;

#[async_trait]
pub trait PlayerGateway: Send + Sync {
    async fn fetch_player(&self, player_id: &ItemId) -> ClientResult<PlayerSnapshot>;
}

#[async_trait]
pub trait InventoryGateway: Send + Sync {
    async fn wear(&self, item_id: &ItemId) -> ClientResult<ActionAck>;
    async fn unwear(&self, item_id: &ItemId) -> ClientResult<ActionAck>;
    async fn sell(&self, item_id: &ItemId, amount: i64) -> ClientResult<ActionAck>;
    async fn throw_away(&self, item_id: &ItemId, amount: i64) -> ClientResult<ActionAck>;
}

#[async_trait]
pub trait AuctionGateway: Send + Sync {
    async fn list_lots(&self) -> ClientResult<Collection>;
    async fn create_lot(
        &self,
        item_id: &ItemId,
        amount: i64,
        start_price: i64,
        buyout_price: Option<i64>,
    ) -> ClientResult<ActionAck>;
    async fn place_bid(&self, lot_id: &ItemId, amount: i64) -> ClientResult<ActionAck>;
    async fn buyout(&self, lot_id: &ItemId) -> ClientResult<ActionAck>;
    async fn bid_history(&self, lot_id: &ItemId) -> ClientResult<Vec<BidRecord>>;
}

#[async_trait]
pub trait BirzhaGateway: Send + Sync {
    async fn rate(&self) -> ClientResult<BirzhaRate>;
    async fn buy(&self, amount: i64) -> ClientResult<ActionAck>;
    async fn sell(&self, amount: i64) -> ClientResult<ActionAck>;
    async fn history(&self) -> ClientResult<Collection>;
}

#[async_trait]
pub trait BuyRequestGateway: Send + Sync {
    async fn list_requests(&self) -> ClientResult<Collection>;
    async fn create_request(&self, item_id: &ItemId, price: i64, amount: i64) -> ClientResult<ActionAck>;
    async fn sell_to_request(&self, request_id: &ItemId, amount: i64) -> ClientResult<ActionAck>;
    async fn cancel_request(&self, request_id: &ItemId) -> ClientResult<ActionAck>;
}

#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn list_storage(&self) -> ClientResult<Collection>;
    async fn collect(&self, entry_id: &ItemId) -> ClientResult<ActionAck>;
}

#[async_trait]
pub trait ShopGateway: Send + Sync {
    async fn offers(&self, shop: ShopKind) -> ClientResult<Collection>;
    async fn purchase(&self, shop: ShopKind, offer_id: &ItemId, amount: i64) -> ClientResult<ActionAck>;
    async fn purchase_history(&self, shop: ShopKind) -> ClientResult<Collection>;
}

#[async_trait]
pub trait SettingsGateway: Send + Sync {
    async fn settings(&self) -> ClientResult<PlayerSettings>;
    async fn update_settings(&self, settings: &PlayerSettings) -> ClientResult<ActionAck>;
    async fn select_image(&self, image: &str) -> ClientResult<ActionAck>;
}

#[async_trait]
pub trait SettlementGateway: Send + Sync {
    async fn buildings(&self) -> ClientResult<Collection>;
    async fn constructions(&self) -> ClientResult<Collection>;
    async fn start_construction(&self, building_id: &ItemId) -> ClientResult<ActionAck>;
    async fn contribute(&self, construction_id: &ItemId, amount: i64) -> ClientResult<ActionAck>;
    async fn cancel_construction(&self, construction_id: &ItemId) -> ClientResult<ActionAck>;
}

/// Fetches any cached collection by kind. Used by the store so loaders don't
/// need to know which gateway owns a list.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    async fn fetch_collection(&self, kind: CollectionKind) -> ClientResult<Collection>;
}

/// Everything the orchestrator talks to.
pub trait GameApi:
    PlayerGateway
    + InventoryGateway
    + AuctionGateway
    + BirzhaGateway
    + BuyRequestGateway
    + StorageGateway
    + ShopGateway
    + SettingsGateway
    + SettlementGateway
    + CollectionSource
{
}

impl<T> GameApi for T where
    T: PlayerGateway
        + InventoryGateway
        + AuctionGateway
        + BirzhaGateway
        + BuyRequestGateway
        + StorageGateway
        + ShopGateway
        + SettingsGateway
        + SettlementGateway
        + CollectionSource
{
}
