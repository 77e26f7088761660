use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub type TimestampMs = i64;

/// Identifier of a record inside a server-owned collection.
///
/// The backend mixes numeric ids (inventory, lots) with string ids (requests
/// created by some handlers), so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Num(i64),
    Str(String),
}

impl ItemId {
    /// Parses a JSON object key, preferring the numeric form.
    pub fn from_key(key: &str) -> Self {
        match key.trim().parse::<i64>() {
            Ok(n) => ItemId::Num(n),
            Err(_) => ItemId::Str(key.to_string()),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(ItemId::Num),
            Value::String(s) if !s.trim().is_empty() => Some(ItemId::from_key(s)),
            _ => None,
        }
    }

    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Num(n) => write!(f, "{}", n),
            ItemId::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(v: i64) -> Self {
        ItemId::Num(v)
    }
}

impl From<&str> for ItemId {
    fn from(v: &str) -> Self {
        ItemId::from_key(v)
    }
}

/// Server-owned resource sets cached by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Inventory,
    Equipment,
    BuyRequests,
    Storage,
    AuctionLots,
    BirzhaHistory,
    EventShop,
    PremiumShop,
    EventPurchases,
    PremiumPurchases,
    Buildings,
    Constructions,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 12] = [
        CollectionKind::Inventory,
        CollectionKind::Equipment,
        CollectionKind::BuyRequests,
        CollectionKind::Storage,
        CollectionKind::AuctionLots,
        CollectionKind::BirzhaHistory,
        CollectionKind::EventShop,
        CollectionKind::PremiumShop,
        CollectionKind::EventPurchases,
        CollectionKind::PremiumPurchases,
        CollectionKind::Buildings,
        CollectionKind::Constructions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Inventory => "inventory",
            CollectionKind::Equipment => "equipment",
            CollectionKind::BuyRequests => "buy_requests",
            CollectionKind::Storage => "storage",
            CollectionKind::AuctionLots => "auction_lots",
            CollectionKind::BirzhaHistory => "birzha_history",
            CollectionKind::EventShop => "event_shop",
            CollectionKind::PremiumShop => "premium_shop",
            CollectionKind::EventPurchases => "event_purchases",
            CollectionKind::PremiumPurchases => "premium_purchases",
            CollectionKind::Buildings => "buildings",
            CollectionKind::Constructions => "constructions",
        }
    }

    /// Field used as the record id when a list payload carries no keys.
    pub fn id_field(&self) -> &'static str {
        match self {
            CollectionKind::Inventory | CollectionKind::Equipment => "item_id",
            _ => "id",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Insertion-ordered mapping of id to record.
///
/// Records are kept as JSON objects so the projector can filter on any field
/// the server sends; typed DTOs are recovered with [`Collection::get_as`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    entries: Map<String, Value>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(entries: Map<String, Value>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, id: ItemId, record: Value) -> Option<Value> {
        self.entries.insert(id.as_key(), record)
    }

    pub fn get(&self, id: &ItemId) -> Option<&Value> {
        self.entries.get(&id.as_key())
    }

    pub fn get_as<T: serde::de::DeserializeOwned>(&self, id: &ItemId) -> Option<T> {
        self.get(id)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.entries.contains_key(&id.as_key())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.entries.keys().map(|k| ItemId::from_key(k))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &Value)> + '_ {
        self.entries.iter().map(|(k, v)| (ItemId::from_key(k), v))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }
}

impl FromIterator<(ItemId, Value)> for Collection {
    fn from_iter<I: IntoIterator<Item = (ItemId, Value)>>(iter: I) -> Self {
        let mut c = Collection::new();
        for (id, v) in iter {
            c.insert(id, v);
        }
        c
    }
}

/// Uniform `{status, message}` answer of every write endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAck {
    #[serde(default)]
    pub status: bool,
    #[serde(default)]
    pub message: String,
}

impl ActionAck {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub corrupted: bool,
    #[serde(default)]
    pub junk: bool,
    #[serde(default)]
    pub is_equippable: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyRequest {
    pub id: ItemId,
    pub item_id: ItemId,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub buy_price: i64,
    #[serde(default)]
    pub buy_amount: i64,
    #[serde(default)]
    pub user_id: Option<ItemId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub id: ItemId,
    pub item_id: ItemId,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionLot {
    pub id: ItemId,
    pub item_id: ItemId,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub current_bid: i64,
    #[serde(default)]
    pub buyout_price: Option<i64>,
    #[serde(default)]
    pub seller_id: Option<ItemId>,
    #[serde(default)]
    pub ends_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidRecord {
    #[serde(default)]
    pub bidder: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirzhaRate {
    #[serde(default)]
    pub buy_rate: f64,
    #[serde(default)]
    pub sell_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirzhaTrade {
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopKind {
    Event,
    Premium,
}

impl ShopKind {
    pub fn offers_kind(&self) -> CollectionKind {
        match self {
            ShopKind::Event => CollectionKind::EventShop,
            ShopKind::Premium => CollectionKind::PremiumShop,
        }
    }

    pub fn history_kind(&self) -> CollectionKind {
        match self {
            ShopKind::Event => CollectionKind::EventPurchases,
            ShopKind::Premium => CollectionKind::PremiumPurchases,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShopKind::Event => "event",
            ShopKind::Premium => "premium",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShopOffer {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub stock: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    #[serde(default)]
    pub offer_id: Option<ItemId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: i64,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub notifications: bool,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub id: ItemId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub level: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construction {
    pub id: ItemId,
    #[serde(default)]
    pub building_id: Option<ItemId>,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub required: i64,
    #[serde(default)]
    pub finishes_at: Option<String>,
}

/// The "current player" projection shared by every view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerSnapshot {
    pub id: Option<ItemId>,
    pub name: String,
    pub level: i64,
    pub money: i64,
    pub premium_money: i64,
    pub image: Option<String>,
    pub inventory: Collection,
    pub equipment: Collection,
}

impl PlayerSnapshot {
    /// Stack size of an inventory item, 0 when absent or unreadable.
    pub fn item_count(&self, id: &ItemId) -> i64 {
        self.inventory
            .get(id)
            .and_then(|v| v.get("count"))
            .and_then(parse_count)
            .unwrap_or(0)
    }
}

/// Reads a stack size sent as an integer, a whole float (`3.0`) or a numeric
/// string (`"5"`, `"2.0"`).
pub fn parse_count(value: &Value) -> Option<i64> {
    fn whole(f: f64) -> Option<i64> {
        (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
    }
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub expires_at_ms: Option<TimestampMs>,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            expires_at_ms: None,
        }
    }

    pub fn expiring_at(mut self, at_ms: TimestampMs) -> Self {
        self.expires_at_ms = Some(at_ms);
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == NotificationKind::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_id_prefers_numeric_keys() {
        assert_eq!(ItemId::from_key("42"), ItemId::Num(42));
        assert_eq!(ItemId::from_key("req-7"), ItemId::Str("req-7".into()));
        assert_eq!(ItemId::from_value(&json!(3)), Some(ItemId::Num(3)));
        assert_eq!(ItemId::from_value(&json!("")), None);
    }

    #[test]
    fn collection_keeps_insertion_order() {
        let c: Collection = vec![
            (ItemId::Num(9), json!({"name": "Axe"})),
            (ItemId::Num(1), json!({"name": "Sword"})),
            (ItemId::from("b"), json!({"name": "Bow"})),
        ]
        .into_iter()
        .collect();
        let ids: Vec<ItemId> = c.ids().collect();
        assert_eq!(ids, vec![ItemId::Num(9), ItemId::Num(1), ItemId::from("b")]);
    }

    #[test]
    fn player_item_count_reads_numeric_and_string_counts() {
        let mut snap = PlayerSnapshot::default();
        snap.inventory.insert(ItemId::Num(1), json!({"count": 2}));
        snap.inventory.insert(ItemId::Num(2), json!({"count": "5"}));
        assert_eq!(snap.item_count(&ItemId::Num(1)), 2);
        assert_eq!(snap.item_count(&ItemId::Num(2)), 5);
        assert_eq!(snap.item_count(&ItemId::Num(3)), 0);
    }

    #[test]
    fn counts_accept_whole_floats_and_numeric_strings() {
        assert_eq!(parse_count(&json!(4)), Some(4));
        assert_eq!(parse_count(&json!(3.0)), Some(3));
        assert_eq!(parse_count(&json!(" 5 ")), Some(5));
        assert_eq!(parse_count(&json!("2.0")), Some(2));
        assert_eq!(parse_count(&json!(2.5)), None);
        assert_eq!(parse_count(&json!("many")), None);
        assert_eq!(parse_count(&json!(null)), None);
    }

    #[test]
    fn typed_records_are_recovered_from_collection() {
        let mut c = Collection::new();
        c.insert(
            ItemId::Num(1),
            json!({"name": "Sword", "type": "weapon", "value": 100, "count": 1}),
        );
        let item: InventoryItem = c.get_as(&ItemId::Num(1)).expect("typed item");
        assert_eq!(item.item_type, "weapon");
        assert_eq!(item.count, 1);
        assert!(!item.junk);
    }
}
