use crate::http_pool::HttpPool;
use crate::normalize::{collection_from_value, decode, decode_list, expect_json, parse_ack, player_from_value};
use async_trait::async_trait;
use realm_core::*;
use serde_json::{json, Value};
use std::sync::Arc;

/// HTTP implementation of every gateway port.
#[derive(Clone)]
pub struct HttpGameApi {
    pool: Arc<HttpPool>,
}

fn seg(id: &ItemId) -> String {
    urlencoding::encode(&id.as_key()).into_owned()
}

impl HttpGameApi {
    pub fn new(pool: Arc<HttpPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<HttpPool> {
        &self.pool
    }

    async fn list(&self, path: &str, id_field: &str) -> ClientResult<Collection> {
        let body = expect_json(self.pool.get(path).await?)?;
        collection_from_value(&body, id_field)
    }

    async fn ack(&self, path: &str, body: Value) -> ClientResult<ActionAck> {
        parse_ack(self.pool.post(path, Some(&body)).await?)
    }

    async fn current_player(&self) -> ClientResult<PlayerSnapshot> {
        let id = self
            .pool
            .session()
            .user_id()
            .ok_or(ClientError::Unauthorized)?;
        self.fetch_player(&id).await
    }
}

#[async_trait]
impl PlayerGateway for HttpGameApi {
    async fn fetch_player(&self, player_id: &ItemId) -> ClientResult<PlayerSnapshot> {
        let body = expect_json(self.pool.get(&format!("/players/{}", seg(player_id))).await?)?;
        player_from_value(body)
    }
}

#[async_trait]
impl InventoryGateway for HttpGameApi {
    async fn wear(&self, item_id: &ItemId) -> ClientResult<ActionAck> {
        self.ack("/inventory/wear", json!({ "item_id": item_id })).await
    }

    async fn unwear(&self, item_id: &ItemId) -> ClientResult<ActionAck> {
        self.ack("/inventory/unwear", json!({ "item_id": item_id })).await
    }

    async fn sell(&self, item_id: &ItemId, amount: i64) -> ClientResult<ActionAck> {
        self.ack("/inventory/sell", json!({ "item_id": item_id, "amount": amount }))
            .await
    }

    async fn throw_away(&self, item_id: &ItemId, amount: i64) -> ClientResult<ActionAck> {
        self.ack("/inventory/throw", json!({ "item_id": item_id, "amount": amount }))
            .await
    }
}

#[async_trait]
impl AuctionGateway for HttpGameApi {
    async fn list_lots(&self) -> ClientResult<Collection> {
        self.list("/auction/lots", "id").await
    }

    async fn create_lot(
        &self,
        item_id: &ItemId,
        amount: i64,
        start_price: i64,
        buyout_price: Option<i64>,
    ) -> ClientResult<ActionAck> {
        self.ack(
            "/auction/lots",
            json!({
                "item_id": item_id,
                "amount": amount,
                "start_price": start_price,
                "buyout_price": buyout_price,
            }),
        )
        .await
    }

    async fn place_bid(&self, lot_id: &ItemId, amount: i64) -> ClientResult<ActionAck> {
        self.ack(
            &format!("/auction/lots/{}/bid", seg(lot_id)),
            json!({ "amount": amount }),
        )
        .await
    }

    async fn buyout(&self, lot_id: &ItemId) -> ClientResult<ActionAck> {
        self.ack(&format!("/auction/lots/{}/buyout", seg(lot_id)), json!({}))
            .await
    }

    async fn bid_history(&self, lot_id: &ItemId) -> ClientResult<Vec<BidRecord>> {
        let body = expect_json(
            self.pool
                .get(&format!("/auction/lots/{}/bids", seg(lot_id)))
                .await?,
        )?;
        decode_list(&body)
    }
}

#[async_trait]
impl BirzhaGateway for HttpGameApi {
    async fn rate(&self) -> ClientResult<BirzhaRate> {
        decode(expect_json(self.pool.get("/birzha/rate").await?)?)
    }

    async fn buy(&self, amount: i64) -> ClientResult<ActionAck> {
        self.ack("/birzha/buy", json!({ "amount": amount })).await
    }

    async fn sell(&self, amount: i64) -> ClientResult<ActionAck> {
        self.ack("/birzha/sell", json!({ "amount": amount })).await
    }

    async fn history(&self) -> ClientResult<Collection> {
        self.list("/birzha/history", "id").await
    }
}

#[async_trait]
impl BuyRequestGateway for HttpGameApi {
    async fn list_requests(&self) -> ClientResult<Collection> {
        self.list("/buy-requests", "id").await
    }

    async fn create_request(&self, item_id: &ItemId, price: i64, amount: i64) -> ClientResult<ActionAck> {
        self.ack(
            "/buy-requests",
            json!({ "item_id": item_id, "buy_price": price, "buy_amount": amount }),
        )
        .await
    }

    async fn sell_to_request(&self, request_id: &ItemId, amount: i64) -> ClientResult<ActionAck> {
        self.ack(
            &format!("/buy-requests/{}/sell", seg(request_id)),
            json!({ "amount": amount }),
        )
        .await
    }

    async fn cancel_request(&self, request_id: &ItemId) -> ClientResult<ActionAck> {
        parse_ack(
            self.pool
                .delete(&format!("/buy-requests/{}", seg(request_id)))
                .await?,
        )
    }
}

#[async_trait]
impl StorageGateway for HttpGameApi {
    async fn list_storage(&self) -> ClientResult<Collection> {
        self.list("/storage", "id").await
    }

    async fn collect(&self, entry_id: &ItemId) -> ClientResult<ActionAck> {
        self.ack(&format!("/storage/{}/collect", seg(entry_id)), json!({}))
            .await
    }
}

#[async_trait]
impl ShopGateway for HttpGameApi {
    async fn offers(&self, shop: ShopKind) -> ClientResult<Collection> {
        self.list(&format!("/shop/{}/offers", shop.as_str()), "id")
            .await
    }

    async fn purchase(&self, shop: ShopKind, offer_id: &ItemId, amount: i64) -> ClientResult<ActionAck> {
        self.ack(
            &format!("/shop/{}/purchase", shop.as_str()),
            json!({ "offer_id": offer_id, "amount": amount }),
        )
        .await
    }

    async fn purchase_history(&self, shop: ShopKind) -> ClientResult<Collection> {
        self.list(&format!("/shop/{}/history", shop.as_str()), "id")
            .await
    }
}

#[async_trait]
impl SettingsGateway for HttpGameApi {
    async fn settings(&self) -> ClientResult<PlayerSettings> {
        decode(expect_json(self.pool.get("/settings").await?)?)
    }

    async fn update_settings(&self, settings: &PlayerSettings) -> ClientResult<ActionAck> {
        let body = serde_json::to_value(settings)?;
        parse_ack(self.pool.put("/settings", Some(&body)).await?)
    }

    async fn select_image(&self, image: &str) -> ClientResult<ActionAck> {
        self.ack("/settings/image", json!({ "image": image })).await
    }
}

#[async_trait]
impl SettlementGateway for HttpGameApi {
    async fn buildings(&self) -> ClientResult<Collection> {
        self.list("/settlement/buildings", "id").await
    }

    async fn constructions(&self) -> ClientResult<Collection> {
        self.list("/settlement/constructions", "id").await
    }

    async fn start_construction(&self, building_id: &ItemId) -> ClientResult<ActionAck> {
        self.ack(
            &format!("/settlement/buildings/{}/construct", seg(building_id)),
            json!({}),
        )
        .await
    }

    async fn contribute(&self, construction_id: &ItemId, amount: i64) -> ClientResult<ActionAck> {
        self.ack(
            &format!("/settlement/constructions/{}/contribute", seg(construction_id)),
            json!({ "amount": amount }),
        )
        .await
    }

    async fn cancel_construction(&self, construction_id: &ItemId) -> ClientResult<ActionAck> {
        parse_ack(
            self.pool
                .delete(&format!("/settlement/constructions/{}", seg(construction_id)))
                .await?,
        )
    }
}

#[async_trait]
impl CollectionSource for HttpGameApi {
    async fn fetch_collection(&self, kind: CollectionKind) -> ClientResult<Collection> {
        match kind {
            CollectionKind::Inventory => Ok(self.current_player().await?.inventory),
            CollectionKind::Equipment => Ok(self.current_player().await?.equipment),
            CollectionKind::BuyRequests => self.list_requests().await,
            CollectionKind::Storage => self.list_storage().await,
            CollectionKind::AuctionLots => self.list_lots().await,
            CollectionKind::BirzhaHistory => BirzhaGateway::history(self).await,
            CollectionKind::EventShop => self.offers(ShopKind::Event).await,
            CollectionKind::PremiumShop => self.offers(ShopKind::Premium).await,
            CollectionKind::EventPurchases => self.purchase_history(ShopKind::Event).await,
            CollectionKind::PremiumPurchases => self.purchase_history(ShopKind::Premium).await,
            CollectionKind::Buildings => self.buildings().await,
            CollectionKind::Constructions => self.constructions().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::http_pool::test_server;
    use crate::session::{Credentials, MemoryCredentialStore, Session};
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use prometheus::Registry;

    #[derive(Default)]
    struct Recorded {
        calls: Mutex<Vec<(String, Value)>>,
    }

    async fn api(app: Router) -> HttpGameApi {
        let addr = test_server::spawn(app).await;
        let mut cfg = ClientConfig::default();
        cfg.http.base_url = format!("http://{addr}");
        let store = Arc::new(MemoryCredentialStore::with(Credentials {
            access_token: "t".into(),
            refresh_token: None,
            user_id: Some(ItemId::Num(3)),
        }));
        let session = Arc::new(Session::restore(store).await.unwrap());
        HttpGameApi::new(Arc::new(
            HttpPool::new(&cfg, session, &Registry::new()).unwrap(),
        ))
    }

    #[tokio::test]
    async fn list_endpoints_normalize_every_shape() {
        let app = Router::new()
            .route("/auction/lots", get(|| async { Json(json!([{"id": 1, "item_name": "Axe"}])) }))
            .route("/buy-requests", get(|| async { Json(json!({"data": [{"id": "r1"}]})) }))
            .route("/storage", get(|| async { Json(json!({"id": 4, "item_name": "Ore"})) }));
        let api = api(app).await;

        let lots = api.fetch_collection(CollectionKind::AuctionLots).await.unwrap();
        assert!(lots.contains(&ItemId::Num(1)));
        let reqs = api.fetch_collection(CollectionKind::BuyRequests).await.unwrap();
        assert!(reqs.contains(&ItemId::from("r1")));
        let storage = api.fetch_collection(CollectionKind::Storage).await.unwrap();
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn inventory_comes_from_the_session_player() {
        let app = Router::new().route(
            "/players/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({"id": id, "money": 10, "inventory": {"1": {"name": "Herb", "count": 2}}}))
            }),
        );
        let api = api(app).await;
        let inv = api.fetch_collection(CollectionKind::Inventory).await.unwrap();
        assert!(inv.contains(&ItemId::Num(1)));
    }

    #[tokio::test]
    async fn writes_send_amounts_and_surface_server_detail() {
        let rec = Arc::new(Recorded::default());
        let app = Router::new()
            .route(
                "/auction/lots/{id}/bid",
                post(
                    |State(rec): State<Arc<Recorded>>,
                     Path(id): Path<String>,
                     Json(body): Json<Value>| async move {
                        rec.calls.lock().push((id, body));
                        (StatusCode::BAD_REQUEST, Json(json!({"detail": "Insufficient funds"})))
                    },
                ),
            )
            .route(
                "/buy-requests/{id}",
                delete(|Path(_id): Path<String>| async { Json(json!({"status": true, "message": "Cancelled"})) }),
            )
            .with_state(rec.clone());
        let api = api(app).await;

        let err = api.place_bid(&ItemId::Num(8), 150).await.unwrap_err();
        assert_eq!(err.user_message("Bid failed"), "Insufficient funds");
        let calls = rec.calls.lock().clone();
        assert_eq!(calls, vec![("8".to_string(), json!({"amount": 150}))]);

        let ack = api.cancel_request(&ItemId::from("r 1")).await.unwrap();
        assert_eq!(ack.message, "Cancelled");
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_server_error() {
        let api = api(Router::new()).await;
        let err = api.rate().await.unwrap_err();
        assert!(matches!(err, ClientError::Server { status: 404, .. }));
    }
}
