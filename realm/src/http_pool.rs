use crate::config::ClientConfig;
use crate::session::Session;
use anyhow::{Context, Result};
use prometheus::{HistogramVec, IntCounterVec, IntGaugeVec, Registry};
use realm_core::{ClientError, ClientResult};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, ClientBuilder, Method,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Shared HTTP client for every gateway.
///
/// Attaches the bearer token and tunnel header to each request. A 401 triggers
/// exactly one token refresh followed by exactly one retry; when that does not
/// help the session is cleared and the caller gets `ClientError::Unauthorized`.
#[derive(Clone)]
pub struct HttpPool {
    client: Client,
    base: Url,
    session: Arc<Session>,
    tunnel_header: Option<(HeaderName, HeaderValue)>,
    refresh_path: String,
    metrics: Arc<HttpMetrics>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub json: Option<Value>,
    pub text: Option<String>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl HttpPool {
    pub fn new(cfg: &ClientConfig, session: Arc<Session>, registry: &Registry) -> Result<Self> {
        let http = &cfg.http;
        let client = ClientBuilder::new()
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .pool_max_idle_per_host(http.max_connections)
            .connect_timeout(Duration::from_millis(http.timeout_ms))
            .timeout(Duration::from_millis(http.timeout_ms))
            .build()
            .context("build reqwest client")?;

        // Url::join drops the last path segment unless the base ends in '/'.
        let mut base_str = http.base_url.trim().to_string();
        if !base_str.ends_with('/') {
            base_str.push('/');
        }
        let base = Url::parse(&base_str).context("parse base url")?;

        let (name, value) = &http.tunnel_header;
        let tunnel_header = if name.trim().is_empty() {
            None
        } else {
            Some((
                HeaderName::from_bytes(name.as_bytes()).context("tunnel header name")?,
                HeaderValue::from_str(value).context("tunnel header value")?,
            ))
        };

        Ok(Self {
            client,
            base,
            session,
            tunnel_header,
            refresh_path: http.refresh_path.clone(),
            metrics: Arc::new(HttpMetrics::new(registry)?),
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn build_url(&self, path: &str) -> ClientResult<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).map_err(|err| ClientError::Unexpected(err.to_string()));
        }
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|err| ClientError::Unexpected(format!("join url {path}: {err}")))
    }

    fn headers(&self, token: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some((name, value)) = &self.tunnel_header {
            h.insert(name.clone(), value.clone());
        }
        if let Some(token) = token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(v) => {
                    h.insert(AUTHORIZATION, v);
                }
                Err(err) => {
                    tracing::warn!(target: "http", ?err, "access token is not a valid header value");
                }
            }
        }
        h
    }

    pub async fn get(&self, path: &str) -> ClientResult<HttpResponse> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> ClientResult<HttpResponse> {
        self.request(Method::POST, path, body).await
    }

    pub async fn put(&self, path: &str, body: Option<&Value>) -> ClientResult<HttpResponse> {
        self.request(Method::PUT, path, body).await
    }

    pub async fn delete(&self, path: &str) -> ClientResult<HttpResponse> {
        self.request(Method::DELETE, path, None).await
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> ClientResult<HttpResponse> {
        let token = self.session.access_token();
        let resp = self.do_req(&method, path, body, token.as_deref()).await?;
        if resp.status != 401 {
            return Ok(resp);
        }

        tracing::info!(target: "http", method=%method, path=%path, "unauthorized, refreshing token");
        if !self.refresh_after_unauthorized(token.as_deref()).await {
            self.session.logout().await;
            return Err(ClientError::Unauthorized);
        }

        let token = self.session.access_token();
        let retry = self.do_req(&method, path, body, token.as_deref()).await?;
        if retry.status == 401 {
            tracing::warn!(target: "http", method=%method, path=%path, "still unauthorized after refresh");
            self.session.logout().await;
            return Err(ClientError::Unauthorized);
        }
        Ok(retry)
    }

    /// Returns true when a usable token is in place for the retry. Concurrent
    /// 401s queue on the session's refresh lock; whoever comes second sees a
    /// token different from the one that failed and skips the refresh call.
    async fn refresh_after_unauthorized(&self, stale: Option<&str>) -> bool {
        let _guard = self.session.refresh_guard().await;

        let current = self.session.access_token();
        if current.is_some() && current.as_deref() != stale {
            return true;
        }
        let Some(refresh_token) = self.session.refresh_token() else {
            tracing::info!(target: "http", "no refresh token stored");
            return false;
        };

        let body = json!({ "refresh_token": refresh_token });
        let resp = match self
            .do_req(&Method::POST, &self.refresh_path, Some(&body), None)
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(target: "http", ?err, "token refresh request failed");
                return false;
            }
        };
        if !resp.is_success() {
            tracing::warn!(target: "http", status=%resp.status, "token refresh rejected");
            return false;
        }

        let json = resp.json.as_ref();
        let access = json
            .and_then(|v| v.get("access_token"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let Some(access) = access else {
            tracing::warn!(target: "http", "token refresh response without access_token");
            return false;
        };
        let rotated = json
            .and_then(|v| v.get("refresh_token"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Err(err) = self.session.apply_refresh(access.to_string(), rotated).await {
            // The new token is live in memory even if persisting failed.
            tracing::warn!(target: "http", ?err, "failed to persist refreshed token");
        }
        true
    }

    async fn do_req(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> ClientResult<HttpResponse> {
        let url = self.build_url(path)?;
        let label = method.as_str();
        let mut builder = self
            .client
            .request(method.clone(), url)
            .headers(self.headers(token));
        if let Some(v) = body {
            builder = builder.json(v);
        }

        let start = Instant::now();
        self.metrics.inflight.with_label_values(&[label]).inc();
        self.metrics
            .req_total
            .with_label_values(&[label, path])
            .inc();
        let result = match builder.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                resp.bytes().await.map(|bytes| (status, bytes))
            }
            Err(err) => Err(err),
        };
        self.metrics.inflight.with_label_values(&[label]).dec();

        let (status, body_bytes) = match result {
            Ok(ok) => ok,
            Err(err) => {
                self.metrics
                    .fail_total
                    .with_label_values(&[label, path])
                    .inc();
                tracing::warn!(target: "http", method=%label, path=%path, ?err, "HTTP request failed");
                return Err(ClientError::Network(err.to_string()));
            }
        };

        let dur = start.elapsed().as_secs_f64();
        self.metrics
            .latency
            .with_label_values(&[label, path])
            .observe(dur);
        if status >= 400 {
            self.metrics
                .fail_total
                .with_label_values(&[label, path])
                .inc();
        }
        let dur_ms = (dur * 1000.0) as u64;
        tracing::info!(target: "http", method=%label, path=%path, status=%status, latency_ms=%dur_ms, bytes=%body_bytes.len(), "HTTP request completed");
        Ok(Self::parse_body(status, &body_bytes))
    }

    fn parse_body(status: u16, bytes: &[u8]) -> HttpResponse {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(v) => HttpResponse {
                status,
                json: Some(v),
                text: None,
            },
            Err(_) => HttpResponse {
                status,
                json: None,
                text: (!bytes.is_empty()).then(|| String::from_utf8_lossy(bytes).to_string()),
            },
        }
    }
}

#[derive(Clone)]
struct HttpMetrics {
    req_total: IntCounterVec,
    fail_total: IntCounterVec,
    inflight: IntGaugeVec,
    latency: HistogramVec,
}

impl HttpMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let req_total = IntCounterVec::new(
            prometheus::Opts::new("realm_http_requests_total", "HTTP requests total"),
            &["method", "path"],
        )?;
        let fail_total = IntCounterVec::new(
            prometheus::Opts::new("realm_http_failures_total", "HTTP failures total"),
            &["method", "path"],
        )?;
        let inflight = IntGaugeVec::new(
            prometheus::Opts::new("realm_http_inflight", "HTTP inflight requests"),
            &["method"],
        )?;
        let latency = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "realm_http_latency_seconds",
                "HTTP request latency seconds",
            )
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["method", "path"],
        )?;
        registry.register(Box::new(req_total.clone())).ok();
        registry.register(Box::new(fail_total.clone())).ok();
        registry.register(Box::new(inflight.clone())).ok();
        registry.register(Box::new(latency.clone())).ok();
        Ok(Self {
            req_total,
            fail_total,
            inflight,
            latency,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Credentials, MemoryCredentialStore, SessionEvent};
    use axum::extract::State;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Backend {
        refreshes: AtomicUsize,
        refresh_ok: bool,
        accept_fresh: bool,
    }

    async fn whoami(
        State(be): State<Arc<Backend>>,
        headers: AxumHeaders,
    ) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let tunnel = headers.get("ngrok-skip-browser-warning").is_some();
        if auth == "Bearer fresh" && be.accept_fresh {
            (StatusCode::OK, Json(json!({ "auth": auth, "tunnel": tunnel })))
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "expired" })))
        }
    }

    async fn refresh(
        State(be): State<Arc<Backend>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        be.refreshes.fetch_add(1, Ordering::SeqCst);
        if be.refresh_ok && body["refresh_token"] == "r1" {
            (StatusCode::OK, Json(json!({ "access_token": "fresh" })))
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad refresh" })))
        }
    }

    async fn pool_for(be: Arc<Backend>, store: Arc<MemoryCredentialStore>) -> HttpPool {
        let app = Router::new()
            .route("/me", get(whoami))
            .route("/auth/refresh", post(refresh))
            .with_state(be);
        let addr = test_server::spawn(app).await;
        let mut cfg = ClientConfig::default();
        cfg.http.base_url = format!("http://{addr}");
        let session = Arc::new(Session::restore(store).await.unwrap());
        HttpPool::new(&cfg, session, &Registry::new()).unwrap()
    }

    fn stale() -> Credentials {
        Credentials {
            access_token: "stale".into(),
            refresh_token: Some("r1".into()),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn unauthorized_refreshes_once_then_retries() {
        let be = Arc::new(Backend {
            refresh_ok: true,
            accept_fresh: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryCredentialStore::with(stale()));
        let pool = pool_for(be.clone(), store.clone()).await;

        let resp = pool.get("/me").await.unwrap();
        assert_eq!(resp.status, 200);
        let body = resp.json.unwrap();
        assert_eq!(body["auth"], "Bearer fresh");
        assert_eq!(body["tunnel"], true);
        assert_eq!(be.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(store.stored().unwrap().access_token, "fresh");
        assert_eq!(store.stored().unwrap().refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn failed_refresh_clears_session() {
        let be = Arc::new(Backend::default());
        let store = Arc::new(MemoryCredentialStore::with(stale()));
        let pool = pool_for(be.clone(), store.clone()).await;
        let mut events = pool.session().subscribe();

        let err = pool.get("/me").await.unwrap_err();
        assert_eq!(err, ClientError::Unauthorized);
        assert_eq!(be.refreshes.load(Ordering::SeqCst), 1);
        assert!(store.stored().is_none());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoginRequired);
    }

    #[tokio::test]
    async fn retry_still_unauthorized_does_not_loop() {
        let be = Arc::new(Backend {
            refresh_ok: true,
            accept_fresh: false,
            ..Default::default()
        });
        let store = Arc::new(MemoryCredentialStore::with(stale()));
        let pool = pool_for(be.clone(), store.clone()).await;

        let err = pool.get("/me").await.unwrap_err();
        assert_eq!(err, ClientError::Unauthorized);
        assert_eq!(be.refreshes.load(Ordering::SeqCst), 1);
        assert!(!pool.session().is_authenticated());
    }

    #[tokio::test]
    async fn concurrent_unauthorized_requests_share_one_refresh() {
        let be = Arc::new(Backend {
            refresh_ok: true,
            accept_fresh: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryCredentialStore::with(stale()));
        let pool = pool_for(be.clone(), store).await;

        let (a, b) = tokio::join!(pool.get("/me"), pool.get("/me"));
        assert_eq!(a.unwrap().status, 200);
        assert_eq!(b.unwrap().status, 200);
        assert_eq!(be.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut cfg = ClientConfig::default();
        cfg.http.base_url = format!("http://{addr}");
        cfg.http.timeout_ms = 2_000;
        let session = Arc::new(Session::new(Arc::new(MemoryCredentialStore::new())));
        let pool = HttpPool::new(&cfg, session, &Registry::new()).unwrap();

        let err = pool.get("/me").await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }

    #[test]
    fn base_url_with_prefix_keeps_its_path() {
        let mut cfg = ClientConfig::default();
        cfg.http.base_url = "http://example.test/api".into();
        let session = Arc::new(Session::new(Arc::new(MemoryCredentialStore::new())));
        let pool = HttpPool::new(&cfg, session, &Registry::new()).unwrap();
        assert_eq!(
            pool.build_url("/players/1").unwrap().as_str(),
            "http://example.test/api/players/1"
        );
    }
}
