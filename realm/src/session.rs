use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use realm_core::ItemId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Tokens and user id kept in persistent client storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_id: Option<ItemId>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> Result<Option<Credentials>>;
    async fn save(&self, creds: &Credentials) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(creds: Credentials) -> Self {
        Self {
            inner: Mutex::new(Some(creds)),
        }
    }

    pub fn stored(&self) -> Option<Credentials> {
        self.inner.lock().clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.inner.lock().clone())
    }

    async fn save(&self, creds: &Credentials) -> Result<()> {
        *self.inner.lock() = Some(creds.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.inner.lock() = None;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    Refreshed,
    /// Credentials were dropped; the UI must route to the login screen.
    LoginRequired,
}

/// In-memory view of the persisted credentials plus the refresh lock shared
/// by every request.
pub struct Session {
    creds: RwLock<Option<Credentials>>,
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            creds: RwLock::new(None),
            store,
            events,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Builds a session from whatever the store holds.
    pub async fn restore(store: Arc<dyn CredentialStore>) -> Result<Self> {
        let creds = store.load().await?;
        let session = Self::new(store);
        *session.creds.write() = creds;
        Ok(session)
    }

    pub fn is_authenticated(&self) -> bool {
        self.creds.read().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.creds.read().as_ref().map(|c| c.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.creds
            .read()
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
    }

    pub fn user_id(&self) -> Option<ItemId> {
        self.creds.read().as_ref().and_then(|c| c.user_id.clone())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn login(&self, creds: Credentials) -> Result<()> {
        self.store.save(&creds).await?;
        *self.creds.write() = Some(creds);
        let _ = self.events.send(SessionEvent::LoggedIn);
        tracing::info!(target: "session", "credentials stored");
        Ok(())
    }

    /// Swaps in a refreshed access token, keeping the old refresh token
    /// unless the server rotated it.
    pub async fn apply_refresh(&self, access_token: String, refresh_token: Option<String>) -> Result<()> {
        let updated = {
            let mut guard = self.creds.write();
            let current = guard.get_or_insert_with(Credentials::default);
            current.access_token = access_token;
            if refresh_token.is_some() {
                current.refresh_token = refresh_token;
            }
            current.clone()
        };
        self.store.save(&updated).await?;
        let _ = self.events.send(SessionEvent::Refreshed);
        Ok(())
    }

    /// Drops all credentials and tells listeners to route to login.
    pub async fn logout(&self) {
        *self.creds.write() = None;
        if let Err(err) = self.store.clear().await {
            tracing::warn!(target: "session", ?err, "failed to clear persisted credentials");
        }
        let _ = self.events.send(SessionEvent::LoginRequired);
        tracing::info!(target: "session", "session cleared, login required");
    }

    pub(crate) async fn refresh_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refresh_lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            access_token: "a1".into(),
            refresh_token: Some("r1".into()),
            user_id: Some(ItemId::Num(7)),
        }
    }

    #[tokio::test]
    async fn restore_reads_persisted_credentials() {
        let store = Arc::new(MemoryCredentialStore::with(creds()));
        let session = Session::restore(store).await.unwrap();
        assert_eq!(session.access_token().as_deref(), Some("a1"));
        assert_eq!(session.user_id(), Some(ItemId::Num(7)));
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_unless_rotated() {
        let store = Arc::new(MemoryCredentialStore::with(creds()));
        let session = Session::restore(store.clone()).await.unwrap();
        session.apply_refresh("a2".into(), None).await.unwrap();
        assert_eq!(session.refresh_token().as_deref(), Some("r1"));
        session.apply_refresh("a3".into(), Some("r2".into())).await.unwrap();
        let stored = store.stored().unwrap();
        assert_eq!(stored.access_token, "a3");
        assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn logout_clears_store_and_emits_event() {
        let store = Arc::new(MemoryCredentialStore::with(creds()));
        let session = Session::restore(store.clone()).await.unwrap();
        let mut events = session.subscribe();
        session.logout().await;
        assert!(!session.is_authenticated());
        assert!(store.stored().is_none());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoginRequired);
    }
}
