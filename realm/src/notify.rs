use crate::config::NotificationConfig;
use parking_lot::Mutex;
use realm_core::{Notification, NotificationKind};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use uuid::Uuid;

/// Transient banner plus a queue of blocking error modals.
///
/// Only one banner is visible; a newer one replaces the older and the older
/// one's timer must not clear its replacement.
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<Inner>,
}

struct Inner {
    banner: watch::Sender<Option<Notification>>,
    modals: Mutex<VecDeque<Notification>>,
    modal_tx: watch::Sender<Option<Notification>>,
    success_ttl: Duration,
    error_ttl: Duration,
}

impl NotificationChannel {
    pub fn new(cfg: &NotificationConfig) -> Self {
        let (banner, _) = watch::channel(None);
        let (modal_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                banner,
                modals: Mutex::new(VecDeque::new()),
                modal_tx,
                success_ttl: Duration::from_millis(cfg.success_ttl_ms),
                error_ttl: Duration::from_millis(cfg.error_ttl_ms),
            }),
        }
    }

    pub fn success(&self, message: impl Into<String>) -> Uuid {
        self.notify(NotificationKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Uuid {
        self.notify(NotificationKind::Error, message)
    }

    /// Shows a banner and schedules its removal. Must be called inside a tokio
    /// runtime.
    pub fn notify(&self, kind: NotificationKind, message: impl Into<String>) -> Uuid {
        let ttl = match kind {
            NotificationKind::Success => self.inner.success_ttl,
            NotificationKind::Error => self.inner.error_ttl,
        };
        let note = Notification::new(kind, message).expiring_at(now_ms() + ttl.as_millis() as i64);
        let id = note.id;
        tracing::debug!(target: "notify", %id, ?kind, message=%note.message, "banner shown");
        self.inner.banner.send_replace(Some(note));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            inner.banner.send_if_modified(|current| match current {
                Some(n) if n.id == id => {
                    *current = None;
                    true
                }
                _ => false,
            });
        });
        id
    }

    /// Clears the banner early if it is still the one identified by `id`.
    pub fn dismiss(&self, id: Uuid) {
        self.inner.banner.send_if_modified(|current| match current {
            Some(n) if n.id == id => {
                *current = None;
                true
            }
            _ => false,
        });
    }

    /// Queues an error that stays until acknowledged.
    pub fn notify_blocking(&self, message: impl Into<String>) -> Uuid {
        let note = Notification::new(NotificationKind::Error, message);
        let id = note.id;
        tracing::debug!(target: "notify", %id, message=%note.message, "blocking modal queued");
        let mut modals = self.inner.modals.lock();
        modals.push_back(note);
        self.inner.modal_tx.send_replace(modals.front().cloned());
        id
    }

    /// Closes the front modal and shows the next queued one, if any.
    pub fn acknowledge(&self) -> Option<Notification> {
        let mut modals = self.inner.modals.lock();
        let closed = modals.pop_front();
        self.inner.modal_tx.send_replace(modals.front().cloned());
        closed
    }

    pub fn current(&self) -> Option<Notification> {
        self.inner.banner.borrow().clone()
    }

    pub fn current_modal(&self) -> Option<Notification> {
        self.inner.modal_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Notification>> {
        self.inner.banner.subscribe()
    }

    pub fn subscribe_modal(&self) -> watch::Receiver<Option<Notification>> {
        self.inner.modal_tx.subscribe()
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
