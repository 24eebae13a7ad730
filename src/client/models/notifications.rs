//! Badges, the notification inbox and transient toasts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::client::models::session::{SessionState, SessionStore};
use crate::client::models::ui_state::LoadState;
use crate::client::services::api_client::{ApiError, DatingApi};
use crate::client::utils::lock;
use crate::common::models::{EntityId, Notification, UnreadCounts};

pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(5);

/// One aggregation round. Every count is rebuilt from the four server
/// responses; nothing carries over from an earlier round.
pub async fn compute_unread_counts(api: &dyn DatingApi) -> Result<UnreadCounts, ApiError> {
    let (notifications, conversations, likes_me, matches) = tokio::try_join!(
        api.unread_notification_count(),
        api.conversations(),
        api.likes_me(),
        api.my_matches()
    )?;
    Ok(UnreadCounts {
        notifications,
        messages: conversations.iter().map(|c| c.unread_count).sum(),
        likes: likes_me.iter().filter(|l| !l.liked_back).count() as u32,
        matches: matches.len() as u32,
    })
}

/// Background badge refresher. Polls while the session is authenticated: a
/// round runs as soon as a user signs in and then every `period`. Signing out
/// or losing the credential pauses polling and resets the counts; the next
/// sign-in resumes it. Dropping the handle cancels the task.
pub struct UnreadPoller {
    counts: watch::Receiver<UnreadCounts>,
    handle: JoinHandle<()>,
}

impl UnreadPoller {
    pub fn start(api: Arc<dyn DatingApi>, session: SessionStore, period: Duration) -> Self {
        let (tx, rx) = watch::channel(UnreadCounts::default());
        let handle = tokio::spawn(run_poller(api, session, period, tx));
        Self { counts: rx, handle }
    }

    pub fn counts(&self) -> UnreadCounts {
        *self.counts.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UnreadCounts> {
        self.counts.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for UnreadPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_poller(api: Arc<dyn DatingApi>, session: SessionStore, period: Duration, counts: watch::Sender<UnreadCounts>) {
    let mut session_rx = session.subscribe();
    loop {
        if session_rx.wait_for(|s| s.is_authenticated()).await.is_err() {
            return;
        }
        info!("[BADGES] Polling unread counts every {:?}", period);
        poll_while_signed_in(api.as_ref(), &session, &mut session_rx, period, &counts).await;
        counts.send_replace(UnreadCounts::default());
        info!("[BADGES] Session ended, unread polling paused");
    }
}

async fn poll_while_signed_in(
    api: &dyn DatingApi,
    session: &SessionStore,
    session_rx: &mut watch::Receiver<SessionState>,
    period: Duration,
    counts: &watch::Sender<UnreadCounts>,
) {
    let mut ticker = interval(period.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match compute_unread_counts(api).await {
                    Ok(c) if session.is_authenticated() => {
                        debug!("[BADGES] {:?}", c);
                        counts.send_replace(c);
                    }
                    Ok(_) => return,
                    Err(e) => warn!("[BADGES] Failed to fetch unread counts, keeping previous values: {}", e),
                }
                if !session.is_authenticated() {
                    return;
                }
            }
            changed = session_rx.changed() => {
                if changed.is_err() || !session_rx.borrow().is_authenticated() {
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct InboxState {
    items: Vec<Notification>,
    load: LoadState,
}

/// Server-side notifications with read/unread state.
#[derive(Clone)]
pub struct NotificationInbox {
    api: Arc<dyn DatingApi>,
    state: Arc<Mutex<InboxState>>,
}

impl NotificationInbox {
    pub fn new(api: Arc<dyn DatingApi>) -> Self {
        Self { api, state: Arc::new(Mutex::new(InboxState::default())) }
    }

    pub async fn load(&self) -> Result<(), ApiError> {
        lock(&self.state).load = LoadState::Loading;
        let result = self.api.notifications().await;
        let mut st = lock(&self.state);
        match result {
            Ok(items) => {
                info!("[NOTIFICATIONS] Loaded {} notifications", items.len());
                st.items = items;
                st.load = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("[NOTIFICATIONS] Error loading notifications: {}", e);
                st.load = LoadState::Failed(e.user_message("Failed to load notifications"));
                Err(e)
            }
        }
    }

    pub fn items(&self) -> Vec<Notification> {
        lock(&self.state).items.clone()
    }

    pub fn unread(&self) -> usize {
        lock(&self.state).items.iter().filter(|n| !n.is_read).count()
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.state).load.clone()
    }

    pub async fn mark_read(&self, id: &EntityId) -> Result<(), ApiError> {
        self.api.mark_notification_read(id).await.map_err(|e| {
            error!("[NOTIFICATIONS] Error marking {} as read: {}", id, e);
            e
        })?;
        if let Some(n) = lock(&self.state).items.iter_mut().find(|n| &n.id == id) {
            n.is_read = true;
        }
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.api.mark_all_notifications_read().await.map_err(|e| {
            error!("[NOTIFICATIONS] Error marking all as read: {}", e);
            e
        })?;
        for n in lock(&self.state).items.iter_mut() {
            n.is_read = true;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub id: Uuid,
    pub kind: ToastKind,
    pub title: String,
    pub message: String,
    pub duration: Duration,
    pub created_at: DateTime<Utc>,
}

impl Toast {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = ChronoDuration::from_std(self.duration).unwrap_or_else(|_| ChronoDuration::days(365));
        now - self.created_at >= ttl
    }
}

/// In-app toast stack, oldest first.
#[derive(Debug, Clone, Default)]
pub struct ToastQueue {
    toasts: Arc<Mutex<Vec<Toast>>>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, kind: ToastKind, title: impl Into<String>, message: impl Into<String>, duration: Option<Duration>) -> Uuid {
        self.push_at(kind, title, message, duration, Utc::now())
    }

    pub fn push_at(
        &self,
        kind: ToastKind,
        title: impl Into<String>,
        message: impl Into<String>,
        duration: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        lock(&self.toasts).push(Toast {
            id,
            kind,
            title: title.into(),
            message: message.into(),
            duration: duration.unwrap_or(DEFAULT_TOAST_DURATION),
            created_at: now,
        });
        id
    }

    pub fn success(&self, title: impl Into<String>, message: impl Into<String>) -> Uuid {
        self.push(ToastKind::Success, title, message, None)
    }

    pub fn error(&self, title: impl Into<String>, message: impl Into<String>) -> Uuid {
        self.push(ToastKind::Error, title, message, None)
    }

    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut toasts = lock(&self.toasts);
        let before = toasts.len();
        toasts.retain(|t| t.id != id);
        toasts.len() != before
    }

    pub fn clear(&self) {
        lock(&self.toasts).clear();
    }

    /// Drops every toast whose duration has elapsed at `now`.
    pub fn expire(&self, now: DateTime<Utc>) -> usize {
        let mut toasts = lock(&self.toasts);
        let before = toasts.len();
        toasts.retain(|t| !t.is_expired(now));
        before - toasts.len()
    }

    pub fn visible(&self) -> Vec<Toast> {
        lock(&self.toasts).clone()
    }
}
