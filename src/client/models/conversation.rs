//! Conversation list and the open-conversation view.
//!
//! Opening a conversation joins the live channel first and then loads the
//! history snapshot, so nothing stored while the history is in flight is
//! missed. Live events received meanwhile stay buffered in the subscription
//! and are merged after the history. Live messages are appended in arrival
//! order. At most one live subscription exists per [`ConversationSync`];
//! switching conversations tears the previous one down first. A dropped
//! channel is rejoined with a growing delay and the history is fetched again
//! to fill the gap.

use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::client::models::ui_state::LoadState;
use crate::client::services::api_client::{ApiError, DatingApi, ErrorKind, StartedConversation};
use crate::client::services::websocket_client::{LiveConnector, LiveError, LiveSubscription};
use crate::client::utils::lock;
use crate::common::models::{Conversation, EntityId, Message};
use crate::common::protocol::LiveEvent;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

pub const NOT_MATCHED_MESSAGE: &str =
    "You can only message matched users. Like their profile first to create a match!";

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("No conversation is open")]
    NotOpen,

    #[error("{}", NOT_MATCHED_MESSAGE)]
    NotMatched,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Live(#[from] LiveError),
}

/// Asks the server for a conversation with `user_id`. Unmatched pairs are
/// refused with [`ConversationError::NotMatched`].
pub async fn start_conversation(api: &dyn DatingApi, user_id: &EntityId) -> Result<StartedConversation, ConversationError> {
    match api.start_conversation(user_id).await {
        Ok(started) => {
            info!("[CHAT] Started conversation with user {}", user_id);
            Ok(started)
        }
        Err(e) if e.kind() == ErrorKind::Forbidden => {
            warn!("[CHAT] Refused conversation with unmatched user {}", user_id);
            Err(ConversationError::NotMatched)
        }
        Err(e) => {
            error!("[CHAT] Error starting conversation with {}: {}", user_id, e);
            Err(e.into())
        }
    }
}

#[derive(Debug, Default)]
struct InboxState {
    items: Vec<Conversation>,
    load: LoadState,
}

/// Conversation summaries from `/messages/conversations`.
#[derive(Clone)]
pub struct ConversationList {
    api: Arc<dyn DatingApi>,
    state: Arc<Mutex<InboxState>>,
}

impl ConversationList {
    pub fn new(api: Arc<dyn DatingApi>) -> Self {
        Self { api, state: Arc::new(Mutex::new(InboxState::default())) }
    }

    pub async fn load(&self) -> Result<(), ApiError> {
        lock(&self.state).load = LoadState::Loading;
        let result = self.api.conversations().await;
        let mut st = lock(&self.state);
        match result {
            Ok(items) => {
                info!("[CHAT] Loaded {} conversations", items.len());
                st.items = items;
                st.load = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("[CHAT] Error loading conversations: {}", e);
                st.load = LoadState::Failed(e.user_message("Failed to load conversations"));
                Err(e)
            }
        }
    }

    pub fn items(&self) -> Vec<Conversation> {
        lock(&self.state).items.clone()
    }

    pub fn get(&self, id: &EntityId) -> Option<Conversation> {
        lock(&self.state).items.iter().find(|c| &c.id == id).cloned()
    }

    pub fn unread_total(&self) -> u32 {
        lock(&self.state).items.iter().map(|c| c.unread_count).sum()
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.state).load.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationView {
    Closed,
    Loading,
    Empty,
    Ready(Vec<Message>),
    Failed(String),
}

#[derive(Debug, Default)]
struct ChatState {
    conversation_id: Option<EntityId>,
    messages: Vec<Message>,
    seen: HashSet<EntityId>,
    load: LoadState,
    live: bool,
    generation: u64,
}

impl ChatState {
    /// Appends unless the id was already shown. Returns whether it was added.
    fn push_unique(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    fn belongs_here(&self, message: &Message) -> bool {
        match (&message.conversation_id, &self.conversation_id) {
            (Some(tagged), Some(open)) => tagged == open,
            (None, Some(_)) => true,
            (_, None) => false,
        }
    }
}

pub struct ConversationSync {
    api: Arc<dyn DatingApi>,
    connector: Arc<dyn LiveConnector>,
    state: Arc<Mutex<ChatState>>,
    revision: Arc<watch::Sender<u64>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    reconnect_delay: Duration,
}

impl ConversationSync {
    pub fn new(api: Arc<dyn DatingApi>, connector: Arc<dyn LiveConnector>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            api,
            connector,
            state: Arc::new(Mutex::new(ChatState::default())),
            revision: Arc::new(revision),
            pump: Mutex::new(None),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// First wait before rejoining a dropped live channel. Doubles on each
    /// failed attempt up to 30 seconds.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Ticks once per visible change. Renderers redraw on every tick.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn conversation_id(&self) -> Option<EntityId> {
        lock(&self.state).conversation_id.clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.state).messages.clone()
    }

    pub fn is_live(&self) -> bool {
        lock(&self.state).live
    }

    pub fn view(&self) -> ConversationView {
        let st = lock(&self.state);
        if st.conversation_id.is_none() {
            return ConversationView::Closed;
        }
        match &st.load {
            LoadState::Idle | LoadState::Loading => ConversationView::Loading,
            LoadState::Failed(msg) => ConversationView::Failed(msg.clone()),
            LoadState::Ready if st.messages.is_empty() => ConversationView::Empty,
            LoadState::Ready => ConversationView::Ready(st.messages.clone()),
        }
    }

    /// Shows `conversation_id`: live channel first, then history. A live
    /// join failure leaves the history on screen and `is_live()` false while
    /// the join is retried in the background.
    pub async fn open(&self, conversation_id: &EntityId) -> Result<(), ConversationError> {
        self.stop_pump();
        let generation = {
            let mut st = lock(&self.state);
            st.generation += 1;
            st.conversation_id = Some(conversation_id.clone());
            st.messages.clear();
            st.seen.clear();
            st.live = false;
            st.load = LoadState::Loading;
            st.generation
        };
        self.bump();

        let subscription = match self.connector.join(conversation_id).await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!("[CHAT] Live updates unavailable for {}: {}", conversation_id, e);
                None
            }
        };

        let history = self.api.messages(conversation_id).await;
        {
            let mut st = lock(&self.state);
            if st.generation != generation {
                debug!("[CHAT] Dropping history for {} after a newer open", conversation_id);
                return Ok(());
            }
            match history {
                Ok(messages) => {
                    info!("[CHAT] Loaded {} messages for conversation {}", messages.len(), conversation_id);
                    for m in messages {
                        st.push_unique(m);
                    }
                    st.load = LoadState::Ready;
                }
                Err(e) => {
                    error!("[CHAT] Error loading conversation {}: {}", conversation_id, e);
                    st.load = LoadState::Failed(e.user_message("Failed to load messages"));
                    drop(st);
                    self.bump();
                    return Err(e.into());
                }
            }
        }
        self.bump();

        let pump = LivePump {
            api: self.api.clone(),
            connector: self.connector.clone(),
            state: self.state.clone(),
            revision: self.revision.clone(),
            conversation_id: conversation_id.clone(),
            generation,
            reconnect_delay: self.reconnect_delay,
        };
        let handle = tokio::spawn(pump.run(subscription));
        let mut slot = lock(&self.pump);
        if lock(&self.state).generation != generation {
            // a newer open or a close won the race
            handle.abort();
            return Ok(());
        }
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Sends `body` to the open conversation. The stored message is appended
    /// when the server echoes it; the live copy of the same id is then ignored.
    pub async fn send(&self, body: &str) -> Result<Option<Message>, ConversationError> {
        let text = body.trim();
        if text.is_empty() {
            return Err(ConversationError::EmptyMessage);
        }
        let (conversation_id, generation) = {
            let st = lock(&self.state);
            match &st.conversation_id {
                Some(id) => (id.clone(), st.generation),
                None => return Err(ConversationError::NotOpen),
            }
        };

        let receipt = self.api.send_message(&conversation_id, text).await.map_err(|e| {
            error!("[CHAT] Error sending message to {}: {}", conversation_id, e);
            e
        })?;

        if let Some(message) = &receipt.message {
            let added = {
                let mut st = lock(&self.state);
                st.generation == generation && st.belongs_here(message) && st.push_unique(message.clone())
            };
            if added {
                self.bump();
            }
        }
        Ok(receipt.message)
    }

    /// Leaves the conversation and closes its live subscription.
    pub fn close(&self) {
        self.stop_pump();
        {
            let mut st = lock(&self.state);
            st.generation += 1;
            st.conversation_id = None;
            st.messages.clear();
            st.seen.clear();
            st.live = false;
            st.load = LoadState::Idle;
        }
        self.bump();
    }

    fn stop_pump(&self) {
        if let Some(handle) = lock(&self.pump).take() {
            handle.abort();
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

impl Drop for ConversationSync {
    fn drop(&mut self) {
        self.stop_pump();
    }
}

/// Feeds live events for one open of a conversation into the shared state.
/// Owns the subscription and stops as soon as a newer open or a close bumps
/// the generation.
struct LivePump {
    api: Arc<dyn DatingApi>,
    connector: Arc<dyn LiveConnector>,
    state: Arc<Mutex<ChatState>>,
    revision: Arc<watch::Sender<u64>>,
    conversation_id: EntityId,
    generation: u64,
    reconnect_delay: Duration,
}

impl LivePump {
    fn is_current(&self) -> bool {
        lock(&self.state).generation == self.generation
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }

    async fn run(self, mut subscription: Option<LiveSubscription>) {
        let mut delay = self.reconnect_delay;
        loop {
            if let Some(mut sub) = subscription.take() {
                if !self.drain(&mut sub).await {
                    break;
                }
            }

            tokio::time::sleep(delay).await;
            if !self.is_current() {
                break;
            }
            match self.connector.join(&self.conversation_id).await {
                Ok(sub) => {
                    if !self.is_current() {
                        break;
                    }
                    info!("[CHAT] Rejoined live channel for conversation {}", self.conversation_id);
                    delay = self.reconnect_delay;
                    self.catch_up().await;
                    subscription = Some(sub);
                }
                Err(e) => {
                    delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                    warn!("[CHAT] Rejoin of {} failed, next attempt in {:?}: {}", self.conversation_id, delay, e);
                }
            }
        }
        debug!("[CHAT] Live pump for conversation {} stopped", self.conversation_id);
    }

    /// Applies events until the channel is lost. Returns false when this pump
    /// has been superseded.
    async fn drain(&self, sub: &mut LiveSubscription) -> bool {
        while let Some(event) = sub.recv().await {
            let (changed, lost) = {
                let mut st = lock(&self.state);
                if st.generation != self.generation {
                    return false;
                }
                match event {
                    LiveEvent::Connected => (!std::mem::replace(&mut st.live, true), false),
                    LiveEvent::NewMessage(message) => {
                        if st.belongs_here(&message) {
                            (st.push_unique(message), false)
                        } else {
                            debug!("[CHAT] Discarding message {} for another conversation", message.id);
                            (false, false)
                        }
                    }
                    LiveEvent::Disconnected(reason) => {
                        warn!("[CHAT] Live channel closed: {}", reason);
                        st.live = false;
                        (true, true)
                    }
                }
            };
            if changed {
                self.bump();
            }
            if lost {
                return true;
            }
        }

        let was_live = {
            let mut st = lock(&self.state);
            if st.generation != self.generation {
                return false;
            }
            std::mem::replace(&mut st.live, false)
        };
        if was_live {
            self.bump();
        }
        true
    }

    /// Merges whatever was stored while the channel was down.
    async fn catch_up(&self) {
        let messages = match self.api.messages(&self.conversation_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("[CHAT] Could not refresh conversation {} after rejoining: {}", self.conversation_id, e);
                return;
            }
        };
        let added = {
            let mut st = lock(&self.state);
            if st.generation != self.generation {
                return;
            }
            messages.into_iter().filter(|m| st.push_unique(m.clone())).count()
        };
        if added > 0 {
            debug!("[CHAT] Caught up {} messages in conversation {}", added, self.conversation_id);
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn msg(id: i64, conversation: Option<i64>) -> Message {
        serde_json::from_value(json!({
            "id": id,
            "conversation_id": conversation,
            "message": format!("m{}", id),
            "created_at": "2025-03-01T10:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut st = ChatState { conversation_id: Some(EntityId::from(1)), ..ChatState::default() };
        assert!(st.push_unique(msg(10, Some(1))));
        assert!(!st.push_unique(msg(10, Some(1))));
        assert!(st.push_unique(msg(11, Some(1))));
        assert_eq!(st.messages.len(), 2);
    }

    #[test]
    fn foreign_conversation_tags_are_rejected() {
        let st = ChatState { conversation_id: Some(EntityId::from(1)), ..ChatState::default() };
        assert!(st.belongs_here(&msg(1, Some(1))));
        assert!(st.belongs_here(&msg(2, None)));
        assert!(!st.belongs_here(&msg(3, Some(2))));
        let closed = ChatState::default();
        assert!(!closed.belongs_here(&msg(4, None)));
    }

    #[test]
    fn not_matched_uses_the_user_facing_text() {
        assert_eq!(ConversationError::NotMatched.to_string(), NOT_MATCHED_MESSAGE);
    }
}
