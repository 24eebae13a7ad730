#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use desire_client::client::services::api_client::{
    Ack, ApiError, AuthResponse, Credentials, DatingApi, LikeResponse, OnboardingPayload, OnboardingStatus,
    PasswordChange, ProfileUpdate, RegisterResponse, Registration, SendReceipt, StartedConversation,
};
use desire_client::client::services::auth_service::EMAIL_NOT_VERIFIED;
use desire_client::client::services::websocket_client::{LiveConnector, LiveError, LiveSubscription};
use desire_client::common::models::{
    Candidate, CandidatePage, Conversation, EntityId, Favorite, LikeRecord, Location, Match, Message, Notification,
    Pagination, User,
};
use desire_client::common::protocol::LiveEvent;

pub fn id(n: i64) -> EntityId {
    EntityId::from(n)
}

pub fn user(n: i64, name: &str) -> User {
    User {
        id: id(n),
        username: Some(name.to_lowercase()),
        email: Some(format!("{}@example.com", name.to_lowercase())),
        first_name: Some(name.to_string()),
        last_name: None,
        age: Some(30),
        bio: None,
        photos: Vec::new(),
        interests: Vec::new(),
        created_at: None,
    }
}

pub fn message(n: i64, conversation: i64, text: &str) -> Message {
    Message {
        id: id(n),
        conversation_id: Some(id(conversation)),
        message: text.to_string(),
        is_from_me: false,
        sender_id: None,
        created_at: base_time() + ChronoDuration::seconds(n),
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().unwrap_or_else(Utc::now)
}

#[derive(Debug, Clone)]
pub enum Failure {
    Status(u16, String),
    Validation(Vec<String>),
    /// 403 carrying the address that still needs verification.
    Unverified(String),
    Network,
}

impl Failure {
    fn into_error(self) -> ApiError {
        match self {
            Failure::Status(code, msg) => ApiError::status(code, msg),
            Failure::Validation(errors) => {
                ApiError::Status { status: 400, message: Some("Validation failed".into()), email: None, errors }
            }
            Failure::Unverified(email) => ApiError::Status {
                status: 403,
                message: Some(EMAIL_NOT_VERIFIED.into()),
                email: Some(email),
                errors: Vec::new(),
            },
            Failure::Network => ApiError::Network("connection reset".into()),
        }
    }
}

struct World {
    viewer: EntityId,
    users: Vec<User>,
    likes: HashSet<(EntityId, EntityId)>,
    dislikes: HashSet<(EntityId, EntityId)>,
    favorites: HashMap<EntityId, Vec<Favorite>>,
    conversations: Vec<(Conversation, (EntityId, EntityId))>,
    messages: HashMap<EntityId, Vec<Message>>,
    notifications: Vec<Notification>,
    unread_notifications: u32,
    onboarding_completed: bool,
    echo_sends: bool,
    clock: i64,
    next_id: i64,
    valid_token: Option<String>,
    login_error: Option<Failure>,
}

impl World {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        base_time() + ChronoDuration::seconds(self.clock)
    }

    fn fresh_id(&mut self) -> EntityId {
        self.next_id += 1;
        id(10_000 + self.next_id)
    }

    fn find(&self, user_id: &EntityId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == user_id)
    }

    fn matched(&self, a: &EntityId, b: &EntityId) -> bool {
        self.likes.contains(&(a.clone(), b.clone())) && self.likes.contains(&(b.clone(), a.clone()))
    }

    fn like_record(&self, other: &EntityId, matched: bool, liked_back: bool) -> LikeRecord {
        let u = self.find(other);
        LikeRecord {
            id: other.clone(),
            first_name: u.and_then(|u| u.first_name.clone()),
            last_name: None,
            age: u.and_then(|u| u.age),
            location: Location::default(),
            photos: Vec::new(),
            liked_at: Some(base_time()),
            matched,
            liked_back,
        }
    }
}

/// In-memory stand-in for the REST backend. Acts on behalf of `viewer`.
pub struct FakeBackend {
    world: Mutex<World>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, Failure>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    page_delays: Mutex<HashMap<u32, Duration>>,
}

impl FakeBackend {
    /// A backend with `viewer` plus `others` as the browsable directory.
    pub fn new(viewer: i64, others: &[(i64, &str)]) -> Arc<Self> {
        let mut world = World {
            viewer: id(viewer),
            users: Vec::new(),
            likes: HashSet::new(),
            dislikes: HashSet::new(),
            favorites: HashMap::new(),
            conversations: Vec::new(),
            messages: HashMap::new(),
            notifications: Vec::new(),
            unread_notifications: 0,
            onboarding_completed: true,
            echo_sends: true,
            clock: 0,
            next_id: 0,
            valid_token: None,
            login_error: None,
        };
        world.users.push(user(viewer, "Viewer"));
        for (n, name) in others {
            world.users.push(user(*n, name));
        }
        Arc::new(Self {
            world: Mutex::new(world),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            page_delays: Mutex::new(HashMap::new()),
        })
    }

    /// Directory of `count` people numbered from 1, viewer is 1000.
    pub fn with_directory(count: i64) -> Arc<Self> {
        let names: Vec<(i64, String)> = (1..=count).map(|n| (n, format!("User{}", n))).collect();
        let refs: Vec<(i64, &str)> = names.iter().map(|(n, s)| (*n, s.as_str())).collect();
        Self::new(1000, &refs)
    }

    pub fn act_as(&self, viewer: i64) {
        self.world.lock().unwrap().viewer = id(viewer);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn fail_next(&self, op: &'static str, failure: Failure) {
        self.failures.lock().unwrap().insert(op, failure);
    }

    pub fn delay(&self, op: &'static str, by: Duration) {
        self.delays.lock().unwrap().insert(op, by);
    }

    pub fn delay_page(&self, page: u32, by: Duration) {
        self.page_delays.lock().unwrap().insert(page, by);
    }

    pub fn set_echo_sends(&self, echo: bool) {
        self.world.lock().unwrap().echo_sends = echo;
    }

    pub fn set_onboarding_completed(&self, done: bool) {
        self.world.lock().unwrap().onboarding_completed = done;
    }

    pub fn set_unread_notifications(&self, count: u32) {
        self.world.lock().unwrap().unread_notifications = count;
    }

    pub fn set_valid_token(&self, token: &str) {
        self.world.lock().unwrap().valid_token = Some(token.to_string());
    }

    pub fn fail_login(&self, failure: Failure) {
        self.world.lock().unwrap().login_error = Some(failure);
    }

    /// Records that `a` liked `b` without going through the API.
    pub fn seed_like(&self, a: i64, b: i64) {
        self.world.lock().unwrap().likes.insert((id(a), id(b)));
    }

    pub fn add_conversation(&self, conversation: i64, other: i64, unread: u32) {
        let mut w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        let first_name = w.find(&id(other)).and_then(|u| u.first_name.clone());
        let summary = Conversation {
            id: id(conversation),
            other_user_id: Some(id(other)),
            username: None,
            first_name,
            last_name: None,
            profile_image: None,
            last_message: None,
            message_time: None,
            is_from_me: false,
            unread_count: unread,
        };
        w.conversations.push((summary, (viewer, id(other))));
        w.messages.entry(id(conversation)).or_default();
    }

    pub fn seed_messages(&self, conversation: i64, messages: Vec<Message>) {
        self.world.lock().unwrap().messages.insert(id(conversation), messages);
    }

    pub fn add_notification(&self, n: i64, text: &str) {
        let mut w = self.world.lock().unwrap();
        let created_at = Some(w.tick());
        w.notifications.push(Notification {
            id: id(n),
            kind: Some("like".into()),
            message: text.to_string(),
            is_read: false,
            created_at,
        });
    }

    async fn enter(&self, op: &'static str) -> Result<(), ApiError> {
        *self.calls.lock().unwrap().entry(op).or_insert(0) += 1;
        let delay = self.delays.lock().unwrap().get(op).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let failure = self.failures.lock().unwrap().remove(op);
        match failure {
            Some(f) => Err(f.into_error()),
            None => Ok(()),
        }
    }

    fn ack(text: &str) -> Ack {
        Ack { message: Some(text.to_string()) }
    }
}

#[async_trait]
impl DatingApi for FakeBackend {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.enter("login").await?;
        let mut w = self.world.lock().unwrap();
        if let Some(f) = w.login_error.clone() {
            return Err(f.into_error());
        }
        let u = w
            .users
            .iter()
            .find(|u| u.email.as_deref() == Some(credentials.email.as_str()))
            .cloned()
            .ok_or_else(|| ApiError::status(401, "Invalid credentials"))?;
        let token = format!("token-{}", u.id);
        w.valid_token = Some(token.clone());
        w.viewer = u.id.clone();
        Ok(AuthResponse { token, user: u })
    }

    async fn register(&self, registration: &Registration) -> Result<RegisterResponse, ApiError> {
        self.enter("register").await?;
        let mut w = self.world.lock().unwrap();
        let new_id = w.fresh_id();
        let mut u = user(0, &registration.first_name);
        u.id = new_id;
        u.email = Some(registration.email.clone());
        w.users.push(u.clone());
        Ok(RegisterResponse { user: u })
    }

    async fn verify_email(&self, token: &str) -> Result<AuthResponse, ApiError> {
        self.enter("verify_email").await?;
        let w = self.world.lock().unwrap();
        let u = w.find(&w.viewer).cloned().ok_or_else(|| ApiError::status(400, "Invalid token"))?;
        Ok(AuthResponse { token: format!("verified-{}", token), user: u })
    }

    async fn resend_verification(&self, _email: &str) -> Result<Ack, ApiError> {
        self.enter("resend_verification").await?;
        Ok(Self::ack("Verification email sent"))
    }

    async fn forgot_password(&self, _email: &str) -> Result<Ack, ApiError> {
        self.enter("forgot_password").await?;
        Ok(Self::ack("Reset email sent"))
    }

    async fn reset_password(&self, _token: &str, _password: &str) -> Result<Ack, ApiError> {
        self.enter("reset_password").await?;
        Ok(Self::ack("Password reset"))
    }

    async fn get_profile(&self) -> Result<User, ApiError> {
        self.enter("get_profile").await?;
        let w = self.world.lock().unwrap();
        w.find(&w.viewer).cloned().ok_or_else(|| ApiError::status(404, "User not found"))
    }

    async fn update_profile(&self, _update: &ProfileUpdate) -> Result<Ack, ApiError> {
        self.enter("update_profile").await?;
        Ok(Self::ack("Profile updated"))
    }

    async fn update_password(&self, _change: &PasswordChange) -> Result<Ack, ApiError> {
        self.enter("update_password").await?;
        Ok(Self::ack("Password updated"))
    }

    async fn delete_account(&self) -> Result<Ack, ApiError> {
        self.enter("delete_account").await?;
        Ok(Self::ack("Account deleted"))
    }

    async fn get_user(&self, user_id: &EntityId) -> Result<User, ApiError> {
        self.enter("get_user").await?;
        let w = self.world.lock().unwrap();
        w.find(user_id).cloned().ok_or_else(|| ApiError::status(404, "User not found"))
    }

    async fn get_users(&self, page: u32, limit: u32) -> Result<CandidatePage, ApiError> {
        self.enter("get_users").await?;
        let delay = self.page_delays.lock().unwrap().get(&page).copied();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        let favorites: HashSet<EntityId> =
            w.favorites.get(&viewer).map(|f| f.iter().map(|f| f.id.clone()).collect()).unwrap_or_default();
        let pool: Vec<&User> = w
            .users
            .iter()
            .filter(|u| u.id != viewer)
            .filter(|u| !w.likes.contains(&(viewer.clone(), u.id.clone())))
            .filter(|u| !w.dislikes.contains(&(viewer.clone(), u.id.clone())))
            .collect();
        let limit = limit.max(1) as usize;
        let total = pool.len();
        let total_pages = ((total + limit - 1) / limit).max(1) as u32;
        let start = (page.max(1) as usize - 1) * limit;
        let users = pool
            .iter()
            .skip(start)
            .take(limit)
            .map(|u| Candidate {
                id: u.id.clone(),
                first_name: u.first_name.clone(),
                last_name: u.last_name.clone(),
                age: u.age,
                location: Location::default(),
                photos: Vec::new(),
                is_favorited: favorites.contains(&u.id),
            })
            .collect();
        Ok(CandidatePage {
            users,
            pagination: Pagination {
                current_page: page,
                total_pages,
                total_users: total as u32,
                has_prev: page > 1,
                has_next: page < total_pages,
            },
        })
    }

    async fn like_user(&self, user_id: &EntityId) -> Result<LikeResponse, ApiError> {
        self.enter("like_user").await?;
        let mut w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        if !w.likes.insert((viewer.clone(), user_id.clone())) {
            return Err(ApiError::status(400, "You have already liked this user"));
        }
        Ok(LikeResponse { is_match: w.matched(&viewer, user_id) })
    }

    async fn dislike_user(&self, user_id: &EntityId) -> Result<Ack, ApiError> {
        self.enter("dislike_user").await?;
        let mut w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        w.dislikes.insert((viewer, user_id.clone()));
        Ok(Self::ack("User disliked"))
    }

    async fn my_matches(&self) -> Result<Vec<Match>, ApiError> {
        self.enter("my_matches").await?;
        let w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        Ok(w.users
            .iter()
            .filter(|u| w.matched(&viewer, &u.id))
            .map(|u| Match {
                id: u.id.clone(),
                first_name: u.first_name.clone(),
                last_name: None,
                age: u.age,
                location: Location::default(),
                photos: Vec::new(),
                match_date: Some(base_time()),
            })
            .collect())
    }

    async fn my_likes(&self) -> Result<Vec<LikeRecord>, ApiError> {
        self.enter("my_likes").await?;
        let w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        let mut out: Vec<LikeRecord> = w
            .likes
            .iter()
            .filter(|(a, _)| a == &viewer)
            .map(|(_, b)| w.like_record(b, w.matched(&viewer, b), false))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn likes_me(&self) -> Result<Vec<LikeRecord>, ApiError> {
        self.enter("likes_me").await?;
        let w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        let mut out: Vec<LikeRecord> = w
            .likes
            .iter()
            .filter(|(_, b)| b == &viewer)
            .map(|(a, _)| w.like_record(a, false, w.likes.contains(&(viewer.clone(), a.clone()))))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn favorites(&self) -> Result<Vec<Favorite>, ApiError> {
        self.enter("favorites").await?;
        let w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        let mut out = w.favorites.get(&viewer).cloned().unwrap_or_default();
        for f in out.iter_mut() {
            f.matched = w.matched(&viewer, &f.id);
        }
        Ok(out)
    }

    async fn add_favorite(&self, user_id: &EntityId) -> Result<Ack, ApiError> {
        self.enter("add_favorite").await?;
        let mut w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        if w.favorites.get(&viewer).map(|f| f.iter().any(|f| &f.id == user_id)).unwrap_or(false) {
            return Err(ApiError::status(400, "User already in favorites"));
        }
        let when = w.tick();
        let first_name = w.find(user_id).and_then(|u| u.first_name.clone());
        w.favorites.entry(viewer).or_default().push(Favorite {
            id: user_id.clone(),
            first_name,
            last_name: None,
            age: None,
            location: Location::default(),
            photos: Vec::new(),
            favorited_date: Some(when),
            matched: false,
        });
        Ok(Self::ack("Added to favorites"))
    }

    async fn remove_favorite(&self, user_id: &EntityId) -> Result<Ack, ApiError> {
        self.enter("remove_favorite").await?;
        let mut w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        let list = w.favorites.entry(viewer).or_default();
        let before = list.len();
        list.retain(|f| &f.id != user_id);
        if list.len() == before {
            return Err(ApiError::status(404, "Favorite not found"));
        }
        Ok(Self::ack("Removed from favorites"))
    }

    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.enter("conversations").await?;
        let w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        Ok(w.conversations
            .iter()
            .filter(|(_, (a, b))| a == &viewer || b == &viewer)
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn messages(&self, conversation_id: &EntityId) -> Result<Vec<Message>, ApiError> {
        self.enter("messages").await?;
        let w = self.world.lock().unwrap();
        w.messages.get(conversation_id).cloned().ok_or_else(|| ApiError::status(404, "Conversation not found"))
    }

    async fn send_message(&self, conversation_id: &EntityId, body: &str) -> Result<SendReceipt, ApiError> {
        self.enter("send_message").await?;
        let mut w = self.world.lock().unwrap();
        let message_id = w.fresh_id();
        let created_at = w.tick();
        let viewer = w.viewer.clone();
        let stored = Message {
            id: message_id,
            conversation_id: Some(conversation_id.clone()),
            message: body.to_string(),
            is_from_me: true,
            sender_id: Some(viewer),
            created_at,
        };
        let echo = w.echo_sends;
        w.messages
            .get_mut(conversation_id)
            .ok_or_else(|| ApiError::status(404, "Conversation not found"))?
            .push(stored.clone());
        Ok(SendReceipt { message: echo.then_some(stored) })
    }

    async fn start_conversation(&self, user_id: &EntityId) -> Result<StartedConversation, ApiError> {
        self.enter("start_conversation").await?;
        let mut w = self.world.lock().unwrap();
        let viewer = w.viewer.clone();
        if !w.matched(&viewer, user_id) {
            return Err(ApiError::status(403, "You can only message matched users"));
        }
        let existing = w
            .conversations
            .iter()
            .find(|(_, (a, b))| (a == &viewer && b == user_id) || (a == user_id && b == &viewer))
            .map(|(c, _)| c.id.clone());
        let conversation_id = match existing {
            Some(existing) => existing,
            None => {
                let new_id = w.fresh_id();
                let summary = Conversation {
                    id: new_id.clone(),
                    other_user_id: Some(user_id.clone()),
                    username: None,
                    first_name: None,
                    last_name: None,
                    profile_image: None,
                    last_message: None,
                    message_time: None,
                    is_from_me: false,
                    unread_count: 0,
                };
                w.conversations.push((summary, (viewer, user_id.clone())));
                w.messages.insert(new_id.clone(), Vec::new());
                new_id
            }
        };
        Ok(StartedConversation { conversation_id: Some(conversation_id) })
    }

    async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.enter("notifications").await?;
        Ok(self.world.lock().unwrap().notifications.clone())
    }

    async fn mark_notification_read(&self, notification_id: &EntityId) -> Result<Ack, ApiError> {
        self.enter("mark_notification_read").await?;
        let mut w = self.world.lock().unwrap();
        match w.notifications.iter_mut().find(|n| &n.id == notification_id) {
            Some(n) => {
                n.is_read = true;
                Ok(Self::ack("Marked as read"))
            }
            None => Err(ApiError::status(404, "Notification not found")),
        }
    }

    async fn mark_all_notifications_read(&self) -> Result<Ack, ApiError> {
        self.enter("mark_all_notifications_read").await?;
        for n in self.world.lock().unwrap().notifications.iter_mut() {
            n.is_read = true;
        }
        Ok(Self::ack("All marked as read"))
    }

    async fn unread_notification_count(&self) -> Result<u32, ApiError> {
        self.enter("unread_notification_count").await?;
        Ok(self.world.lock().unwrap().unread_notifications)
    }

    async fn onboarding_status(&self) -> Result<OnboardingStatus, ApiError> {
        self.enter("onboarding_status").await?;
        Ok(OnboardingStatus { onboarding_completed: self.world.lock().unwrap().onboarding_completed })
    }

    async fn complete_onboarding(&self, _payload: &OnboardingPayload) -> Result<Ack, ApiError> {
        self.enter("complete_onboarding").await?;
        self.world.lock().unwrap().onboarding_completed = true;
        Ok(Self::ack("Onboarding completed"))
    }
}

/// Live connector whose events are pushed by the test.
#[derive(Default)]
pub struct FakeLive {
    subscribers: Mutex<Vec<(EntityId, mpsc::UnboundedSender<LiveEvent>)>>,
    joins: Mutex<Vec<EntityId>>,
    refuse: Mutex<bool>,
}

impl FakeLive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_joins(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }

    pub fn joins(&self) -> Vec<EntityId> {
        self.joins.lock().unwrap().clone()
    }

    /// Whether a subscription for `conversation` is still held open.
    pub fn is_open(&self, conversation: i64) -> bool {
        self.subscribers.lock().unwrap().iter().any(|(c, tx)| c == &id(conversation) && !tx.is_closed())
    }

    /// Delivers `event` on every subscription joined to `conversation`.
    /// Returns how many live subscriptions received it.
    pub fn emit(&self, conversation: i64, event: LiveEvent) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == &id(conversation))
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }
}

#[async_trait]
impl LiveConnector for FakeLive {
    async fn join(&self, conversation_id: &EntityId) -> Result<LiveSubscription, LiveError> {
        if *self.refuse.lock().unwrap() {
            return Err(LiveError::ConnectionFailed("refused".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(LiveEvent::Connected);
        self.joins.lock().unwrap().push(conversation_id.clone());
        self.subscribers.lock().unwrap().push((conversation_id.clone(), tx));
        Ok(LiveSubscription::new(conversation_id.clone(), rx, None))
    }
}
