//! REST client for the dating backend.
//!
//! [`DatingApi`] is the seam every state machine talks to; [`ApiClient`] is the
//! reqwest-backed implementation used by the application.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::config::ClientConfig;
use crate::client::models::session::SessionStore;
use crate::common::models::{
    CandidatePage, Conversation, EntityId, Favorite, LikeRecord, Match, Message, Notification, User,
};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
        /// Set by the login endpoint when the account still needs verification.
        email: Option<String>,
        /// Field validation messages (`errors[].msg`).
        errors: Vec<String>,
    },

    /// The credential was rejected; the session has already been invalidated.
    #[error("authentication required")]
    Unauthorized,

    #[error("network: {0}")]
    Network(String),

    #[error("decode: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Forbidden,
    NotFound,
    BusinessRule,
    Transient,
    Other,
}

impl ApiError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        ApiError::Status { status: code, message: Some(message.into()), email: None, errors: Vec::new() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Unauthorized => ErrorKind::Authentication,
            ApiError::Network(_) | ApiError::Decode(_) => ErrorKind::Transient,
            ApiError::Status { status, .. } => match *status {
                401 => ErrorKind::Authentication,
                403 => ErrorKind::Forbidden,
                404 => ErrorKind::NotFound,
                400 | 409 | 422 => ErrorKind::BusinessRule,
                s if s >= 500 => ErrorKind::Transient,
                _ => ErrorKind::Other,
            },
        }
    }

    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Text to show the user: the server's own message when it sent one.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().map(str::to_string).unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    errors: Vec<FieldError>,
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    msg: String,
}

// ── Request / response bodies ──────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub user: User,
}

/// Generic `{ "message": ... }` acknowledgement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interested_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Body of `POST /onboarding/complete`. Empty optional answers are left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingPayload {
    pub interests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub looking_for: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LikeResponse {
    #[serde(default, rename = "isMatch", alias = "is_match")]
    pub is_match: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OnboardingStatus {
    #[serde(rename = "onboardingCompleted", alias = "onboarding_completed")]
    pub onboarding_completed: bool,
}

/// What `POST /messages/send` gave back. The backend may or may not echo the
/// stored message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendReceipt {
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartedConversation {
    pub conversation_id: Option<EntityId>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct MatchesEnvelope {
    #[serde(default)]
    matches: Vec<Match>,
}

#[derive(Deserialize)]
struct LikesEnvelope {
    #[serde(default)]
    likes: Vec<LikeRecord>,
}

#[derive(Deserialize)]
struct FavoritesEnvelope {
    #[serde(default)]
    favorites: Vec<Favorite>,
}

#[derive(Deserialize)]
struct ConversationsEnvelope {
    #[serde(default)]
    conversations: Vec<Conversation>,
}

#[derive(Deserialize)]
struct MessagesEnvelope {
    #[serde(default)]
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct NotificationsEnvelope {
    #[serde(default)]
    notifications: Vec<Notification>,
}

#[derive(Deserialize)]
struct CountEnvelope {
    #[serde(default)]
    count: u32,
}

/// Pulls the stored message out of a send response. Servers answer either
/// `{message: {...}}`, `{data: {...}}` or the bare message.
pub(crate) fn receipt_from(body: Value) -> SendReceipt {
    let candidates = [body.get("message").cloned(), body.get("data").cloned(), Some(body)];
    let message = candidates
        .into_iter()
        .flatten()
        .filter(|v| v.is_object())
        .find_map(|v| serde_json::from_value::<Message>(v).ok());
    SendReceipt { message }
}

pub(crate) fn started_from(body: &Value) -> StartedConversation {
    let id = body
        .get("conversationId")
        .or_else(|| body.get("conversation_id"))
        .or_else(|| body.get("conversation").and_then(|c| c.get("id")))
        .cloned()
        .and_then(|v| serde_json::from_value::<EntityId>(v).ok());
    StartedConversation { conversation_id: id }
}

// ── Trait ───────────────────────────────────────────────────────────

/// One method per server capability.
#[async_trait]
pub trait DatingApi: Send + Sync {
    // auth
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<RegisterResponse, ApiError>;
    async fn verify_email(&self, token: &str) -> Result<AuthResponse, ApiError>;
    async fn resend_verification(&self, email: &str) -> Result<Ack, ApiError>;
    async fn forgot_password(&self, email: &str) -> Result<Ack, ApiError>;
    async fn reset_password(&self, token: &str, password: &str) -> Result<Ack, ApiError>;

    // profile
    async fn get_profile(&self) -> Result<User, ApiError>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Ack, ApiError>;
    async fn update_password(&self, change: &PasswordChange) -> Result<Ack, ApiError>;
    async fn delete_account(&self) -> Result<Ack, ApiError>;
    async fn get_user(&self, user_id: &EntityId) -> Result<User, ApiError>;

    // discovery and matching
    async fn get_users(&self, page: u32, limit: u32) -> Result<CandidatePage, ApiError>;
    async fn like_user(&self, user_id: &EntityId) -> Result<LikeResponse, ApiError>;
    async fn dislike_user(&self, user_id: &EntityId) -> Result<Ack, ApiError>;
    async fn my_matches(&self) -> Result<Vec<Match>, ApiError>;
    async fn my_likes(&self) -> Result<Vec<LikeRecord>, ApiError>;
    async fn likes_me(&self) -> Result<Vec<LikeRecord>, ApiError>;

    // favorites
    async fn favorites(&self) -> Result<Vec<Favorite>, ApiError>;
    async fn add_favorite(&self, user_id: &EntityId) -> Result<Ack, ApiError>;
    async fn remove_favorite(&self, user_id: &EntityId) -> Result<Ack, ApiError>;

    // messaging
    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError>;
    async fn messages(&self, conversation_id: &EntityId) -> Result<Vec<Message>, ApiError>;
    async fn send_message(&self, conversation_id: &EntityId, body: &str) -> Result<SendReceipt, ApiError>;
    async fn start_conversation(&self, user_id: &EntityId) -> Result<StartedConversation, ApiError>;

    // notifications
    async fn notifications(&self) -> Result<Vec<Notification>, ApiError>;
    async fn mark_notification_read(&self, notification_id: &EntityId) -> Result<Ack, ApiError>;
    async fn mark_all_notifications_read(&self) -> Result<Ack, ApiError>;
    async fn unread_notification_count(&self) -> Result<u32, ApiError>;

    // onboarding
    async fn onboarding_status(&self) -> Result<OnboardingStatus, ApiError>;
    async fn complete_onboarding(&self, payload: &OnboardingPayload) -> Result<Ack, ApiError>;
}

// ── reqwest implementation ─────────────────────────────────────────

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: SessionStore) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { http, base_url: config.api_base_url.trim_end_matches('/').to_string(), session })
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> (RequestBuilder, bool) {
        let mut req = self.http.request(method, self.url(path));
        let token = self.session.token();
        let authenticated = token.is_some();
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        (req, authenticated)
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, ApiError> {
        let (mut req, authenticated) = self.request(method.clone(), path);
        if let Some(body) = body {
            req = req.json(&body);
        }
        debug!("[API] {} {}", method, path);
        let resp = req.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|e| ApiError::Network(e.to_string()))?;

        // A 401 on an anonymous call (bad password) is an ordinary failure; only
        // a rejected credential ends the session.
        if status == StatusCode::UNAUTHORIZED && authenticated {
            warn!("[API] {} {} rejected the credential, invalidating session", method, path);
            self.session.invalidate();
            return Err(ApiError::Unauthorized);
        }

        if !status.is_success() {
            let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: body.message.or(body.error),
                email: body.email,
                errors: body.errors.into_iter().map(|e| e.msg).filter(|m| !m.is_empty()).collect(),
            });
        }

        let slice: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        serde_json::from_slice(slice).map_err(|e| ApiError::Decode(format!("{} {}: {}", method, path, e)))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<T, ApiError> {
        self.call(Method::POST, path, body).await
    }

    async fn put<T: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<T, ApiError> {
        self.call(Method::PUT, path, body).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call(Method::DELETE, path, None).await
    }
}

fn to_body<T: Serialize>(value: &T) -> Result<Option<Value>, ApiError> {
    serde_json::to_value(value).map(Some).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl DatingApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.post("/auth/login", to_body(credentials)?).await
    }

    async fn register(&self, registration: &Registration) -> Result<RegisterResponse, ApiError> {
        self.post("/auth/register", to_body(registration)?).await
    }

    async fn verify_email(&self, token: &str) -> Result<AuthResponse, ApiError> {
        self.post("/auth/verify-email", Some(serde_json::json!({ "token": token }))).await
    }

    async fn resend_verification(&self, email: &str) -> Result<Ack, ApiError> {
        self.post("/auth/resend-verification", Some(serde_json::json!({ "email": email }))).await
    }

    async fn forgot_password(&self, email: &str) -> Result<Ack, ApiError> {
        self.post("/auth/forgot-password", Some(serde_json::json!({ "email": email }))).await
    }

    async fn reset_password(&self, token: &str, password: &str) -> Result<Ack, ApiError> {
        self.post("/auth/reset-password", Some(serde_json::json!({ "token": token, "password": password })))
            .await
    }

    async fn get_profile(&self) -> Result<User, ApiError> {
        let env: UserEnvelope = self.get("/users/profile").await?;
        Ok(env.user)
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<Ack, ApiError> {
        self.put("/users/profile", to_body(update)?).await
    }

    async fn update_password(&self, change: &PasswordChange) -> Result<Ack, ApiError> {
        self.put("/users/password", to_body(change)?).await
    }

    async fn delete_account(&self) -> Result<Ack, ApiError> {
        self.delete("/users/account").await
    }

    async fn get_user(&self, user_id: &EntityId) -> Result<User, ApiError> {
        let env: UserEnvelope = self.get(&format!("/users/{}", user_id)).await?;
        Ok(env.user)
    }

    async fn get_users(&self, page: u32, limit: u32) -> Result<CandidatePage, ApiError> {
        self.get(&format!("/users?page={}&limit={}", page, limit)).await
    }

    async fn like_user(&self, user_id: &EntityId) -> Result<LikeResponse, ApiError> {
        self.post(&format!("/matches/like/{}", user_id), None).await
    }

    async fn dislike_user(&self, user_id: &EntityId) -> Result<Ack, ApiError> {
        self.post(&format!("/matches/dislike/{}", user_id), None).await
    }

    async fn my_matches(&self) -> Result<Vec<Match>, ApiError> {
        let env: MatchesEnvelope = self.get("/matches/my-matches").await?;
        Ok(env.matches)
    }

    async fn my_likes(&self) -> Result<Vec<LikeRecord>, ApiError> {
        let env: LikesEnvelope = self.get("/matches/my-likes").await?;
        Ok(env.likes)
    }

    async fn likes_me(&self) -> Result<Vec<LikeRecord>, ApiError> {
        let env: LikesEnvelope = self.get("/matches/likes-me").await?;
        Ok(env.likes)
    }

    async fn favorites(&self) -> Result<Vec<Favorite>, ApiError> {
        let env: FavoritesEnvelope = self.get("/favorites").await?;
        Ok(env.favorites)
    }

    async fn add_favorite(&self, user_id: &EntityId) -> Result<Ack, ApiError> {
        self.post(&format!("/favorites/{}", user_id), None).await
    }

    async fn remove_favorite(&self, user_id: &EntityId) -> Result<Ack, ApiError> {
        self.delete(&format!("/favorites/{}", user_id)).await
    }

    async fn conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let env: ConversationsEnvelope = self.get("/messages/conversations").await?;
        Ok(env.conversations)
    }

    async fn messages(&self, conversation_id: &EntityId) -> Result<Vec<Message>, ApiError> {
        let env: MessagesEnvelope = self.get(&format!("/messages/conversation/{}", conversation_id)).await?;
        Ok(env.messages)
    }

    async fn send_message(&self, conversation_id: &EntityId, body: &str) -> Result<SendReceipt, ApiError> {
        let payload = serde_json::json!({ "conversationId": conversation_id, "message": body });
        let resp: Value = self.post("/messages/send", Some(payload)).await?;
        Ok(receipt_from(resp))
    }

    async fn start_conversation(&self, user_id: &EntityId) -> Result<StartedConversation, ApiError> {
        let resp: Value = self.post(&format!("/messages/start-conversation/{}", user_id), None).await?;
        Ok(started_from(&resp))
    }

    async fn notifications(&self) -> Result<Vec<Notification>, ApiError> {
        let env: NotificationsEnvelope = self.get("/notifications").await?;
        Ok(env.notifications)
    }

    async fn mark_notification_read(&self, notification_id: &EntityId) -> Result<Ack, ApiError> {
        self.put(&format!("/notifications/{}/read", notification_id), None).await
    }

    async fn mark_all_notifications_read(&self) -> Result<Ack, ApiError> {
        self.put("/notifications/read-all", None).await
    }

    async fn unread_notification_count(&self) -> Result<u32, ApiError> {
        let env: CountEnvelope = self.get("/notifications/unread-count").await?;
        Ok(env.count)
    }

    async fn onboarding_status(&self) -> Result<OnboardingStatus, ApiError> {
        self.get("/onboarding/status").await
    }

    async fn complete_onboarding(&self, payload: &OnboardingPayload) -> Result<Ack, ApiError> {
        self.post("/onboarding/complete", to_body(payload)?).await
    }
}
