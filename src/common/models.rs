use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Server-assigned identifier. The backend emits ids either as JSON numbers or
/// as strings, so both are accepted and normalised to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // numeric ids go back out as numbers so the server sees what it sent
        match self.0.parse::<i64>() {
            Ok(n) => serializer.serialize_i64(n),
            Err(_) => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Uint(u64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => EntityId(n.to_string()),
            Raw::Uint(n) => EntityId(n.to_string()),
            Raw::Text(s) => EntityId(s),
        })
    }
}

/// Authenticated account as returned by login and `/users/profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: EntityId,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> String {
        display_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

/// Optional location triple shared by every profile summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}

impl Location {
    /// "city, state, country" with missing parts skipped.
    pub fn label(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() { None } else { Some(parts.join(", ")) }
    }
}

/// A browsable profile in the discovery feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: EntityId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default, alias = "isFavorited")]
    pub is_favorited: bool,
}

impl Candidate {
    pub fn display_name(&self) -> String {
        display_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_users: u32,
    pub has_prev: bool,
    pub has_next: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePage {
    pub users: Vec<Candidate>,
    pub pagination: Pagination,
}

/// One side of the like relation, as listed by `my-likes` or `likes-me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeRecord {
    pub id: EntityId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub liked_at: Option<DateTime<Utc>>,
    /// Set on outgoing likes once the other side liked back.
    #[serde(default)]
    pub matched: bool,
    /// Set on incoming likes once the viewer liked back.
    #[serde(default)]
    pub liked_back: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: EntityId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub match_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: EntityId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(flatten)]
    pub location: Location,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default)]
    pub favorited_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub matched: bool,
}

/// Conversation summary row from `/messages/conversations`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: EntityId,
    #[serde(default)]
    pub other_user_id: Option<EntityId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub message_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub unread_count: u32,
}

impl Conversation {
    pub fn title(&self) -> String {
        match self.first_name.as_deref() {
            Some(_) => display_name(self.first_name.as_deref(), self.last_name.as_deref()),
            None => "Unknown User".to_string(),
        }
    }
}

/// A single chat line. Immutable once the server created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: EntityId,
    #[serde(default, alias = "conversationId")]
    pub conversation_id: Option<EntityId>,
    #[serde(alias = "body")]
    pub message: String,
    #[serde(default)]
    pub is_from_me: bool,
    #[serde(default)]
    pub sender_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: EntityId,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "isRead")]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Badge counters. Derived from server truth and safe to recompute at any time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCounts {
    pub notifications: u32,
    pub messages: u32,
    pub likes: u32,
    pub matches: u32,
}

pub(crate) fn display_name(first: Option<&str>, last: Option<&str>) -> String {
    match (first, last) {
        (Some(f), Some(l)) => format!("{} {}", f, l),
        (Some(f), None) => f.to_string(),
        (None, Some(l)) => l.to_string(),
        (None, None) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_accepts_numbers_and_strings() {
        let a: EntityId = serde_json::from_str("42").unwrap();
        let b: EntityId = serde_json::from_str("\"42\"").unwrap();
        let c: EntityId = serde_json::from_str("\"a1b2\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(c.as_str(), "a1b2");
        assert_eq!(serde_json::to_string(&a).unwrap(), "42");
        assert_eq!(serde_json::to_string(&c).unwrap(), "\"a1b2\"");
    }

    #[test]
    fn candidate_decodes_flattened_location() {
        let json = r#"{"id":7,"first_name":"Ana","last_name":"Reyes","age":29,
            "country":"Spain","state":null,"city":"Madrid","photos":["p.jpg"],"is_favorited":true}"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, EntityId::from(7));
        assert!(c.is_favorited);
        assert_eq!(c.location.label().as_deref(), Some("Madrid, Spain"));
        assert_eq!(c.display_name(), "Ana Reyes");
    }

    #[test]
    fn pagination_is_camel_case() {
        let json = r#"{"currentPage":2,"totalPages":5,"totalUsers":60,"hasPrev":true,"hasNext":true}"#;
        let p: Pagination = serde_json::from_str(json).unwrap();
        assert_eq!(p.current_page, 2);
        assert!(p.has_prev && p.has_next);
    }

    #[test]
    fn message_accepts_conversation_id_alias() {
        let json = r#"{"id":"m1","conversationId":3,"message":"hi","is_from_me":false,
            "created_at":"2025-03-01T10:00:00Z"}"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert_eq!(m.conversation_id, Some(EntityId::from(3)));
        assert_eq!(m.message, "hi");
    }

    #[test]
    fn conversation_title_falls_back() {
        let json = r#"{"id":1,"unread_count":2}"#;
        let c: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(c.title(), "Unknown User");
        assert_eq!(c.unread_count, 2);
    }
}
