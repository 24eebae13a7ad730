//! Live channel framing.
//!
//! The chat backend speaks Socket.IO v4 on top of Engine.IO v4. Only the text
//! framing is needed here: an Engine.IO packet is one type digit followed by
//! its payload, and an Engine.IO `message` packet carries one Socket.IO packet
//! (type digit, optional ack id, JSON body). Long-polling bodies batch several
//! Engine.IO packets separated by the ASCII record separator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::models::{EntityId, Message};

pub const RECORD_SEPARATOR: char = '\u{1e}';

pub const EVENT_JOIN_CONVERSATION: &str = "join_conversation";
pub const EVENT_NEW_MESSAGE: &str = "new_message";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error("empty packet")]
    Empty,
    #[error("unknown engine packet type '{0}'")]
    UnknownEngineType(char),
    #[error("unknown socket packet type '{0}'")]
    UnknownSocketType(char),
    #[error("invalid packet body: {0}")]
    InvalidBody(String),
}

/// Engine.IO handshake sent by the server right after connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let body = chars.as_str();
        match kind {
            '0' => serde_json::from_str(body)
                .map(EnginePacket::Open)
                .map_err(|e| ProtocolError::InvalidBody(e.to_string())),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(body.to_string())),
            '3' => Ok(EnginePacket::Pong(body.to_string())),
            '4' => Ok(EnginePacket::Message(body.to_string())),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(ProtocolError::UnknownEngineType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(hs) => format!("0{}", serde_json::to_string(hs).unwrap_or_default()),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(p) => format!("2{}", p),
            EnginePacket::Pong(p) => format!("3{}", p),
            EnginePacket::Message(m) => format!("4{}", m),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

/// Socket.IO packets on the default namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event { name: String, args: Vec<Value> },
    ConnectError(Value),
}

impl SocketPacket {
    pub fn event(name: &str, args: Vec<Value>) -> Self {
        SocketPacket::Event { name: name.to_string(), args }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let mut chars = text.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let mut rest = chars.as_str();
        // namespaced packets look like "/chat,{...}"; the app only uses "/"
        if rest.starts_with('/') {
            rest = match rest.find(',') {
                Some(pos) => &rest[pos + 1..],
                None => "",
            };
        }
        let body = rest.trim_start_matches(|c: char| c.is_ascii_digit());
        match kind {
            '0' => {
                if body.is_empty() {
                    Ok(SocketPacket::Connect(None))
                } else {
                    serde_json::from_str(body)
                        .map(|v| SocketPacket::Connect(Some(v)))
                        .map_err(|e| ProtocolError::InvalidBody(e.to_string()))
                }
            }
            '1' => Ok(SocketPacket::Disconnect),
            '2' => {
                let mut items: Vec<Value> = serde_json::from_str(body)
                    .map_err(|e| ProtocolError::InvalidBody(e.to_string()))?;
                if items.is_empty() {
                    return Err(ProtocolError::InvalidBody("event without name".to_string()));
                }
                let name = match items.remove(0) {
                    Value::String(s) => s,
                    other => return Err(ProtocolError::InvalidBody(format!("event name {}", other))),
                };
                Ok(SocketPacket::Event { name, args: items })
            }
            '4' => serde_json::from_str(body)
                .map(SocketPacket::ConnectError)
                .map_err(|e| ProtocolError::InvalidBody(e.to_string())),
            other => Err(ProtocolError::UnknownSocketType(other)),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SocketPacket::Connect(None) => "0".to_string(),
            SocketPacket::Connect(Some(v)) => format!("0{}", v),
            SocketPacket::Disconnect => "1".to_string(),
            SocketPacket::Event { name, args } => {
                let mut items = Vec::with_capacity(args.len() + 1);
                items.push(Value::String(name.clone()));
                items.extend(args.iter().cloned());
                format!("2{}", Value::Array(items))
            }
            SocketPacket::ConnectError(v) => format!("4{}", v),
        }
    }

    /// Wraps this packet into an Engine.IO message frame.
    pub fn into_frame(self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

/// Splits a long-polling response body into Engine.IO packets.
pub fn split_payload(body: &str) -> Vec<&str> {
    body.split(RECORD_SEPARATOR).filter(|p| !p.is_empty()).collect()
}

pub fn join_payload(frames: &[String]) -> String {
    frames.join(&RECORD_SEPARATOR.to_string())
}

pub fn join_conversation_frame(conversation_id: &EntityId) -> String {
    let id = serde_json::to_value(conversation_id).unwrap_or(Value::Null);
    SocketPacket::event(EVENT_JOIN_CONVERSATION, vec![id]).into_frame()
}

/// What the application sees from a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    Connected,
    NewMessage(Message),
    Disconnected(String),
}

/// Maps a decoded Socket.IO event onto an application event. Unknown events
/// yield `None`.
pub fn live_event_from(name: &str, args: &[Value]) -> Result<Option<LiveEvent>, ProtocolError> {
    match name {
        EVENT_NEW_MESSAGE => {
            let payload = args
                .first()
                .cloned()
                .ok_or_else(|| ProtocolError::InvalidBody("new_message without payload".to_string()))?;
            let message: Message = serde_json::from_value(payload)
                .map_err(|e| ProtocolError::InvalidBody(e.to_string()))?;
            Ok(Some(LiveEvent::NewMessage(message)))
        }
        _ => Ok(None),
    }
}
