use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::client::models::session::SessionStore;
use crate::common::models::EntityId;
use crate::common::protocol::{
    join_conversation_frame, join_payload, live_event_from, split_payload, EnginePacket, LiveEvent, ProtocolError,
    SocketPacket,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Invalid frame: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Live channel disconnected")]
    Disconnected,
    #[error("Operation timed out")]
    Timeout,
}

/// An open live channel joined to one conversation. Events arrive in the
/// order the transport delivered them. Dropping the subscription stops its
/// background task and closes the connection.
pub struct LiveSubscription {
    conversation_id: EntityId,
    events: mpsc::UnboundedReceiver<LiveEvent>,
    task: Option<JoinHandle<()>>,
}

impl LiveSubscription {
    pub fn new(conversation_id: EntityId, events: mpsc::UnboundedReceiver<LiveEvent>, task: Option<JoinHandle<()>>) -> Self {
        Self { conversation_id, events, task }
    }

    pub fn conversation_id(&self) -> &EntityId {
        &self.conversation_id
    }

    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("[WS:CLIENT] Closed live channel for conversation {}", self.conversation_id);
        }
        self.events.close();
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Opens live subscriptions scoped to a conversation.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    async fn join(&self, conversation_id: &EntityId) -> Result<LiveSubscription, LiveError>;
}

#[derive(Debug, PartialEq)]
pub(crate) enum FrameAction {
    Reply(String),
    Event(LiveEvent),
    Ignore,
    Close(String),
}

/// Decides what to do with one Engine.IO text frame.
pub(crate) fn interpret(frame: &str) -> Result<FrameAction, ProtocolError> {
    Ok(match EnginePacket::decode(frame)? {
        EnginePacket::Ping(payload) => FrameAction::Reply(EnginePacket::Pong(payload).encode()),
        EnginePacket::Close => FrameAction::Close("server closed the session".to_string()),
        EnginePacket::Message(body) => match SocketPacket::decode(&body)? {
            SocketPacket::Event { name, args } => match live_event_from(&name, &args)? {
                Some(event) => FrameAction::Event(event),
                None => FrameAction::Ignore,
            },
            SocketPacket::Connect(_) => FrameAction::Event(LiveEvent::Connected),
            SocketPacket::Disconnect => FrameAction::Close("server disconnected the socket".to_string()),
            SocketPacket::ConnectError(v) => FrameAction::Close(format!("connect error: {}", v)),
        },
        EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => FrameAction::Ignore,
    })
}

pub(crate) fn engine_url(base: &str, transport: &str) -> Result<Url, LiveError> {
    let mut url = Url::parse(base).map_err(|e| LiveError::ConnectionFailed(format!("invalid live url {}: {}", base, e)))?;
    if transport == "websocket" {
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| LiveError::ConnectionFailed(format!("cannot use {} for {}", scheme, base)))?;
    }
    url.set_path("/socket.io/");
    url.query_pairs_mut().clear().append_pair("EIO", "4").append_pair("transport", transport);
    Ok(url)
}

/// Socket.IO client: websocket first, long-polling when the upgrade fails.
pub struct SocketIoConnector {
    base_url: String,
    session: SessionStore,
    http: reqwest::Client,
    max_retry_attempts: u32,
    retry_delay: Duration,
}

impl SocketIoConnector {
    pub fn new(base_url: impl Into<String>, session: SessionStore) -> Self {
        Self {
            base_url: base_url.into(),
            session,
            http: reqwest::Client::new(),
            max_retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }

    fn connect_frame(&self) -> String {
        let auth = self.session.token().map(|t| json!({ "token": t }));
        SocketPacket::Connect(auth).into_frame()
    }

    async fn open_websocket(&self, conversation_id: &EntityId) -> Result<LiveSubscription, LiveError> {
        let url = engine_url(&self.base_url, "websocket")?;
        info!("[WS:CLIENT] Connecting to {}", url);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| LiveError::ConnectionFailed(format!("Failed to connect: {}", e)))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let open = timeout(HANDSHAKE_TIMEOUT, next_text(&mut ws_receiver)).await.map_err(|_| LiveError::Timeout)??;
        match EnginePacket::decode(&open)? {
            EnginePacket::Open(hs) => debug!("[WS:CLIENT] Engine session {} (ping every {}ms)", hs.sid, hs.ping_interval),
            other => return Err(LiveError::Handshake(format!("expected open packet, got {:?}", other))),
        }

        send_text(&mut ws_sender, self.connect_frame()).await?;
        loop {
            let text = timeout(HANDSHAKE_TIMEOUT, next_text(&mut ws_receiver)).await.map_err(|_| LiveError::Timeout)??;
            match interpret(&text)? {
                FrameAction::Event(LiveEvent::Connected) => break,
                FrameAction::Reply(reply) => send_text(&mut ws_sender, reply).await?,
                FrameAction::Close(reason) => return Err(LiveError::Handshake(reason)),
                _ => {}
            }
        }

        send_text(&mut ws_sender, join_conversation_frame(conversation_id)).await?;
        info!("[WS:CLIENT] Joined conversation {} over websocket", conversation_id);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(LiveEvent::Connected);
        let task = tokio::spawn(async move {
            pump_websocket(ws_sender, ws_receiver, tx).await;
        });
        Ok(LiveSubscription::new(conversation_id.clone(), rx, Some(task)))
    }

    async fn open_polling(&self, conversation_id: &EntityId) -> Result<LiveSubscription, LiveError> {
        let base = engine_url(&self.base_url, "polling")?;
        info!("[WS:CLIENT] Falling back to long-polling at {}", base);

        let body = poll_get(&self.http, &base).await?;
        let sid = split_payload(&body)
            .into_iter()
            .find_map(|frame| match EnginePacket::decode(frame) {
                Ok(EnginePacket::Open(hs)) => Some(hs.sid),
                _ => None,
            })
            .ok_or_else(|| LiveError::Handshake("no open packet in polling handshake".to_string()))?;

        let mut url = base;
        url.query_pairs_mut().append_pair("sid", &sid);
        poll_post(&self.http, &url, self.connect_frame()).await?;

        let connected = timeout(HANDSHAKE_TIMEOUT, async {
            loop {
                let body = poll_get(&self.http, &url).await?;
                let mut replies = Vec::new();
                let mut connected = false;
                for frame in split_payload(&body) {
                    match interpret(frame)? {
                        FrameAction::Event(LiveEvent::Connected) => connected = true,
                        FrameAction::Reply(reply) => replies.push(reply),
                        FrameAction::Close(reason) => return Err(LiveError::Handshake(reason)),
                        _ => {}
                    }
                }
                if !replies.is_empty() {
                    poll_post(&self.http, &url, join_payload(&replies)).await?;
                }
                if connected {
                    return Ok::<(), LiveError>(());
                }
            }
        })
        .await;
        connected.map_err(|_| LiveError::Timeout)??;

        poll_post(&self.http, &url, join_conversation_frame(conversation_id)).await?;
        info!("[WS:CLIENT] Joined conversation {} over polling", conversation_id);

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(LiveEvent::Connected);
        let http = self.http.clone();
        let task = tokio::spawn(async move {
            pump_polling(http, url, tx).await;
        });
        Ok(LiveSubscription::new(conversation_id.clone(), rx, Some(task)))
    }
}

#[async_trait]
impl LiveConnector for SocketIoConnector {
    async fn join(&self, conversation_id: &EntityId) -> Result<LiveSubscription, LiveError> {
        let mut delay = self.retry_delay;
        let mut last_error = LiveError::ConnectionFailed("no attempt made".to_string());
        for attempt in 1..=self.max_retry_attempts {
            match self.open_websocket(conversation_id).await {
                Ok(sub) => return Ok(sub),
                Err(e) => warn!("[WS:CLIENT] Websocket attempt {} failed: {}", attempt, e),
            }
            match self.open_polling(conversation_id).await {
                Ok(sub) => return Ok(sub),
                Err(e) => {
                    warn!("[WS:CLIENT] Polling attempt {} failed: {}", attempt, e);
                    last_error = e;
                }
            }
            if attempt < self.max_retry_attempts {
                debug!("[WS:CLIENT] Retrying in {:?}...", delay);
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }
        }
        Err(last_error)
    }
}

async fn next_text(ws_receiver: &mut SplitStream<WsStream>) -> Result<String, LiveError> {
    while let Some(message) = ws_receiver.next().await {
        match message {
            Ok(WsMessage::Text(text)) => return Ok(text),
            Ok(WsMessage::Close(_)) => return Err(LiveError::Disconnected),
            // binary, ping, pong
            Ok(_) => continue,
            Err(e) => return Err(LiveError::ConnectionFailed(e.to_string())),
        }
    }
    Err(LiveError::Disconnected)
}

async fn send_text(ws_sender: &mut SplitSink<WsStream, WsMessage>, text: String) -> Result<(), LiveError> {
    ws_sender.send(WsMessage::Text(text)).await.map_err(|e| LiveError::ConnectionFailed(e.to_string()))
}

async fn pump_websocket(
    mut ws_sender: SplitSink<WsStream, WsMessage>,
    mut ws_receiver: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<LiveEvent>,
) {
    loop {
        let text = match next_text(&mut ws_receiver).await {
            Ok(text) => text,
            Err(e) => {
                let _ = events.send(LiveEvent::Disconnected(e.to_string()));
                break;
            }
        };
        match interpret(&text) {
            Ok(FrameAction::Reply(reply)) => {
                if let Err(e) = send_text(&mut ws_sender, reply).await {
                    let _ = events.send(LiveEvent::Disconnected(e.to_string()));
                    break;
                }
            }
            Ok(FrameAction::Event(event)) => {
                if events.send(event).is_err() {
                    debug!("[WS:CLIENT] Subscriber dropped, stopping websocket pump");
                    break;
                }
            }
            Ok(FrameAction::Ignore) => {}
            Ok(FrameAction::Close(reason)) => {
                let _ = events.send(LiveEvent::Disconnected(reason));
                break;
            }
            Err(e) => warn!("[WS:CLIENT] Failed to parse frame: {} - Raw: {}", e, text),
        }
    }
    let _ = ws_sender.close().await;
}

async fn pump_polling(http: reqwest::Client, url: Url, events: mpsc::UnboundedSender<LiveEvent>) {
    loop {
        let body = match poll_get(&http, &url).await {
            Ok(body) => body,
            Err(e) => {
                let _ = events.send(LiveEvent::Disconnected(e.to_string()));
                return;
            }
        };
        let mut replies = Vec::new();
        for frame in split_payload(&body) {
            match interpret(frame) {
                Ok(FrameAction::Reply(reply)) => replies.push(reply),
                Ok(FrameAction::Event(event)) => {
                    if events.send(event).is_err() {
                        return;
                    }
                }
                Ok(FrameAction::Ignore) => {}
                Ok(FrameAction::Close(reason)) => {
                    let _ = events.send(LiveEvent::Disconnected(reason));
                    return;
                }
                Err(e) => warn!("[WS:CLIENT] Failed to parse polled frame: {} - Raw: {}", e, frame),
            }
        }
        if !replies.is_empty() {
            if let Err(e) = poll_post(&http, &url, join_payload(&replies)).await {
                let _ = events.send(LiveEvent::Disconnected(e.to_string()));
                return;
            }
        }
    }
}

async fn poll_get(http: &reqwest::Client, url: &Url) -> Result<String, LiveError> {
    http.get(url.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?
        .text()
        .await
        .map_err(|e| LiveError::ConnectionFailed(e.to_string()))
}

async fn poll_post(http: &reqwest::Client, url: &Url, body: String) -> Result<(), LiveError> {
    http.post(url.clone())
        .header(reqwest::header::CONTENT_TYPE, "text/plain;charset=UTF-8")
        .body(body)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| LiveError::ConnectionFailed(e.to_string()))?;
    Ok(())
}
