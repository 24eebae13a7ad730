use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use desire_client::client::config::ClientConfig;
use desire_client::client::models::session::{SessionEnd, SessionStore};
use desire_client::client::services::api_client::{ApiClient, ApiError, Credentials, DatingApi};
use desire_client::client::utils::session_store::MemoryStore;
use desire_client::common::models::EntityId;

/// Answers each connection with the next canned `(status, body)` pair and
/// records the raw request head.
async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            let head = read_request(&mut stream).await;
            log.lock().unwrap().push(head);
            let reply = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(reply.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    (format!("http://{}/api", addr), seen)
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn client(base: String, session: SessionStore) -> ApiClient {
    let config = ClientConfig { api_base_url: base, ..ClientConfig::default() };
    ApiClient::new(&config, session).unwrap()
}

fn user_json() -> serde_json::Value {
    serde_json::json!({ "id": 7, "first_name": "Sam" })
}

#[tokio::test]
async fn rejected_credential_ends_the_session() {
    let (base, seen) = serve(vec![(401, r#"{"message":"Invalid token"}"#)]).await;
    let session = SessionStore::new(Arc::new(MemoryStore::new()));
    let user = serde_json::from_value(user_json()).unwrap();
    session.login_with("tok-7".into(), user);

    let api = client(base, session.clone());
    let err = api.get_profile().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized));

    let state = session.snapshot();
    assert!(!state.is_authenticated());
    assert_eq!(state.ended, Some(SessionEnd::Expired));

    let head = seen.lock().unwrap()[0].to_ascii_lowercase();
    assert!(head.starts_with("get /api/users/profile"));
    assert!(head.contains("authorization: bearer tok-7"));
}

#[tokio::test]
async fn bad_password_is_an_ordinary_failure() {
    let (base, seen) = serve(vec![(401, r#"{"message":"Invalid credentials"}"#)]).await;
    let session = SessionStore::new(Arc::new(MemoryStore::new()));
    let api = client(base, session.clone());

    let credentials = Credentials { email: "sam@example.com".into(), password: "nope".into() };
    let err = api.login(&credentials).await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 401, .. }));
    assert_eq!(err.user_message("Login failed"), "Invalid credentials");
    assert_eq!(session.snapshot().ended, None);

    let head = seen.lock().unwrap()[0].to_ascii_lowercase();
    assert!(!head.contains("authorization:"));
    assert!(head.contains(r#""email":"sam@example.com""#));
}

#[tokio::test]
async fn validation_errors_are_collected() {
    let body = r#"{"message":"Validation failed","errors":[{"msg":"Age must be at least 18"},{"msg":"Bio is required"}]}"#;
    let (base, _seen) = serve(vec![(400, body)]).await;
    let api = client(base, SessionStore::new(Arc::new(MemoryStore::new())));

    match api.like_user(&EntityId::from(3)).await {
        Err(ApiError::Status { status, errors, .. }) => {
            assert_eq!(status, 400);
            assert_eq!(errors, vec!["Age must be at least 18", "Bio is required"]);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn like_response_reports_the_match() {
    let (base, seen) = serve(vec![(200, r#"{"message":"User liked","isMatch":true}"#)]).await;
    let api = client(base, SessionStore::new(Arc::new(MemoryStore::new())));
    assert!(api.like_user(&EntityId::from(3)).await.unwrap().is_match);
    assert!(seen.lock().unwrap()[0].starts_with("POST /api/matches/like/3"));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let api = client(format!("http://{}/api", addr), SessionStore::new(Arc::new(MemoryStore::new())));
    assert!(matches!(api.get_profile().await, Err(ApiError::Network(_))));
}
