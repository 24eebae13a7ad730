use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST root, e.g. `http://localhost:5000/api`.
    pub api_base_url: String,
    /// Origin of the live channel server.
    pub live_url: String,
    pub poll_interval_secs: u64,
    pub page_size: u32,
    pub request_timeout_secs: u64,
    pub log_level: String,
    pub keyring_fallback: bool,
    pub session_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            live_url: "http://localhost:5000".to_string(),
            poll_interval_secs: 30,
            page_size: 12,
            request_timeout_secs: 15,
            log_level: "info".to_string(),
            keyring_fallback: false,
            session_dir: PathBuf::from("data"),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            api_base_url: env::var("API_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            live_url: env::var("LIVE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.live_url),
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.poll_interval_secs),
            page_size: env::var("PAGE_SIZE").ok().and_then(|v| v.parse().ok()).filter(|v| *v > 0).unwrap_or(defaults.page_size),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            keyring_fallback: env::var("KEYRING_FALLBACK").map(|v| v == "true" || v == "1").unwrap_or(false),
            session_dir: env::var("SESSION_DIR").map(PathBuf::from).unwrap_or(defaults.session_dir),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
