use keyring::Entry;
use log::warn;
use std::path::PathBuf;
use std::sync::Mutex;

const SERVICE: &str = "desire_client";
const USER: &str = "desire_session";
const FALLBACK_FILE: &str = "session_token.txt";

/// Where the bearer credential survives between runs.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> anyhow::Result<()>;
    fn clear(&self) -> anyhow::Result<()>;
}

/// OS keyring, with an opt-in plain file fallback for machines without one.
pub struct KeyringStore {
    allow_fallback: bool,
    fallback_dir: PathBuf,
}

impl KeyringStore {
    pub fn new(allow_fallback: bool, fallback_dir: impl Into<PathBuf>) -> Self {
        Self { allow_fallback, fallback_dir: fallback_dir.into() }
    }

    fn fallback_path(&self) -> PathBuf {
        self.fallback_dir.join(FALLBACK_FILE)
    }
}

impl CredentialStore for KeyringStore {
    fn load(&self) -> Option<String> {
        let entry = Entry::new(SERVICE, USER);
        match entry.get_password() {
            Ok(t) => {
                if t.trim().is_empty() { None } else { Some(t) }
            }
            Err(_e) => {
                if !self.allow_fallback {
                    return None;
                }
                let s = std::fs::read_to_string(self.fallback_path()).ok()?;
                let t = s.trim().to_string();
                if t.is_empty() { None } else { Some(t) }
            }
        }
    }

    fn save(&self, token: &str) -> anyhow::Result<()> {
        let entry = Entry::new(SERVICE, USER);
        match entry.set_password(token) {
            Ok(()) => Ok(()),
            Err(_e) => {
                if self.allow_fallback {
                    std::fs::create_dir_all(&self.fallback_dir)?;
                    std::fs::write(self.fallback_path(), token)?;
                    // never log the token itself
                    warn!("[SESSION_STORE] Keyring unavailable, persisted token to fallback file");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("keyring unavailable and file fallback disabled"))
                }
            }
        }
    }

    fn clear(&self) -> anyhow::Result<()> {
        let entry = Entry::new(SERVICE, USER);
        let _ = entry.delete_password();
        if self.allow_fallback {
            let path = self.fallback_path();
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Process-local store, used by tests and by callers that do not want persistence.
#[derive(Default)]
pub struct MemoryStore {
    token: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self { token: Mutex::new(Some(token.to_string())) }
    }
}

impl CredentialStore for MemoryStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn save(&self, token: &str) -> anyhow::Result<()> {
        let mut guard = self.token.lock().map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        let mut guard = self.token.lock().map_err(|_| anyhow::anyhow!("credential lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}
