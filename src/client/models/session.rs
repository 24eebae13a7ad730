//! Process-wide authentication state.
//!
//! [`SessionStore`] is a cheap-to-clone handle shared by every component. It is
//! the only writer of the current user and credential; readers take snapshots
//! or subscribe to the underlying watch channel to react to login and logout.

use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::client::services::api_client::{DatingApi, ErrorKind};
use crate::client::utils::session_store::CredentialStore;
use crate::common::models::User;

/// Why the last session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    LoggedOut,
    /// The server rejected the credential; the user must sign in again.
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub token: Option<String>,
    pub is_loading: bool,
    pub ended: Option<SessionEnd>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self { user: None, token: None, is_loading: true, ended: None }
    }
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.token.is_some()
    }

    /// What a protected view should do with this state.
    pub fn gate(&self) -> Gate {
        if self.is_loading {
            Gate::Wait
        } else if self.is_authenticated() {
            Gate::Allow
        } else {
            Gate::SignIn
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Wait,
    Allow,
    SignIn,
}

#[derive(Clone)]
pub struct SessionStore {
    state: Arc<watch::Sender<SessionState>>,
    credentials: Arc<dyn CredentialStore>,
    hydrated: Arc<AtomicBool>,
}

impl SessionStore {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { state: Arc::new(tx), credentials, hydrated: Arc::new(AtomicBool::new(false)) }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn login_with(&self, token: String, user: User) {
        if let Err(e) = self.credentials.save(&token) {
            // the session still works for this run
            warn!("[SESSION] Could not persist credential: {}", e);
        }
        info!("[SESSION] Logged in as user {}", user.id);
        self.state.send_replace(SessionState { user: Some(user), token: Some(token), is_loading: false, ended: None });
    }

    pub fn logout(&self) {
        self.end(SessionEnd::LoggedOut);
    }

    /// Called when the server rejects the credential. No-op when already signed out.
    pub fn invalidate(&self) {
        if self.state.borrow().token.is_none() {
            return;
        }
        self.end(SessionEnd::Expired);
    }

    fn end(&self, reason: SessionEnd) {
        if let Err(e) = self.credentials.clear() {
            warn!("[SESSION] Could not clear persisted credential: {}", e);
        }
        info!("[SESSION] Session ended: {:?}", reason);
        self.state.send_modify(|s| {
            s.user = None;
            s.token = None;
            s.ended = Some(reason);
        });
    }

    /// Restores the persisted credential, if any, and confirms it against the
    /// profile endpoint. Resolves `is_loading` exactly once; later calls return
    /// immediately. Only a rejected credential is forgotten; when the server
    /// cannot be reached the credential stays persisted for the next start.
    /// A login that lands while the profile request is running wins.
    pub async fn hydrate(&self, api: &dyn DatingApi) {
        if self.hydrated.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(token) = self.credentials.load() else {
            self.finish_loading();
            return;
        };

        // expose the token so the profile request carries it
        self.state.send_modify(|s| s.token = Some(token.clone()));
        let result = api.get_profile().await;
        let current = {
            let s = self.state.borrow();
            (s.token.clone(), s.user.is_some())
        };
        match current {
            (Some(t), false) if t == token => {}
            (Some(_), _) => {
                info!("[SESSION] A login completed during restore, keeping it");
                self.finish_loading();
                return;
            }
            // logged out or invalidated by the client while the request ran
            (None, _) => {
                self.finish_loading();
                return;
            }
        }

        match result {
            Ok(user) => {
                info!("[SESSION] Restored session for user {}", user.id);
                self.state.send_modify(|s| s.user = Some(user));
            }
            Err(e) if e.kind() == ErrorKind::Authentication => {
                warn!("[SESSION] Stored credential rejected: {}", e);
                if let Err(e) = self.credentials.clear() {
                    warn!("[SESSION] Could not clear persisted credential: {}", e);
                }
                self.state.send_modify(|s| {
                    s.user = None;
                    s.token = None;
                });
            }
            Err(e) => {
                warn!("[SESSION] Could not confirm stored credential, will retry next start: {}", e);
                self.state.send_modify(|s| s.token = None);
            }
        }
        self.finish_loading();
    }

    fn finish_loading(&self) {
        self.state.send_modify(|s| s.is_loading = false);
    }

    /// Waits until hydration resolved, then returns the state dependents branch on.
    pub async fn wait_ready(&self) -> SessionState {
        let mut rx = self.subscribe();
        let _ = rx.wait_for(|s| !s.is_loading).await;
        self.snapshot()
    }
}
