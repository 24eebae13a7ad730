//! Likes page: outgoing likes ("my likes") and incoming likes ("likes me").
//!
//! Liking back an incoming like removes it from the pending view right away.
//! It becomes a match on the server; the matches list picks it up on its own
//! next load rather than being patched from here.

use log::{error, info};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::client::models::feed::ActionOutcome;
use crate::client::models::ui_state::LoadState;
use crate::client::services::api_client::{ApiError, DatingApi};
use crate::client::utils::inflight::InFlight;
use crate::client::utils::lock;
use crate::common::models::{EntityId, LikeRecord};

#[derive(Debug, Default)]
struct LikesState {
    my_likes: Vec<LikeRecord>,
    likes_me: Vec<LikeRecord>,
    liked_back: HashSet<EntityId>,
    load: LoadState,
}

#[derive(Clone)]
pub struct LikesBoard {
    api: Arc<dyn DatingApi>,
    state: Arc<Mutex<LikesState>>,
    in_flight: InFlight,
}

impl LikesBoard {
    pub fn new(api: Arc<dyn DatingApi>) -> Self {
        Self { api, state: Arc::new(Mutex::new(LikesState::default())), in_flight: InFlight::new() }
    }

    /// Fetches both directions together and rebuilds the liked-back set from
    /// the server's flags.
    pub async fn load(&self) -> Result<(), ApiError> {
        lock(&self.state).load = LoadState::Loading;
        let result = tokio::try_join!(self.api.my_likes(), self.api.likes_me());
        let mut st = lock(&self.state);
        match result {
            Ok((mine, incoming)) => {
                st.liked_back = incoming.iter().filter(|l| l.liked_back).map(|l| l.id.clone()).collect();
                info!("[LIKES] Loaded {} outgoing and {} incoming likes", mine.len(), incoming.len());
                st.my_likes = mine;
                st.likes_me = incoming;
                st.load = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("[LIKES] Error loading likes: {}", e);
                st.load = LoadState::Failed(e.user_message("Failed to load likes"));
                Err(e)
            }
        }
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.state).load.clone()
    }

    pub fn my_likes(&self) -> Vec<LikeRecord> {
        lock(&self.state).my_likes.clone()
    }

    /// Every incoming like still held locally, liked back or not.
    pub fn likes_me(&self) -> Vec<LikeRecord> {
        lock(&self.state).likes_me.clone()
    }

    /// Incoming likes the viewer has not answered yet.
    pub fn pending_incoming(&self) -> Vec<LikeRecord> {
        let st = lock(&self.state);
        st.likes_me.iter().filter(|l| !l.liked_back && !st.liked_back.contains(&l.id)).cloned().collect()
    }

    pub fn is_liked_back(&self, id: &EntityId) -> bool {
        lock(&self.state).liked_back.contains(id)
    }

    pub async fn like_back(&self, id: &EntityId) -> Result<ActionOutcome, ApiError> {
        let Some(_ticket) = self.in_flight.try_begin(id) else {
            return Ok(ActionOutcome::Busy);
        };
        let resp = self.api.like_user(id).await.map_err(|e| {
            error!("[LIKES] Error liking back user {}: {}", id, e);
            e
        })?;
        let mut st = lock(&self.state);
        st.liked_back.insert(id.clone());
        st.likes_me.retain(|l| &l.id != id);
        Ok(if resp.is_match { ActionOutcome::Matched } else { ActionOutcome::Applied })
    }
}
