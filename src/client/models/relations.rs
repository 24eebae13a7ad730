use log::{error, info};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use crate::client::models::feed::ActionOutcome;
use crate::client::models::ui_state::LoadState;
use crate::client::services::api_client::{ApiError, DatingApi};
use crate::client::utils::inflight::InFlight;
use crate::client::utils::lock;
use crate::common::models::{EntityId, Favorite, LikeRecord, Match};

/// Directed like edges. A match is exactly a pair of opposite edges.
#[derive(Debug, Clone, Default)]
pub struct LikeGraph {
    edges: HashSet<(EntityId, EntityId)>,
}

impl LikeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn like(&mut self, liker: &EntityId, liked: &EntityId) {
        if liker != liked {
            self.edges.insert((liker.clone(), liked.clone()));
        }
    }

    pub fn unlike(&mut self, liker: &EntityId, liked: &EntityId) {
        self.edges.remove(&(liker.clone(), liked.clone()));
    }

    pub fn likes(&self, liker: &EntityId, liked: &EntityId) -> bool {
        self.edges.contains(&(liker.clone(), liked.clone()))
    }

    pub fn is_match(&self, a: &EntityId, b: &EntityId) -> bool {
        self.likes(a, b) && self.likes(b, a)
    }

    /// Every unordered matched pair, smaller id first.
    pub fn matches(&self) -> BTreeSet<(EntityId, EntityId)> {
        self.edges
            .iter()
            .filter(|(a, b)| self.likes(b, a))
            .map(|(a, b)| if a <= b { (a.clone(), b.clone()) } else { (b.clone(), a.clone()) })
            .collect()
    }

    pub fn matches_of(&self, user: &EntityId) -> BTreeSet<EntityId> {
        self.edges
            .iter()
            .filter(|(a, b)| a == user && self.likes(b, a))
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Builds the viewer's graph from the two like lists.
    pub fn from_lists(viewer: &EntityId, my_likes: &[LikeRecord], likes_me: &[LikeRecord]) -> Self {
        let mut graph = Self::new();
        for l in my_likes {
            graph.like(viewer, &l.id);
            if l.matched {
                graph.like(&l.id, viewer);
            }
        }
        for l in likes_me {
            graph.like(&l.id, viewer);
            if l.liked_back {
                graph.like(viewer, &l.id);
            }
        }
        graph
    }
}

/// Incoming likes flagged `liked_back` that are missing from the match list.
/// Empty when server lists agree.
pub fn missing_matches(likes_me: &[LikeRecord], matches: &[Match]) -> Vec<EntityId> {
    let matched: HashSet<&EntityId> = matches.iter().map(|m| &m.id).collect();
    likes_me.iter().filter(|l| l.liked_back && !matched.contains(&l.id)).map(|l| l.id.clone()).collect()
}

#[derive(Debug)]
struct ListState<T> {
    items: Vec<T>,
    load: LoadState,
}

impl<T> Default for ListState<T> {
    fn default() -> Self {
        Self { items: Vec::new(), load: LoadState::default() }
    }
}

#[derive(Clone)]
pub struct MatchesList {
    api: Arc<dyn DatingApi>,
    state: Arc<Mutex<ListState<Match>>>,
}

impl MatchesList {
    pub fn new(api: Arc<dyn DatingApi>) -> Self {
        Self { api, state: Arc::new(Mutex::new(ListState::default())) }
    }

    pub async fn load(&self) -> Result<(), ApiError> {
        lock(&self.state).load = LoadState::Loading;
        let result = self.api.my_matches().await;
        let mut st = lock(&self.state);
        match result {
            Ok(matches) => {
                info!("[MATCHES] Loaded {} matches", matches.len());
                st.items = matches;
                st.load = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("[MATCHES] Error loading matches: {}", e);
                st.load = LoadState::Failed(e.user_message("Failed to load matches"));
                Err(e)
            }
        }
    }

    pub fn items(&self) -> Vec<Match> {
        lock(&self.state).items.clone()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        lock(&self.state).items.iter().any(|m| &m.id == id)
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.state).load.clone()
    }
}

#[derive(Clone)]
pub struct FavoritesList {
    api: Arc<dyn DatingApi>,
    state: Arc<Mutex<ListState<Favorite>>>,
    in_flight: InFlight,
}

impl FavoritesList {
    pub fn new(api: Arc<dyn DatingApi>) -> Self {
        Self { api, state: Arc::new(Mutex::new(ListState::default())), in_flight: InFlight::new() }
    }

    pub async fn load(&self) -> Result<(), ApiError> {
        lock(&self.state).load = LoadState::Loading;
        let result = self.api.favorites().await;
        let mut st = lock(&self.state);
        match result {
            Ok(favorites) => {
                info!("[FAVORITES] Loaded {} favorites", favorites.len());
                st.items = favorites;
                st.load = LoadState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("[FAVORITES] Error loading favorites: {}", e);
                st.load = LoadState::Failed(e.user_message("Failed to load favorites"));
                Err(e)
            }
        }
    }

    pub fn items(&self) -> Vec<Favorite> {
        lock(&self.state).items.clone()
    }

    pub fn get(&self, id: &EntityId) -> Option<Favorite> {
        lock(&self.state).items.iter().find(|f| &f.id == id).cloned()
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.state).load.clone()
    }

    /// Whether the card offers "Message" rather than "Like to message".
    pub fn can_message(&self, id: &EntityId) -> bool {
        self.get(id).map(|f| f.matched).unwrap_or(false)
    }

    /// Deletes the bookmark on the server and drops it locally. Favoriting the
    /// same user again later creates a fresh record.
    pub async fn remove(&self, id: &EntityId) -> Result<ActionOutcome, ApiError> {
        let Some(_ticket) = self.in_flight.try_begin(id) else {
            return Ok(ActionOutcome::Busy);
        };
        self.api.remove_favorite(id).await.map_err(|e| {
            error!("[FAVORITES] Error removing favorite {}: {}", id, e);
            e
        })?;
        lock(&self.state).items.retain(|f| &f.id != id);
        Ok(ActionOutcome::Applied)
    }
}
