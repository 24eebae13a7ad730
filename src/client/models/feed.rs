//! Discovery feed: one page of candidates plus the like / dislike / favorite
//! actions on them.
//!
//! Liked and disliked candidates leave the feed; favorited ones stay with their
//! flag set. Every action is guarded per candidate id so a double click never
//! reaches the server twice.

use log::{debug, error, info};
use std::sync::{Arc, Mutex};

use crate::client::models::ui_state::LoadState;
use crate::client::services::api_client::{ApiError, DatingApi};
use crate::client::utils::inflight::InFlight;
use crate::client::utils::lock;
use crate::common::models::{Candidate, EntityId, Pagination};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// Like succeeded and the server reported a mutual like.
    Matched,
    /// Another action on the same candidate is still running.
    Busy,
    AlreadyFavorited,
    NotInFeed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// A newer page request was issued while this one was in flight.
    Stale,
}

/// What a renderer draws.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedView {
    Loading,
    Empty,
    Ready(Vec<Candidate>),
    Failed(String),
}

#[derive(Debug, Default)]
struct FeedState {
    candidates: Vec<Candidate>,
    pagination: Option<Pagination>,
    load: LoadState,
    page: u32,
    generation: u64,
}

#[derive(Clone)]
pub struct CandidateFeed {
    api: Arc<dyn DatingApi>,
    state: Arc<Mutex<FeedState>>,
    in_flight: InFlight,
    page_size: u32,
}

impl CandidateFeed {
    pub fn new(api: Arc<dyn DatingApi>, page_size: u32) -> Self {
        Self {
            api,
            state: Arc::new(Mutex::new(FeedState { page: 1, ..FeedState::default() })),
            in_flight: InFlight::new(),
            page_size: page_size.max(1),
        }
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        lock(&self.state).candidates.clone()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        lock(&self.state).candidates.iter().map(|c| c.id.clone()).collect()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        lock(&self.state).candidates.iter().any(|c| &c.id == id)
    }

    pub fn get(&self, id: &EntityId) -> Option<Candidate> {
        lock(&self.state).candidates.iter().find(|c| &c.id == id).cloned()
    }

    pub fn pagination(&self) -> Option<Pagination> {
        lock(&self.state).pagination.clone()
    }

    pub fn current_page(&self) -> u32 {
        lock(&self.state).page
    }

    pub fn load_state(&self) -> LoadState {
        lock(&self.state).load.clone()
    }

    pub fn is_actionable(&self, id: &EntityId) -> bool {
        self.contains(id) && !self.in_flight.contains(id)
    }

    pub fn view(&self) -> FeedView {
        let st = lock(&self.state);
        match &st.load {
            LoadState::Idle | LoadState::Loading => FeedView::Loading,
            LoadState::Failed(msg) if st.candidates.is_empty() => FeedView::Failed(msg.clone()),
            _ if st.candidates.is_empty() => FeedView::Empty,
            _ => FeedView::Ready(st.candidates.clone()),
        }
    }

    /// Replaces the feed with server page `page`. A response that arrives after
    /// a newer request was issued is dropped. The current page only moves when
    /// the page actually loaded.
    pub async fn fetch_page(&self, page: u32) -> Result<FetchOutcome, ApiError> {
        let page = page.max(1);
        let generation = {
            let mut st = lock(&self.state);
            st.generation += 1;
            st.load = LoadState::Loading;
            st.generation
        };

        let result = self.api.get_users(page, self.page_size).await;

        let mut st = lock(&self.state);
        if st.generation != generation {
            debug!("[FEED] Dropping stale page {} (generation {} < {})", page, generation, st.generation);
            return Ok(FetchOutcome::Stale);
        }
        match result {
            Ok(resp) => {
                info!("[FEED] Loaded page {} with {} candidates", page, resp.users.len());
                st.candidates = resp.users;
                st.page = page;
                st.pagination = Some(resp.pagination);
                st.load = LoadState::Ready;
                Ok(FetchOutcome::Applied)
            }
            Err(e) => {
                error!("[FEED] Error loading page {}: {}", page, e);
                st.load = LoadState::Failed(e.user_message("Failed to load profiles"));
                Err(e)
            }
        }
    }

    pub async fn refresh(&self) -> Result<FetchOutcome, ApiError> {
        self.fetch_page(1).await
    }

    /// Moves to the next page when the server says there is one.
    pub async fn next_page(&self) -> Result<Option<FetchOutcome>, ApiError> {
        let target = {
            let st = lock(&self.state);
            match &st.pagination {
                Some(p) if p.has_next => Some(st.page + 1),
                _ => None,
            }
        };
        match target {
            Some(page) => self.fetch_page(page).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn prev_page(&self) -> Result<Option<FetchOutcome>, ApiError> {
        let target = {
            let st = lock(&self.state);
            match &st.pagination {
                Some(p) if p.has_prev && st.page > 1 => Some(st.page - 1),
                _ => None,
            }
        };
        match target {
            Some(page) => self.fetch_page(page).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn like(&self, id: &EntityId) -> Result<ActionOutcome, ApiError> {
        if !self.contains(id) {
            return Ok(ActionOutcome::NotInFeed);
        }
        let Some(_ticket) = self.in_flight.try_begin(id) else {
            return Ok(ActionOutcome::Busy);
        };
        let resp = self.api.like_user(id).await.map_err(|e| {
            error!("[FEED] Error liking user {}: {}", id, e);
            e
        })?;
        self.remove(id);
        Ok(if resp.is_match { ActionOutcome::Matched } else { ActionOutcome::Applied })
    }

    pub async fn dislike(&self, id: &EntityId) -> Result<ActionOutcome, ApiError> {
        if !self.contains(id) {
            return Ok(ActionOutcome::NotInFeed);
        }
        let Some(_ticket) = self.in_flight.try_begin(id) else {
            return Ok(ActionOutcome::Busy);
        };
        self.api.dislike_user(id).await.map_err(|e| {
            error!("[FEED] Error disliking user {}: {}", id, e);
            e
        })?;
        self.remove(id);
        Ok(ActionOutcome::Applied)
    }

    pub async fn favorite(&self, id: &EntityId) -> Result<ActionOutcome, ApiError> {
        match self.get(id) {
            None => return Ok(ActionOutcome::NotInFeed),
            Some(c) if c.is_favorited => return Ok(ActionOutcome::AlreadyFavorited),
            Some(_) => {}
        }
        let Some(_ticket) = self.in_flight.try_begin(id) else {
            return Ok(ActionOutcome::Busy);
        };
        self.api.add_favorite(id).await.map_err(|e| {
            error!("[FEED] Error adding {} to favorites: {}", id, e);
            e
        })?;
        let mut st = lock(&self.state);
        if let Some(c) = st.candidates.iter_mut().find(|c| &c.id == id) {
            c.is_favorited = true;
        }
        Ok(ActionOutcome::Applied)
    }

    fn remove(&self, id: &EntityId) {
        lock(&self.state).candidates.retain(|c| &c.id != id);
    }
}
