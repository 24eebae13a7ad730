use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::client::utils::lock;
use crate::common::models::EntityId;

/// Ids with an outstanding user action. An id stays blocked until the
/// [`InFlightTicket`] returned by [`InFlight::try_begin`] is dropped, which
/// happens on success, on failure and when the action future is cancelled.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<EntityId>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set. Returns `None` when `id` already has an action running.
    pub fn try_begin(&self, id: &EntityId) -> Option<InFlightTicket> {
        let mut ids = lock(&self.ids);
        if !ids.insert(id.clone()) {
            return None;
        }
        Some(InFlightTicket { ids: self.ids.clone(), id: id.clone() })
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        lock(&self.ids).contains(id)
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.ids).is_empty()
    }
}

#[derive(Debug)]
pub struct InFlightTicket {
    ids: Arc<Mutex<HashSet<EntityId>>>,
    id: EntityId,
}

impl InFlightTicket {
    pub fn id(&self) -> &EntityId {
        &self.id
    }
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        lock(&self.ids).remove(&self.id);
    }
}
