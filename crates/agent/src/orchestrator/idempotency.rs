//! Idempotency store keyed by the client-supplied turn id.
//!
//! Completed envelopes are kept with first-writer-wins semantics. Runs in
//! progress are registered as shared futures so a retry that arrives while
//! the first attempt is still running awaits the same result instead of
//! starting a second run.

use crate::cache::BoundedCache;
use async_trait::async_trait;
use decisionflow_core::ResponseEnvelope;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A turn still running, awaitable by any number of callers.
pub type InflightTurn = Shared<BoxFuture<'static, ResponseEnvelope>>;

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, turn_id: &str) -> Option<ResponseEnvelope>;

    /// Store unless already present. Returns the stored envelope, which is
    /// the first writer's when several race.
    async fn set_if_absent(&self, turn_id: &str, envelope: ResponseEnvelope) -> ResponseEnvelope;

    fn get_inflight(&self, turn_id: &str) -> Option<InflightTurn>;

    /// Register a run. If one is already registered it is returned and
    /// `turn` is not stored.
    fn register_inflight(&self, turn_id: &str, turn: InflightTurn) -> Option<InflightTurn>;

    /// Remove the registration, but only if it is still `turn`.
    fn clear_inflight(&self, turn_id: &str, turn: &InflightTurn);
}

/// Owns a run's in-flight registration and clears it on drop, so a caller
/// dropped mid-run (client gone) does not leave the turn id registered.
pub struct InflightRegistration {
    store: Arc<dyn IdempotencyStore>,
    turn_id: String,
    turn: InflightTurn,
}

impl InflightRegistration {
    pub fn new(store: Arc<dyn IdempotencyStore>, turn_id: &str, turn: InflightTurn) -> Self {
        Self {
            store,
            turn_id: turn_id.to_string(),
            turn,
        }
    }
}

impl Drop for InflightRegistration {
    fn drop(&mut self) {
        self.store.clear_inflight(&self.turn_id, &self.turn);
    }
}

pub struct InMemoryIdempotencyStore {
    completed: BoundedCache<ResponseEnvelope>,
    inflight: Mutex<HashMap<String, InflightTurn>>,
}

impl InMemoryIdempotencyStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            completed: BoundedCache::new(capacity),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn inflight(&self) -> std::sync::MutexGuard<'_, HashMap<String, InflightTurn>> {
        self.inflight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Test reset hook.
    pub fn clear(&self) {
        self.completed.clear();
        self.inflight().clear();
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, turn_id: &str) -> Option<ResponseEnvelope> {
        self.completed.get(turn_id)
    }

    async fn set_if_absent(&self, turn_id: &str, envelope: ResponseEnvelope) -> ResponseEnvelope {
        self.completed.insert_if_absent(turn_id, envelope)
    }

    fn get_inflight(&self, turn_id: &str) -> Option<InflightTurn> {
        self.inflight().get(turn_id).cloned()
    }

    fn register_inflight(&self, turn_id: &str, turn: InflightTurn) -> Option<InflightTurn> {
        let mut inflight = self.inflight();
        if let Some(existing) = inflight.get(turn_id) {
            return Some(existing.clone());
        }
        inflight.insert(turn_id.to_string(), turn);
        None
    }

    fn clear_inflight(&self, turn_id: &str, turn: &InflightTurn) {
        let mut inflight = self.inflight();
        if inflight.get(turn_id).is_some_and(|t| t.ptr_eq(turn)) {
            inflight.remove(turn_id);
        }
    }
}
