use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::clock::Clock;

/// Zone name to backend zone id, invalidated wholesale once per horizon.
///
/// Expiry is a single wall-clock epoch for the whole map, not per entry: the first lookup after
/// the epoch passes clears everything and starts a new epoch. Population of a missing name is
/// single-flighted per name, so two workers resolving the same new zone do not both create it,
/// while unrelated zones resolve in parallel.
pub struct ZoneIdCache {
    clock: Arc<dyn Clock>,
    horizon: Duration,
    state: Mutex<CacheState>,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, String>,
    expires_at: Option<DateTime<Utc>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ZoneIdCache {
    pub fn new(clock: Arc<dyn Clock>, horizon: Duration) -> Self {
        Self {
            clock,
            horizon,
            state: Mutex::new(CacheState::default()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if state.expires_at.is_none_or(|at| at <= now) {
            if !state.entries.is_empty() {
                info!("clearing zone id cache ({} entries)", state.entries.len());
            }
            state.entries.clear();
            state.expires_at = Some(now + self.horizon);
        }
        state.entries.get(name).cloned()
    }

    pub fn insert(&self, name: &str, zone_id: String) {
        lock(&self.state).entries.insert(name.to_string(), zone_id);
    }

    /// Return the cached id for `name`, or run `load` once (per name, across concurrent
    /// callers) and cache its result. Failures are not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, name: &str, load: F) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        if let Some(id) = self.get(name) {
            return Ok(id);
        }

        let gate = {
            let mut inflight = lock(&self.inflight);
            inflight.entry(name.to_string()).or_default().clone()
        };

        let result = {
            let _turn = gate.lock().await;
            match self.get(name) {
                Some(id) => Ok(id),
                None => match load().await {
                    Ok(id) => {
                        self.insert(name, id.clone());
                        Ok(id)
                    }
                    Err(err) => Err(err),
                },
            }
        };

        let mut inflight = lock(&self.inflight);
        // Map entry plus our clone: nobody else is waiting on this gate.
        if Arc::strong_count(&gate) == 2 {
            inflight.remove(name);
        }

        result
    }
}
