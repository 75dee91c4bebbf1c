//! Keyed fixture store.
//!
//! Fixtures live in a `BTreeMap` behind a synchronous `RwLock` that is only
//! ever held for a map lookup, clone or insert, never across I/O or an
//! `.await`. Mutations are serialized per fixture id by an async key lock:
//! the holder reads the current record, persists the change through the
//! [`FixtureBackend`], then publishes it into the map. Nothing between the
//! backend write and the publish awaits, so a caller that drops the future
//! leaves either the old record or the new one, never a mix. Different ids
//! mutate in parallel, and readers never wait behind a backend write.
//!
//! Readers see a created fixture as soon as `create` returns. Key lock waits
//! are bounded by the configured operation timeout and surface as the
//! retryable [`StoreError::Unavailable`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::fixture::match_state;
use crate::fixture::{
    validate, EventList, Fixture, FixtureStatus, FootballFullState, InvalidRecord, MatchEvent,
    MatchPhase, MatchStateError, StatusUpdate,
};

/// Failure reported by a [`FixtureBackend`].
#[derive(Debug, Error)]
pub enum BackendError {
    /// Storage could not be reached or written (I/O, busy, poisoned lock).
    #[error("{0:#}")]
    Transient(anyhow::Error),

    /// Storage disagrees with the store's view (row missing, key clash).
    #[error("{0}")]
    OutOfSync(String),
}

/// Durable storage underneath the fixture store.
pub trait FixtureBackend: Send + Sync {
    /// Every stored fixture, fully assembled.
    fn load_all(&self) -> Result<Vec<Fixture>, BackendError>;

    /// Persist a new fixture atomically.
    fn insert(&self, fixture: &Fixture) -> Result<(), BackendError>;

    /// Persist flag/clock/period changes of an existing fixture.
    fn update(&self, fixture: &Fixture) -> Result<(), BackendError>;

    /// Persist one appended event at index `seq` of `list`.
    fn append_event(
        &self,
        fixture_id: &str,
        list: EventList,
        seq: usize,
        event: &MatchEvent,
    ) -> Result<(), BackendError>;

    /// Remove a fixture entirely. Returns false if it was not stored.
    fn remove(&self, fixture_id: &str) -> Result<bool, BackendError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidRecord(#[from] InvalidRecord),

    #[error("fixture {0} already exists")]
    DuplicateId(String),

    #[error("fixture {0} not found")]
    NotFound(String),

    #[error(transparent)]
    MatchState(#[from] MatchStateError),

    /// Transient; the only error callers should retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Backend and in-memory view disagree; retrying will not help.
    #[error("store inconsistent: {0}")]
    Inconsistent(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    fn backend(op: &str, err: BackendError) -> Self {
        match err {
            BackendError::Transient(e) => {
                warn!("Fixture backend {} failed: {:#}", op, e);
                StoreError::Unavailable(format!("{op} failed: {e:#}"))
            }
            BackendError::OutOfSync(msg) => {
                warn!("Fixture backend {} out of sync: {}", op, msg);
                StoreError::Inconsistent(format!("{op}: {msg}"))
            }
        }
    }

    fn poisoned(what: &str) -> Self {
        StoreError::Unavailable(format!("{what} lock poisoned"))
    }
}

type KeyLocks = Arc<StdMutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Exclusive hold on one fixture id. Drops its table entry once unused.
struct KeyGuard {
    key: String,
    locks: KeyLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_key(&self.locks, &self.key);
    }
}

/// Remove the key's lock if no task holds or waits on it.
fn release_key(locks: &KeyLocks, key: &str) {
    if let Ok(mut table) = locks.lock() {
        if table.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            table.remove(key);
        }
    }
}

#[derive(Clone)]
pub struct FixtureStore {
    fixtures: Arc<RwLock<BTreeMap<String, Fixture>>>,
    key_locks: KeyLocks,
    backend: Arc<dyn FixtureBackend>,
    op_timeout: Duration,
}

impl FixtureStore {
    /// Build a store hydrated from everything the backend already holds.
    pub fn open(backend: Arc<dyn FixtureBackend>, op_timeout: Duration) -> anyhow::Result<Self> {
        let fixtures: BTreeMap<String, Fixture> = backend
            .load_all()?
            .into_iter()
            .map(|f| (f.fixture_id.clone(), f))
            .collect();
        info!("Fixture store loaded {} fixture(s)", fixtures.len());
        Ok(FixtureStore {
            fixtures: Arc::new(RwLock::new(fixtures)),
            key_locks: Arc::new(StdMutex::new(HashMap::new())),
            backend,
            op_timeout,
        })
    }

    /// Serialize mutations on one fixture id, waiting at most `op_timeout`.
    async fn lock_key(&self, fixture_id: &str) -> Result<KeyGuard, StoreError> {
        let lock = {
            let mut table = self
                .key_locks
                .lock()
                .map_err(|_| StoreError::poisoned("key table"))?;
            table.entry(fixture_id.to_string()).or_default().clone()
        };

        match tokio::time::timeout(self.op_timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(KeyGuard {
                key: fixture_id.to_string(),
                locks: self.key_locks.clone(),
                guard: Some(guard),
            }),
            Err(_) => {
                release_key(&self.key_locks, fixture_id);
                Err(StoreError::Unavailable(format!(
                    "fixture {} busy for more than {:?}",
                    fixture_id, self.op_timeout
                )))
            }
        }
    }

    fn lookup(&self, fixture_id: &str) -> Result<Option<Fixture>, StoreError> {
        let fixtures = self
            .fixtures
            .read()
            .map_err(|_| StoreError::poisoned("fixture map"))?;
        Ok(fixtures.get(fixture_id).cloned())
    }

    fn publish(&self, fixture: Fixture) -> Result<(), StoreError> {
        let mut fixtures = self
            .fixtures
            .write()
            .map_err(|_| StoreError::poisoned("fixture map"))?;
        fixtures.insert(fixture.fixture_id.clone(), fixture);
        Ok(())
    }

    fn unpublish(&self, fixture_id: &str) -> Result<(), StoreError> {
        let mut fixtures = self
            .fixtures
            .write()
            .map_err(|_| StoreError::poisoned("fixture map"))?;
        fixtures.remove(fixture_id);
        Ok(())
    }

    // ── Create / read / list / delete ────────────────────────────────────────

    /// Validate and store a new fixture. Returns the stored id.
    pub async fn create(&self, record: Fixture) -> Result<String, StoreError> {
        validate(&record)?;

        let _key = self.lock_key(&record.fixture_id).await?;
        if self.lookup(&record.fixture_id)?.is_some() {
            return Err(StoreError::DuplicateId(record.fixture_id));
        }
        self.backend
            .insert(&record)
            .map_err(|e| StoreError::backend("insert", e))?;

        let id = record.fixture_id.clone();
        self.publish(record)?;
        info!("Fixture {} created", id);
        Ok(id)
    }

    pub async fn get(&self, fixture_id: &str) -> Result<Fixture, StoreError> {
        self.lookup(fixture_id)?
            .ok_or_else(|| StoreError::NotFound(fixture_id.to_string()))
    }

    /// Point-in-time snapshot, ordered by fixture id.
    pub async fn list_all(&self) -> Result<Vec<Fixture>, StoreError> {
        let fixtures = self
            .fixtures
            .read()
            .map_err(|_| StoreError::poisoned("fixture map"))?;
        Ok(fixtures.values().cloned().collect())
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let fixtures = self
            .fixtures
            .read()
            .map_err(|_| StoreError::poisoned("fixture map"))?;
        Ok(fixtures.len())
    }

    /// Remove a fixture entirely; a later `get` reports `NotFound`.
    pub async fn delete(&self, fixture_id: &str) -> Result<(), StoreError> {
        let _key = self.lock_key(fixture_id).await?;
        if self.lookup(fixture_id)?.is_none() {
            return Err(StoreError::NotFound(fixture_id.to_string()));
        }
        let removed = self
            .backend
            .remove(fixture_id)
            .map_err(|e| StoreError::backend("remove", e))?;
        if !removed {
            warn!("Fixture {} was cached but missing from backend", fixture_id);
        }
        self.unpublish(fixture_id)?;
        info!("Fixture {} deleted", fixture_id);
        Ok(())
    }

    /// Create each fixture if the store is empty. Returns how many were added.
    pub async fn seed_if_empty(&self, seeds: Vec<Fixture>) -> Result<usize, StoreError> {
        if self.count().await? > 0 {
            return Ok(0);
        }
        let mut added = 0;
        for fixture in seeds {
            match self.create(fixture).await {
                Ok(_) => added += 1,
                Err(StoreError::DuplicateId(id)) => debug!("Seed fixture {} already present", id),
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    // ── Match state ──────────────────────────────────────────────────────────

    /// Append an event to the end of one of the fixture's event lists.
    pub async fn append_event(
        &self,
        fixture_id: &str,
        list: EventList,
        event: MatchEvent,
    ) -> Result<Fixture, StoreError> {
        let _key = self.lock_key(fixture_id).await?;
        let mut next = self
            .lookup(fixture_id)?
            .ok_or_else(|| StoreError::NotFound(fixture_id.to_string()))?;

        let seq = list.events(&next.football_full_state).len();
        next.football_full_state =
            match_state::append_event(&next.football_full_state, list, event.clone())?;
        self.backend
            .append_event(fixture_id, list, seq, &event)
            .map_err(|e| StoreError::backend("append_event", e))?;

        self.publish(next.clone())?;
        debug!("Fixture {}: {}[{}] appended", fixture_id, list, seq);
        Ok(next)
    }

    pub async fn advance_clock(&self, fixture_id: &str, seconds: i64) -> Result<Fixture, StoreError> {
        self.transition(fixture_id, |state| match_state::advance_clock(state, seconds))
            .await
    }

    pub async fn set_status(
        &self,
        fixture_id: &str,
        update: StatusUpdate,
    ) -> Result<Fixture, StoreError> {
        self.transition(fixture_id, |state| match_state::set_status(state, update))
            .await
    }

    pub async fn set_period(&self, fixture_id: &str, period: &str) -> Result<Fixture, StoreError> {
        self.transition(fixture_id, |state| match_state::set_period(state, period))
            .await
    }

    /// Replace the display flags. Allowed in every match phase.
    pub async fn set_fixture_status(
        &self,
        fixture_id: &str,
        status: FixtureStatus,
    ) -> Result<Fixture, StoreError> {
        self.replace(fixture_id, |current| {
            let mut next = current.clone();
            next.fixture_status = status;
            Ok(next)
        })
        .await
    }

    async fn transition<F>(&self, fixture_id: &str, apply: F) -> Result<Fixture, StoreError>
    where
        F: FnOnce(&FootballFullState) -> Result<FootballFullState, MatchStateError>,
    {
        self.replace(fixture_id, |current| {
            let mut next = current.clone();
            next.football_full_state = apply(&current.football_full_state)?;
            Ok(next)
        })
        .await
    }

    /// Under the key lock: compute, persist if changed, publish.
    async fn replace<F>(&self, fixture_id: &str, compute: F) -> Result<Fixture, StoreError>
    where
        F: FnOnce(&Fixture) -> Result<Fixture, StoreError>,
    {
        let _key = self.lock_key(fixture_id).await?;
        let current = self
            .lookup(fixture_id)?
            .ok_or_else(|| StoreError::NotFound(fixture_id.to_string()))?;

        let next = compute(&current)?;
        if next == current {
            return Ok(next);
        }
        self.backend
            .update(&next)
            .map_err(|e| StoreError::backend("update", e))?;

        self.publish(next.clone())?;
        debug!(
            "Fixture {} updated ({:?}, clock={}s, period={:?})",
            fixture_id,
            MatchPhase::of(&next.football_full_state),
            next.football_full_state.game_time_in_seconds,
            next.football_full_state.period
        );
        Ok(next)
    }
}
