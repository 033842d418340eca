//! Per-session roster cache for the cell editor.
//!
//! A cached roster is tagged with the store's roster version for its cell
//! and is only reused while that version is unchanged, so a write from any
//! caller drops it. Right after a save through the session the store may not
//! yet show the new rows: refetches wait out a settle delay, and an empty
//! result inside the stale window falls back to the roster the save was
//! projected to leave.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use types::{CellKey, RosterView, SaveCellRequest, SaveOutcome, SessionId, TeacherScheduleAssignment};
use uuid::Uuid;

use crate::error::Result;
use crate::staffing::FloaterWeighting;
use crate::{cells, Store};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedRoster {
    pub version: u64,
    pub assignments: Vec<TeacherScheduleAssignment>,
}

#[derive(Debug, Default)]
pub struct RosterCache {
    entries: Mutex<HashMap<CellKey, CachedRoster>>,
}

impl RosterCache {
    pub fn get(&self, key: &CellKey) -> Option<CachedRoster> {
        self.entries.lock().get(key).cloned()
    }

    /// The cached roster if it was fetched at `version`. An outdated entry
    /// is dropped.
    pub fn current(&self, key: &CellKey, version: u64) -> Option<Vec<TeacherScheduleAssignment>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(c) if c.version == version => Some(c.assignments.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: CellKey, version: u64, assignments: Vec<TeacherScheduleAssignment>) {
        self.entries
            .lock()
            .insert(key, CachedRoster { version, assignments });
    }

    pub fn invalidate(&self, key: &CellKey) -> Option<CachedRoster> {
        self.entries.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub settle_delay: Duration,
    pub stale_window: Duration,
    /// Sessions untouched for this long are dropped.
    pub idle_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            stale_window: Duration::from_millis(5000),
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug)]
struct SaveHint {
    at: Instant,
    /// Roster the save is expected to leave in the cell.
    projected: Vec<TeacherScheduleAssignment>,
}

pub struct CellSession<S: Store + ?Sized> {
    store: Arc<S>,
    cache: RosterCache,
    hints: Mutex<HashMap<CellKey, SaveHint>>,
    config: SessionConfig,
    weighting: FloaterWeighting,
    touched: Mutex<Instant>,
}

impl<S: Store + ?Sized> CellSession<S> {
    pub fn new(store: Arc<S>, config: SessionConfig, weighting: FloaterWeighting) -> Self {
        Self {
            store,
            cache: RosterCache::default(),
            hints: Mutex::new(HashMap::new()),
            config,
            weighting,
            touched: Mutex::new(Instant::now()),
        }
    }

    pub fn cache(&self) -> &RosterCache {
        &self.cache
    }

    pub fn touch(&self) {
        *self.touched.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.touched.lock().elapsed()
    }

    pub async fn roster(&self, key: &CellKey) -> Result<RosterView> {
        self.touch();
        let version = self.store.roster_version(key).await?;
        if let Some(assignments) = self.cache.current(key, version) {
            return Ok(RosterView {
                assignments,
                from_cache: true,
                stale: false,
            });
        }

        let hint = self
            .hints
            .lock()
            .get(key)
            .map(|h| (h.at, h.projected.clone()));
        if let Some(wait) = hint
            .as_ref()
            .and_then(|(at, _)| self.config.settle_delay.checked_sub(at.elapsed()))
        {
            debug!(cell = %key, ?wait, "waiting for saved roster to settle");
            tokio::time::sleep(wait).await;
        }

        // read before the fetch so a write racing it leaves the entry outdated
        let version = self.store.roster_version(key).await?;
        let fetched = cells::roster(&*self.store, key).await?;
        if fetched.is_empty() {
            if let Some((at, projected)) = hint {
                if at.elapsed() < self.config.stale_window && !projected.is_empty() {
                    warn!(cell = %key, "empty roster right after save; serving the saved roster");
                    return Ok(RosterView {
                        assignments: projected,
                        from_cache: false,
                        stale: true,
                    });
                }
            }
        }

        self.hints.lock().remove(key);
        self.cache.insert(key.clone(), version, fetched.clone());
        Ok(RosterView {
            assignments: fetched,
            from_cache: false,
            stale: false,
        })
    }

    /// Saves through the engine. Once anything was written every touched
    /// cell leaves the cache and keeps its projected roster as a hint.
    pub async fn save(&self, req: &SaveCellRequest) -> Result<SaveOutcome> {
        self.touch();
        let targets = cells::target_cells(&*self.store, req).await?;
        let mut saved = cells::save_and_project(&*self.store, req, self.weighting).await?;
        if matches!(saved.outcome, SaveOutcome::ConflictsPending { .. }) {
            return Ok(saved.outcome);
        }
        let now = Instant::now();
        let mut hints = self.hints.lock();
        for key in targets {
            self.cache.invalidate(&key);
            let projected = saved.rosters.remove(&key).unwrap_or_default();
            hints.insert(key, SaveHint { at: now, projected });
        }
        Ok(saved.outcome)
    }

    pub fn invalidate(&self, key: &CellKey) {
        self.cache.invalidate(key);
        self.hints.lock().remove(key);
    }
}

/// Open edit sessions keyed by a generated id. Idle sessions are swept
/// whenever a session is opened or looked up.
pub struct Sessions<S: Store + ?Sized> {
    inner: RwLock<HashMap<SessionId, Arc<CellSession<S>>>>,
    store: Arc<S>,
    config: SessionConfig,
    weighting: FloaterWeighting,
}

impl<S: Store + ?Sized> Sessions<S> {
    pub fn new(store: Arc<S>, config: SessionConfig, weighting: FloaterWeighting) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            store,
            config,
            weighting,
        }
    }

    pub fn open(&self) -> SessionId {
        self.sweep();
        let id = SessionId(Uuid::new_v4().to_string());
        let session = CellSession::new(self.store.clone(), self.config, self.weighting);
        self.inner.write().insert(id.clone(), Arc::new(session));
        info!(session = %id, "edit session opened");
        id
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<CellSession<S>>> {
        self.sweep();
        let session = self.inner.read().get(id).cloned()?;
        session.touch();
        Some(session)
    }

    pub fn close(&self, id: &SessionId) -> bool {
        let closed = self.inner.write().remove(id).is_some();
        if closed {
            info!(session = %id, "edit session closed");
        }
        closed
    }

    /// Drops sessions idle longer than the configured ttl.
    pub fn sweep(&self) -> usize {
        let ttl = self.config.idle_ttl;
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|_, s| s.idle_for() < ttl);
        let expired = before - inner.len();
        if expired > 0 {
            info!(expired, open = inner.len(), "idle edit sessions expired");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
