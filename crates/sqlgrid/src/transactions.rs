//! Transactions kept open between requests.
//!
//! A mutating request that leaves rows changed hands its sessions to the
//! pool and returns the id. A later commit or rollback finishes them.
//! Entries older than the idle TTL are rolled back by the sweeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use sqlgrid_core::provider::DatabaseSession;
use sqlgrid_core::row::Row;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::repository::generate_id;

/// Result of a commit or rollback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionOutcome {
    /// False if the id was unknown or already finished.
    pub ok: bool,
    /// Rows kept with the transaction; only returned by commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
}

impl TransactionOutcome {
    const fn missing() -> Self {
        Self {
            ok: false,
            data: None,
        }
    }
}

struct Entry {
    sessions: Vec<Box<dyn DatabaseSession>>,
    data: Option<Vec<Row>>,
    created: Instant,
}

/// Open transactions by id.
pub struct TransactionPool {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    sweep_interval: Duration,
    sweeper: AtomicBool,
}

impl std::fmt::Debug for TransactionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionPool")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl TransactionPool {
    #[must_use]
    pub fn new(ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            sweep_interval,
            sweeper: AtomicBool::new(false),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores sessions as one unit and returns its id.
    pub fn keep(&self, sessions: Vec<Box<dyn DatabaseSession>>, data: Option<Vec<Row>>) -> String {
        let id = generate_id();
        let count = sessions.len();
        self.entries().insert(
            id.clone(),
            Entry {
                sessions,
                data,
                created: Instant::now(),
            },
        );
        debug!(transaction = %id, sessions = count, "Kept transaction");
        id
    }

    /// Number of open entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries().contains_key(id)
    }

    /// Commits every session of an entry and returns its rows.
    ///
    /// A failing session does not stop the others; the first error is
    /// returned after all of them were tried.
    ///
    /// # Errors
    ///
    /// Returns the first commit error.
    pub async fn commit(&self, id: &str) -> crate::error::Result<TransactionOutcome> {
        let removed = self.entries().remove(id);
        let Some(entry) = removed else {
            return Ok(TransactionOutcome::missing());
        };
        let mut first_error = None;
        for session in entry.sessions {
            if let Err(e) = session.commit().await {
                warn!(transaction = %id, error = %e, "Commit failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e.into());
        }
        info!(transaction = %id, "Committed transaction");
        Ok(TransactionOutcome {
            ok: true,
            data: Some(entry.data.unwrap_or_default()),
        })
    }

    /// Rolls every session of an entry back.
    pub async fn rollback(&self, id: &str) -> TransactionOutcome {
        let removed = self.entries().remove(id);
        let Some(entry) = removed else {
            return TransactionOutcome::missing();
        };
        roll_back(id, entry.sessions).await;
        info!(transaction = %id, "Rolled back transaction");
        TransactionOutcome {
            ok: true,
            data: None,
        }
    }

    /// Rolls back every entry that reached the TTL. Returns how many.
    pub async fn sweep(&self) -> usize {
        let expired: Vec<(String, Entry)> = {
            let mut entries = self.entries();
            let now = Instant::now();
            let ids: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| now.duration_since(entry.created) >= self.ttl)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        let count = expired.len();
        for (id, entry) in expired {
            roll_back(&id, entry.sessions).await;
            info!(transaction = %id, "Rolled back idle transaction");
        }
        count
    }

    /// Starts the background sweep. Only the first call starts a task;
    /// the task ends once the pool is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> bool {
        if self.sweeper.swap(true, Ordering::SeqCst) {
            return false;
        }
        let pool: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let Some(pool) = pool.upgrade() else {
                    break;
                };
                pool.sweep().await;
            }
        });
        debug!(interval = ?period, ttl = ?self.ttl, "Started transaction sweeper");
        true
    }
}

async fn roll_back(id: &str, sessions: Vec<Box<dyn DatabaseSession>>) {
    for session in sessions {
        if let Err(e) = session.rollback().await {
            warn!(transaction = %id, error = %e, "Rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use sqlgrid_core::provider::ResultSet;
    use sqlgrid_core::synth::SynthesizedStatement;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counters {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    struct FakeSession(Arc<Counters>);

    impl DatabaseSession for FakeSession {
        fn query<'a>(
            &'a mut self,
            _statement: &'a SynthesizedStatement,
            _max_rows: Option<usize>,
        ) -> BoxFuture<'a, sqlgrid_core::Result<ResultSet>> {
            Box::pin(async { Ok(ResultSet::default()) })
        }

        fn execute<'a>(
            &'a mut self,
            _statement: &'a SynthesizedStatement,
        ) -> BoxFuture<'a, sqlgrid_core::Result<u64>> {
            Box::pin(async { Ok(0) })
        }

        fn commit(self: Box<Self>) -> BoxFuture<'static, sqlgrid_core::Result<()>> {
            self.0.commits.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }

        fn rollback(self: Box<Self>) -> BoxFuture<'static, sqlgrid_core::Result<()>> {
            self.0.rollbacks.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    fn session(counters: &Arc<Counters>) -> Box<dyn DatabaseSession> {
        Box::new(FakeSession(Arc::clone(counters)))
    }

    fn pool() -> Arc<TransactionPool> {
        Arc::new(TransactionPool::new(
            Duration::from_secs(30),
            Duration::from_secs(1),
        ))
    }

    #[tokio::test]
    async fn test_commit_returns_rows_once() {
        let counters = Arc::new(Counters::default());
        let pool = pool();
        let rows = vec![Row::new().with("f1", 1)];
        let id = pool.keep(vec![session(&counters), session(&counters)], Some(rows.clone()));
        assert_eq!(id.len(), 64);

        let outcome = pool.commit(&id).await.unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.data, Some(rows));
        assert_eq!(counters.commits.load(Ordering::SeqCst), 2);

        assert_eq!(pool.commit(&id).await.unwrap(), TransactionOutcome::missing());
        assert!(!pool.rollback(&id).await.ok);
    }

    #[tokio::test]
    async fn test_rollback_has_no_data() {
        let counters = Arc::new(Counters::default());
        let pool = pool();
        let id = pool.keep(vec![session(&counters)], Some(vec![Row::new()]));

        let outcome = pool.rollback(&id).await;
        assert_eq!(serde_json::to_value(&outcome).unwrap(), serde_json::json!({"ok": true}));
        assert_eq!(counters.rollbacks.load(Ordering::SeqCst), 1);
        assert!(pool.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reaps_idle_entries() {
        let counters = Arc::new(Counters::default());
        let pool = pool();
        assert!(pool.start_sweeper());
        assert!(!pool.start_sweeper());

        let id = pool.keep(vec![session(&counters)], None);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(pool.contains(&id));

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert!(!pool.contains(&id));
        assert_eq!(counters.rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(counters.commits.load(Ordering::SeqCst), 0);
    }
}
