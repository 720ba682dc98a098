//! In-process remote table.
//!
//! Behaves like the hosted table (per-user row visibility, last write
//! wins, a change feed shared by every client) without a network. Clones
//! share the same rows, so two `RemoteStore`s built on clones of one
//! `MemoryTable` act like two devices signed in to the same backend.
//! Used for offline development and tests; `set_offline` and
//! `fail_next` simulate an unreachable backend, `hold_writes` a slow one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard, broadcast};

use touchcode_core::store::TaskGuard;
use touchcode_core::{ChangeNotice, ChangeTopic, ProjectId, Subscription};

use crate::remote::{Identity, RemoteError, RemoteTable};
use crate::row::ProjectRow;

struct Shared {
    rows: Mutex<HashMap<ProjectId, ProjectRow>>,
    feed: broadcast::Sender<ProjectId>,
    offline: AtomicBool,
    failures: AtomicUsize,
    writes: Arc<AsyncMutex<()>>,
}

/// Shared in-memory table.
#[derive(Clone)]
pub struct MemoryTable {
    shared: Arc<Shared>,
}

impl MemoryTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                rows: Mutex::new(HashMap::new()),
                feed,
                offline: AtomicBool::new(false),
                failures: AtomicUsize::new(0),
                writes: Arc::new(AsyncMutex::new(())),
            }),
        }
    }

    /// Makes every request fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `count` requests fail.
    pub fn fail_next(&self, count: usize) {
        self.shared.failures.store(count, Ordering::SeqCst);
    }

    /// Stalls every upsert until the returned guard is dropped.
    pub async fn hold_writes(&self) -> OwnedMutexGuard<()> {
        self.shared.writes.clone().lock_owned().await
    }

    /// Returns a row regardless of owner.
    pub fn row(&self, id: &ProjectId) -> Option<ProjectRow> {
        self.rows().get(id).cloned()
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows().len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn rows(&self) -> std::sync::MutexGuard<'_, HashMap<ProjectId, ProjectRow>> {
        self.shared.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.shared.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("backend offline".into()));
        }
        let injected = self
            .shared
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(RemoteError::Transport("injected failure".into()));
        }
        Ok(())
    }

    fn announce(&self, id: ProjectId) {
        let _ = self.shared.feed.send(id);
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTable for MemoryTable {
    async fn upsert(&self, identity: &Identity, row: ProjectRow) -> Result<(), RemoteError> {
        let _write = self.shared.writes.lock().await;
        self.check()?;
        if row.user_id != identity.user_id {
            return Err(RemoteError::Unauthorized);
        }

        let id = row.id.clone();
        {
            let mut rows = self.rows();
            if rows
                .get(&id)
                .is_some_and(|existing| existing.user_id != identity.user_id)
            {
                return Err(RemoteError::Unauthorized);
            }
            rows.insert(id.clone(), row);
        }
        self.announce(id);
        Ok(())
    }

    async fn fetch(
        &self,
        identity: &Identity,
        id: &ProjectId,
    ) -> Result<Option<ProjectRow>, RemoteError> {
        self.check()?;
        Ok(self
            .rows()
            .get(id)
            .filter(|row| row.user_id == identity.user_id)
            .cloned())
    }

    async fn list(&self, identity: &Identity) -> Result<Vec<ProjectRow>, RemoteError> {
        self.check()?;
        let mut rows: Vec<_> = self
            .rows()
            .values()
            .filter(|row| row.user_id == identity.user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(rows)
    }

    async fn remove(&self, identity: &Identity, id: &ProjectId) -> Result<(), RemoteError> {
        self.check()?;
        let removed = {
            let mut rows = self.rows();
            match rows.get(id) {
                Some(row) if row.user_id == identity.user_id => rows.remove(id).is_some(),
                _ => false,
            }
        };
        if removed {
            self.announce(id.clone());
        }
        Ok(())
    }

    fn watch(&self, _identity: &Identity, topic: ChangeTopic) -> Result<Subscription, RemoteError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| RemoteError::Transport("no async runtime for change feed".into()))?;

        let mut feed = self.shared.feed.subscribe();
        let (tx, subscription) = Subscription::channel(topic.clone());

        let task = runtime.spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(id) if topic.matches(&id) => {
                        if tx.send(ChangeNotice { project: Some(id) }).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!("Change feed lagged by {} notices", n);
                        let _ = tx.send(ChangeNotice { project: None });
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(subscription.with_guard(TaskGuard::new(task)))
    }
}
