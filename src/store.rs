//! # Snapshot store
//! Append-only persistence for `AggregateSnapshot`s.
//!
//! "Latest" is the maximum of `(created_at, append sequence)`, so two
//! snapshots stamped within the same instant still resolve to the one
//! appended last.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::snapshot::AggregateSnapshot;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Always inserts a new document.
    async fn append(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError>;

    /// Newest snapshot of `client_name` that `actor_key` is authorized for.
    async fn latest_for(
        &self,
        client_name: &str,
        actor_key: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError>;

    /// Newest snapshot of any client that `actor_key` is authorized for.
    async fn latest_for_actor(
        &self,
        actor_key: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError>;

    fn name(&self) -> &'static str;
}

pub type DynStore = Arc<dyn SnapshotStore>;

/// Pick the newest matching snapshot; on equal timestamps the later index wins.
fn newest<'a, I>(snapshots: I, client_name: Option<&str>, actor_key: &str) -> Option<AggregateSnapshot>
where
    I: IntoIterator<Item = &'a AggregateSnapshot>,
{
    snapshots
        .into_iter()
        .enumerate()
        .filter(|(_, s)| client_name.map_or(true, |c| s.client_name == c))
        .filter(|(_, s)| s.is_authorized(actor_key))
        .max_by_key(|(seq, s)| (s.created_at, *seq))
        .map(|(_, s)| s.clone())
}

/* ----------------------------
In-memory
---------------------------- */

#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    inner: RwLock<Vec<AggregateSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("snapshot lock poisoned".into())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn append(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError> {
        let mut v = self.inner.write().map_err(|_| Self::poisoned())?;
        v.push(snapshot.clone());
        Ok(())
    }

    async fn latest_for(
        &self,
        client_name: &str,
        actor_key: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError> {
        let v = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(newest(v.iter(), Some(client_name), actor_key))
    }

    async fn latest_for_actor(
        &self,
        actor_key: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError> {
        let v = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(newest(v.iter(), None, actor_key))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/* ----------------------------
JSON lines file
---------------------------- */

/// One JSON document per line. Appends are serialized by a mutex and
/// written with a single `write_all`, so a document lands whole or not at all.
pub struct JsonlSnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// All readable snapshots in append order. A missing file is empty.
    async fn read_all(&self) -> Result<Vec<AggregateSnapshot>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AggregateSnapshot>(line) {
                Ok(s) => out.push(s),
                Err(e) => {
                    warn!(target: "store", path = %self.path.display(), line = n + 1, error = %e, "skipping unreadable snapshot");
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SnapshotStore for JsonlSnapshotStore {
    async fn append(&self, snapshot: &AggregateSnapshot) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(snapshot)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        f.write_all(&line).await?;
        f.flush().await?;
        debug!(target: "store", client = %snapshot.client_name, bytes = line.len(), "snapshot appended");
        Ok(())
    }

    async fn latest_for(
        &self,
        client_name: &str,
        actor_key: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError> {
        let all = self.read_all().await?;
        Ok(newest(all.iter(), Some(client_name), actor_key))
    }

    async fn latest_for_actor(
        &self,
        actor_key: &str,
    ) -> Result<Option<AggregateSnapshot>, StoreError> {
        let all = self.read_all().await?;
        Ok(newest(all.iter(), None, actor_key))
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }
}
