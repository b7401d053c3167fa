use crate::session::{SessionRecord, DEFAULT_SESSION_TTL};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use switchyard_core::{BackendId, SwitchyardError, SwitchyardResult};
use tracing::{debug, warn};

/// Task-id keyed store of backend continuation tokens.
///
/// A missing or expired session is not an error: `get` returns `None`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The live record for `task_id`, if any.
    async fn get(&self, task_id: &str) -> SwitchyardResult<Option<SessionRecord>>;
    /// Create or refresh the record for `task_id`.
    async fn put(&self, task_id: &str, backend_id: &BackendId, token: &str) -> SwitchyardResult<()>;
    /// Forget `task_id`. Missing records are not an error.
    async fn remove(&self, task_id: &str) -> SwitchyardResult<()>;
    /// Drop every expired record, returning how many were removed.
    async fn purge_expired(&self) -> SwitchyardResult<usize>;
    /// Number of live records.
    async fn len(&self) -> SwitchyardResult<usize>;
}

/// Inserts between two sweeps of expired records in [`MemorySessionStore`].
pub const DEFAULT_PURGE_INTERVAL: usize = 256;

/// Longest task id (in bytes) stored under its hex encoding; longer ids are
/// stored under a SHA-256 digest to stay within file name limits.
const MAX_HEX_ID_LEN: usize = 100;

/// In-process session store. The default when no session directory is configured.
///
/// Expired records are swept every `purge_interval` inserts, so a long-lived
/// store holds at most the live records plus one interval's worth of stale ones.
pub struct MemorySessionStore {
    ttl: Duration,
    purge_interval: usize,
    inserts: AtomicUsize,
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    /// Empty store whose records expire after `ttl` of inactivity.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            purge_interval: DEFAULT_PURGE_INTERVAL,
            inserts: AtomicUsize::new(0),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Sweep expired records every `interval` inserts (minimum 1).
    pub fn with_purge_interval(mut self, interval: usize) -> Self {
        self.purge_interval = interval.max(1);
        self
    }

    /// Idle time after which a record expires.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn sweep(&self, records: &mut HashMap<String, SessionRecord>) -> usize {
        let now = Utc::now();
        let before = records.len();
        records.retain(|_, rec| !rec.is_expired_at(self.ttl, now));
        before - records.len()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, task_id: &str) -> SwitchyardResult<Option<SessionRecord>> {
        {
            let records = self.records.read();
            match records.get(task_id) {
                None => return Ok(None),
                Some(rec) if !rec.is_expired(self.ttl) => return Ok(Some(rec.clone())),
                Some(_) => {}
            }
        }
        let mut records = self.records.write();
        if records.get(task_id).is_some_and(|r| r.is_expired(self.ttl)) {
            records.remove(task_id);
            debug!(task_id, "Evicted expired session");
        }
        Ok(None)
    }

    async fn put(
        &self,
        task_id: &str,
        backend_id: &BackendId,
        token: &str,
    ) -> SwitchyardResult<()> {
        let mut records = self.records.write();
        match records.get_mut(task_id) {
            Some(rec) if !rec.is_expired(self.ttl) => rec.touch(backend_id.clone(), token),
            _ => {
                records.insert(
                    task_id.to_string(),
                    SessionRecord::new(task_id, backend_id.clone(), token),
                );
                let inserts = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
                if inserts % self.purge_interval == 0 {
                    let purged = self.sweep(&mut records);
                    if purged > 0 {
                        debug!(purged, live = records.len(), "Swept expired sessions");
                    }
                }
            }
        }
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> SwitchyardResult<()> {
        self.records.write().remove(task_id);
        Ok(())
    }

    async fn purge_expired(&self) -> SwitchyardResult<usize> {
        let mut records = self.records.write();
        Ok(self.sweep(&mut records))
    }

    async fn len(&self) -> SwitchyardResult<usize> {
        let now = Utc::now();
        Ok(self
            .records
            .read()
            .values()
            .filter(|rec| !rec.is_expired_at(self.ttl, now))
            .count())
    }
}

/// File-based session store: one JSON file per task under `dir`.
///
/// File names are the hex-encoded task id, or `sha256-<digest>` for ids
/// longer than 100 bytes, so arbitrary caller ids can never escape the
/// directory or exceed file name limits. The record itself carries the real id.
pub struct FileSessionStore {
    dir: PathBuf,
    ttl: Duration,
}

impl FileSessionStore {
    /// Store rooted at `dir`, created if missing.
    pub async fn new(dir: PathBuf, ttl: Duration) -> SwitchyardResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, ttl })
    }

    fn record_path(&self, task_id: &str) -> PathBuf {
        self.dir.join(record_file_name(task_id))
    }

    async fn read_record(&self, path: &PathBuf) -> SwitchyardResult<Option<SessionRecord>> {
        let data = match tokio::fs::read_to_string(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_str(&data)
            .map_err(|e| SwitchyardError::Session(format!("Failed to parse session: {e}")))?;
        Ok(Some(record))
    }

    async fn remove_path(&self, path: &PathBuf) -> SwitchyardResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn record_paths(&self) -> SwitchyardResult<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn record_file_name(task_id: &str) -> String {
    if task_id.len() <= MAX_HEX_ID_LEN {
        format!("{}.json", hex::encode(task_id))
    } else {
        format!("sha256-{}.json", hex::encode(Sha256::digest(task_id.as_bytes())))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn get(&self, task_id: &str) -> SwitchyardResult<Option<SessionRecord>> {
        let path = self.record_path(task_id);
        match self.read_record(&path).await? {
            Some(rec) if rec.task_id != task_id => Ok(None),
            Some(rec) if rec.is_expired(self.ttl) => {
                self.remove_path(&path).await?;
                debug!(task_id, "Evicted expired session");
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn put(
        &self,
        task_id: &str,
        backend_id: &BackendId,
        token: &str,
    ) -> SwitchyardResult<()> {
        let path = self.record_path(task_id);
        let record = match self.read_record(&path).await {
            Ok(Some(mut rec)) if rec.task_id == task_id && !rec.is_expired(self.ttl) => {
                rec.touch(backend_id.clone(), token);
                rec
            }
            Ok(_) => SessionRecord::new(task_id, backend_id.clone(), token),
            Err(e) => {
                warn!(task_id, error = %e, "Replacing unreadable session file");
                SessionRecord::new(task_id, backend_id.clone(), token)
            }
        };
        let json = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }

    async fn remove(&self, task_id: &str) -> SwitchyardResult<()> {
        self.remove_path(&self.record_path(task_id)).await
    }

    async fn purge_expired(&self) -> SwitchyardResult<usize> {
        let now = Utc::now();
        let mut purged = 0;
        for path in self.record_paths().await? {
            let expired = match self.read_record(&path).await {
                Ok(Some(rec)) => rec.is_expired_at(self.ttl, now),
                Ok(None) => false,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Removing corrupt session file");
                    true
                }
            };
            if expired {
                self.remove_path(&path).await?;
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn len(&self) -> SwitchyardResult<usize> {
        let now = Utc::now();
        let mut live = 0;
        for path in self.record_paths().await? {
            if let Ok(Some(rec)) = self.read_record(&path).await {
                if !rec.is_expired_at(self.ttl, now) {
                    live += 1;
                }
            }
        }
        Ok(live)
    }
}
