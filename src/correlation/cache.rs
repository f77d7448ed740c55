//! Pending correlation cache and its durable mirror.
//!
//! # Responsibilities
//! - Hold partially assembled header data per request id (memory tier)
//! - Mirror the whole map under one storage key (durable tier)
//! - Coalesce mutation bursts into one mirror write per quiet window
//! - Hand a request's merged headers to the terminal-event path exactly once
//!
//! # Design Decisions
//! - Memory is authoritative once seeded; a flush writes the full snapshot
//! - Per-key DashMap entries make the fallback check-and-write atomic
//! - One async mutex serializes flushes and consumes, so writes never overlap
//! - Entries untouched for the TTL, or beyond the entry cap, are discarded

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::config::{CaptureConfig, StorageConfig};
use crate::correlation::debounce::Debouncer;
use crate::correlation::types::{unix_millis, HeaderEntry, PendingCorrelation, RequestId};
use crate::observability::metrics;
use crate::storage::{KeyValueStore, StorageResult};

/// Which host channel delivered outgoing headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HeaderChannel {
    /// Authoritative; overwrites whenever it carries a non-empty list.
    #[default]
    Primary,
    /// Only fills an empty slot.
    Fallback,
}

/// Tuning for a [`CorrelationCache`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub mirror_key: String,
    pub debounce: Duration,
    pub ttl: Duration,
    pub max_entries: usize,
}

impl CacheSettings {
    pub fn from_config(storage: &StorageConfig, capture: &CaptureConfig) -> Self {
        Self {
            mirror_key: storage.pending_key.clone(),
            debounce: capture.debounce(),
            ttl: capture.pending_ttl(),
            max_entries: capture.max_pending,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default(), &CaptureConfig::default())
    }
}

/// Two-tier cache of pending correlations.
pub struct CorrelationCache {
    pending: DashMap<RequestId, PendingCorrelation>,
    storage: Arc<dyn KeyValueStore>,
    settings: CacheSettings,
    debouncer: Debouncer,
    /// Held for every mirror write.
    flush_lock: Mutex<()>,
}

impl CorrelationCache {
    /// Create an empty cache over `storage`. Call [`seed`](Self::seed) before use.
    pub fn new(storage: Arc<dyn KeyValueStore>, settings: CacheSettings) -> Self {
        Self {
            pending: DashMap::new(),
            debouncer: Debouncer::new(settings.debounce),
            storage,
            settings,
            flush_lock: Mutex::new(()),
        }
    }

    /// Load the durable mirror into memory.
    ///
    /// Entries already in memory win. Expired and undecodable entries are skipped.
    /// Returns the number of entries loaded.
    pub async fn seed(&self) -> StorageResult<usize> {
        let mirror = self.read_mirror().await?;
        let cutoff = self.expiry_cutoff();
        let mut loaded = 0;
        let mut expired = 0;
        for (id, entry) in mirror {
            if entry.updated_at < cutoff {
                expired += 1;
                continue;
            }
            self.pending.entry(id).or_insert_with(|| {
                loaded += 1;
                entry
            });
        }
        self.enforce_cap();
        if expired > 0 {
            // Rewrite the mirror without the expired entries.
            self.debouncer.arm();
        }
        metrics::record_pending_size(self.pending.len());
        tracing::info!(loaded, expired, "Seeded pending correlations from mirror");
        Ok(loaded)
    }

    /// Record outgoing headers from `channel`.
    ///
    /// Primary overwrites with any non-empty list. Fallback writes only while
    /// the slot is still empty. Returns whether the cache changed.
    pub fn record_request_headers(
        &self,
        request_id: &RequestId,
        channel: HeaderChannel,
        headers: Option<Vec<HeaderEntry>>,
    ) -> bool {
        let Some(headers) = headers.filter(|h| !h.is_empty()) else {
            return false;
        };
        let applied = self.mutate(request_id, |entry| match channel {
            HeaderChannel::Primary => {
                entry.request_headers = Some(headers);
                true
            }
            HeaderChannel::Fallback if entry.request_headers_empty() => {
                entry.request_headers = Some(headers);
                true
            }
            HeaderChannel::Fallback => false,
        });
        if !applied {
            tracing::trace!(request_id = %request_id, "Fallback headers ignored; primary already captured");
        }
        applied
    }

    /// Record incoming headers. Returns whether the cache changed.
    pub fn record_response_headers(
        &self,
        request_id: &RequestId,
        headers: Option<Vec<HeaderEntry>>,
    ) -> bool {
        let Some(headers) = headers else {
            return false;
        };
        self.mutate(request_id, |entry| {
            entry.response_headers = Some(headers);
            true
        })
    }

    /// Apply `patch` under the entry lock and arm the debouncer when it reports a change.
    fn mutate<F>(&self, request_id: &RequestId, patch: F) -> bool
    where
        F: FnOnce(&mut PendingCorrelation) -> bool,
    {
        let inserted = !self.pending.contains_key(request_id);
        let changed = {
            let mut entry = self
                .pending
                .entry(request_id.clone())
                .or_insert_with(|| PendingCorrelation::new(request_id.clone()));
            let changed = patch(entry.value_mut());
            if changed {
                entry.updated_at = unix_millis();
            }
            changed
        };
        if inserted {
            self.enforce_cap();
        }
        if changed || inserted {
            self.debouncer.arm();
            metrics::record_pending_size(self.pending.len());
        }
        changed
    }

    /// Remove and return everything known about `request_id`.
    ///
    /// Flushes pending mutations first, then reads the mirror, deletes the entry
    /// from both tiers and returns the mirror view overlaid with memory.
    pub async fn consume(&self, request_id: &RequestId) -> StorageResult<Option<PendingCorrelation>> {
        let _guard = self.flush_lock.lock().await;
        if self.debouncer.take_dirty() {
            self.write_snapshot().await?;
        }

        let cutoff = self.expiry_cutoff();
        let mirrored = self
            .read_mirror()
            .await?
            .remove(request_id)
            .filter(|entry| entry.updated_at >= cutoff);
        let in_memory = self.pending.remove(request_id).map(|(_, entry)| entry);
        if mirrored.is_none() && in_memory.is_none() {
            return Ok(None);
        }
        metrics::record_pending_size(self.pending.len());

        let merged = match (mirrored, in_memory) {
            (Some(m), Some(mem)) => Some(m.merge(mem)),
            (m, mem) => m.or(mem),
        };

        // Drop the entry from the mirror right away.
        self.debouncer.take_dirty();
        if let Err(e) = self.write_snapshot().await {
            tracing::warn!(
                request_id = %request_id,
                error = %e,
                "Consumed correlation stays in mirror until the next flush"
            );
        }
        Ok(merged)
    }

    /// Drop `request_id` from memory only, when the mirror cannot be reached.
    ///
    /// The mirror catches up on the next successful flush.
    pub fn discard(&self, request_id: &RequestId) -> Option<PendingCorrelation> {
        let removed = self.pending.remove(request_id).map(|(_, entry)| entry);
        if removed.is_some() {
            self.debouncer.arm();
            metrics::record_pending_size(self.pending.len());
        }
        removed
    }

    /// Write the snapshot now if anything changed since the last write.
    pub async fn flush(&self) -> StorageResult<bool> {
        let _guard = self.flush_lock.lock().await;
        if !self.debouncer.take_dirty() {
            return Ok(false);
        }
        self.write_snapshot().await?;
        Ok(true)
    }

    /// Background task: flush once per quiet window until shutdown.
    pub async fn run_flusher(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let Some(mut windows) = self.debouncer.windows() else {
            tracing::warn!("Correlation flusher already running");
            return;
        };
        tracing::debug!(delay = ?self.debouncer.delay(), "Correlation flusher started");

        loop {
            tokio::select! {
                open = windows.next() => {
                    if !open {
                        break;
                    }
                    if let Err(e) = self.flush().await {
                        tracing::warn!(error = %e, "Failed to flush pending correlations");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Correlation flusher received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Final flush before the process exits.
    pub async fn teardown(&self) {
        match self.flush().await {
            Ok(true) => tracing::info!(pending = self.pending.len(), "Flushed pending correlations"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Final flush of pending correlations failed"),
        }
    }

    /// Copy of the in-memory entry for `request_id`.
    pub fn get(&self, request_id: &RequestId) -> Option<PendingCorrelation> {
        self.pending.get(request_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether a mutation is waiting for the next flush.
    pub fn has_unflushed(&self) -> bool {
        self.debouncer.is_dirty()
    }

    /// Caller must hold `flush_lock`.
    async fn write_snapshot(&self) -> StorageResult<()> {
        let started = Instant::now();
        self.expire_stale();
        let snapshot: serde_json::Map<String, Value> = self
            .pending
            .iter()
            .map(|r| Ok((r.key().to_string(), serde_json::to_value(r.value())?)))
            .collect::<Result<_, serde_json::Error>>()?;
        let count = snapshot.len();

        let result = self
            .storage
            .set_value(&self.settings.mirror_key, Value::Object(snapshot))
            .await;
        if result.is_err() {
            // Retry on the next window.
            self.debouncer.arm();
        }
        result?;

        metrics::record_flush(started);
        tracing::debug!(entries = count, "Wrote pending correlation mirror");
        Ok(())
    }

    async fn read_mirror(&self) -> StorageResult<HashMap<RequestId, PendingCorrelation>> {
        let raw = match self.storage.get_value(&self.settings.mirror_key).await? {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => return Ok(HashMap::new()),
            Some(other) => {
                tracing::warn!(value = %other, "Pending mirror is not an object; ignoring it");
                return Ok(HashMap::new());
            }
        };

        Ok(raw
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_value::<PendingCorrelation>(value) {
                Ok(mut entry) => {
                    let id = RequestId::from(id);
                    entry.request_id = id.clone();
                    Some((id, entry))
                }
                Err(e) => {
                    tracing::debug!(request_id = %id, error = %e, "Skipping undecodable mirror entry");
                    None
                }
            })
            .collect())
    }

    fn expiry_cutoff(&self) -> u64 {
        unix_millis().saturating_sub(self.settings.ttl.as_millis() as u64)
    }

    fn expire_stale(&self) {
        let cutoff = self.expiry_cutoff();
        let before = self.pending.len();
        self.pending.retain(|_, entry| entry.updated_at >= cutoff);
        let expired = before - self.pending.len();
        if expired > 0 {
            tracing::info!(expired, "Discarded abandoned pending correlations");
            metrics::record_pending_size(self.pending.len());
        }
    }

    /// Evict the least recently updated entries beyond `max_entries`.
    fn enforce_cap(&self) {
        let excess = self.pending.len().saturating_sub(self.settings.max_entries);
        if excess == 0 {
            return;
        }
        let mut by_age: Vec<(u64, RequestId)> = self
            .pending
            .iter()
            .map(|r| (r.value().updated_at, r.key().clone()))
            .collect();
        by_age.sort();
        for (_, id) in by_age.into_iter().take(excess) {
            self.pending.remove(&id);
        }
        tracing::warn!(evicted = excess, "Pending correlation cap reached; evicted oldest entries");
    }
}
