use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::version::types::VersionInfo;

/// Identifies one cached resolution: a package at a version, seen from a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub scope: String,
    pub package_name: String,
    pub version: String,
}

impl CacheKey {
    pub fn new(scope: &str, package_name: &str, version: &str) -> Self {
        Self {
            scope: scope.to_string(),
            package_name: package_name.to_string(),
            version: version.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}@{}", self.scope, self.package_name, self.version)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    data: VersionInfo,
    created_at: Instant,
}

/// Time-boxed, scope-keyed store of resolved version information
///
/// Entries expire purely by age: reading an entry never extends its life.
/// Expired entries are dropped lazily on read and eagerly by [`sweep_expired`].
///
/// [`sweep_expired`]: VersionCache::sweep_expired
pub struct VersionCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl VersionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_millis(config.ttl_ms))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.duration_since(entry.created_at) > self.ttl
    }

    /// Get the cached value if present and not older than the TTL
    pub fn get(&self, scope: &str, package_name: &str, version: &str) -> Option<VersionInfo> {
        let key = CacheKey::new(scope, package_name, version);
        let mut entries = self.lock_entries();
        let entry = entries.get(&key)?;

        if self.is_expired(entry, Instant::now()) {
            debug!("Cache entry expired: {}", key);
            entries.remove(&key);
            return None;
        }

        Some(entry.data.clone())
    }

    /// Store a value, replacing any previous one and resetting its age
    pub fn set(&self, scope: &str, package_name: &str, version: &str, data: VersionInfo) {
        let key = CacheKey::new(scope, package_name, version);
        debug!("Caching {}", key);
        self.lock_entries().insert(
            key,
            CacheEntry {
                data,
                created_at: Instant::now(),
            },
        );
    }

    /// Remove every entry belonging to `scope`, and nothing else
    pub fn invalidate_scope(&self, scope: &str) -> usize {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|key, _| key.scope != scope);
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Invalidated {} cache entries for {}", removed, scope);
        }
        removed
    }

    /// Remove every entry older than the TTL across all scopes
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!("Swept {} expired cache entries", removed);
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }
}

impl Default for VersionCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Run [`VersionCache::sweep_expired`] every `interval` until `cancel` fires
pub fn spawn_sweeper(
    cache: Arc<VersionCache>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Cache sweeper started (every {:?})", interval);
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    cache.sweep_expired();
                }
            }
        }
        info!("Cache sweeper stopped");
    })
}
