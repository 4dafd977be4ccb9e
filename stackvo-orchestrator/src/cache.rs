//! Short-TTL read cache over registry and runtime queries.
//!
//! Entries expire on read once the injected [`Clock`] passes their deadline.
//! Mutations call [`TtlCache::invalidate_all`] when they finish, so a listing
//! requested after a mutation returns never reflects pre-mutation state.
//!
//! Every invalidation bumps a generation counter. A reader that computed its
//! value before the bump stores it with [`TtlCache::set_if_current`], which
//! drops the write instead of caching a pre-mutation snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use stackvo_core::Unit;

pub const SERVICES_KEY: &str = "services";
pub const TOOLS_KEY: &str = "tools_list";
pub const PROJECTS_KEY: &str = "projects";
pub const STATS_KEY: &str = "docker_stats";

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.base + offset
    }
}

/// Container totals cached under [`STATS_KEY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuntimeSummary {
    pub total: usize,
    pub running: usize,
    pub stopped: usize,
}

/// Values the orchestrator caches.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedQuery {
    Units(Vec<Unit>),
    Summary(RuntimeSummary),
}

struct Entries<V> {
    map: HashMap<String, (V, Instant)>,
    generation: u64,
}

/// Map of string keys to values with per-entry expiry.
pub struct TtlCache<V> {
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    entries: Mutex<Entries<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            clock,
            default_ttl,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                generation: 0,
            }),
        }
    }

    /// The live value under `key`, evicting it if expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().ok()?;
        match entries.map.get(key) {
            Some((value, expires)) if now < *expires => Some(value.clone()),
            Some(_) => {
                entries.map.remove(key);
                None
            }
            None => None,
        }
    }

    /// Current invalidation generation. Capture it before computing a value
    /// that will be stored with [`TtlCache::set_if_current`].
    pub fn generation(&self) -> u64 {
        self.entries.lock().map(|e| e.generation).unwrap_or(0)
    }

    pub fn set(&self, key: &str, value: V) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        let expires = self.clock.now() + ttl;
        if let Ok(mut entries) = self.entries.lock() {
            entries.map.insert(key.to_string(), (value, expires));
        }
    }

    /// Store `value` only if no invalidation happened since `generation` was
    /// read. Returns whether the value was cached.
    pub fn set_if_current(&self, key: &str, value: V, ttl: Duration, generation: u64) -> bool {
        let expires = self.clock.now() + ttl;
        let Ok(mut entries) = self.entries.lock() else {
            return false;
        };
        if entries.generation != generation {
            return false;
        }
        entries.map.insert(key.to_string(), (value, expires));
        true
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.map.clear();
            entries.generation = entries.generation.wrapping_add(1);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type QueryCache = TtlCache<CachedQuery>;
