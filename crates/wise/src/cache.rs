use capture_types::Operation;
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// A `Pending` item's waiter list caps out here; a session asking for an
/// identifier already pending beyond this count never receives ops for it
/// this round.
const MAX_PENDING_SESSIONS: usize = 20;

/// A single key's state: either awaiting a response (tracking which
/// sessions asked for it so they can be resolved together), or resolved
/// with the operations the remote returned and the time it was resolved,
/// used to decide whether a later hit is still fresh.
enum Item<Id> {
    Pending { pending_sessions: Vec<Id> },
    Cached { ops: Vec<Operation>, load_time: Instant },
}

/// One identifier kind's cache: a hash index plus an insertion-time LRU
/// over the `Cached` subset. `Pending` items are never on the LRU list —
/// only a resolved entry counts against `max_cache`, matching the
/// insertion-time (not access-time) eviction policy: a cache hit never
/// bumps its entry, only a fresh resolution does.
pub struct KindCache<Id> {
    items: HashMap<String, Item<Id>>,
    order: LruCache<String, ()>,
    cache_ttl: Duration,
}

impl<Id> KindCache<Id> {
    pub fn new(max_cache: usize, cache_ttl: Duration) -> Self {
        KindCache {
            items: HashMap::new(),
            order: LruCache::new(NonZeroUsize::new(max_cache.max(1)).unwrap()),
            cache_ttl,
        }
    }

    /// Returns the cached ops for `key` if it's `Cached` and still fresh as
    /// of `now`. A `Cached` entry older than `cache_ttl` is evicted here and
    /// treated the same as a miss: the caller falls through to
    /// `begin_pending`, matching "expired → detach, free ops, transition to
    /// Pending and behave as Miss".
    pub fn take_cached_if_fresh(&mut self, key: &str, now: Instant) -> Option<Vec<Operation>> {
        match self.items.get(key) {
            Some(Item::Cached { ops, load_time }) => {
                if now.duration_since(*load_time) < self.cache_ttl {
                    Some(ops.clone())
                } else {
                    self.items.remove(key);
                    self.order.pop(key);
                    None
                }
            }
            _ => None,
        }
    }

    pub fn is_pending(&self, key: &str) -> bool {
        matches!(self.items.get(key), Some(Item::Pending { .. }))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Creates a fresh `Pending` entry for `key` if one doesn't already
    /// exist. Returns `true` if this call created it — the caller should
    /// enqueue a network request only on a fresh creation, not a repeat
    /// lookup against an already-pending key.
    pub fn begin_pending(&mut self, key: &str) -> bool {
        if self.items.contains_key(key) {
            return false;
        }
        self.items.insert(
            key.to_string(),
            Item::Pending {
                pending_sessions: Vec::new(),
            },
        );
        true
    }

    /// Appends `session` to `key`'s waiter list. Silently drops it once the
    /// list already holds `MAX_PENDING_SESSIONS` entries: that session just
    /// won't receive ops for this identifier on this round.
    pub fn attach_session(&mut self, key: &str, session: Id) {
        if let Some(Item::Pending { pending_sessions }) = self.items.get_mut(key) {
            if pending_sessions.len() < MAX_PENDING_SESSIONS {
                pending_sessions.push(session);
            }
        }
    }

    /// Transitions `key` from `Pending` to `Cached`, inserting it into the
    /// LRU and evicting the least-recently-resolved entry if `max_cache` is
    /// now exceeded. Returns the sessions that were waiting on it.
    pub fn resolve(&mut self, key: &str, ops: Vec<Operation>, now: Instant) -> Vec<Id> {
        let pending_sessions = match self.items.remove(key) {
            Some(Item::Pending { pending_sessions }) => pending_sessions,
            other => {
                // Not pending (already resolved, or never requested): put it
                // back untouched and report no waiters.
                if let Some(item) = other {
                    self.items.insert(key.to_string(), item);
                }
                Vec::new()
            }
        };

        self.items.insert(
            key.to_string(),
            Item::Cached {
                ops,
                load_time: now,
            },
        );
        if let Some(evicted) = self.order.push(key.to_string(), ()) {
            if evicted.0 != key {
                self.items.remove(&evicted.0);
            }
        }
        pending_sessions
    }

    /// Drops `key` entirely, e.g. after a transport failure frees its
    /// in-flight request: it reverts to absent, not `Cached`, so the next
    /// lookup starts a fresh `Pending` round-trip.
    pub fn drop_key(&mut self, key: &str) -> Vec<Id> {
        match self.items.remove(key) {
            Some(Item::Pending { pending_sessions }) => pending_sessions,
            _ => Vec::new(),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.order.len()
    }
}
