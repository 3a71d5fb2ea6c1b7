//! Bounded, least-recently-used session cache
//!
//! Sessions live in an arena of nodes threaded into a doubly linked recency
//! list, most recently used at the head. An index maps each session id to
//! its node's slot. Once the cache is full, saving a new session takes over
//! the slot of the session at the tail, so the arena never grows past
//! `max_size` and every operation is O(1).
//!
//! The index, the list and the arena are guarded together by a single lock.

use std::{fmt, num::NonZeroUsize, sync::Arc};

use ahash::AHashMap;
use parking_lot::Mutex;
use smsgate_common::internal;

use crate::{
    config::SessionConfig,
    error::SessionError,
    r#trait::SessionStore,
    session::{Session, SessionId},
};

struct Node<D> {
    session: Arc<Session<D>>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Lru<D> {
    index: AHashMap<SessionId, usize>,
    nodes: Vec<Node<D>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<D> Lru<D> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            index: AHashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    fn node(&self, slot: usize) -> &Node<D> {
        self.nodes.get(slot).unwrap_or_else(|| {
            panic!(
                "Session cache corrupted: slot {slot} out of {} referenced",
                self.nodes.len()
            )
        })
    }

    fn node_mut(&mut self, slot: usize) -> &mut Node<D> {
        let len = self.nodes.len();
        self.nodes.get_mut(slot).unwrap_or_else(|| {
            panic!("Session cache corrupted: slot {slot} out of {len} referenced")
        })
    }

    /// Slot holding `id`, checked against the node it points at.
    fn lookup(&self, id: &SessionId) -> Option<usize> {
        let slot = *self.index.get(id)?;
        let held = &self.node(slot).session.id;
        assert!(
            held == id,
            "Session cache corrupted: index maps {id} to a node holding {held}"
        );
        Some(slot)
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.node_mut(slot);
            (node.prev.take(), node.next.take())
        };

        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, slot: usize) {
        let head = self.head;
        {
            let node = self.node_mut(slot);
            node.prev = None;
            node.next = head;
        }

        match head {
            Some(head) => self.node_mut(head).prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn touch(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    /// Detach the tail node and drop it from the index, returning its slot.
    fn evict(&mut self) -> (usize, SessionId) {
        let Some(slot) = self.tail else {
            panic!(
                "Session cache corrupted: {} sessions indexed but the recency list is empty",
                self.index.len()
            );
        };

        self.unlink(slot);
        let id = self.node(slot).session.id.clone();
        assert!(
            self.index.remove(&id).is_some(),
            "Session cache corrupted: evicted session {id} was not indexed"
        );

        (slot, id)
    }

    /// Ids from most to least recently used.
    #[cfg(test)]
    fn recency(&self) -> Vec<SessionId> {
        let mut ids = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let node = self.node(slot);
            ids.push(node.session.id.clone());
            cursor = node.next;
        }
        ids
    }
}

/// A bounded session store that evicts the least recently used session.
///
/// Both [`get`](Self::get) and [`save`](Self::save) count as a use. Sessions
/// are handed out as [`Arc`]s, so a session evicted while a caller still
/// holds it stays valid for that caller.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use smsgate_session::{Session, SessionCache, SessionId};
///
/// let cache = SessionCache::new(NonZeroUsize::MIN.saturating_add(1));
/// cache.save(Session::new("s-1", "tel:94771234567", 1u32));
/// cache.save(Session::new("s-2", "tel:94771234568", 2u32));
/// cache.save(Session::new("s-3", "tel:94771234569", 3u32));
///
/// assert!(cache.get(&SessionId::from("s-1")).is_none());
/// assert_eq!(cache.len(), 2);
/// ```
pub struct SessionCache<D> {
    max_size: NonZeroUsize,
    inner: Mutex<Lru<D>>,
}

impl<D> fmt::Debug for SessionCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache")
            .field("max_size", &self.max_size)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<D> SessionCache<D> {
    /// Create an empty cache holding at most `max_size` sessions.
    pub fn new(max_size: NonZeroUsize) -> Self {
        Self {
            max_size,
            inner: Mutex::new(Lru::with_capacity(max_size.get())),
        }
    }

    /// Create a cache sized from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if `max_size` is zero.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        Ok(Self::new(config.max_size()?))
    }

    /// Look up a session and mark it most recently used.
    ///
    /// # Panics
    ///
    /// Panics if the index and the recency list disagree, which means the
    /// cache's internal structure is corrupted.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session<D>>> {
        let mut lru = self.inner.lock();
        let slot = lru.lookup(id)?;
        lru.touch(slot);

        Some(Arc::clone(&lru.node(slot).session))
    }

    /// Store `session` as the most recently used one.
    ///
    /// Saving an id already held replaces its session in place. Saving a new
    /// id into a full cache first evicts the least recently used session.
    ///
    /// # Panics
    ///
    /// Panics if the index and the recency list disagree, which means the
    /// cache's internal structure is corrupted.
    pub fn save(&self, session: Session<D>) {
        let session = Arc::new(session);

        let evicted = {
            let mut lru = self.inner.lock();

            if let Some(slot) = lru.lookup(&session.id) {
                lru.node_mut(slot).session = session;
                lru.touch(slot);
                return;
            }

            let id = session.id.clone();
            let node = Node {
                session,
                prev: None,
                next: None,
            };

            let (slot, evicted) = if lru.index.len() >= self.max_size.get() {
                let (slot, evicted) = lru.evict();
                *lru.node_mut(slot) = node;
                (slot, Some(evicted))
            } else {
                lru.nodes.push(node);
                (lru.nodes.len() - 1, None)
            };

            lru.push_front(slot);
            lru.index.insert(id, slot);
            evicted
        };

        if let Some(evicted) = evicted {
            internal!(
                level = DEBUG,
                session_id = %evicted,
                max_size = self.max_size.get(),
                "Session cache full, evicted least recently used session"
            );
        }
    }

    /// Number of sessions held.
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn max_size(&self) -> NonZeroUsize {
        self.max_size
    }
}

impl<D: Send + Sync> SessionStore<D> for SessionCache<D> {
    fn get(&self, id: &SessionId) -> Option<Arc<Session<D>>> {
        Self::get(self, id)
    }

    fn save(&self, session: Session<D>) {
        Self::save(self, session);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn cache(max_size: usize) -> SessionCache<u32> {
        SessionCache::new(NonZeroUsize::new(max_size).unwrap())
    }

    fn session(id: &str, data: u32) -> Session<u32> {
        Session::new(id, format!("tel:{id}"), data)
    }

    fn id(id: &str) -> SessionId {
        SessionId::from(id)
    }

    fn recency(cache: &SessionCache<u32>) -> Vec<SessionId> {
        cache.inner.lock().recency()
    }

    #[test]
    fn test_get_absent_returns_none() {
        let cache = cache(2);
        assert!(cache.get(&id("missing")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overflow_evicts_first_inserted() {
        let cache = cache(3);
        for (i, name) in ["a", "b", "c", "d"].into_iter().enumerate() {
            cache.save(session(name, u32::try_from(i).unwrap()));
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&id("a")).is_none());
        for kept in ["b", "c", "d"] {
            assert!(cache.get(&id(kept)).is_some(), "{kept} should be held");
        }
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let cache = cache(3);
        for name in ["a", "b", "c"] {
            cache.save(session(name, 0));
        }

        assert!(cache.get(&id("a")).is_some());
        cache.save(session("d", 0));

        assert!(cache.get(&id("b")).is_none());
        assert!(cache.get(&id("a")).is_some());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_resave_replaces_without_growing() {
        let cache = cache(2);
        cache.save(session("a", 1));
        cache.save(session("b", 2));
        cache.save(session("a", 10));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&id("a")).unwrap().data, 10);
        assert_eq!(recency(&cache), vec![id("a"), id("b")]);

        // "a" was refreshed by the re-save, so "b" goes first
        cache.save(session("c", 3));
        assert!(cache.get(&id("b")).is_none());
        assert!(cache.get(&id("a")).is_some());
    }

    #[test]
    fn test_recency_order_tracks_uses() {
        let cache = cache(4);
        for name in ["a", "b", "c", "d"] {
            cache.save(session(name, 0));
        }
        cache.get(&id("b"));
        cache.get(&id("d"));
        cache.get(&id("a"));

        assert_eq!(recency(&cache), vec![id("a"), id("d"), id("b"), id("c")]);
    }

    #[test]
    fn test_evicted_slot_is_reused() {
        let cache = cache(2);
        for i in 0..50 {
            cache.save(session(&format!("s-{i}"), i));
        }

        assert_eq!(cache.inner.lock().nodes.len(), 2);
        assert_eq!(recency(&cache), vec![id("s-49"), id("s-48")]);
    }

    #[test]
    fn test_single_slot_cache() {
        let cache = cache(1);
        cache.save(session("a", 1));
        cache.save(session("a", 2));
        assert_eq!(cache.get(&id("a")).unwrap().data, 2);

        cache.save(session("b", 3));
        assert!(cache.get(&id("a")).is_none());
        assert_eq!(cache.get(&id("b")).unwrap().data, 3);
    }

    #[test]
    fn test_evicted_session_outlives_cache_entry() {
        let cache = cache(1);
        cache.save(session("a", 7));
        let held = cache.get(&id("a")).unwrap();

        cache.save(session("b", 0));

        assert!(cache.get(&id("a")).is_none());
        assert_eq!(held.data, 7);
    }

    #[test]
    fn test_concurrent_access_stays_bounded() {
        let cache = cache(64);

        std::thread::scope(|scope| {
            for worker in 0..8u32 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..500u32 {
                        let name = format!("w{worker}-{}", i % 100);
                        if cache.get(&id(&name)).is_none() {
                            cache.save(session(&name, i));
                        }
                        assert!(cache.len() <= 64);
                    }
                });
            }
        });

        assert_eq!(cache.len(), 64);
        let order = recency(&cache);
        assert_eq!(order.len(), 64);
        for held in order {
            assert!(cache.inner.lock().lookup(&held).is_some());
        }
    }

    #[test]
    #[should_panic(expected = "Session cache corrupted")]
    fn test_corrupted_index_panics() {
        let cache = cache(2);
        cache.save(session("a", 1));
        cache.save(session("b", 2));

        {
            let mut lru = cache.inner.lock();
            let slot = lru.index["b"];
            lru.index.insert(id("a"), slot);
        }

        cache.get(&id("a"));
    }
}
