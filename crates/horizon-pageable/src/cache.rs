//! Window and count caches.
//!
//! Both caches are single-slot: they remember the last window (or count) and
//! nothing else. A UI typically re-reads the page it is showing many times per
//! interaction, so one slot removes almost every redundant round trip without
//! holding more than a page of items.
//!
//! When created with [`WindowCache::watching`] / [`CountCache::watching`] the
//! caches subscribe to their query descriptor and drop the slot as soon as a
//! relevant aspect changes: the window on filter or sort changes, the count on
//! filter changes only (counts are sort independent).
//!
//! [`CachingQueryService`] bundles both in front of a [`PageQueryService`].

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use horizon_pageable_core::logging::targets;
use horizon_pageable_core::PerfSpan;
use parking_lot::Mutex;

use crate::error::Result;
use crate::query::{QueryChange, QueryWatch};
use crate::service::{PageQueryService, ParamsOf, QueryOf, QueryService};

struct CachedWindow<S: QueryService> {
    query: ParamsOf<S>,
    start: u64,
    size: usize,
    items: Arc<Vec<S::Item>>,
    index: HashMap<S::Id, usize>,
}

impl<S: QueryService> CachedWindow<S> {
    fn matches(&self, query: &ParamsOf<S>, start: u64, size: usize) -> bool {
        self.start == start && self.size == size && self.query == *query
    }
}

type WindowSlot<S> = Arc<Mutex<Option<CachedWindow<S>>>>;

fn clear_on<T: Send + 'static>(
    slot: Weak<Mutex<Option<T>>>,
    affected: fn(QueryChange) -> bool,
    what: &'static str,
) -> impl Fn(&QueryChange) + Send + Sync + 'static {
    move |change| {
        if !affected(*change) {
            return;
        }
        if let Some(slot) = slot.upgrade() {
            if slot.lock().take().is_some() {
                tracing::debug!(target: targets::CACHE, ?change, what, "cache slot invalidated");
            }
        }
    }
}

/// Caches the most recently fetched result window.
pub struct WindowCache<S: PageQueryService> {
    service: Arc<S>,
    slot: WindowSlot<S>,
    _watch: Option<QueryWatch<S::Filter, S::Sort>>,
}

impl<S: PageQueryService> WindowCache<S> {
    /// Create a cache that is only invalidated explicitly or by key mismatch.
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            slot: Arc::new(Mutex::new(None)),
            _watch: None,
        }
    }

    /// Create a cache that clears itself when `query`'s filter or sort changes.
    pub fn watching(service: Arc<S>, query: &Arc<QueryOf<S>>) -> Self {
        let slot: WindowSlot<S> = Arc::new(Mutex::new(None));
        let watch = query.watch(clear_on(
            Arc::downgrade(&slot),
            QueryChange::affects_window,
            "window",
        ));
        Self {
            service,
            slot,
            _watch: Some(watch),
        }
    }

    /// Returns the window `[start, start + size)` of the `query` result.
    ///
    /// An exact match of the cached `(query, start, size)` is served without a
    /// backend call; anything else is fetched and replaces the cached window.
    pub fn get(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<Arc<Vec<S::Item>>> {
        let mut slot = self.slot.lock();
        if let Some(cached) = slot.as_ref() {
            if cached.matches(query, start, size) {
                tracing::trace!(target: targets::CACHE, start, size, "window cache hit");
                return Ok(cached.items.clone());
            }
        }

        tracing::debug!(target: targets::CACHE, start, size, "window cache miss");
        let items = {
            let _span = PerfSpan::new("items");
            Arc::new(self.service.items(query, start, size)?)
        };
        let index = items
            .iter()
            .enumerate()
            .map(|(position, item)| (self.service.id_for_item(item), position))
            .collect();
        *slot = Some(CachedWindow {
            query: query.clone(),
            start,
            size,
            items: items.clone(),
            index,
        });
        Ok(items)
    }

    /// Returns `true` if `(query, start, size)` would be served from the cache.
    pub fn is_cached(&self, query: &ParamsOf<S>, start: u64, size: usize) -> bool {
        self.slot
            .lock()
            .as_ref()
            .is_some_and(|cached| cached.matches(query, start, size))
    }

    /// Looks up an item of the cached window by id.
    pub fn lookup(&self, id: &S::Id) -> Option<S::Item> {
        let slot = self.slot.lock();
        let cached = slot.as_ref()?;
        cached
            .index
            .get(id)
            .and_then(|&position| cached.items.get(position).cloned())
    }

    /// Returns the item at absolute `index` of `query` if the cached window covers it.
    pub fn item_at(&self, query: &ParamsOf<S>, index: u64) -> Option<S::Item> {
        let slot = self.slot.lock();
        let cached = slot.as_ref()?;
        if cached.query != *query || index < cached.start {
            return None;
        }
        let offset = usize::try_from(index - cached.start).ok()?;
        cached.items.get(offset).cloned()
    }

    /// Drop the cached window. Returns `true` if a window was cached.
    pub fn invalidate(&self) -> bool {
        self.slot.lock().take().is_some()
    }
}

struct CachedCount<F> {
    filter: Option<F>,
    count: u64,
}

/// Caches the most recently fetched item count, keyed by filter only.
pub struct CountCache<S: QueryService> {
    service: Arc<S>,
    slot: Arc<Mutex<Option<CachedCount<S::Filter>>>>,
    _watch: Option<QueryWatch<S::Filter, S::Sort>>,
}

impl<S: QueryService> CountCache<S> {
    /// Create a cache that is only invalidated explicitly or by key mismatch.
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            slot: Arc::new(Mutex::new(None)),
            _watch: None,
        }
    }

    /// Create a cache that clears itself when `query`'s filter changes.
    pub fn watching(service: Arc<S>, query: &Arc<QueryOf<S>>) -> Self {
        let slot = Arc::new(Mutex::new(None));
        let watch = query.watch(clear_on(
            Arc::downgrade(&slot),
            QueryChange::affects_count,
            "count",
        ));
        Self {
            service,
            slot,
            _watch: Some(watch),
        }
    }

    /// Returns the number of items matching `query`'s filter.
    pub fn count(&self, query: &ParamsOf<S>) -> Result<u64> {
        let mut slot = self.slot.lock();
        if let Some(cached) = slot.as_ref() {
            if cached.filter.as_ref() == query.filter() {
                tracing::trace!(target: targets::CACHE, count = cached.count, "count cache hit");
                return Ok(cached.count);
            }
        }

        tracing::debug!(target: targets::CACHE, "count cache miss");
        let count = {
            let _span = PerfSpan::new("item_count");
            self.service.item_count(query)?
        };
        *slot = Some(CachedCount {
            filter: query.filter().cloned(),
            count,
        });
        Ok(count)
    }

    /// Drop the cached count. Returns `true` if a count was cached.
    pub fn invalidate(&self) -> bool {
        self.slot.lock().take().is_some()
    }
}

/// A [`PageQueryService`] front that answers repeated reads from caches.
///
/// The caches themselves are never handed out; [`invalidate`](Self::invalidate)
/// is the only way to reset them from outside.
pub struct CachingQueryService<S: PageQueryService> {
    service: Arc<S>,
    windows: WindowCache<S>,
    counts: CountCache<S>,
}

impl<S: PageQueryService> CachingQueryService<S> {
    /// Put caches in front of `service`, invalidated by changes to `query`.
    pub fn new(service: Arc<S>, query: &Arc<QueryOf<S>>) -> Self {
        Self {
            windows: WindowCache::watching(service.clone(), query),
            counts: CountCache::watching(service.clone(), query),
            service,
        }
    }

    /// The wrapped service.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Cached [`PageQueryService::items`].
    pub fn items(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<Arc<Vec<S::Item>>> {
        self.windows.get(query, start, size)
    }

    /// Cached [`QueryService::item_count`].
    pub fn item_count(&self, query: &ParamsOf<S>) -> Result<u64> {
        self.counts.count(query)
    }

    /// Point lookup served from the current window when possible.
    pub fn item_for_id(&self, id: &S::Id) -> Result<Option<S::Item>> {
        if let Some(item) = self.windows.lookup(id) {
            return Ok(Some(item));
        }
        let _span = PerfSpan::new("item_for_id");
        self.service.item_for_id(id)
    }

    /// The item at absolute `index` of `query`, from the cached window or a
    /// single-row read that leaves the cached window in place.
    pub fn item_at(&self, query: &ParamsOf<S>, index: u64) -> Result<Option<S::Item>> {
        if let Some(item) = self.windows.item_at(query, index) {
            return Ok(Some(item));
        }
        let _span = PerfSpan::new("items");
        Ok(self.service.items(query, index, 1)?.into_iter().next())
    }

    /// Drop cached window and count. Returns `true` if anything was cached.
    pub fn invalidate(&self) -> bool {
        let windows = self.windows.invalidate();
        let counts = self.counts.invalidate();
        windows || counts
    }
}
