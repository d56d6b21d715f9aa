use std::collections::HashSet;
use std::sync::Arc;

use horizon_pageable_core::logging::targets;
use horizon_pageable_core::{Memo, PerfSpan};

use super::{QueryStrategy, StrategyKind};
use crate::error::{PageableError, Result};
use crate::guard::SizeGuardStrategy;
use crate::query::QueryChange;
use crate::service::{resolve_ids_skipping_gaps, IdQueryService, ParamsOf};
use crate::source::{IdSource, ItemSource};

/// The id list of one query.
#[derive(Clone)]
struct LoadedIds<P, Id> {
    query: P,
    ids: Arc<Vec<Id>>,
}

/// Strategy over an [`IdQueryService`].
///
/// The id list is loaded once per query, guarded by the configured
/// [`SizeGuardStrategy`], and kept across page navigation. Local removals
/// prune it in place instead of reloading.
pub struct IdStrategy<S: IdQueryService> {
    service: Arc<S>,
    source: Arc<IdSource<S>>,
    guard: SizeGuardStrategy,
    ids: Memo<LoadedIds<ParamsOf<S>, S::Id>>,
}

impl<S: IdQueryService> IdStrategy<S> {
    /// Create a strategy over `service`.
    pub fn new(service: Arc<S>, guard: SizeGuardStrategy) -> Self {
        Self {
            source: Arc::new(IdSource::new(service.clone())),
            service,
            guard,
            ids: Memo::new(),
        }
    }

    /// The ids matching `query`, loading them on first use.
    ///
    /// Concurrent first calls load once and share the result.
    pub fn ids(&self, query: &ParamsOf<S>) -> Result<Arc<Vec<S::Id>>> {
        let loaded = self.ids.get_or_try_init_if(
            |loaded| loaded.query == *query,
            || {
                let ids = self.guard.load_ids(self.service.as_ref(), query)?;
                tracing::debug!(target: targets::STRATEGY, count = ids.len(), "id list loaded");
                Ok::<_, PageableError>(LoadedIds {
                    query: query.clone(),
                    ids: Arc::new(ids),
                })
            },
        )?;
        Ok(loaded.ids.clone())
    }

    /// Returns `true` if an id list is loaded.
    pub fn is_loaded(&self) -> bool {
        self.ids.is_set()
    }
}

impl<S: IdQueryService> QueryStrategy<S> for IdStrategy<S> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::IdBased
    }

    fn source(&self) -> Arc<dyn ItemSource<S>> {
        self.source.clone()
    }

    fn item_count(&self, query: &ParamsOf<S>) -> Result<u64> {
        Ok(self.ids(query)?.len() as u64)
    }

    fn window(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<Vec<S::Item>> {
        let ids = self.ids(query)?;
        let start = usize::try_from(start).unwrap_or(usize::MAX).min(ids.len());
        let end = start.saturating_add(size).min(ids.len());
        resolve_ids_skipping_gaps(self.service.as_ref(), &ids[start..end])
    }

    fn item_at(&self, query: &ParamsOf<S>, index: u64) -> Result<Option<S::Item>> {
        let ids = self.ids(query)?;
        let Some(id) = usize::try_from(index).ok().and_then(|index| ids.get(index)) else {
            return Ok(None);
        };
        match self.item_for_id(id)? {
            Some(item) => Ok(Some(item)),
            None => Err(PageableError::no_item_for_id(id)),
        }
    }

    fn item_for_id(&self, id: &S::Id) -> Result<Option<S::Item>> {
        let _span = PerfSpan::new("item_for_id");
        self.service.item_for_id(id)
    }

    fn query_changed(&self, change: QueryChange) {
        if self.ids.reset() {
            tracing::debug!(target: targets::STRATEGY, ?change, "id list dropped");
        }
    }

    fn items_removed(&self, ids: &HashSet<S::Id>, query_after: &ParamsOf<S>) {
        let pruned = self.ids.update(|loaded| {
            Arc::make_mut(&mut loaded.ids).retain(|id| !ids.contains(id));
            loaded.query = query_after.clone();
        });
        if pruned {
            tracing::debug!(target: targets::STRATEGY, removed = ids.len(), "id list pruned");
        }
    }

    fn clear_caches(&self) -> bool {
        self.ids.reset()
    }
}
