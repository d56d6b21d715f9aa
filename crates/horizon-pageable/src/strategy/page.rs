use std::collections::HashSet;
use std::sync::Arc;

use horizon_pageable_core::logging::targets;

use super::{QueryStrategy, StrategyKind};
use crate::cache::CachingQueryService;
use crate::error::Result;
use crate::guard::check_count;
use crate::query::QueryChange;
use crate::service::{PageQueryService, ParamsOf, QueryOf};
use crate::source::{ItemSource, PageSource};

/// Strategy over a [`PageQueryService`].
///
/// Every read goes through a [`CachingQueryService`] watching the collection's
/// query descriptor. The `max_results` limit is checked against the count
/// each page needs anyway, whatever the configured guard strategy.
pub struct PageStrategy<S: PageQueryService> {
    cache: CachingQueryService<S>,
    source: Arc<PageSource<S>>,
}

impl<S: PageQueryService> PageStrategy<S> {
    /// Create a strategy over `service`, invalidated by changes to `query`.
    pub fn new(service: Arc<S>, query: &Arc<QueryOf<S>>) -> Self {
        Self {
            source: Arc::new(PageSource::new(service.clone())),
            cache: CachingQueryService::new(service, query),
        }
    }
}

impl<S: PageQueryService> QueryStrategy<S> for PageStrategy<S> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PageBased
    }

    fn source(&self) -> Arc<dyn ItemSource<S>> {
        self.source.clone()
    }

    fn item_count(&self, query: &ParamsOf<S>) -> Result<u64> {
        let count = self.cache.item_count(query)?;
        check_count(query.max_results(), count)?;
        Ok(count)
    }

    fn window(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<Vec<S::Item>> {
        Ok(self.cache.items(query, start, size)?.to_vec())
    }

    fn item_at(&self, query: &ParamsOf<S>, index: u64) -> Result<Option<S::Item>> {
        self.cache.item_at(query, index)
    }

    fn item_for_id(&self, id: &S::Id) -> Result<Option<S::Item>> {
        self.cache.item_for_id(id)
    }

    fn query_changed(&self, change: QueryChange) {
        // The caches watch the descriptor themselves.
        tracing::trace!(target: targets::STRATEGY, ?change, "query changed");
    }

    fn items_removed(&self, ids: &HashSet<S::Id>, _query_after: &ParamsOf<S>) {
        if self.cache.invalidate() {
            tracing::debug!(target: targets::STRATEGY, removed = ids.len(), "page caches dropped");
        }
    }

    fn clear_caches(&self) -> bool {
        self.cache.invalidate()
    }
}
