//! Uncached windowed reads.
//!
//! An [`ItemSource`] reads counts and result windows for arbitrary query
//! snapshots straight from the backing service. Selections use it to count
//! and walk the query they were frozen against, which generally differs from
//! whatever the collection's caches currently hold.

use std::sync::Arc;

use horizon_pageable_core::PerfSpan;

use crate::error::Result;
use crate::service::{resolve_ids_skipping_gaps, IdQueryService, PageQueryService, ParamsOf, QueryService};

/// One window read by an [`ItemSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceWindow<T> {
    /// Items of the window, in query order.
    pub items: Vec<T>,
    /// `true` if the query result ends within this window.
    ///
    /// Not the same as `items.len() < size`: an id-based window skips ids
    /// whose items vanished, and may come back short before the end.
    pub exhausted: bool,
}

/// Counts and windows for any query snapshot, bypassing collection caches.
pub trait ItemSource<S: QueryService>: Send + Sync {
    /// The backing service.
    fn service(&self) -> &Arc<S>;

    /// Number of items matching `query`.
    fn count(&self, query: &ParamsOf<S>) -> Result<u64> {
        let _span = PerfSpan::new("item_count");
        self.service().item_count(query)
    }

    /// At most `size` items of the `query` result, starting at `start`.
    fn window(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<SourceWindow<S::Item>>;
}

/// Reads windows from a [`PageQueryService`].
pub struct PageSource<S> {
    service: Arc<S>,
}

impl<S: PageQueryService> PageSource<S> {
    /// Wrap a page-based service.
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

impl<S: PageQueryService> ItemSource<S> for PageSource<S> {
    fn service(&self) -> &Arc<S> {
        &self.service
    }

    fn window(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<SourceWindow<S::Item>> {
        let _span = PerfSpan::new("items");
        let items = self.service.items(query, start, size)?;
        Ok(SourceWindow {
            exhausted: items.len() < size,
            items,
        })
    }
}

/// Reads windows from an [`IdQueryService`]: ids first, then items for ids.
pub struct IdSource<S> {
    service: Arc<S>,
}

impl<S: IdQueryService> IdSource<S> {
    /// Wrap an id-based service.
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

impl<S: IdQueryService> ItemSource<S> for IdSource<S> {
    fn service(&self) -> &Arc<S> {
        &self.service
    }

    fn window(&self, query: &ParamsOf<S>, start: u64, size: usize) -> Result<SourceWindow<S::Item>> {
        let ids = {
            let _span = PerfSpan::new("find_ids");
            self.service.find_ids(query, start, Some(size))?
        };
        Ok(SourceWindow {
            exhausted: ids.len() < size,
            items: resolve_ids_skipping_gaps(self.service.as_ref(), &ids)?,
        })
    }
}
